//! Service layer: session tokens, sync protocols, external identity.

pub mod jwt_service;
pub mod oidc_service;
pub mod sync_service;
