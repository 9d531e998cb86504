// API module for the sync backend.
pub mod api;

// Re-export api modules at crate root so the binary and the integration
// tests can use crate::models, crate::routes, etc.
pub use api::models;
pub use api::routes;
pub use api::services;
pub use api::storage;
