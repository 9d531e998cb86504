//! Diagram sync backend: versioned diagram storage, sync protocols, and
//! single-session authentication.

pub mod models;
pub mod routes;
pub mod services;
pub mod storage;
