//! SQLite storage layer: diagram registry, version store, account store.
//!
//! All operations take a `&mut SqliteConnection` so callers decide the
//! transaction scope; the sync coordinator wraps every write protocol in a
//! single transaction spanning registry and version-store writes.

pub mod diagrams;
pub mod error;
pub mod users;

pub use error::StorageError;
