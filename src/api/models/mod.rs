//! Data models: database rows and wire types.

pub mod diagram;
pub mod user;

pub use diagram::*;
pub use user::*;
