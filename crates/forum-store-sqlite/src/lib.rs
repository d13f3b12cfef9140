//! SQLite backend for the forum gateway.
//!
//! One file holds the document tree, the registered identities and the
//! persisted session. Access goes through [`tokio_rusqlite`] so every query
//! runs on a dedicated thread without blocking the async runtime.

mod auth;
mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteGateway;

#[cfg(test)]
mod tests;
