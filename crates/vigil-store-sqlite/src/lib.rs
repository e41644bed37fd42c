//! SQLite backend for the Vigil escalation engine.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Implements every storage trait in
//! [`vigil_core::store`].

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{NewContact, SqliteStore};

#[cfg(test)]
mod tests;
