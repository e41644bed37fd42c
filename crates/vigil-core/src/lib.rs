//! Core types and trait definitions for the Vigil escalation engine.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage backends, notification channels and the escalation engine itself
//! all depend on it.

pub mod contact;
pub mod error;
pub mod geo;
pub mod incident;
pub mod store;
pub mod subject;
pub mod time;

pub use error::{Error, Result};
