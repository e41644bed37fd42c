//! Notification delivery for Vigil.
//!
//! A [`Dispatcher`] fans an incident notification out to every reachable
//! address of every contact, over every configured [`Channel`]. Delivery is
//! best effort: a failing channel or recipient is counted and logged, never
//! raised to the caller.

pub mod channel;
pub mod config;
pub mod dispatch;
pub mod email;
pub mod error;
pub mod push;
pub mod token;

pub use channel::{Channel, IncidentContext};
pub use config::NotifyConfig;
pub use dispatch::{DispatchReport, Dispatcher};
pub use error::ChannelError;
