//! Public client API

pub mod facade;
pub mod config;

pub use facade::{Client, ReleaseOutcome};
pub use config::ClientConfig;
