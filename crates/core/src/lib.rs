//! Shared types for the fanout request dispatcher.
//!
//! Holds the pieces that do not depend on an async runtime: job
//! identifiers, dispatcher configuration and its error type.

pub mod config;
pub mod error;
pub mod types;

pub use config::DispatcherConfig;
pub use error::ConfigError;
pub use types::JobId;
