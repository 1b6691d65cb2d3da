//! Turncoat Core Library
//!
//! Domain state, rule table, configuration, and invariants for the Turncoat
//! session coordinator.

pub mod config;
pub mod error;
pub mod invariants;
pub mod models;
pub mod rules;

pub use config::GameConfig;
pub use error::{Error, Result};
pub use models::*;
