//! Data models for Turncoat

mod participant;
mod session;
mod snapshot;

pub use participant::*;
pub use session::*;
pub use snapshot::*;
