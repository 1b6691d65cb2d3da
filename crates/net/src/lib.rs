//! Turncoat Network Library
//!
//! TCP plumbing and game orchestration for a five-seat session.
//!
//! # Architecture
//!
//! - **Coordinator**: accepts connections, registers seats, routes frames
//! - **PhaseDriver**: single flow that runs the game once the table is full
//! - **Client**: connects a participant to a coordinator
//! - **Protocol**: length-prefixed JSON messages
//!
//! # Usage
//!
//! ```ignore
//! // One process coordinates
//! let coordinator = Arc::new(Coordinator::start(config).await?);
//! let driver = PhaseDriver::new(coordinator.clone(), bridge);
//! let report = driver.run().await?;
//!
//! // Participants connect
//! let mut client = Client::connect(addr, "alice").await?;
//! while let Some(event) = client.next_event().await {
//!     match event {
//!         CoordinatorEvent::VoteRequested { .. } => client.send_vote(true).await?,
//!         _ => {}
//!     }
//! }
//! ```

pub mod bridge;
pub mod client;
pub mod decision;
pub mod driver;
pub mod error;
mod frame;
pub mod protocol;
pub mod server;

pub use bridge::{DecisionRequest, Notice, PresentationBridge};
pub use client::{Client, CoordinatorEvent};
pub use decision::{Decision, DecisionBook, DecisionKind, Resolution, SlotKey};
pub use driver::{GameReport, PhaseDriver};
pub use error::{Error, Result};
pub use protocol::Message;
pub use server::Coordinator;

/// Default port for turncoat coordinators
pub const DEFAULT_PORT: u16 = 12345;
