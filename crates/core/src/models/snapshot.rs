//! Broadcast view of a session
//!
//! The snapshot is what every participant sees after a state change. It
//! deliberately carries no role information; allegiance reaches each seat
//! only through its own direct role message.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MissionRecord, ParticipantId, Phase};

/// One seat as visible to the whole table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatView {
    pub id: ParticipantId,
    pub name: String,
    pub connected: bool,
}

/// Role-free state of the session, broadcast after every change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub session_id: Uuid,
    pub round: u8,
    pub leader: ParticipantId,
    pub rejections: u8,
    pub phase: Phase,
    pub proposed_team: Vec<ParticipantId>,
    pub missions: Vec<MissionRecord>,
    pub seats: Vec<SeatView>,
}

impl Snapshot {
    pub fn successes(&self) -> u8 {
        self.missions.iter().filter(|m| m.success).count() as u8
    }

    pub fn failures(&self) -> u8 {
        self.missions.iter().filter(|m| !m.success).count() as u8
    }

    pub fn seat_name(&self, id: ParticipantId) -> Option<&str> {
        self.seats
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.name.as_str())
    }
}
