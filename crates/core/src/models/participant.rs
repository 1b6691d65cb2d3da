//! Participant and role models

use serde::{Deserialize, Serialize};

/// Seat number at the table (1 through 5)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ParticipantId(pub u8);

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Secret allegiance, dealt once at game start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Resistance,
    Spy,
}

impl Role {
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Resistance => "Resistance",
            Role::Spy => "Spy",
        }
    }

    /// Only spies may sabotage a mission
    pub fn can_sabotage(&self) -> bool {
        matches!(self, Role::Spy)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A registered participant
///
/// The role stays `None` until the roster is complete and roles are dealt.
/// It is never included in broadcast state; each participant learns only
/// their own role through a direct message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub role: Option<Role>,
    pub connected: bool,
}

impl Participant {
    pub fn new(id: ParticipantId, name: String) -> Self {
        Self {
            id,
            name,
            role: None,
            connected: true,
        }
    }

    pub fn is_spy(&self) -> bool {
        self.role == Some(Role::Spy)
    }
}
