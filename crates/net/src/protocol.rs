//! Network protocol message types
//!
//! All messages are JSON-serialized and length-prefixed on the wire.
//! Deadlines travel as milliseconds remaining (`deadline_ms`) rather than
//! wall-clock instants, so peers need no clock agreement.

use serde::{Deserialize, Serialize};

use turncoat_core::{MissionRecord, ParticipantId, Role, Snapshot, Winner};

use crate::error::{Error, Result};

/// Network protocol messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    // -- client to server --
    /// First message on a new connection: request a seat
    Join { name: String },

    /// Echo of the assigned seat, completing the handshake
    Ready { participant_id: ParticipantId },

    /// Leader's proposed mission team
    TeamSelectionResponse { members: Vec<ParticipantId> },

    /// Approve or reject the current proposal
    VoteResponse { approve: bool },

    /// Team member's sabotage choice
    SabotageResponse { sabotage: bool },

    /// Graceful leave (client), or announcement that a seat dropped (server)
    Disconnect { participant_id: ParticipantId },

    // -- server to client --
    /// Seat assignment offered during the handshake
    ConnectAck { participant_id: ParticipantId },

    /// The receiving seat's secret role; never broadcast
    RoleAssign { role: Role },

    /// Role-free session state, broadcast after every change
    GameStateUpdate { snapshot: Snapshot },

    /// Ask the leader for a team of `size` members
    RequestTeamSelection {
        leader: ParticipantId,
        size: u8,
        deadline_ms: u64,
    },

    /// Ask every seat to vote on the proposal
    RequestVote {
        proposal: Vec<ParticipantId>,
        deadline_ms: u64,
    },

    /// Ask a team member whether to sabotage
    RequestSabotageChoice { deadline_ms: u64 },

    /// Result of the mission just played
    MissionOutcome { success: bool, sabotages: u8 },

    /// Terminal announcement with the full mission history
    GameOver {
        winner: Winner,
        history: Vec<MissionRecord>,
    },

    /// Human-readable table talk from the coordinator
    LogLine { text: String },

    /// Reply to a message the coordinator could not accept
    ProtocolError { reason: String },
}

impl Message {
    /// Serialize message to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Frame(format!("Serialization failed: {e}")))
    }

    /// Deserialize message from JSON bytes
    ///
    /// Broken JSON is a framing problem (the stream cannot be trusted);
    /// valid JSON that is not a known message is a protocol problem the
    /// connection survives.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| match e.classify() {
            serde_json::error::Category::Data => {
                Error::Protocol(format!("Unrecognized message: {e}"))
            }
            _ => Error::Frame(format!("Malformed payload: {e}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turncoat_core::{Participant, Session};

    fn sample_snapshot() -> Snapshot {
        let roster = (1..=5)
            .map(|i| Participant::new(ParticipantId(i), format!("player{i}")))
            .collect();
        Session::new(roster).unwrap().snapshot()
    }

    #[test]
    fn test_every_kind_roundtrips() {
        let messages = vec![
            Message::Join {
                name: "alice".into(),
            },
            Message::Ready {
                participant_id: ParticipantId(1),
            },
            Message::TeamSelectionResponse {
                members: vec![ParticipantId(1), ParticipantId(4)],
            },
            Message::VoteResponse { approve: false },
            Message::SabotageResponse { sabotage: true },
            Message::Disconnect {
                participant_id: ParticipantId(3),
            },
            Message::ConnectAck {
                participant_id: ParticipantId(2),
            },
            Message::RoleAssign { role: Role::Spy },
            Message::GameStateUpdate {
                snapshot: sample_snapshot(),
            },
            Message::RequestTeamSelection {
                leader: ParticipantId(1),
                size: 2,
                deadline_ms: 60_000,
            },
            Message::RequestVote {
                proposal: vec![ParticipantId(1), ParticipantId(2)],
                deadline_ms: 30_000,
            },
            Message::RequestSabotageChoice { deadline_ms: 30_000 },
            Message::MissionOutcome {
                success: false,
                sabotages: 1,
            },
            Message::GameOver {
                winner: Winner::Resistance,
                history: vec![MissionRecord {
                    round: 1,
                    success: true,
                    sabotages: 0,
                }],
            },
            Message::LogLine {
                text: "round 1 begins".into(),
            },
            Message::ProtocolError {
                reason: "stale response".into(),
            },
        ];

        for msg in messages {
            let bytes = msg.to_bytes().unwrap();
            let decoded = Message::from_bytes(&bytes).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn test_unknown_kind_is_protocol_error() {
        let bytes = br#"{"type":"CastFireball","target":3}"#;
        let result = Message::from_bytes(bytes);
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn test_missing_field_is_protocol_error() {
        let bytes = br#"{"type":"Join"}"#;
        let result = Message::from_bytes(bytes);
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn test_broken_json_is_frame_error() {
        let bytes = br#"{"type":"Join","#;
        let result = Message::from_bytes(bytes);
        assert!(matches!(result, Err(Error::Frame(_))));
    }
}
