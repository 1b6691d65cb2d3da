//! Decision slot rendezvous
//!
//! A `DecisionBook` holds the open decision slots for one phase step. Each
//! slot is a single-use rendezvous: the matching receive loop is its only
//! writer, the phase driver its only reader. Cancelling a slot drops the
//! sender, so a reader blocked on it completes immediately and applies the
//! fallback instead of waiting out the deadline.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use turncoat_core::ParticipantId;

/// What a participant is being asked to decide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionKind {
    TeamSelection,
    Vote,
    Sabotage,
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DecisionKind::TeamSelection => "team selection",
            DecisionKind::Vote => "vote",
            DecisionKind::Sabotage => "sabotage",
        };
        write!(f, "{name}")
    }
}

/// A participant's answer to a decision request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Team(Vec<ParticipantId>),
    Vote(bool),
    Sabotage(bool),
}

impl Decision {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Decision::Team(_) => DecisionKind::TeamSelection,
            Decision::Vote(_) => DecisionKind::Vote,
            Decision::Sabotage(_) => DecisionKind::Sabotage,
        }
    }
}

/// Identity of one open slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub participant: ParticipantId,
    pub kind: DecisionKind,
    pub round: u8,
}

/// Outcome of trying to resolve a slot
#[derive(Debug, PartialEq, Eq)]
pub enum Resolution {
    Accepted,
    /// Nothing was waiting for this response; the caller replies with a
    /// protocol error and mutates no state
    Stale { reason: String },
}

struct OpenSlot {
    kind: DecisionKind,
    round: u8,
    opened_at: Instant,
    deadline: Duration,
    tx: oneshot::Sender<Decision>,
}

/// Open decision slots, at most one per participant
///
/// Slots never outlive one phase step; the driver calls `clear` between
/// steps.
#[derive(Default)]
pub struct DecisionBook {
    slots: Mutex<HashMap<ParticipantId, OpenSlot>>,
}

impl DecisionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a slot and hand back the receiving end
    pub fn open(&self, key: SlotKey, deadline: Duration) -> oneshot::Receiver<Decision> {
        let (tx, rx) = oneshot::channel();
        let slot = OpenSlot {
            kind: key.kind,
            round: key.round,
            opened_at: Instant::now(),
            deadline,
            tx,
        };

        let mut slots = self.lock_slots();
        if slots.insert(key.participant, slot).is_some() {
            // Should not happen: the driver clears the book between steps
            warn!(participant = %key.participant, "Replacing an open decision slot");
        }
        rx
    }

    /// Resolve a participant's open slot with their decision
    ///
    /// Called by the receive loop that owns the participant's connection.
    /// Responses carry no round on the wire; because slots are cleared
    /// between phase steps, the only slot a participant can match is the
    /// current step's. A response that matches no open slot, answers the
    /// wrong kind of request, or arrives after the reader gave up is
    /// reported as stale.
    pub fn resolve(&self, participant: ParticipantId, decision: Decision) -> Resolution {
        let kind = decision.kind();
        let mut slots = self.lock_slots();

        let Some(slot) = slots.get(&participant) else {
            return Resolution::Stale {
                reason: format!("No {kind} awaited from {participant}"),
            };
        };
        if slot.kind != kind {
            return Resolution::Stale {
                reason: format!("Expected {} from {participant}, got {kind}", slot.kind),
            };
        }

        // Checks passed; consume the slot
        let slot = match slots.remove(&participant) {
            Some(slot) => slot,
            None => {
                return Resolution::Stale {
                    reason: format!("No {kind} awaited from {participant}"),
                }
            }
        };

        let elapsed = slot.opened_at.elapsed();
        if elapsed > slot.deadline {
            debug!(
                participant = %participant,
                round = slot.round,
                elapsed_ms = elapsed.as_millis() as u64,
                "Response arrived after its deadline"
            );
        }

        match slot.tx.send(decision) {
            Ok(()) => Resolution::Accepted,
            // Reader already timed out and dropped the receiver
            Err(_) => Resolution::Stale {
                reason: format!("{kind} from {participant} is no longer awaited"),
            },
        }
    }

    /// Drop a participant's open slot, if any
    ///
    /// The waiting reader completes at once with a closed-channel error and
    /// applies the fallback. Used on disconnect.
    pub fn cancel(&self, participant: ParticipantId) {
        let mut slots = self.lock_slots();
        if let Some(slot) = slots.remove(&participant) {
            debug!(
                participant = %participant,
                kind = %slot.kind,
                "Cancelled open decision slot"
            );
        }
    }

    /// Drop every open slot; called between phase steps
    pub fn clear(&self) {
        self.lock_slots().clear();
    }

    pub fn open_count(&self) -> usize {
        self.lock_slots().len()
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<ParticipantId, OpenSlot>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("Decision book mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEADLINE: Duration = Duration::from_secs(30);

    fn key(participant: u8, kind: DecisionKind, round: u8) -> SlotKey {
        SlotKey {
            participant: ParticipantId(participant),
            kind,
            round,
        }
    }

    #[tokio::test]
    async fn test_resolve_delivers_to_reader() {
        let book = DecisionBook::new();
        let rx = book.open(key(1, DecisionKind::Vote, 1), DEADLINE);

        let resolution = book.resolve(ParticipantId(1), Decision::Vote(true));

        assert_eq!(resolution, Resolution::Accepted);
        assert_eq!(rx.await.unwrap(), Decision::Vote(true));
        assert_eq!(book.open_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_participant_is_stale() {
        let book = DecisionBook::new();
        let resolution = book.resolve(ParticipantId(4), Decision::Vote(false));
        assert!(matches!(resolution, Resolution::Stale { .. }));
    }

    #[tokio::test]
    async fn test_wrong_kind_leaves_slot_open() {
        let book = DecisionBook::new();
        let mut rx = book.open(key(2, DecisionKind::Sabotage, 3), DEADLINE);

        let resolution = book.resolve(ParticipantId(2), Decision::Vote(true));

        assert!(matches!(resolution, Resolution::Stale { .. }));
        assert_eq!(book.open_count(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_response_between_steps_is_stale() {
        let book = DecisionBook::new();
        let _rx = book.open(key(1, DecisionKind::Vote, 2), DEADLINE);
        book.clear();

        let resolution = book.resolve(ParticipantId(1), Decision::Vote(true));
        assert!(matches!(resolution, Resolution::Stale { .. }));
    }

    #[tokio::test]
    async fn test_cancel_wakes_reader_immediately() {
        let book = DecisionBook::new();
        let rx = book.open(key(3, DecisionKind::TeamSelection, 1), DEADLINE);

        book.cancel(ParticipantId(3));

        // Closed without a value; the reader applies its fallback
        assert!(rx.await.is_err());
        assert_eq!(book.open_count(), 0);
    }

    #[tokio::test]
    async fn test_resolve_after_reader_dropped_is_stale() {
        let book = DecisionBook::new();
        let rx = book.open(key(1, DecisionKind::Vote, 1), DEADLINE);
        drop(rx);

        let resolution = book.resolve(ParticipantId(1), Decision::Vote(true));
        assert!(matches!(resolution, Resolution::Stale { .. }));
    }

    #[tokio::test]
    async fn test_clear_drops_all_slots() {
        let book = DecisionBook::new();
        let rx1 = book.open(key(1, DecisionKind::Vote, 1), DEADLINE);
        let rx2 = book.open(key(2, DecisionKind::Vote, 1), DEADLINE);

        book.clear();

        assert!(rx1.await.is_err());
        assert!(rx2.await.is_err());
        assert_eq!(book.open_count(), 0);
    }
}
