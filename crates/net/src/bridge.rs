//! Presentation bridge
//!
//! The core never talks to a window, a terminal, or any other presentation
//! surface directly. Every notification goes through a host-supplied
//! `schedule` hook, so whatever single-threaded consumer the host runs
//! (terminal renderer, GUI event loop) receives state that is never mutated
//! concurrently with its own rendering.
//!
//! Decision requests are awaitable: the notice carries a one-shot reply
//! sender, and the caller holds the matching receiver. Dropping the sender
//! without answering resolves the caller's wait immediately with an error,
//! which it treats as "no decision" and covers with its fallback.

use std::time::Duration;

use tokio::sync::oneshot;

use turncoat_core::{MissionRecord, ParticipantId, Role, Snapshot, Winner};

use crate::decision::Decision;

/// What the presentation layer is being asked to decide
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionRequest {
    TeamSelection {
        leader: ParticipantId,
        size: u8,
        deadline: Duration,
    },
    Vote {
        proposal: Vec<ParticipantId>,
        deadline: Duration,
    },
    Sabotage {
        deadline: Duration,
    },
}

/// A notification marshaled to the presentation consumer
#[derive(Debug)]
pub enum Notice {
    StateChanged(Snapshot),
    RoleAssigned(Role),
    DecisionRequested {
        request: DecisionRequest,
        reply: oneshot::Sender<Decision>,
    },
    MissionOutcome {
        success: bool,
        sabotages: u8,
    },
    GameOver {
        winner: Winner,
        history: Vec<MissionRecord>,
    },
    LogLine(String),
}

type ScheduleFn = Box<dyn Fn(Notice) + Send + Sync>;

/// Hook-based channel to the single-threaded presentation consumer
pub struct PresentationBridge {
    schedule: ScheduleFn,
}

impl PresentationBridge {
    /// Wrap the host's scheduling hook
    pub fn new(schedule: impl Fn(Notice) + Send + Sync + 'static) -> Self {
        Self {
            schedule: Box::new(schedule),
        }
    }

    /// A bridge that drops every notice; decision requests resolve
    /// immediately as unanswered. For headless use and tests.
    pub fn discarding() -> Self {
        Self::new(|_| {})
    }

    pub fn notify(&self, notice: Notice) {
        (self.schedule)(notice);
    }

    pub fn state_changed(&self, snapshot: Snapshot) {
        self.notify(Notice::StateChanged(snapshot));
    }

    pub fn role_assigned(&self, role: Role) {
        self.notify(Notice::RoleAssigned(role));
    }

    pub fn mission_outcome(&self, success: bool, sabotages: u8) {
        self.notify(Notice::MissionOutcome { success, sabotages });
    }

    pub fn game_over(&self, winner: Winner, history: Vec<MissionRecord>) {
        self.notify(Notice::GameOver { winner, history });
    }

    pub fn log_line(&self, text: impl Into<String>) {
        self.notify(Notice::LogLine(text.into()));
    }

    /// Ask the presentation layer for a decision
    ///
    /// Returns the receiving end; the consumer answers through the sender
    /// carried inside the notice, whenever its user gets around to it.
    pub fn request_decision(&self, request: DecisionRequest) -> oneshot::Receiver<Decision> {
        let (reply, rx) = oneshot::channel();
        self.notify(Notice::DecisionRequested { request, reply });
        rx
    }
}

impl std::fmt::Debug for PresentationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresentationBridge").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_notices_reach_the_hook_in_order() {
        let (tx, rx) = mpsc::channel();
        let bridge = PresentationBridge::new(move |notice| {
            tx.send(notice).ok();
        });

        bridge.log_line("first");
        bridge.mission_outcome(true, 0);

        assert!(matches!(rx.try_recv().unwrap(), Notice::LogLine(l) if l == "first"));
        assert!(matches!(
            rx.try_recv().unwrap(),
            Notice::MissionOutcome {
                success: true,
                sabotages: 0
            }
        ));
    }

    #[tokio::test]
    async fn test_decision_request_roundtrip() {
        let bridge = PresentationBridge::new(|notice| {
            if let Notice::DecisionRequested { request, reply } = notice {
                assert!(matches!(request, DecisionRequest::Vote { .. }));
                reply.send(Decision::Vote(true)).ok();
            }
        });

        let rx = bridge.request_decision(DecisionRequest::Vote {
            proposal: vec![ParticipantId(1), ParticipantId(2)],
            deadline: Duration::from_secs(30),
        });

        assert_eq!(rx.await.unwrap(), Decision::Vote(true));
    }

    #[tokio::test]
    async fn test_discarding_bridge_resolves_unanswered() {
        let bridge = PresentationBridge::discarding();
        let rx = bridge.request_decision(DecisionRequest::Sabotage {
            deadline: Duration::from_secs(30),
        });

        // Sender was dropped with the notice; the caller falls back
        assert!(rx.await.is_err());
    }
}
