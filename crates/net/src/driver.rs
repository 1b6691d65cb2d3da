//! Phase synchronizer
//!
//! One `PhaseDriver` drives one game from roster completion to a winner.
//! It is the only writer of the session state, which lives behind a
//! standard mutex: the guard is scoped to each read-modify-write and is
//! released before every await, so the driver never sleeps on a decision
//! or a send while holding it. A guard held across an await would also
//! make the future `!Send`, which refuses to compile once the driver is
//! spawned.
//!
//! The driver never touches sockets. Requests go out through the
//! coordinator's queues, responses come back through decision slots, and
//! everything shown locally goes through the presentation bridge.

use std::sync::{Arc, Mutex, MutexGuard};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use turncoat_core::{invariants, rules, GameConfig, ParticipantId, Role, Session, Winner};

use crate::bridge::PresentationBridge;
use crate::decision::{Decision, DecisionKind, SlotKey};
use crate::error::Result;
use crate::protocol::Message;
use crate::server::Coordinator;

/// Final report of a completed game
#[derive(Debug)]
pub struct GameReport {
    pub winner: Winner,
    pub session: Session,
}

/// Single-flow orchestrator for one session
pub struct PhaseDriver {
    coordinator: Arc<Coordinator>,
    config: GameConfig,
    bridge: PresentationBridge,
    rng: StdRng,
}

impl PhaseDriver {
    pub fn new(coordinator: Arc<Coordinator>, bridge: PresentationBridge) -> Self {
        Self::with_rng(coordinator, bridge, StdRng::from_entropy())
    }

    /// Inject the RNG used for the role deal; tests seed it
    pub fn with_rng(
        coordinator: Arc<Coordinator>,
        bridge: PresentationBridge,
        rng: StdRng,
    ) -> Self {
        let config = coordinator.config().clone();
        Self {
            coordinator,
            config,
            bridge,
            rng,
        }
    }

    /// Drive the game to its terminal outcome
    pub async fn run(mut self) -> Result<GameReport> {
        info!("Waiting for a full table");
        self.bridge.log_line("Waiting for participants to take their seats");

        let roster = self.coordinator.await_full_roster().await?;

        // Deal roles and tell each seat its own, nobody else's
        let roles = rules::deal_roles(&mut self.rng);
        let mut session = Session::new(roster)?;
        session.assign_roles(roles)?;

        for participant in &session.roster {
            if let Some(role) = participant.role {
                self.coordinator
                    .unicast(participant.id, Message::RoleAssign { role })
                    .await;
            }
        }
        self.table_talk("All seats are taken. The game begins.").await;

        let session = Mutex::new(session);
        self.publish_state(&session).await;

        loop {
            match self.request_team(&session).await {
                Some(team) => {
                    self.publish_state(&session).await;

                    let approvals = self.collect_votes(&session, &team).await;
                    let approved = rules::majority(approvals);
                    self.table_talk(format!(
                        "Proposal {} ({} of {} in favour)",
                        if approved { "approved" } else { "rejected" },
                        approvals,
                        rules::PARTICIPANTS
                    ))
                    .await;

                    if approved {
                        let approval = {
                            let mut s = lock_session(&session);
                            s.approve_team()
                        };
                        approval?;
                        self.publish_state(&session).await;

                        let sabotages = self.collect_sabotages(&session, &team).await;
                        let record = {
                            let mut s = lock_session(&session);
                            s.record_mission(sabotages)
                        };

                        self.coordinator
                            .broadcast(Message::MissionOutcome {
                                success: record.success,
                                sabotages: record.sabotages,
                            })
                            .await;
                        self.bridge.mission_outcome(record.success, record.sabotages);
                        self.publish_state(&session).await;

                        let winner = {
                            let mut s = lock_session(&session);
                            s.advance_after_mission()
                        };
                        if let Some(winner) = winner {
                            return self.finish(session, winner).await;
                        }
                        self.publish_state(&session).await;
                    } else {
                        let winner = {
                            let mut s = lock_session(&session);
                            s.record_rejection()
                        };
                        self.publish_state(&session).await;
                        if let Some(winner) = winner {
                            return self.finish(session, winner).await;
                        }
                    }
                }
                None => {
                    // A proposal that never arrived counts as a rejected one
                    self.table_talk("No team was proposed in time; the proposal is rejected")
                        .await;
                    let winner = {
                        let mut s = lock_session(&session);
                        s.record_rejection()
                    };
                    self.publish_state(&session).await;
                    if let Some(winner) = winner {
                        return self.finish(session, winner).await;
                    }
                }
            }
        }
    }

    /// Ask the current leader for a team
    ///
    /// An invalid composition gets a `ProtocolError` reply and another
    /// chance within the same absolute deadline; only the deadline
    /// expiring or the leader vanishing gives up on the proposal.
    async fn request_team(&self, session: &Mutex<Session>) -> Option<Vec<ParticipantId>> {
        let (leader, leader_name, round, size) = {
            let s = lock_session(session);
            let leader = s.leader();
            (leader.id, leader.name.clone(), s.round, s.team_size())
        };

        let deadline = Instant::now() + self.config.team_selection_timeout();
        let book = self.coordinator.decisions();

        self.table_talk(format!(
            "Round {round}: {leader_name} is choosing a team of {size}"
        ))
        .await;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let rx = book.open(
                SlotKey {
                    participant: leader,
                    kind: DecisionKind::TeamSelection,
                    round,
                },
                remaining,
            );
            self.coordinator
                .unicast(
                    leader,
                    Message::RequestTeamSelection {
                        leader,
                        size: size as u8,
                        deadline_ms: remaining.as_millis() as u64,
                    },
                )
                .await;

            match timeout_at(deadline, rx).await {
                Ok(Ok(Decision::Team(members))) => {
                    let verdict = {
                        let mut s = lock_session(session);
                        s.propose_team(members.clone())
                    };
                    match verdict {
                        Ok(()) => {
                            book.clear();
                            return Some(members);
                        }
                        Err(e) => {
                            debug!(participant = %leader, error = %e, "Invalid proposal");
                            self.coordinator
                                .unicast(
                                    leader,
                                    Message::ProtocolError {
                                        reason: e.to_string(),
                                    },
                                )
                                .await;
                        }
                    }
                }
                Ok(Ok(other)) => {
                    warn!(participant = %leader, decision = ?other, "Unusable team decision");
                }
                Ok(Err(_)) => {
                    debug!(participant = %leader, "Leader gone during team selection");
                    book.clear();
                    return None;
                }
                Err(_) => {
                    debug!(participant = %leader, "Team selection timed out");
                    book.clear();
                    return None;
                }
            }
        }
    }

    /// Collect one vote per seat against a shared deadline
    async fn collect_votes(&self, session: &Mutex<Session>, team: &[ParticipantId]) -> usize {
        let (round, seats) = {
            let s = lock_session(session);
            (s.round, s.roster.iter().map(|p| p.id).collect::<Vec<_>>())
        };

        let vote_timeout = self.config.vote_timeout();
        let deadline = Instant::now() + vote_timeout;
        let book = self.coordinator.decisions();

        // Every slot opens before the request goes out, so no response can
        // arrive with nothing waiting for it
        let mut ballots = Vec::with_capacity(seats.len());
        for seat in seats {
            let rx = book.open(
                SlotKey {
                    participant: seat,
                    kind: DecisionKind::Vote,
                    round,
                },
                vote_timeout,
            );
            ballots.push((seat, rx));
        }

        self.coordinator
            .broadcast(Message::RequestVote {
                proposal: team.to_vec(),
                deadline_ms: vote_timeout.as_millis() as u64,
            })
            .await;

        let fallback = self.config.fallback_vote;
        let mut approvals = 0;
        for (seat, rx) in ballots {
            let approve = match timeout_at(deadline, rx).await {
                Ok(Ok(Decision::Vote(approve))) => approve,
                Ok(Ok(other)) => {
                    warn!(participant = %seat, decision = ?other, "Unusable vote decision");
                    fallback
                }
                Ok(Err(_)) => {
                    debug!(participant = %seat, "No vote before disconnect, using fallback");
                    fallback
                }
                Err(_) => {
                    debug!(participant = %seat, "Vote timed out, using fallback");
                    fallback
                }
            };
            if approve {
                approvals += 1;
            }
        }

        book.clear();
        approvals
    }

    /// Ask every team member for a sabotage choice
    ///
    /// All members are asked, spy or not, so the request pattern reveals
    /// nothing; a sabotage from a resistance seat is ignored.
    async fn collect_sabotages(&self, session: &Mutex<Session>, team: &[ParticipantId]) -> u8 {
        let (round, members) = {
            let s = lock_session(session);
            let members: Vec<(ParticipantId, Option<Role>)> =
                team.iter().map(|id| (*id, s.role_of(*id))).collect();
            (s.round, members)
        };

        let sabotage_timeout = self.config.sabotage_timeout();
        let deadline = Instant::now() + sabotage_timeout;
        let book = self.coordinator.decisions();

        self.table_talk("The team sets out on the mission").await;

        let mut pending = Vec::with_capacity(members.len());
        for (seat, role) in members {
            let rx = book.open(
                SlotKey {
                    participant: seat,
                    kind: DecisionKind::Sabotage,
                    round,
                },
                sabotage_timeout,
            );
            self.coordinator
                .unicast(
                    seat,
                    Message::RequestSabotageChoice {
                        deadline_ms: sabotage_timeout.as_millis() as u64,
                    },
                )
                .await;
            pending.push((seat, role, rx));
        }

        let fallback = self.config.fallback_sabotage;
        let mut sabotages = 0u8;
        for (seat, role, rx) in pending {
            let mut sabotage = match timeout_at(deadline, rx).await {
                Ok(Ok(Decision::Sabotage(choice))) => choice,
                Ok(Ok(other)) => {
                    warn!(participant = %seat, decision = ?other, "Unusable sabotage decision");
                    fallback
                }
                Ok(Err(_)) => {
                    debug!(participant = %seat, "No choice before disconnect, using fallback");
                    fallback
                }
                Err(_) => {
                    debug!(participant = %seat, "Sabotage choice timed out, using fallback");
                    fallback
                }
            };

            // Only spies can sabotage
            if sabotage && role != Some(Role::Spy) {
                warn!(participant = %seat, "Ignoring sabotage from a resistance seat");
                sabotage = false;
            }
            if let Some(role) = role {
                invariants::assert_sabotage_allowed(role, sabotage);
            }
            if sabotage {
                sabotages += 1;
            }
        }

        book.clear();
        sabotages
    }

    /// Announce the result and hand the final state back
    async fn finish(&self, session: Mutex<Session>, winner: Winner) -> Result<GameReport> {
        let mut session = match session.into_inner() {
            Ok(session) => session,
            Err(poisoned) => poisoned.into_inner(),
        };

        let connected = self.coordinator.connected_seats().await;
        let ids: Vec<ParticipantId> = session.roster.iter().map(|p| p.id).collect();
        for id in ids {
            session.set_connected(id, connected.contains(&id));
        }

        info!(winner = %winner, missions = session.missions.len(), "Game over");

        self.coordinator
            .broadcast(Message::GameOver {
                winner,
                history: session.missions.clone(),
            })
            .await;
        self.coordinator
            .broadcast(Message::GameStateUpdate {
                snapshot: session.snapshot(),
            })
            .await;
        self.bridge.game_over(winner, session.missions.clone());
        self.bridge.state_changed(session.snapshot());

        Ok(GameReport { winner, session })
    }

    /// Refresh connection flags and broadcast the snapshot
    async fn publish_state(&self, session: &Mutex<Session>) {
        let connected = self.coordinator.connected_seats().await;
        let snapshot = {
            let mut s = lock_session(session);
            let ids: Vec<ParticipantId> = s.roster.iter().map(|p| p.id).collect();
            for id in ids {
                s.set_connected(id, connected.contains(&id));
            }
            s.snapshot()
        };

        self.bridge.state_changed(snapshot.clone());
        self.coordinator
            .broadcast(Message::GameStateUpdate { snapshot })
            .await;
    }

    /// Say something to the whole table and the local presentation
    async fn table_talk(&self, text: impl Into<String>) {
        let text = text.into();
        self.bridge.log_line(text.clone());
        self.coordinator
            .broadcast(Message::LogLine { text })
            .await;
    }
}

fn lock_session(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    match session.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            error!("Session guard poisoned, recovering");
            poisoned.into_inner()
        }
    }
}
