//! Session state machine
//!
//! One `Session` is the authoritative record of a single game: the fixed
//! five-seat roster, whose turn it is to lead, the rejection counter, and
//! the mission history. Mutators keep the phase coherent and run the
//! debug-build invariant checks; they never perform I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::invariants;
use crate::models::{Participant, ParticipantId, Role, SeatView, Snapshot};
use crate::rules;

/// Where the session currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Waiting for all five seats to register
    AwaitingRoster,
    /// Leader is choosing a team
    TeamProposal,
    /// Everyone is voting on the proposal
    TeamVote,
    /// Team members are choosing whether to sabotage
    MissionVote,
    /// Mission outcome is being applied and announced
    ScoreUpdate,
    GameOver,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::AwaitingRoster => "awaiting roster",
            Phase::TeamProposal => "team proposal",
            Phase::TeamVote => "team vote",
            Phase::MissionVote => "mission vote",
            Phase::ScoreUpdate => "score update",
            Phase::GameOver => "game over",
        };
        write!(f, "{name}")
    }
}

/// Outcome of one completed mission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionRecord {
    pub round: u8,
    pub success: bool,
    pub sabotages: u8,
}

/// Which side won the game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    Resistance,
    Spies,
}

impl std::fmt::Display for Winner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Winner::Resistance => write!(f, "Resistance"),
            Winner::Spies => write!(f, "Spies"),
        }
    }
}

/// Authoritative state of one game
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Fixed at five seats once the game begins
    pub roster: Vec<Participant>,
    /// Current mission round, 1 through 5
    pub round: u8,
    /// Index into `roster` of the current leader
    pub leader_index: usize,
    /// Consecutive rejected proposals; resets on approval
    pub rejections: u8,
    pub missions: Vec<MissionRecord>,
    pub phase: Phase,
    /// Team currently proposed or on mission; empty between proposals
    pub proposed_team: Vec<ParticipantId>,
}

impl Session {
    /// Create a session from a complete roster
    pub fn new(roster: Vec<Participant>) -> Result<Self> {
        if roster.len() != rules::PARTICIPANTS {
            return Err(Error::InvalidOperation(format!(
                "Session requires {} participants, got {}",
                rules::PARTICIPANTS,
                roster.len()
            )));
        }

        let session = Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            roster,
            round: 1,
            leader_index: 0,
            rejections: 0,
            missions: Vec::new(),
            phase: Phase::AwaitingRoster,
            proposed_team: Vec::new(),
        };
        invariants::assert_session_invariants(&session);
        Ok(session)
    }

    /// Apply a dealt role to each seat and open the first proposal
    pub fn assign_roles(&mut self, roles: Vec<Role>) -> Result<()> {
        if self.phase != Phase::AwaitingRoster {
            return Err(Error::InvalidOperation(
                "Roles are dealt exactly once, before the first proposal".into(),
            ));
        }
        if roles.len() != self.roster.len() {
            return Err(Error::InvalidOperation(format!(
                "Expected {} roles, got {}",
                self.roster.len(),
                roles.len()
            )));
        }

        for (participant, role) in self.roster.iter_mut().zip(roles) {
            participant.role = Some(role);
        }
        self.phase = Phase::TeamProposal;
        invariants::assert_session_invariants(self);
        Ok(())
    }

    pub fn leader(&self) -> &Participant {
        &self.roster[self.leader_index]
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.roster.iter().find(|p| p.id == id)
    }

    pub fn role_of(&self, id: ParticipantId) -> Option<Role> {
        self.participant(id).and_then(|p| p.role)
    }

    /// Number of members the current round's mission takes
    pub fn team_size(&self) -> usize {
        rules::team_size(self.round)
    }

    pub fn successes(&self) -> u8 {
        self.missions.iter().filter(|m| m.success).count() as u8
    }

    pub fn failures(&self) -> u8 {
        self.missions.iter().filter(|m| !m.success).count() as u8
    }

    pub fn set_connected(&mut self, id: ParticipantId, connected: bool) {
        if let Some(participant) = self.roster.iter_mut().find(|p| p.id == id) {
            participant.connected = connected;
        }
    }

    /// Accept the leader's proposal and move to the vote
    ///
    /// Rejects a team of the wrong size, with duplicate seats, or with seats
    /// not on the roster.
    pub fn propose_team(&mut self, members: Vec<ParticipantId>) -> Result<()> {
        if self.phase != Phase::TeamProposal {
            return Err(Error::InvalidOperation(format!(
                "Cannot propose a team during {}",
                self.phase
            )));
        }

        let expected = self.team_size();
        if members.len() != expected {
            return Err(Error::InvalidOperation(format!(
                "Round {} takes {} members, got {}",
                self.round,
                expected,
                members.len()
            )));
        }
        for (i, member) in members.iter().enumerate() {
            if self.participant(*member).is_none() {
                return Err(Error::InvalidOperation(format!(
                    "Unknown participant {member} in proposal"
                )));
            }
            if members[..i].contains(member) {
                return Err(Error::InvalidOperation(format!(
                    "Duplicate participant {member} in proposal"
                )));
            }
        }

        self.proposed_team = members;
        self.phase = Phase::TeamVote;
        invariants::assert_session_invariants(self);
        Ok(())
    }

    /// Count a rejected proposal; returns the winner if the table has
    /// now rejected five in a row
    pub fn record_rejection(&mut self) -> Option<Winner> {
        self.rejections += 1;
        self.proposed_team.clear();
        self.advance_leader();
        if self.rejections >= rules::MAX_REJECTIONS {
            self.phase = Phase::GameOver;
        } else {
            self.phase = Phase::TeamProposal;
        }
        invariants::assert_session_invariants(self);
        self.winner()
    }

    /// Count an approved proposal and move to the mission
    pub fn approve_team(&mut self) -> Result<()> {
        if self.phase != Phase::TeamVote {
            return Err(Error::InvalidOperation(format!(
                "Cannot approve a team during {}",
                self.phase
            )));
        }
        self.rejections = 0;
        self.phase = Phase::MissionVote;
        invariants::assert_session_invariants(self);
        Ok(())
    }

    /// Record the outcome of the current round's mission
    pub fn record_mission(&mut self, sabotages: u8) -> MissionRecord {
        let record = MissionRecord {
            round: self.round,
            success: rules::mission_succeeds(sabotages),
            sabotages,
        };
        self.missions.push(record);
        self.phase = Phase::ScoreUpdate;
        invariants::assert_session_invariants(self);
        record
    }

    /// Leave the score update: next round, or game over on a decided game
    pub fn advance_after_mission(&mut self) -> Option<Winner> {
        let winner = self.winner();
        self.proposed_team.clear();
        if winner.is_some() {
            self.phase = Phase::GameOver;
        } else {
            self.round += 1;
            self.advance_leader();
            self.phase = Phase::TeamProposal;
        }
        invariants::assert_session_invariants(self);
        winner
    }

    /// Pass leadership to the next seat, wrapping around the table
    pub fn advance_leader(&mut self) {
        self.leader_index = (self.leader_index + 1) % self.roster.len();
    }

    pub fn winner(&self) -> Option<Winner> {
        rules::winner(self.successes(), self.failures(), self.rejections)
    }

    /// Role-free view of the session for broadcasting
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            session_id: self.id,
            round: self.round,
            leader: self.leader().id,
            rejections: self.rejections,
            phase: self.phase,
            proposed_team: self.proposed_team.clone(),
            missions: self.missions.clone(),
            seats: self
                .roster
                .iter()
                .map(|p| SeatView {
                    id: p.id,
                    name: p.name.clone(),
                    connected: p.connected,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_roster() -> Vec<Participant> {
        (1..=5)
            .map(|i| Participant::new(ParticipantId(i), format!("player{i}")))
            .collect()
    }

    fn make_session() -> Session {
        let mut session = Session::new(make_roster()).unwrap();
        session
            .assign_roles(vec![
                Role::Spy,
                Role::Resistance,
                Role::Spy,
                Role::Resistance,
                Role::Resistance,
            ])
            .unwrap();
        session
    }

    #[test]
    fn test_requires_five_participants() {
        let roster: Vec<_> = make_roster().into_iter().take(3).collect();
        assert!(Session::new(roster).is_err());
    }

    #[test]
    fn test_roles_dealt_once() {
        let mut session = make_session();
        let result = session.assign_roles(vec![Role::Resistance; 5]);
        assert!(result.is_err());
    }

    #[test]
    fn test_leader_rotation_wraps() {
        let mut session = make_session();
        assert_eq!(session.leader().id, ParticipantId(1));
        for _ in 0..5 {
            session.advance_leader();
        }
        assert_eq!(session.leader().id, ParticipantId(1));
    }

    #[test]
    fn test_propose_team_validates_size() {
        let mut session = make_session();
        // Round 1 takes two members
        let result = session.propose_team(vec![ParticipantId(1)]);
        assert!(result.is_err());
        assert_eq!(session.phase, Phase::TeamProposal);
    }

    #[test]
    fn test_propose_team_rejects_duplicates() {
        let mut session = make_session();
        let result = session.propose_team(vec![ParticipantId(2), ParticipantId(2)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_propose_team_rejects_unknown_seat() {
        let mut session = make_session();
        let result = session.propose_team(vec![ParticipantId(1), ParticipantId(9)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejection_advances_leader_and_counts() {
        let mut session = make_session();
        session
            .propose_team(vec![ParticipantId(1), ParticipantId(2)])
            .unwrap();

        assert_eq!(session.record_rejection(), None);
        assert_eq!(session.rejections, 1);
        assert_eq!(session.leader().id, ParticipantId(2));
        assert_eq!(session.phase, Phase::TeamProposal);
        assert!(session.proposed_team.is_empty());
    }

    #[test]
    fn test_five_rejections_end_the_game() {
        let mut session = make_session();
        for _ in 0..4 {
            assert_eq!(session.record_rejection(), None);
        }
        assert_eq!(session.record_rejection(), Some(Winner::Spies));
        assert_eq!(session.phase, Phase::GameOver);
    }

    #[test]
    fn test_approval_resets_rejections() {
        let mut session = make_session();
        session.record_rejection();
        session.record_rejection();
        session
            .propose_team(vec![ParticipantId(3), ParticipantId(4)])
            .unwrap();
        session.approve_team().unwrap();

        assert_eq!(session.rejections, 0);
        assert_eq!(session.phase, Phase::MissionVote);
    }

    #[test]
    fn test_single_sabotage_fails_mission() {
        let mut session = make_session();
        session
            .propose_team(vec![ParticipantId(1), ParticipantId(2)])
            .unwrap();
        session.approve_team().unwrap();

        let record = session.record_mission(1);
        assert!(!record.success);
        assert_eq!(record.sabotages, 1);
        assert_eq!(session.failures(), 1);
    }

    #[test]
    fn test_mission_advances_round_and_leader() {
        let mut session = make_session();
        session
            .propose_team(vec![ParticipantId(1), ParticipantId(2)])
            .unwrap();
        session.approve_team().unwrap();
        session.record_mission(0);

        assert_eq!(session.advance_after_mission(), None);
        assert_eq!(session.round, 2);
        assert_eq!(session.leader().id, ParticipantId(2));
        assert_eq!(session.phase, Phase::TeamProposal);
    }

    #[test]
    fn test_three_successes_win_for_resistance() {
        let mut session = make_session();
        session.record_mission(0);
        assert_eq!(session.advance_after_mission(), None);
        session.record_mission(0);
        assert_eq!(session.advance_after_mission(), None);
        session.record_mission(0);
        assert_eq!(session.advance_after_mission(), Some(Winner::Resistance));
        assert_eq!(session.phase, Phase::GameOver);
    }

    #[test]
    fn test_three_failures_win_for_spies() {
        let mut session = make_session();
        session.record_mission(2);
        assert_eq!(session.advance_after_mission(), None);
        session.record_mission(1);
        assert_eq!(session.advance_after_mission(), None);
        session.record_mission(2);
        assert_eq!(session.advance_after_mission(), Some(Winner::Spies));
        assert_eq!(session.missions.len(), 3);
    }

    #[test]
    fn test_snapshot_never_carries_roles() {
        let session = make_session();
        let snapshot = session.snapshot();

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("Spy"));
        assert!(!json.contains("Resistance"));
        assert_eq!(snapshot.seats.len(), 5);
        assert_eq!(snapshot.leader, ParticipantId(1));
    }
}
