//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use crate::models::{Participant, Phase, Role, Session};
use crate::rules;

/// Validate that a session's state is internally consistent
pub fn assert_session_invariants(session: &Session) {
    debug_assert!(
        session.roster.len() == rules::PARTICIPANTS,
        "Session {} has {} seats, expected {}",
        session.id,
        session.roster.len(),
        rules::PARTICIPANTS
    );

    debug_assert!(
        session.leader_index < session.roster.len(),
        "Session {} leader index {} out of bounds",
        session.id,
        session.leader_index
    );

    debug_assert!(
        session.rejections <= rules::MAX_REJECTIONS,
        "Session {} rejection counter {} past the limit",
        session.id,
        session.rejections
    );

    debug_assert!(
        session.missions.len() <= rules::MISSIONS as usize,
        "Session {} recorded {} missions, table has {}",
        session.id,
        session.missions.len(),
        rules::MISSIONS
    );

    // Once dealt, the deck must hold exactly the configured spy count
    if session.phase != Phase::AwaitingRoster {
        assert_deal_complete(&session.roster, session);
    }

    // A decided game may still be announcing the final score, but must
    // never re-enter a decision phase
    debug_assert!(
        session.winner().is_none()
            || matches!(session.phase, Phase::GameOver | Phase::ScoreUpdate),
        "Session {} is decided but still in {}",
        session.id,
        session.phase
    );
}

/// Validate that every seat holds a role and spies number exactly two
pub fn assert_deal_complete(roster: &[Participant], session: &Session) {
    let undealt = roster.iter().filter(|p| p.role.is_none()).count();
    debug_assert!(
        undealt == 0,
        "Session {} has {} seats without a role after the deal",
        session.id,
        undealt
    );

    let spies = roster.iter().filter(|p| p.is_spy()).count();
    debug_assert!(
        spies == rules::SPIES,
        "Session {} dealt {} spies, expected {}",
        session.id,
        spies,
        rules::SPIES
    );
}

/// Validate that a proposed team fits the current round
pub fn assert_team_valid(session: &Session) {
    if session.proposed_team.is_empty() {
        return;
    }

    debug_assert!(
        session.proposed_team.len() == session.team_size(),
        "Session {} round {} team has {} members, expected {}",
        session.id,
        session.round,
        session.proposed_team.len(),
        session.team_size()
    );

    for member in &session.proposed_team {
        debug_assert!(
            session.participant(*member).is_some(),
            "Session {} team member {} is not on the roster",
            session.id,
            member
        );
    }
}

/// Validate that a role is allowed to record a sabotage
pub fn assert_sabotage_allowed(role: Role, sabotage: bool) {
    debug_assert!(
        !sabotage || role.can_sabotage(),
        "Sabotage recorded for role {role:?} which cannot sabotage"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParticipantId;

    fn make_session() -> Session {
        let roster = (1..=5)
            .map(|i| Participant::new(ParticipantId(i), format!("player{i}")))
            .collect();
        Session::new(roster).unwrap()
    }

    fn dealt_session() -> Session {
        let mut session = make_session();
        session
            .assign_roles(vec![
                Role::Spy,
                Role::Spy,
                Role::Resistance,
                Role::Resistance,
                Role::Resistance,
            ])
            .unwrap();
        session
    }

    #[test]
    fn test_valid_session() {
        let session = make_session();
        assert_session_invariants(&session);
    }

    #[test]
    fn test_valid_after_deal() {
        let session = dealt_session();
        assert_session_invariants(&session);
    }

    #[test]
    fn test_valid_team() {
        let mut session = dealt_session();
        session
            .propose_team(vec![ParticipantId(1), ParticipantId(2)])
            .unwrap();
        assert_team_valid(&session);
    }

    #[test]
    #[should_panic(expected = "cannot sabotage")]
    fn test_resistance_cannot_sabotage() {
        assert_sabotage_allowed(Role::Resistance, true);
    }

    #[test]
    fn test_spy_may_sabotage() {
        assert_sabotage_allowed(Role::Spy, true);
        assert_sabotage_allowed(Role::Spy, false);
        assert_sabotage_allowed(Role::Resistance, false);
    }

    #[test]
    #[should_panic(expected = "spies")]
    fn test_short_deal_detected() {
        let mut session = make_session();
        session.roster[0].role = Some(Role::Spy);
        for participant in session.roster.iter_mut().skip(1) {
            participant.role = Some(Role::Resistance);
        }
        assert_deal_complete(&session.roster, &session);
    }
}
