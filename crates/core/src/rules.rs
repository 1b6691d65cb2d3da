//! Fixed rule table and role deal
//!
//! Deterministic, I/O-free rules for the five-seat game: mission sizes per
//! round, the strict-majority vote threshold, win conditions, and the
//! shuffled role deal. Everything here is a pure function so the outcomes
//! are reproducible from a seeded RNG in tests.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::models::{Role, Winner};

/// Seats at the table
pub const PARTICIPANTS: usize = 5;
/// Spies dealt into the roster
pub const SPIES: usize = 2;
/// Missions available; a side wins at three
pub const MISSIONS: u8 = 5;
/// Consecutive rejected proposals that hand the game to the spies
pub const MAX_REJECTIONS: u8 = 5;

/// Mission size per round: rounds 1-2 send two members, rounds 3-5 send three
const MISSION_SIZES: [usize; MISSIONS as usize] = [2, 2, 3, 3, 3];

/// Number of members the given round's mission takes
///
/// Rounds are numbered 1 through 5.
pub fn team_size(round: u8) -> usize {
    MISSION_SIZES[(round as usize - 1).min(MISSION_SIZES.len() - 1)]
}

/// A proposal passes only on a strict majority of the full table
pub fn majority(approvals: usize) -> bool {
    approvals > PARTICIPANTS / 2
}

/// A mission fails on at least one sabotage
pub fn mission_succeeds(sabotages: u8) -> bool {
    sabotages == 0
}

/// Deal roles for a full table: two spies shuffled among five seats
pub fn deal_roles<R: Rng>(rng: &mut R) -> Vec<Role> {
    let mut roles = vec![Role::Resistance; PARTICIPANTS];
    for role in roles.iter_mut().take(SPIES) {
        *role = Role::Spy;
    }
    roles.shuffle(rng);
    roles
}

/// Decide the game, if it is decided
///
/// Three successful missions win for the Resistance; three failed missions
/// or five consecutive rejections win for the spies.
pub fn winner(successes: u8, failures: u8, rejections: u8) -> Option<Winner> {
    if successes >= 3 {
        Some(Winner::Resistance)
    } else if failures >= 3 || rejections >= MAX_REJECTIONS {
        Some(Winner::Spies)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_team_size_table() {
        assert_eq!(team_size(1), 2);
        assert_eq!(team_size(2), 2);
        assert_eq!(team_size(3), 3);
        assert_eq!(team_size(4), 3);
        assert_eq!(team_size(5), 3);
    }

    #[test]
    fn test_strict_majority_of_five() {
        assert!(!majority(0));
        assert!(!majority(2));
        assert!(majority(3));
        assert!(majority(5));
    }

    #[test]
    fn test_deal_composition() {
        let mut rng = StdRng::seed_from_u64(7);
        let roles = deal_roles(&mut rng);

        assert_eq!(roles.len(), PARTICIPANTS);
        assert_eq!(roles.iter().filter(|r| **r == Role::Spy).count(), SPIES);
    }

    #[test]
    fn test_deal_reproducible_from_seed() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        assert_eq!(deal_roles(&mut a), deal_roles(&mut b));
    }

    #[test]
    fn test_mission_fails_on_one_sabotage() {
        assert!(mission_succeeds(0));
        assert!(!mission_succeeds(1));
        assert!(!mission_succeeds(3));
    }

    #[test]
    fn test_win_conditions() {
        assert_eq!(winner(0, 0, 0), None);
        assert_eq!(winner(2, 2, 4), None);
        assert_eq!(winner(3, 0, 0), Some(Winner::Resistance));
        assert_eq!(winner(0, 3, 0), Some(Winner::Spies));
        assert_eq!(winner(1, 1, 5), Some(Winner::Spies));
    }
}
