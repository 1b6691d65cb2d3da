//! Startup configuration
//!
//! All tunables the coordinator and client read at startup: listen port,
//! decision deadlines, handshake admission limit, and the timeout-fallback
//! policy. Loaded from a TOML file; every field has a default so an empty
//! file (or no file at all) yields a playable configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::rules::PARTICIPANTS;

/// Game and network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// TCP port the coordinator listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of seats at the table. The rules are written for exactly 5;
    /// any other value fails validation.
    #[serde(default = "default_participants")]
    pub participants: u8,

    /// Maximum handshakes in flight at once
    #[serde(default = "default_handshake_permits")]
    pub handshake_permits: usize,

    /// Seconds the leader has to propose a team
    #[serde(default = "default_team_selection_timeout")]
    pub team_selection_timeout_secs: u64,

    /// Seconds each participant has to vote on a proposal
    #[serde(default = "default_vote_timeout")]
    pub vote_timeout_secs: u64,

    /// Seconds each team member has to choose sabotage
    #[serde(default = "default_sabotage_timeout")]
    pub sabotage_timeout_secs: u64,

    /// Vote recorded for a participant whose deadline expires (false = reject)
    #[serde(default)]
    pub fallback_vote: bool,

    /// Sabotage recorded for a team member whose deadline expires
    /// (false = no sabotage)
    #[serde(default)]
    pub fallback_sabotage: bool,
}

fn default_port() -> u16 {
    12345
}

fn default_participants() -> u8 {
    PARTICIPANTS as u8
}

fn default_handshake_permits() -> usize {
    3
}

fn default_team_selection_timeout() -> u64 {
    60
}

fn default_vote_timeout() -> u64 {
    30
}

fn default_sabotage_timeout() -> u64 {
    30
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            participants: default_participants(),
            handshake_permits: default_handshake_permits(),
            team_selection_timeout_secs: default_team_selection_timeout(),
            vote_timeout_secs: default_vote_timeout(),
            sabotage_timeout_secs: default_sabotage_timeout(),
            fallback_vote: false,
            fallback_sabotage: false,
        }
    }
}

impl GameConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse configuration from TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Check that the configuration describes a runnable game
    pub fn validate(&self) -> Result<()> {
        if self.participants as usize != PARTICIPANTS {
            return Err(Error::Config(format!(
                "This game is played with exactly {} participants, got {}",
                PARTICIPANTS, self.participants
            )));
        }
        if self.handshake_permits == 0 {
            return Err(Error::Config(
                "handshake_permits must be at least 1".into(),
            ));
        }
        if self.team_selection_timeout_secs == 0
            || self.vote_timeout_secs == 0
            || self.sabotage_timeout_secs == 0
        {
            return Err(Error::Config("decision timeouts must be non-zero".into()));
        }
        Ok(())
    }

    pub fn team_selection_timeout(&self) -> Duration {
        Duration::from_secs(self.team_selection_timeout_secs)
    }

    pub fn vote_timeout(&self) -> Duration {
        Duration::from_secs(self.vote_timeout_secs)
    }

    pub fn sabotage_timeout(&self) -> Duration {
        Duration::from_secs(self.sabotage_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GameConfig::default();
        assert_eq!(config.port, 12345);
        assert_eq!(config.participants, 5);
        assert_eq!(config.handshake_permits, 3);
        assert_eq!(config.team_selection_timeout(), Duration::from_secs(60));
        assert_eq!(config.vote_timeout(), Duration::from_secs(30));
        assert_eq!(config.sabotage_timeout(), Duration::from_secs(30));
        assert!(!config.fallback_vote);
        assert!(!config.fallback_sabotage);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = GameConfig::from_toml("").unwrap();
        assert_eq!(config.port, 12345);
        assert_eq!(config.vote_timeout_secs, 30);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml = r#"
port = 4000
vote_timeout_secs = 10
"#;
        let config = GameConfig::from_toml(toml).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.vote_timeout_secs, 10);
        assert_eq!(config.team_selection_timeout_secs, 60);
    }

    #[test]
    fn test_rejects_wrong_participant_count() {
        let config = GameConfig::from_toml("participants = 7").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let config = GameConfig::from_toml("vote_timeout_secs = 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turncoat.toml");
        std::fs::write(&path, "port = 23456\nhandshake_permits = 2\n").unwrap();

        let config = GameConfig::load(&path).unwrap();
        assert_eq!(config.port, 23456);
        assert_eq!(config.handshake_permits, 2);
    }
}
