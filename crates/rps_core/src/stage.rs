//! The persisted tournament stage, the only durable marker of tournament progress.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Flag key under which the stage is stored.
pub const STAGE_KEY: &str = "stage";

/// Progress of the current tournament.
///
/// Transitions are Idle → Preparing → Ready → Running → Idle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TournamentStage {
    #[default]
    Idle,
    Preparing,
    Ready,
    Running,
}

impl TournamentStage {
    pub fn as_str(self) -> &'static str {
        match self {
            TournamentStage::Idle => "idle",
            TournamentStage::Preparing => "preparing",
            TournamentStage::Ready => "ready",
            TournamentStage::Running => "running",
        }
    }

    /// Stages that mean a tournament has to be resumed after a restart.
    pub fn is_in_flight(self) -> bool {
        matches!(self, TournamentStage::Ready | TournamentStage::Running)
    }
}

impl fmt::Display for TournamentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TournamentStage {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "idle" => Ok(TournamentStage::Idle),
            "preparing" => Ok(TournamentStage::Preparing),
            "ready" => Ok(TournamentStage::Ready),
            "running" => Ok(TournamentStage::Running),
            other => Err(StoreError::Corrupt {
                key: STAGE_KEY.to_string(),
                value: other.to_string(),
            }),
        }
    }
}
