//! Run reports: what happened in one tournament run

use std::path::Path;

use chrono::{DateTime, Utc};
use rps_core::{Hand, ParticipantId, Sats, StoreError};
use serde::{Deserialize, Serialize};

use crate::round::{Decision, RoundOutcome};

/// Complete record of one tournament run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Resumed after a restart
    pub restored: bool,
    pub bracket: Vec<ParticipantId>,
    /// Ticket holders that did not fit the bracket
    pub deferred: Vec<ParticipantId>,
    /// Bank pool at the start of the run
    pub pool: Sats,
    pub rounds: Vec<RoundEntry>,
    pub payouts: Vec<PayoutEntry>,
    /// Credited winnings that stayed in the bank (no address or a failed payout)
    #[serde(default)]
    pub held: Vec<PayoutEntry>,
    pub champion: Option<ParticipantId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundEntry {
    pub round: u32,
    pub matches: Vec<MatchEntry>,
}

/// A single match in a round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchEntry {
    pub winner: ParticipantId,
    pub loser: Option<ParticipantId>,
    pub winner_hand: Option<Hand>,
    pub loser_hand: Option<Hand>,
    /// Equal hands, settled by the coin
    pub draw: bool,
}

impl From<&RoundOutcome> for MatchEntry {
    fn from(outcome: &RoundOutcome) -> Self {
        let (winner_hand, loser_hand, draw) = match outcome.decision {
            Decision::Bye => (None, None, false),
            Decision::Rules { winner, loser } => (Some(winner), Some(loser), false),
            Decision::Draw(hand) => (Some(hand), Some(hand), true),
        };
        Self {
            winner: outcome.winner,
            loser: outcome.loser,
            winner_hand,
            loser_hand,
            draw,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayoutEntry {
    pub participant: ParticipantId,
    pub round: u32,
    pub amount: Sats,
}

impl RunReport {
    pub fn new(bracket: Vec<ParticipantId>, deferred: Vec<ParticipantId>, pool: Sats) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            restored: false,
            bracket,
            deferred,
            pool,
            rounds: Vec::new(),
            payouts: Vec::new(),
            held: Vec::new(),
            champion: None,
        }
    }

    pub fn add_round(&mut self, round: u32, outcomes: &[RoundOutcome]) {
        self.rounds.push(RoundEntry {
            round,
            matches: outcomes.iter().map(MatchEntry::from).collect(),
        });
    }

    pub fn add_payout(&mut self, participant: ParticipantId, round: u32, amount: Sats) {
        self.payouts.push(PayoutEntry {
            participant,
            round,
            amount,
        });
    }

    pub fn add_held(&mut self, participant: ParticipantId, round: u32, amount: Sats) {
        self.held.push(PayoutEntry {
            participant,
            round,
            amount,
        });
    }

    pub fn total_paid(&self) -> Sats {
        self.payouts.iter().map(|p| p.amount).sum()
    }

    pub fn total_held(&self) -> Sats {
        self.held.iter().map(|p| p.amount).sum()
    }

    /// Save report to JSON file
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load report from JSON file
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let contents = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Generate a text report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();
        report.push_str(&format!(
            "=== Tournament started {} ===\n\n",
            self.started_at.format("%Y-%m-%d %H:%M UTC")
        ));
        if self.restored {
            report.push_str("Resumed after restart\n");
        }
        report.push_str(&format!("Bracket: {} players, pool {}\n", self.bracket.len(), self.pool));
        if !self.deferred.is_empty() {
            report.push_str(&format!("Deferred: {}\n", join_ids(&self.deferred)));
        }

        for round in &self.rounds {
            report.push_str(&format!("\nRound {}:\n", round.round));
            for m in &round.matches {
                let line = match (m.loser, m.winner_hand, m.loser_hand) {
                    (None, _, _) => format!("  {:>12} advances (bye)\n", m.winner),
                    (Some(loser), Some(wh), Some(lh)) => format!(
                        "  {:>12} beats {:<12} {} vs {}{}\n",
                        m.winner,
                        loser,
                        wh,
                        lh,
                        if m.draw { " (coin)" } else { "" }
                    ),
                    (Some(loser), _, _) => format!("  {:>12} beats {:<12}\n", m.winner, loser),
                };
                report.push_str(&line);
            }
        }

        report.push_str("\nPayouts:\n");
        for p in &self.payouts {
            report.push_str(&format!(
                "  {:>12} round {:<3} {:>12}\n",
                p.participant, p.round, p.amount
            ));
        }
        if !self.held.is_empty() {
            report.push_str("\nHeld in the bank:\n");
            for p in &self.held {
                report.push_str(&format!(
                    "  {:>12} round {:<3} {:>12}\n",
                    p.participant, p.round, p.amount
                ));
            }
        }
        match self.champion {
            Some(id) => report.push_str(&format!("\nChampion: {id}\n")),
            None => report.push_str("\nNo champion\n"),
        }
        report
    }
}

fn join_ids(ids: &[ParticipantId]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod report_tests;
