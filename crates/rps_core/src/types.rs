//! Hands, per-round move records and the move sequence kept for every participant.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable identity of a participant (the chat identity in the original deployment).
pub type ParticipantId = i64;

/// Amounts are kept in the smallest currency unit.
pub type Sats = u64;

/// One of the three classic hands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hand {
    Rock,
    Paper,
    Scissors,
}

impl Hand {
    pub const ALL: [Hand; 3] = [Hand::Rock, Hand::Paper, Hand::Scissors];

    /// Classic rules: rock beats scissors, scissors beats paper, paper beats rock.
    pub fn beats(self, other: Hand) -> bool {
        matches!(
            (self, other),
            (Hand::Rock, Hand::Scissors) | (Hand::Scissors, Hand::Paper) | (Hand::Paper, Hand::Rock)
        )
    }

    /// Uniform pick, used when a player lets the decision window run out.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Hand {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    pub fn symbol(self) -> char {
        match self {
            Hand::Rock => 'R',
            Hand::Paper => 'P',
            Hand::Scissors => 'S',
        }
    }
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hand::Rock => "rock",
            Hand::Paper => "paper",
            Hand::Scissors => "scissors",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown hand: {0}")]
pub struct ParseHandError(pub String);

impl FromStr for Hand {
    type Err = ParseHandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "r" | "rock" => Ok(Hand::Rock),
            "p" | "paper" => Ok(Hand::Paper),
            "s" | "scissors" => Ok(Hand::Scissors),
            _ => Err(ParseHandError(s.to_string())),
        }
    }
}

/// Whether a recorded hand may still be replaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveState {
    /// Submitted for a round whose decision window has not closed yet
    Open(Hand),
    /// Part of a resolved round
    Sealed(Hand),
}

impl MoveState {
    pub fn hand(self) -> Hand {
        match self {
            MoveState::Open(hand) | MoveState::Sealed(hand) => hand,
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, MoveState::Open(_))
    }
}

/// A single hand tagged with the round it was played in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub round: u32,
    pub state: MoveState,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("round {round} is already resolved")]
    RoundClosed { round: u32 },
    #[error("round {round} is older than the last recorded round {last}")]
    StaleRound { round: u32, last: u32 },
}

/// Ordered per-round moves of one participant within one tournament.
///
/// At most one record exists per round and rounds are strictly increasing,
/// so after round `k` the sequence never holds more than `k` records.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MoveSequence {
    records: Vec<MoveRecord>,
}

impl MoveSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[MoveRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last_round(&self) -> Option<u32> {
        self.records.last().map(|r| r.round)
    }

    /// Record `hand` for `round`, replacing an open hand of the same round.
    pub fn submit(&mut self, round: u32, hand: Hand) -> Result<(), MoveError> {
        if let Some(last) = self.records.last_mut() {
            if last.round > round {
                return Err(MoveError::StaleRound {
                    round,
                    last: last.round,
                });
            }
            if last.round == round {
                return match last.state {
                    MoveState::Open(_) => {
                        last.state = MoveState::Open(hand);
                        Ok(())
                    }
                    MoveState::Sealed(_) => Err(MoveError::RoundClosed { round }),
                };
            }
        }
        self.records.push(MoveRecord {
            round,
            state: MoveState::Open(hand),
        });
        Ok(())
    }

    /// Hand recorded for `round`, open or sealed.
    pub fn hand_for(&self, round: u32) -> Option<Hand> {
        self.records
            .last()
            .filter(|r| r.round == round)
            .map(|r| r.state.hand())
    }

    /// Seal the hand of `round`. Returns false when nothing was open for it.
    pub fn seal(&mut self, round: u32) -> bool {
        match self.records.last_mut() {
            Some(last) if last.round == round && last.state.is_open() => {
                last.state = MoveState::Sealed(last.state.hand());
                true
            }
            _ => false,
        }
    }

    /// Seal whatever is still open at the tail.
    pub fn seal_open(&mut self) -> bool {
        match self.records.last() {
            Some(last) if last.state.is_open() => self.seal(last.round),
            _ => false,
        }
    }

    /// Drop an open tail record (a round that never got resolved).
    pub fn discard_open(&mut self) -> bool {
        if self.records.last().is_some_and(|r| r.state.is_open()) {
            self.records.pop();
            return true;
        }
        false
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Hands of resolved rounds, oldest first. This is what an opponent gets to see.
    pub fn sealed_hands(&self) -> impl Iterator<Item = Hand> + '_ {
        self.records.iter().filter_map(|r| match r.state {
            MoveState::Sealed(hand) => Some(hand),
            MoveState::Open(_) => None,
        })
    }

    /// Compact form such as `R P [S]`, the open hand in brackets.
    pub fn render(&self) -> String {
        self.records
            .iter()
            .map(|r| match r.state {
                MoveState::Sealed(hand) => hand.symbol().to_string(),
                MoveState::Open(hand) => format!("[{}]", hand.symbol()),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;
