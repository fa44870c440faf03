//! Participant record as kept by the participant store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{MoveSequence, ParticipantId, Sats};

/// A registered participant.
///
/// `in_tournament` is only ever set for participants that held a ticket when
/// the bracket was formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub subscribed: bool,
    pub has_ticket: bool,
    pub in_tournament: bool,
    /// Prize state carried through the current tournament
    pub last_winnings: Sats,
    /// Everything ever paid out to this participant
    pub total_winnings: Sats,
    pub leaderboard_position: u32,
    pub moves: MoveSequence,
    pub name: String,
    pub payout_address: Option<String>,
    pub last_ticket_at: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(
        id: ParticipantId,
        name: &str,
        registered_at: DateTime<Utc>,
        leaderboard_position: u32,
    ) -> Self {
        Self {
            id,
            subscribed: true,
            has_ticket: false,
            in_tournament: false,
            last_winnings: 0,
            total_winnings: 0,
            leaderboard_position,
            moves: MoveSequence::new(),
            name: name.to_string(),
            payout_address: None,
            last_ticket_at: None,
            registered_at,
        }
    }

    pub fn grant_ticket(&mut self, at: DateTime<Utc>) {
        self.has_ticket = true;
        self.last_ticket_at = Some(at);
    }

    /// Per-tournament reset applied when the bracket is formed.
    pub fn enter_bracket(&mut self) {
        self.in_tournament = true;
        self.moves.clear();
        self.last_winnings = 0;
    }

    /// Leaving the tournament consumes the ticket.
    pub fn leave_tournament(&mut self) {
        self.in_tournament = false;
        self.has_ticket = false;
        self.moves.clear();
    }
}
