//! Round executor: resolves one pairwise match of the bracket.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use rps_core::{Hand, KeyValueStore, Participant, ParticipantId};
use tracing::{debug, warn};

use crate::bracket::Slot;
use crate::error::TournamentError;
use crate::ports::Notifier;

/// How a round was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No opponent
    Bye,
    /// One hand beat the other
    Rules { winner: Hand, loser: Hand },
    /// Equal hands, settled by the coin drawn before the window opened
    Draw(Hand),
}

/// Result of one match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundOutcome {
    pub round: u32,
    pub winner: ParticipantId,
    /// None for a bye
    pub loser: Option<ParticipantId>,
    pub decision: Decision,
}

/// Whether the first player wins, given both hands and the coin drawn in
/// advance for a draw.
pub fn first_player_wins(first: Hand, second: Hand, first_wins_draw: bool) -> bool {
    if first.beats(second) {
        true
    } else if second.beats(first) {
        false
    } else {
        first_wins_draw
    }
}

/// Runs single matches. Shared by all concurrent rounds of a tournament.
pub struct RoundExecutor {
    store: Arc<dyn KeyValueStore<ParticipantId, Participant>>,
    notifier: Arc<dyn Notifier>,
    decision_window: Duration,
}

impl RoundExecutor {
    pub fn new(
        store: Arc<dyn KeyValueStore<ParticipantId, Participant>>,
        notifier: Arc<dyn Notifier>,
        decision_window: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            decision_window,
        }
    }

    pub fn decision_window(&self) -> Duration {
        self.decision_window
    }

    /// Play round `round` between `a` and `b`.
    ///
    /// The draw coin is the first value taken from `rng`, before the decision
    /// window opens. Hands are read only after the window has fully elapsed.
    /// The executor records moves but never touches winnings.
    pub async fn play(
        &self,
        round: u32,
        a: Slot,
        b: Slot,
        mut rng: StdRng,
    ) -> Result<RoundOutcome, TournamentError> {
        let (a, b) = match (a, b) {
            (Slot::Player(a), Slot::Player(b)) => (a, b),
            (Slot::Player(p), Slot::Bye) | (Slot::Bye, Slot::Player(p)) => {
                self.notifier
                    .notify(p, "No opponent this round, you advance automatically.")
                    .await;
                return Ok(RoundOutcome {
                    round,
                    winner: p,
                    loser: None,
                    decision: Decision::Bye,
                });
            }
            (Slot::Bye, Slot::Bye) => return Err(TournamentError::EmptyPairing),
        };

        let a_wins_draw = rng.gen_bool(0.5);

        let player_a = self.fetch(a)?;
        let player_b = self.fetch(b)?;
        self.announce(round, &player_a, &player_b).await;
        self.announce(round, &player_b, &player_a).await;

        tokio::time::sleep(self.decision_window).await;

        let hand_a = self.lock_in(round, a, &mut rng).await?;
        let hand_b = self.lock_in(round, b, &mut rng).await?;

        self.notifier
            .notify(a, &format!("Opponent's move: *{hand_b}*"))
            .await;
        self.notifier
            .notify(b, &format!("Opponent's move: *{hand_a}*"))
            .await;

        let a_wins = first_player_wins(hand_a, hand_b, a_wins_draw);
        let (winner, loser, winning_hand, losing_hand) = if a_wins {
            (a, b, hand_a, hand_b)
        } else {
            (b, a, hand_b, hand_a)
        };
        let decision = if hand_a == hand_b {
            Decision::Draw(hand_a)
        } else {
            Decision::Rules {
                winner: winning_hand,
                loser: losing_hand,
            }
        };
        debug!(round, winner, loser, ?decision, "round resolved");

        Ok(RoundOutcome {
            round,
            winner,
            loser: Some(loser),
            decision,
        })
    }

    fn fetch(&self, id: ParticipantId) -> Result<Participant, TournamentError> {
        self.store
            .get(&id)?
            .ok_or(TournamentError::UnknownParticipant(id))
    }

    async fn announce(&self, round: u32, to: &Participant, opponent: &Participant) {
        let seconds = self.decision_window.as_secs();
        let mut text = format!("Round {round}. Your opponent is *{}*.", opponent.name);
        let history: Vec<String> = opponent
            .moves
            .sealed_hands()
            .map(|h| h.symbol().to_string())
            .collect();
        if !history.is_empty() {
            text.push_str(&format!("\nOpponent's sequence: {}", history.join(" ")));
        }
        text.push_str(&format!("\nYou have {seconds} seconds to make a move."));
        self.notifier.notify(to.id, &text).await;
    }

    /// Fill a missing hand with a random pick, then seal the round so late
    /// submissions cannot change it.
    async fn lock_in(
        &self,
        round: u32,
        id: ParticipantId,
        rng: &mut StdRng,
    ) -> Result<Hand, TournamentError> {
        let mut picked = None;
        let mut hand = None;
        let updated = self.store.update(&id, &mut |p| {
            if p.moves.hand_for(round).is_none() {
                let auto = Hand::random(&mut *rng);
                match p.moves.submit(round, auto) {
                    Ok(()) => picked = Some(auto),
                    Err(e) => warn!(participant = p.id, round, %e, "can't record automatic move"),
                }
            }
            p.moves.seal(round);
            hand = p.moves.hand_for(round).or(picked);
        })?;

        let Some(updated) = updated else {
            return Err(TournamentError::UnknownParticipant(id));
        };
        let hand = match hand {
            Some(hand) => hand,
            None => Hand::random(rng),
        };
        if let Some(auto) = picked {
            self.notifier
                .notify(
                    id,
                    &format!(
                        "Time is up, *{auto}* was played for you. Your moves for now: {}",
                        updated.moves.render()
                    ),
                )
                .await;
        }
        Ok(hand)
    }
}

#[cfg(test)]
#[path = "round_tests.rs"]
mod round_tests;
