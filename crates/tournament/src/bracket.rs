//! Bracket formation and per-round pairing.

use rand::seq::SliceRandom;
use rand::Rng;
use rps_core::ParticipantId;

/// One side of a pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Player(ParticipantId),
    /// No opponent; the other side advances without playing
    Bye,
}

impl Slot {
    pub fn player(self) -> Option<ParticipantId> {
        match self {
            Slot::Player(id) => Some(id),
            Slot::Bye => None,
        }
    }
}

/// Largest power of two not above `n` (0 for 0).
pub fn power_of_two_floor(n: usize) -> usize {
    if n == 0 {
        0
    } else {
        1 << (usize::BITS - 1 - n.leading_zeros())
    }
}

/// Participants still competing in the current tournament.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bracket {
    players: Vec<ParticipantId>,
}

impl Bracket {
    /// Cut `candidates` to the largest power of two that fits `capacity`.
    ///
    /// Returns the bracket and the deferred remainder, both in input order.
    pub fn align(
        mut candidates: Vec<ParticipantId>,
        capacity: usize,
    ) -> (Bracket, Vec<ParticipantId>) {
        let size = power_of_two_floor(candidates.len().min(capacity));
        let tail = candidates.split_off(size);
        (Bracket { players: candidates }, tail)
    }

    pub fn from_players(players: Vec<ParticipantId>) -> Self {
        Self { players }
    }

    pub fn players(&self) -> &[ParticipantId] {
        &self.players
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.players.contains(&id)
    }

    pub fn remove(&mut self, id: ParticipantId) -> bool {
        match self.players.iter().position(|&p| p == id) {
            Some(idx) => {
                self.players.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.players.shuffle(rng);
    }

    /// Consecutive pairs; an odd participant out gets a bye.
    pub fn pairs(&self) -> Vec<(Slot, Slot)> {
        self.players
            .chunks(2)
            .map(|pair| match *pair {
                [a, b] => (Slot::Player(a), Slot::Player(b)),
                [a] => (Slot::Player(a), Slot::Bye),
                _ => unreachable!("chunks(2) yields one or two items"),
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }
}

#[cfg(test)]
#[path = "bracket_tests.rs"]
mod bracket_tests;
