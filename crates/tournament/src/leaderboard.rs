//! Ranking of participants by cumulative winnings

use std::collections::HashMap;

use rps_core::{KeyValueStore, Participant, ParticipantId, Sats, StoreError};
use tracing::info;

/// One row of the leaderboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    pub position: u32,
    pub id: ParticipantId,
    pub name: String,
    pub total_winnings: Sats,
}

/// Order participants by cumulative winnings, descending.
///
/// Ties go to the earlier registration, then to the lower identity, so the
/// order is total and reproducible.
pub fn rank(participants: &[Participant]) -> Vec<Standing> {
    let mut sorted: Vec<&Participant> = participants.iter().collect();
    sorted.sort_by(|a, b| {
        b.total_winnings
            .cmp(&a.total_winnings)
            .then(a.registered_at.cmp(&b.registered_at))
            .then(a.id.cmp(&b.id))
    });
    sorted
        .into_iter()
        .enumerate()
        .map(|(idx, p)| Standing {
            position: idx as u32 + 1,
            id: p.id,
            name: p.name.clone(),
            total_winnings: p.total_winnings,
        })
        .collect()
}

/// Recompute the ranking and write every position back in one batch.
pub fn rebuild(
    store: &dyn KeyValueStore<ParticipantId, Participant>,
) -> Result<Vec<Standing>, StoreError> {
    let participants: Vec<Participant> = store.all()?.into_iter().map(|(_, p)| p).collect();
    let standings = rank(&participants);
    let positions: HashMap<ParticipantId, u32> =
        standings.iter().map(|s| (s.id, s.position)).collect();
    let keys: Vec<ParticipantId> = positions.keys().copied().collect();
    store.batch_update(&keys, &mut |p| {
        if let Some(&position) = positions.get(&p.id) {
            p.leaderboard_position = position;
        }
    })?;
    info!(participants = standings.len(), "leaderboard rebuilt");
    Ok(standings)
}

/// Text table of the first `top` standings
pub fn render(standings: &[Standing], top: usize) -> String {
    if standings.is_empty() {
        return "Leaderboard is empty.".to_string();
    }
    let mut out = String::new();
    out.push_str(&format!("{:<5} {:<18} {:>12}\n", "Rank", "Name", "Winnings"));
    out.push_str(&"-".repeat(37));
    out.push('\n');
    for s in standings.iter().take(top) {
        out.push_str(&format!(
            "{:<5} {:<18} {:>12}\n",
            s.position, s.name, s.total_winnings
        ));
    }
    out
}

#[cfg(test)]
#[path = "leaderboard_tests.rs"]
mod leaderboard_tests;
