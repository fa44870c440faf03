use super::*;
use chrono::{Duration, TimeZone, Utc};
use rps_core::Vault;

fn participant(id: ParticipantId, total: Sats, registered_minutes: i64) -> Participant {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut p = Participant::new(
        id,
        &format!("Player{id}"),
        base + Duration::minutes(registered_minutes),
        0,
    );
    p.total_winnings = total;
    p
}

#[test]
fn test_rank_by_winnings_descending() {
    let standings = rank(&[
        participant(1, 100, 0),
        participant(2, 300, 1),
        participant(3, 200, 2),
    ]);
    let ids: Vec<_> = standings.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![2, 3, 1]);
    assert_eq!(standings[0].position, 1);
    assert_eq!(standings[2].position, 3);
}

#[test]
fn test_ties_go_to_earlier_registration() {
    let standings = rank(&[
        participant(5, 100, 10),
        participant(7, 100, 2),
        participant(6, 100, 2),
    ]);
    let ids: Vec<_> = standings.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![6, 7, 5]);
}

#[test]
fn test_rebuild_writes_positions() {
    let store: Vault<ParticipantId, Participant> = Vault::in_memory();
    store.put(1, participant(1, 0, 0)).unwrap();
    store.put(2, participant(2, 500, 1)).unwrap();

    let standings = rebuild(&store).unwrap();

    assert_eq!(standings[0].id, 2);
    assert_eq!(store.get(&2).unwrap().unwrap().leaderboard_position, 1);
    assert_eq!(store.get(&1).unwrap().unwrap().leaderboard_position, 2);
}

#[test]
fn test_render_top() {
    let standings = rank(&[participant(1, 10, 0), participant(2, 20, 1)]);
    let text = render(&standings, 1);
    assert!(text.contains("Player2"));
    assert!(!text.contains("Player1"));
    assert_eq!(render(&[], 10), "Leaderboard is empty.");
}
