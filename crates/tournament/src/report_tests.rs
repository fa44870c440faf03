use super::*;

fn sample() -> RunReport {
    let mut report = RunReport::new(vec![1, 2, 3, 4], vec![5], 400);
    report.add_round(
        1,
        &[
            RoundOutcome {
                round: 1,
                winner: 1,
                loser: Some(2),
                decision: Decision::Rules {
                    winner: Hand::Rock,
                    loser: Hand::Scissors,
                },
            },
            RoundOutcome {
                round: 1,
                winner: 4,
                loser: Some(3),
                decision: Decision::Draw(Hand::Paper),
            },
        ],
    );
    report.add_payout(4, 2, 100);
    report.add_payout(1, 2, 300);
    report.champion = Some(1);
    report
}

#[test]
fn test_match_entry_from_outcome() {
    let report = sample();
    let matches = &report.rounds[0].matches;
    assert_eq!(matches[0].winner_hand, Some(Hand::Rock));
    assert!(!matches[0].draw);
    assert!(matches[1].draw);
    assert_eq!(report.total_paid(), 400);
}

#[test]
fn test_generate_report() {
    let text = sample().generate_report();
    assert!(text.contains("Bracket: 4 players, pool 400"));
    assert!(text.contains("Deferred: 5"));
    assert!(text.contains("(coin)"));
    assert!(text.contains("Champion: 1"));
    assert!(!text.contains("Held in the bank"));
}

#[test]
fn test_held_winnings_are_reported_apart_from_payouts() {
    let mut report = sample();
    report.add_held(4, 2, 100);

    assert_eq!(report.total_paid(), 400);
    assert_eq!(report.total_held(), 100);
    let text = report.generate_report();
    assert!(text.contains("Held in the bank:"));
}

#[test]
fn test_save_and_load() {
    let dir = std::env::temp_dir().join(format!("rps-report-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("last_run.json");

    let report = sample();
    report.save(&path).unwrap();
    assert_eq!(RunReport::load(&path).unwrap(), report);

    std::fs::remove_dir_all(&dir).unwrap();
}
