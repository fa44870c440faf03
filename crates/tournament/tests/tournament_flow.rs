//! End-to-end scenarios: ticket purchase through the dispatcher, scheduled
//! and manual runs, and recovery of a run interrupted mid-round.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rps_core::{Hand, KeyValueStore, Participant, ParticipantId, Sats, TournamentStage, Vault};
use rps_tournament::{
    Command, Dispatcher, PaymentProvider, PendingInvoice, RecordingNotifier, RunSummary, Schedule,
    SimulatedWallet, TournamentConfig, TournamentEngine, WalletKind, HELD_KEY, POOL_KEY,
};

const PRICE: Sats = 2_000;

struct System {
    participants: Arc<Vault<ParticipantId, Participant>>,
    flags: Arc<Vault<String, String>>,
    invoices: Arc<Vault<ParticipantId, PendingInvoice>>,
    notifier: Arc<RecordingNotifier>,
    wallet: Arc<SimulatedWallet>,
    engine: Arc<TournamentEngine>,
    dispatcher: Arc<Dispatcher>,
}

fn config() -> TournamentConfig {
    TournamentConfig {
        capacity: 8,
        ticket_price: PRICE,
        seed: Some(2024),
        schedule_period_secs: 60,
        ..Default::default()
    }
}

fn vault<K, V>(dir: Option<&Path>, file: &str) -> Arc<Vault<K, V>>
where
    K: Ord + Clone + serde::Serialize + serde::de::DeserializeOwned + std::fmt::Debug + Send + Sync,
    V: Clone + serde::Serialize + serde::de::DeserializeOwned + Send + Sync,
{
    match dir {
        Some(dir) => Arc::new(Vault::open(dir.join(file)).unwrap()),
        None => Arc::new(Vault::in_memory()),
    }
}

fn system(dir: Option<&Path>, wallet: Arc<SimulatedWallet>) -> System {
    let participants = vault(dir, "participants.json");
    let flags = vault(dir, "flags.json");
    let invoices = vault(dir, "invoices.json");
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = Arc::new(TournamentEngine::new(
        config(),
        participants.clone(),
        flags.clone(),
        notifier.clone(),
        wallet.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        participants.clone(),
        invoices.clone(),
        engine.clone(),
        notifier.clone(),
        wallet.clone(),
    ));
    System {
        participants,
        flags,
        invoices,
        notifier,
        wallet,
        engine,
        dispatcher,
    }
}

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rps-flow-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn address(id: ParticipantId) -> String {
    format!("bitcoincash:{:0>42}", id)
}

async fn send(s: &System, id: ParticipantId, line: &str) {
    let command: Command = line.parse().unwrap();
    s.dispatcher.handle(id, command).await;
}

/// Register `id`, set its wallet and buy a ticket through the dispatcher.
async fn enter(s: &System, id: ParticipantId) {
    send(s, id, &format!("subscribe player-{id}")).await;
    s.participants
        .update(&id, &mut |p| p.payout_address = Some(address(id)))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    send(s, id, "buyticket").await;
    let invoice = s.invoices.get(&id).unwrap().unwrap();
    s.wallet.mark_paid(&invoice.reference).unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(s.participants.get(&id).unwrap().unwrap().has_ticket);
}

async fn wait_for_round(engine: &TournamentEngine, round: u32) {
    for _ in 0..120 {
        if engine.current_round() == Some(round) {
            return;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("round {round} never started");
}

fn total(s: &System, id: ParticipantId) -> Sats {
    s.participants.get(&id).unwrap().unwrap().total_winnings
}

#[tokio::test(start_paused = true)]
async fn test_four_player_tournament() {
    let s = system(None, Arc::new(SimulatedWallet::new()));
    for id in 1..=4 {
        enter(&s, id).await;
    }
    assert_eq!(s.wallet.balance(WalletKind::Cashbox), 4 * PRICE);

    let engine = s.engine.clone();
    let run = tokio::spawn(async move { engine.trigger().await });

    wait_for_round(&s.engine, 1).await;
    assert_eq!(s.engine.stage().unwrap(), TournamentStage::Running);
    for id in 1..=4 {
        send(&s, id, "rock").await;
        assert!(s.notifier.received(id, "Your moves for now: [R]"));
    }
    send(&s, 9, "rock").await;
    assert!(s.notifier.received(9, "not playing"));

    let summary = run.await.unwrap().unwrap();
    let RunSummary::Finished {
        champion: Some(champion),
        rounds: 2,
    } = summary
    else {
        panic!("unexpected summary {summary:?}");
    };

    let report = s.engine.last_report().unwrap();
    for m in &report.rounds[0].matches {
        assert!(m.draw);
        assert_eq!(m.winner_hand, Some(Hand::Rock));
        assert_eq!(total(&s, m.loser.unwrap()), 0);
    }
    let finalist = report.rounds[1].matches[0].loser.unwrap();
    assert_eq!(total(&s, finalist), PRICE);
    assert_eq!(total(&s, champion), 3 * PRICE);
    assert_eq!(s.wallet.paid_to(&address(champion)), 3 * PRICE);
    assert_eq!(s.wallet.balance(WalletKind::Bank), 0);
    assert_eq!(s.wallet.balance(WalletKind::Cashbox), 0);
    assert_eq!(report.total_paid(), 4 * PRICE);

    let champion_record = s.participants.get(&champion).unwrap().unwrap();
    assert_eq!(champion_record.leaderboard_position, 1);
    assert!(!champion_record.has_ticket);
    assert!(!champion_record.in_tournament);
    assert!(champion_record.moves.is_empty());
    assert!(s.notifier.received(champion, "You won the tournament"));
    assert!(s.notifier.received(finalist, "You are out after round 2"));

    send(&s, champion, "leaderboard").await;
    let board = s.notifier.messages_for(champion).pop().unwrap();
    let first_row = board.lines().nth(2).unwrap();
    assert!(first_row.contains(&format!("player-{champion}")));
}

#[tokio::test(start_paused = true)]
async fn test_champion_without_wallet_leads_leaderboard() {
    let s = system(None, Arc::new(SimulatedWallet::new()));
    for id in 1..=4 {
        enter(&s, id).await;
        s.participants
            .update(&id, &mut |p| p.payout_address = None)
            .unwrap();
    }

    let summary = s.engine.trigger().await.unwrap();
    let RunSummary::Finished {
        champion: Some(champion),
        ..
    } = summary
    else {
        panic!("unexpected summary {summary:?}");
    };

    assert_eq!(total(&s, champion), 3 * PRICE);
    assert!(s.wallet.payouts().is_empty());
    assert_eq!(s.wallet.balance(WalletKind::Bank), 4 * PRICE);
    assert_eq!(
        s.flags.get(&HELD_KEY.to_string()).unwrap(),
        Some((4 * PRICE).to_string())
    );

    tokio::time::sleep(Duration::from_secs(1)).await;
    send(&s, champion, "leaderboard").await;
    let board = s.notifier.messages_for(champion).pop().unwrap();
    let first_row = board.lines().nth(2).unwrap();
    assert!(first_row.contains(&format!("player-{champion}")));
}

#[tokio::test(start_paused = true)]
async fn test_restore_after_interrupted_round() {
    let dir = temp_dir();
    let wallet = Arc::new(SimulatedWallet::new());
    {
        let s = system(Some(&dir), wallet.clone());
        for id in 1..=4 {
            enter(&s, id).await;
        }
        let engine = s.engine.clone();
        let run = tokio::spawn(async move { engine.trigger().await });
        wait_for_round(&s.engine, 1).await;
        send(&s, 1, "paper").await;
        run.abort();
        assert!(run.await.unwrap_err().is_cancelled());
    }

    let s = system(Some(&dir), wallet.clone());
    assert_eq!(s.engine.stage().unwrap(), TournamentStage::Running);
    assert_eq!(
        s.flags.get(&POOL_KEY.to_string()).unwrap(),
        Some((4 * PRICE).to_string())
    );
    let in_flight = s
        .participants
        .all()
        .unwrap()
        .iter()
        .filter(|(_, p)| p.in_tournament)
        .count();
    assert_eq!(in_flight, 4);

    let summary = s.engine.restore().await.unwrap();
    let RunSummary::Finished {
        champion: Some(champion),
        rounds: 2,
    } = summary
    else {
        panic!("unexpected summary {summary:?}");
    };
    assert_eq!(s.engine.stage().unwrap(), TournamentStage::Idle);
    assert_eq!(wallet.paid_to(&address(champion)), 3 * PRICE);
    assert_eq!(wallet.balance(WalletKind::Bank), 0);
    assert!(s.notifier.received(champion, "continues after a restart"));
    let report = s.engine.last_report().unwrap();
    assert!(report.restored);
    assert_eq!(report.rounds[0].round, 1);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_schedule_launches_tournament() {
    let s = system(None, Arc::new(SimulatedWallet::new()));
    enter(&s, 1).await;
    enter(&s, 2).await;

    let scheduler = tokio::spawn(Schedule::new(Duration::from_secs(60)).drive(s.engine.clone()));
    tokio::time::sleep(Duration::from_secs(120)).await;
    scheduler.abort();

    let report = s.engine.last_report().expect("a scheduled run finished");
    assert_eq!(report.bracket.len(), 2);
    let champion = report.champion.unwrap();
    assert_eq!(total(&s, champion), 2 * PRICE);
}

#[tokio::test(start_paused = true)]
async fn test_pending_payment_survives_restart() {
    let dir = temp_dir();
    let wallet = Arc::new(SimulatedWallet::new());
    let reference = {
        let s = system(Some(&dir), wallet.clone());
        send(&s, 5, "subscribe").await;
        let invoice = wallet
            .create_invoice(WalletKind::Cashbox, PRICE)
            .await
            .unwrap();
        s.invoices
            .put(
                5,
                PendingInvoice {
                    reference: invoice.reference.clone(),
                    address: invoice.address,
                    amount: PRICE,
                    created_at: chrono::Utc::now(),
                },
            )
            .unwrap();
        invoice.reference
    };

    let s = system(Some(&dir), wallet.clone());
    assert_eq!(s.dispatcher.resume_pending().await.unwrap(), 1);
    wallet.mark_paid(&reference).unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert!(s.participants.get(&5).unwrap().unwrap().has_ticket);
    assert!(s.invoices.all().unwrap().is_empty());

    std::fs::remove_dir_all(&dir).unwrap();
}
