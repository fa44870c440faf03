use std::path::PathBuf;

use chrono::Utc;
use rps_core::{Hand, KeyValueStore, Participant, ParticipantId, TournamentStage, Vault};

fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rps-vault-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn participants_survive_reopen() {
    let dir = scratch_dir();
    let path = dir.join("participants.json");

    {
        let vault: Vault<ParticipantId, Participant> = Vault::open(&path).unwrap();
        let mut p = Participant::new(42, "alice", Utc::now(), 1);
        p.enter_bracket();
        p.moves.submit(1, Hand::Scissors).unwrap();
        p.moves.seal(1);
        p.payout_address = Some("bchtest:qq".to_string());
        vault.put(42, p).unwrap();
    }

    let vault: Vault<ParticipantId, Participant> = Vault::open(&path).unwrap();
    let p = vault.get(&42).unwrap().unwrap();
    assert!(p.in_tournament);
    assert_eq!(p.moves.render(), "S");
    assert_eq!(p.payout_address.as_deref(), Some("bchtest:qq"));

    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn stage_flag_survives_reopen() {
    let dir = scratch_dir();
    let path = dir.join("flags.json");

    {
        let flags: Vault<String, String> = Vault::open(&path).unwrap();
        flags
            .put("stage".into(), TournamentStage::Running.to_string())
            .unwrap();
    }

    let flags: Vault<String, String> = Vault::open(&path).unwrap();
    let stage: TournamentStage = flags.get(&"stage".to_string()).unwrap().unwrap().parse().unwrap();
    assert_eq!(stage, TournamentStage::Running);
    assert!(stage.is_in_flight());

    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn opening_a_missing_file_starts_empty() {
    let dir = scratch_dir();
    let vault: Vault<String, String> = Vault::open(dir.join("nested").join("flags.json")).unwrap();
    assert_eq!(vault.len().unwrap(), 0);
    vault.put("k".into(), "v".into()).unwrap();
    assert!(dir.join("nested").join("flags.json").exists());

    std::fs::remove_dir_all(dir).unwrap();
}
