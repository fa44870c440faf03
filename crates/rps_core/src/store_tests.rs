use super::*;
use crate::{Hand, Participant, ParticipantId};
use chrono::Utc;

fn participant(id: ParticipantId) -> Participant {
    Participant::new(id, &format!("player{id}"), Utc::now(), id as u32)
}

#[test]
fn test_put_get_delete() {
    let vault: Vault<ParticipantId, Participant> = Vault::in_memory();
    assert!(!vault.exists(&1).unwrap());

    vault.put(1, participant(1)).unwrap();
    assert!(vault.exists(&1).unwrap());
    assert_eq!(vault.get(&1).unwrap().unwrap().name, "player1");

    vault.delete(&1).unwrap();
    vault.delete(&1).unwrap();
    assert_eq!(vault.get(&1).unwrap(), None);
}

#[test]
fn test_update_returns_new_record() {
    let vault: Vault<ParticipantId, Participant> = Vault::in_memory();
    vault.put(7, participant(7)).unwrap();

    let updated = vault
        .update(&7, &mut |p| {
            p.moves.submit(1, Hand::Rock).unwrap();
        })
        .unwrap()
        .unwrap();
    assert_eq!(updated.moves.hand_for(1), Some(Hand::Rock));
    assert_eq!(vault.get(&7).unwrap().unwrap().moves.len(), 1);

    assert!(vault.update(&8, &mut |_| {}).unwrap().is_none());
}

#[test]
fn test_batch_update_skips_missing_keys() {
    let vault: Vault<ParticipantId, Participant> = Vault::in_memory();
    vault
        .batch_put(vec![(1, participant(1)), (2, participant(2))])
        .unwrap();

    let touched = vault
        .batch_update(&[1, 2, 3], &mut |p| p.enter_bracket())
        .unwrap();
    assert_eq!(touched.len(), 2);
    assert!(vault.all().unwrap().iter().all(|(_, p)| p.in_tournament));
    assert_eq!(vault.len().unwrap(), 2);
}

#[test]
fn test_all_is_ordered_by_key() {
    let vault: Vault<String, String> = Vault::in_memory();
    vault.put("b".into(), "2".into()).unwrap();
    vault.put("a".into(), "1".into()).unwrap();

    let keys: Vec<String> = vault.all().unwrap().into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
}
