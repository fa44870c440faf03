use super::*;

#[test]
fn test_register_rejects_duplicate() {
    let registry: SignalRegistry<()> = SignalRegistry::new();
    let _rx = registry.register(1).unwrap();

    assert_eq!(registry.register(1).unwrap_err(), AlreadyWatching(1));
    assert!(registry.exists(1));
    assert!(!registry.exists(2));
}

#[test]
fn test_unregister_closes_signal_and_is_idempotent() {
    let registry: SignalRegistry<()> = SignalRegistry::new();
    let mut rx = registry.register(1).unwrap();
    assert_eq!(rx.check(), SignalState::Quiet);

    assert!(registry.unregister(1));
    assert!(!registry.unregister(1));
    assert_eq!(rx.check(), SignalState::Closed);
}

#[test]
fn test_value_handoff() {
    let registry: SignalRegistry<String> = SignalRegistry::new();
    let mut rx = registry.register(5).unwrap();

    assert!(registry.signal(5, Signal::Deliver("alice".to_string())));
    assert_eq!(
        rx.check(),
        SignalState::Received(Signal::Deliver("alice".to_string()))
    );
    assert!(registry.signal(5, Signal::Reset));
    assert_eq!(rx.check(), SignalState::Received(Signal::Reset));
}

#[test]
fn test_delivery_after_watcher_exit_is_dropped() {
    let registry: SignalRegistry<String> = SignalRegistry::new();
    let rx = registry.register(5).unwrap();
    let sender = registry.get(5).unwrap();
    drop(rx);

    assert!(!sender.send(Signal::Deliver("late".to_string())));
    assert!(!registry.signal(6, Signal::Reset));
}

#[test]
fn test_reregister_after_cancel_creates_fresh_watch() {
    let registry: SignalRegistry<()> = SignalRegistry::new();
    let first = registry.register(3).unwrap();
    registry.unregister(3);

    let mut second = registry.register(3).unwrap();
    assert_ne!(first.generation(), second.generation());

    // The old watcher exiting must not remove the new registration.
    assert!(!registry.release(&first));
    assert!(registry.exists(3));
    assert_eq!(second.check(), SignalState::Quiet);

    assert!(registry.release(&second));
    assert!(registry.is_empty());
}

#[test]
fn test_concurrent_registrations() {
    let registry = std::sync::Arc::new(SignalRegistry::<()>::new());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let registry = registry.clone();
            std::thread::spawn(move || registry.register(i % 4).is_ok())
        })
        .collect();
    let accepted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(accepted, 4);
    assert_eq!(registry.len(), 4);
}
