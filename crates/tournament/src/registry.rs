//! Keyed registry of per-participant cancellation/value signals.
//!
//! Each participant can have at most one live registration per registry. The
//! watcher owns the receiving end; the command path looks the sender up by
//! key to hand over a value or to cancel the watch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use rps_core::ParticipantId;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// What travels over a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal<T> {
    /// A value for the watcher, e.g. the new name typed by the participant
    Deliver(T),
    /// Explicit reset requested by the participant
    Reset,
}

/// Result of a non-blocking look at a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalState<T> {
    Quiet,
    Received(Signal<T>),
    /// The registration was dropped
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("participant {0} already has an active watch")]
pub struct AlreadyWatching(pub ParticipantId);

/// Receiving half handed to the watcher.
#[derive(Debug)]
pub struct SignalReceiver<T> {
    key: ParticipantId,
    generation: u64,
    rx: mpsc::Receiver<Signal<T>>,
}

impl<T> SignalReceiver<T> {
    pub fn key(&self) -> ParticipantId {
        self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Never blocks.
    pub fn check(&mut self) -> SignalState<T> {
        match self.rx.try_recv() {
            Ok(signal) => SignalState::Received(signal),
            Err(TryRecvError::Empty) => SignalState::Quiet,
            Err(TryRecvError::Disconnected) => SignalState::Closed,
        }
    }
}

/// Sending half as looked up by key.
#[derive(Debug, Clone)]
pub struct SignalSender<T> {
    tx: mpsc::Sender<Signal<T>>,
}

impl<T> SignalSender<T> {
    /// Returns false when the watcher is gone or already has a pending signal;
    /// the signal is dropped in that case.
    pub fn send(&self, signal: Signal<T>) -> bool {
        self.tx.try_send(signal).is_ok()
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u64,
    tx: mpsc::Sender<Signal<T>>,
}

/// Thread-safe map from participant to its live signal.
#[derive(Debug)]
pub struct SignalRegistry<T> {
    next_generation: AtomicU64,
    slots: Mutex<HashMap<ParticipantId, Slot<T>>>,
}

impl<T> Default for SignalRegistry<T> {
    fn default() -> Self {
        Self {
            next_generation: AtomicU64::new(1),
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> SignalRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<ParticipantId, Slot<T>>> {
        // The map stays consistent even if a holder panicked.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create the signal for `key`. A second registration for a key that is
    /// still live is rejected.
    pub fn register(&self, key: ParticipantId) -> Result<SignalReceiver<T>, AlreadyWatching> {
        let mut slots = self.slots();
        if slots.contains_key(&key) {
            return Err(AlreadyWatching(key));
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(1);
        slots.insert(key, Slot { generation, tx });
        Ok(SignalReceiver {
            key,
            generation,
            rx,
        })
    }

    pub fn get(&self, key: ParticipantId) -> Option<SignalSender<T>> {
        self.slots().get(&key).map(|slot| SignalSender {
            tx: slot.tx.clone(),
        })
    }

    pub fn exists(&self, key: ParticipantId) -> bool {
        self.slots().contains_key(&key)
    }

    /// Drop the registration, which the watcher observes as a closed signal.
    /// Returns whether something was registered.
    pub fn unregister(&self, key: ParticipantId) -> bool {
        self.slots().remove(&key).is_some()
    }

    /// Drop the registration only if it is still the one `receiver` came
    /// from. Used by watchers on exit so they never remove a newer watch.
    pub fn release(&self, receiver: &SignalReceiver<T>) -> bool {
        let mut slots = self.slots();
        match slots.get(&receiver.key) {
            Some(slot) if slot.generation == receiver.generation => {
                slots.remove(&receiver.key);
                true
            }
            _ => false,
        }
    }

    /// Convenience for `get(key)` + `send`.
    pub fn signal(&self, key: ParticipantId, signal: Signal<T>) -> bool {
        self.get(key).is_some_and(|sender| sender.send(signal))
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod registry_tests;
