//! Collaborators the tournament talks to: the messaging transport and the
//! payment provider, plus the local implementations used by the console
//! binary and the tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use rps_core::{ParticipantId, Sats};
use thiserror::Error;
use tracing::{debug, info};

// =============================================================================
// Messaging
// =============================================================================

/// Outbound messages to participants.
///
/// Delivery is best effort: implementations log failures and never surface
/// them to the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, to: ParticipantId, text: &str);
}

pub async fn notify_many(notifier: &dyn Notifier, ids: &[ParticipantId], text: &str) {
    for &id in ids {
        notifier.notify(id, text).await;
    }
}

/// Writes messages to stdout, one line per message.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, to: ParticipantId, text: &str) {
        for line in text.lines() {
            println!("[{to}] {line}");
        }
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(ParticipantId, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(ParticipantId, String)> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn messages_for(&self, id: ParticipantId) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(to, _)| *to == id)
            .map(|(_, text)| text)
            .collect()
    }

    /// Whether `id` received a message containing `needle`
    pub fn received(&self, id: ParticipantId, needle: &str) -> bool {
        self.messages_for(id).iter().any(|m| m.contains(needle))
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, to: ParticipantId, text: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((to, text.to_string()));
        }
    }
}

// =============================================================================
// Payments
// =============================================================================

/// The two wallets of the service: tickets are paid into the cashbox, the
/// prize pool of a running tournament sits in the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletKind {
    Cashbox,
    Bank,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    pub address: String,
    pub reference: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("payment provider unreachable: {0}")]
    Unreachable(String),
    #[error("payment rejected: {0}")]
    Rejected(String),
    #[error("unknown invoice: {0}")]
    UnknownInvoice(String),
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_invoice(&self, wallet: WalletKind, amount: Sats)
        -> Result<Invoice, PaymentError>;

    async fn invoice_status(
        &self,
        wallet: WalletKind,
        reference: &str,
    ) -> Result<InvoiceStatus, PaymentError>;

    /// Send exactly `amount`. Returns the amount that left the wallet.
    async fn pay(&self, from: WalletKind, address: &str, amount: Sats)
        -> Result<Sats, PaymentError>;

    async fn cancel_invoice(&self, wallet: WalletKind, reference: &str)
        -> Result<(), PaymentError>;

    /// Drop every open invoice of `wallet`.
    async fn sweep_invoices(&self, wallet: WalletKind) -> Result<(), PaymentError>;
}

#[derive(Debug, Clone)]
struct SimInvoice {
    wallet: WalletKind,
    address: String,
    amount: Sats,
    paid: bool,
}

/// A payment sent to an address outside the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    pub from: WalletKind,
    pub address: String,
    pub amount: Sats,
}

#[derive(Debug, Default)]
struct SimState {
    balances: HashMap<WalletKind, Sats>,
    invoices: HashMap<String, SimInvoice>,
    payouts: Vec<Payout>,
    offline: bool,
    refused: HashSet<String>,
}

/// In-process ledger standing in for a real wallet.
///
/// Paying an address that belongs to one of its own invoices moves funds
/// between the two wallets and marks that invoice paid; any other address is
/// recorded as an outgoing payout.
#[derive(Debug, Default)]
pub struct SimulatedWallet {
    state: Mutex<SimState>,
}

impl SimulatedWallet {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, SimState>, PaymentError> {
        self.state
            .lock()
            .map_err(|_| PaymentError::Unreachable("wallet state poisoned".into()))
    }

    fn online(&self) -> Result<std::sync::MutexGuard<'_, SimState>, PaymentError> {
        let state = self.state()?;
        if state.offline {
            return Err(PaymentError::Unreachable("simulated outage".into()));
        }
        Ok(state)
    }

    /// Settle an invoice as if its payer had sent the funds.
    pub fn mark_paid(&self, reference: &str) -> Result<(), PaymentError> {
        let mut state = self.state()?;
        let invoice = state
            .invoices
            .get_mut(reference)
            .ok_or_else(|| PaymentError::UnknownInvoice(reference.to_string()))?;
        if invoice.paid {
            return Ok(());
        }
        invoice.paid = true;
        let (wallet, amount) = (invoice.wallet, invoice.amount);
        *state.balances.entry(wallet).or_insert(0) += amount;
        info!(reference, amount, "simulated invoice paid");
        Ok(())
    }

    pub fn deposit(&self, wallet: WalletKind, amount: Sats) {
        if let Ok(mut state) = self.state() {
            *state.balances.entry(wallet).or_insert(0) += amount;
        }
    }

    pub fn balance(&self, wallet: WalletKind) -> Sats {
        self.state()
            .map(|s| s.balances.get(&wallet).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn payouts(&self) -> Vec<Payout> {
        self.state().map(|s| s.payouts.clone()).unwrap_or_default()
    }

    /// Total paid out to `address`
    pub fn paid_to(&self, address: &str) -> Sats {
        self.payouts()
            .iter()
            .filter(|p| p.address == address)
            .map(|p| p.amount)
            .sum()
    }

    pub fn open_invoices(&self, wallet: WalletKind) -> usize {
        self.state()
            .map(|s| s.invoices.values().filter(|i| i.wallet == wallet && !i.paid).count())
            .unwrap_or(0)
    }

    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut state) = self.state() {
            state.offline = offline;
        }
    }

    /// Make every payment to `address` fail.
    pub fn refuse_address(&self, address: &str) {
        if let Ok(mut state) = self.state() {
            state.refused.insert(address.to_string());
        }
    }
}

#[async_trait]
impl PaymentProvider for SimulatedWallet {
    async fn create_invoice(
        &self,
        wallet: WalletKind,
        amount: Sats,
    ) -> Result<Invoice, PaymentError> {
        let mut state = self.online()?;
        let reference = uuid::Uuid::new_v4().simple().to_string();
        let address = format!("sim:{}", &reference[..20]);
        state.invoices.insert(
            reference.clone(),
            SimInvoice {
                wallet,
                address: address.clone(),
                amount,
                paid: false,
            },
        );
        debug!(?wallet, amount, %reference, "simulated invoice created");
        Ok(Invoice { address, reference })
    }

    async fn invoice_status(
        &self,
        _wallet: WalletKind,
        reference: &str,
    ) -> Result<InvoiceStatus, PaymentError> {
        let state = self.online()?;
        match state.invoices.get(reference) {
            Some(invoice) if invoice.paid => Ok(InvoiceStatus::Paid),
            Some(_) => Ok(InvoiceStatus::Pending),
            None => Err(PaymentError::UnknownInvoice(reference.to_string())),
        }
    }

    async fn pay(
        &self,
        from: WalletKind,
        address: &str,
        amount: Sats,
    ) -> Result<Sats, PaymentError> {
        let mut state = self.online()?;
        if state.refused.contains(address) {
            return Err(PaymentError::Rejected(format!("address {address} refused")));
        }
        let available = state.balances.get(&from).copied().unwrap_or(0);
        if amount > available {
            return Err(PaymentError::Rejected(format!(
                "insufficient funds: {available} < {amount}"
            )));
        }
        let sent = amount;
        state.balances.insert(from, available - sent);

        let internal = state
            .invoices
            .values_mut()
            .find(|i| i.address == address && !i.paid)
            .map(|invoice| {
                invoice.paid = true;
                invoice.wallet
            });
        match internal {
            Some(wallet) => *state.balances.entry(wallet).or_insert(0) += sent,
            None => state.payouts.push(Payout {
                from,
                address: address.to_string(),
                amount: sent,
            }),
        }
        Ok(sent)
    }

    async fn cancel_invoice(
        &self,
        _wallet: WalletKind,
        reference: &str,
    ) -> Result<(), PaymentError> {
        let mut state = self.online()?;
        state
            .invoices
            .remove(reference)
            .map(|_| ())
            .ok_or_else(|| PaymentError::UnknownInvoice(reference.to_string()))
    }

    async fn sweep_invoices(&self, wallet: WalletKind) -> Result<(), PaymentError> {
        let mut state = self.online()?;
        state.invoices.retain(|_, i| i.wallet != wallet || i.paid);
        Ok(())
    }
}

#[cfg(test)]
#[path = "ports_tests.rs"]
mod ports_tests;
