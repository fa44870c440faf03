//! Participant-facing commands.
//!
//! The [`Dispatcher`] turns commands from the messaging transport into store
//! updates, payment watches and profile edit watches. Replies go back through
//! the [`Notifier`].

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rand::Rng;
use rps_core::{
    Hand, KeyValueStore, Participant, ParticipantId, Sats, StoreError, TournamentStage,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::TournamentConfig;
use crate::engine::{ParticipantStore, TournamentEngine};
use crate::leaderboard;
use crate::ports::{InvoiceStatus, Notifier, PaymentProvider, WalletKind};
use crate::registry::{Signal, SignalReceiver, SignalRegistry};
use crate::schedule::Schedule;
use crate::watcher::{WatchOutcome, Watcher};

/// Rows shown by the leaderboard command
pub const LEADERBOARD_SIZE: usize = 10;
/// Random name picks before falling back to an id-derived name
const NAME_ATTEMPTS: usize = 32;

/// A ticket invoice waiting for payment, kept until its watch ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInvoice {
    pub reference: String,
    pub address: String,
    pub amount: Sats,
    pub created_at: DateTime<Utc>,
}

pub type InvoiceStore = Arc<dyn KeyValueStore<ParticipantId, PendingInvoice>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start { handle: Option<String> },
    Subscribe { handle: Option<String> },
    Unsubscribe { confirmed: bool },
    BuyTicket,
    Reset,
    ChangeName,
    ChangeWallet,
    Status,
    Leaderboard,
    Help,
    Play(Hand),
    /// Free text, the input of a pending edit
    Text(String),
}

impl FromStr for Command {
    type Err = std::convert::Infallible;

    /// Never fails: anything unrecognised is free text.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let arg = (!rest.is_empty()).then(|| rest.to_string());

        let command = match word.trim_start_matches('/').to_lowercase().as_str() {
            "start" => Command::Start { handle: arg },
            "subscribe" => Command::Subscribe { handle: arg },
            "unsubscribe" => Command::Unsubscribe {
                confirmed: rest.eq_ignore_ascii_case("yes"),
            },
            "yes" if rest.is_empty() => Command::Unsubscribe { confirmed: true },
            "buyticket" => Command::BuyTicket,
            "reset" => Command::Reset,
            "changename" => Command::ChangeName,
            "changewallet" | "changewalletaddress" => Command::ChangeWallet,
            "status" => Command::Status,
            "leaderboard" => Command::Leaderboard,
            "help" => Command::Help,
            other => match other.parse::<Hand>() {
                Ok(hand) if rest.is_empty() => Command::Play(hand),
                _ => Command::Text(line.to_string()),
            },
        };
        Ok(command)
    }
}

/// 4 to 16 characters of latin letters, digits, dashes and spaces.
pub fn validate_name(name: &str) -> bool {
    (4..=16).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ' ')
}

/// `prefix:` followed by exactly 42 characters.
pub fn validate_wallet(wallet: &str) -> bool {
    wallet
        .split_once(':')
        .is_some_and(|(_, address)| address.len() == 42)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditKind {
    Name,
    Wallet,
}

const HELP: &str = "Rock-Paper-Scissors tournament\n\n\
Rock beats scissors, scissors beat paper and paper beats rock. Equal moves are \
settled by a coin. A move you don't make in time is picked at random.\n\
Only a first round loss is a real loss: every round you survive adds one ticket \
price to your winnings, and the final winner takes everything left in the bank.\n\
Set a wallet, otherwise your winnings stay in the bank for someone else.\n\n\
Commands:\n\
buyticket - buy a ticket\n\
reset - discard a payment request or a pending edit\n\
subscribe / unsubscribe - turn notifications on or off\n\
status - schedule, ticket price and your stats\n\
changename / changewallet - edit your profile\n\
rock / paper / scissors - make a move\n\
leaderboard - top players\n\
help - this message";

pub struct Dispatcher {
    config: TournamentConfig,
    participants: ParticipantStore,
    invoices: InvoiceStore,
    engine: Arc<TournamentEngine>,
    notifier: Arc<dyn Notifier>,
    payments: Arc<dyn PaymentProvider>,
    schedule: Schedule,
    payment_signals: SignalRegistry<()>,
    edit_signals: SignalRegistry<String>,
    last_command: Mutex<HashMap<ParticipantId, Instant>>,
}

impl Dispatcher {
    pub fn new(
        participants: ParticipantStore,
        invoices: InvoiceStore,
        engine: Arc<TournamentEngine>,
        notifier: Arc<dyn Notifier>,
        payments: Arc<dyn PaymentProvider>,
    ) -> Self {
        let config = engine.config().clone();
        let schedule = Schedule::new(config.schedule_period());
        Self {
            config,
            participants,
            invoices,
            engine,
            notifier,
            payments,
            schedule,
            payment_signals: SignalRegistry::new(),
            edit_signals: SignalRegistry::new(),
            last_command: Mutex::new(HashMap::new()),
        }
    }

    pub fn payment_watches(&self) -> usize {
        self.payment_signals.len()
    }

    pub fn edit_watches(&self) -> usize {
        self.edit_signals.len()
    }

    /// Handle one command from `id`.
    pub async fn handle(self: &Arc<Self>, id: ParticipantId, command: Command) {
        if self.throttled(id) {
            self.reply(
                id,
                &format!(
                    "Please wait a little before calling again, the timeout is {} seconds.",
                    self.config.op_timeout_secs
                ),
            )
            .await;
            return;
        }
        info!(participant = id, ?command, "command");

        let result = match command {
            Command::Start { handle } => {
                self.reply(id, HELP).await;
                self.subscribe(id, handle.as_deref()).await
            }
            Command::Subscribe { handle } => self.subscribe(id, handle.as_deref()).await,
            Command::Unsubscribe { confirmed } => self.unsubscribe(id, confirmed).await,
            Command::BuyTicket => self.buy_ticket(id).await,
            Command::Reset => self.reset(id).await,
            Command::ChangeName => self.start_edit(id, EditKind::Name).await,
            Command::ChangeWallet => self.start_edit(id, EditKind::Wallet).await,
            Command::Status => self.status(id).await,
            Command::Leaderboard => self.leaderboard(id).await,
            Command::Help => {
                self.reply(id, HELP).await;
                Ok(())
            }
            Command::Play(hand) => self.play(id, hand).await,
            Command::Text(text) => {
                if !self.edit_signals.signal(id, Signal::Deliver(text)) {
                    self.reply(id, "Unknown command, type help to see the list.")
                        .await;
                }
                Ok(())
            }
        };

        if let Err(e) = result {
            error!(participant = id, %e, "command failed");
            self.reply(id, "Something went wrong, please try again.")
                .await;
        }
    }

    fn throttled(&self, id: ParticipantId) -> bool {
        let now = Instant::now();
        let timeout = self.config.op_timeout();
        let mut last = self
            .last_command
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match last.get(&id) {
            Some(&at) if now.duration_since(at) < timeout => true,
            _ => {
                last.retain(|_, at| now.duration_since(*at) < timeout);
                last.insert(id, now);
                false
            }
        }
    }

    async fn reply(&self, id: ParticipantId, text: &str) {
        self.notifier.notify(id, text).await;
    }

    /// The participant if it exists and is subscribed, otherwise tells it to
    /// subscribe first.
    async fn subscribed(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError> {
        match self.participants.get(&id)? {
            Some(p) if p.subscribed => Ok(Some(p)),
            _ => {
                self.reply(id, "To perform this operation you need to subscribe.")
                    .await;
                Ok(None)
            }
        }
    }

    fn name_taken(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self
            .participants
            .all()?
            .iter()
            .any(|(_, p)| p.name.eq_ignore_ascii_case(name)))
    }

    /// A free `PlayerNNNN` name, or one derived from `id` once random picks
    /// keep colliding.
    fn generate_name(&self, id: ParticipantId) -> Result<String, StoreError> {
        let taken: HashSet<String> = self
            .participants
            .all()?
            .into_iter()
            .map(|(_, p)| p.name.to_lowercase())
            .collect();
        let mut rng = rand::thread_rng();
        let name = (0..NAME_ATTEMPTS)
            .map(|_| format!("Player{:04}", rng.gen_range(0..10_000)))
            .chain(std::iter::once(format!("Player{id}")))
            .chain((1u64..).map(|n| format!("Player{id}-{n}")))
            .find(|name| !taken.contains(&name.to_lowercase()))
            .unwrap_or_else(|| format!("Player{id}"));
        Ok(name)
    }

    async fn subscribe(&self, id: ParticipantId, handle: Option<&str>) -> Result<(), StoreError> {
        if let Some(existing) = self.participants.get(&id)? {
            if existing.subscribed {
                self.reply(id, "You're subscribed already.").await;
            } else {
                self.participants
                    .update(&id, &mut |p| p.subscribed = true)?;
                self.reply(id, "You're now subscribed!").await;
            }
            return Ok(());
        }

        let mut name = None;
        if let Some(handle) = handle.filter(|h| validate_name(h)) {
            if !self.name_taken(handle)? {
                name = Some(handle.to_string());
            }
        }
        let name = match name {
            Some(name) => name,
            None => self.generate_name(id)?,
        };
        let position = self.participants.len()? as u32 + 1;
        self.participants
            .put(id, Participant::new(id, &name, Utc::now(), position))?;
        info!(participant = id, %name, "registered");
        self.reply(id, &format!("You're now subscribed as *{name}*!"))
            .await;
        Ok(())
    }

    async fn unsubscribe(&self, id: ParticipantId, confirmed: bool) -> Result<(), StoreError> {
        let Some(participant) = self.participants.get(&id)?.filter(|p| p.subscribed) else {
            self.reply(id, "You're not subscribed.").await;
            return Ok(());
        };
        if participant.has_ticket && !confirmed {
            self.reply(
                id,
                "You'll lose your ticket. Are you sure you want to unsubscribe? Send *yes* to confirm.",
            )
            .await;
            return Ok(());
        }
        self.participants.update(&id, &mut |p| {
            p.subscribed = false;
            p.has_ticket = false;
        })?;
        self.reply(id, "You're now unsubscribed.").await;
        Ok(())
    }

    async fn buy_ticket(self: &Arc<Self>, id: ParticipantId) -> Result<(), StoreError> {
        let Some(participant) = self.subscribed(id).await? else {
            return Ok(());
        };
        if self.invoices.exists(&id)? || self.payment_signals.exists(id) {
            self.reply(id, "You are in process of ticket purchase already.")
                .await;
            return Ok(());
        }
        if participant.has_ticket {
            self.reply(id, "You already have one!").await;
            return Ok(());
        }

        let invoice = match self
            .payments
            .create_invoice(WalletKind::Cashbox, self.config.ticket_price)
            .await
        {
            Ok(invoice) => invoice,
            Err(e) => {
                error!(participant = id, %e, "can't create invoice");
                self.reply(
                    id,
                    "Something went wrong while processing request, please try again later.",
                )
                .await;
                return Ok(());
            }
        };
        let pending = PendingInvoice {
            reference: invoice.reference.clone(),
            address: invoice.address.clone(),
            amount: self.config.ticket_price,
            created_at: Utc::now(),
        };
        self.invoices.put(id, pending.clone())?;
        let Ok(signal) = self.payment_signals.register(id) else {
            self.reply(id, "You are in process of ticket purchase already.")
                .await;
            return Ok(());
        };
        info!(participant = id, reference = %pending.reference, "ticket invoice created");

        self.reply(id, &format!("*{}*", pending.address)).await;
        self.reply(
            id,
            &format!(
                "Now you've got *{} minutes* to pay *{}* to the address above.\n\n\
                 To discard this request type reset. It's *NOT* recommended to reset a paid request.",
                self.config.pay_time_secs / 60,
                pending.amount
            ),
        )
        .await;

        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.watch_payment(id, pending, signal).await });
        Ok(())
    }

    /// Resume the payment watch of every recorded invoice. Returns how many
    /// were resumed.
    pub async fn resume_pending(self: &Arc<Self>) -> Result<usize, StoreError> {
        let pending = self.invoices.all()?;
        let mut resumed = 0;
        for (id, invoice) in pending {
            let Ok(signal) = self.payment_signals.register(id) else {
                continue;
            };
            self.reply(
                id,
                "The service just restarted, you can continue with your payment.",
            )
            .await;
            let dispatcher = self.clone();
            tokio::spawn(async move { dispatcher.watch_payment(id, invoice, signal).await });
            resumed += 1;
        }
        info!(resumed, "pending payments resumed");
        Ok(resumed)
    }

    async fn watch_payment(
        &self,
        id: ParticipantId,
        invoice: PendingInvoice,
        mut signal: SignalReceiver<()>,
    ) {
        debug!(participant = id, reference = %invoice.reference, "watching payment");
        let watcher = Watcher::new(self.config.poll_interval(), self.config.pay_time());
        let outcome = watcher
            .watch(&mut signal, || {
                let payments = self.payments.clone();
                let reference = invoice.reference.clone();
                async move {
                    payments
                        .invoice_status(WalletKind::Cashbox, &reference)
                        .await
                        .map(|status| status == InvoiceStatus::Paid)
                }
            })
            .await;

        match outcome {
            WatchOutcome::Satisfied => {
                let granted = self
                    .participants
                    .update(&id, &mut |p| p.grant_ticket(Utc::now()));
                match granted {
                    Ok(Some(_)) => {
                        info!(participant = id, "ticket granted");
                        self.reply(id, "You've got a ticket! Type status to see the schedule.")
                            .await;
                    }
                    Ok(None) => warn!(participant = id, "paid for a ticket but is not registered"),
                    Err(e) => {
                        error!(participant = id, %e, "can't grant ticket");
                        self.reply(id, "Can't process your request, please contact the operator.")
                            .await;
                    }
                }
            }
            WatchOutcome::TimedOut => {
                self.reply(id, "Time is up, would you like to buy a ticket again?")
                    .await;
            }
            WatchOutcome::CheckFailed(e) => {
                error!(participant = id, %e, "can't check invoice");
                self.reply(id, "Can't process your request, please try again.")
                    .await;
            }
            WatchOutcome::Cancelled | WatchOutcome::Delivered(()) => {
                debug!(participant = id, "payment watch reset");
                self.payment_signals.release(&signal);
                return;
            }
        }

        self.payment_signals.release(&signal);
        if let Err(e) = self.invoices.delete(&id) {
            warn!(participant = id, %e, "can't delete invoice record");
        }
        if let Err(e) = self
            .payments
            .cancel_invoice(WalletKind::Cashbox, &invoice.reference)
            .await
        {
            debug!(participant = id, %e, "can't remove invoice");
        }
    }

    async fn reset(&self, id: ParticipantId) -> Result<(), StoreError> {
        if self.subscribed(id).await?.is_none() {
            return Ok(());
        }
        self.edit_signals.signal(id, Signal::Reset);

        let Some(invoice) = self.invoices.get(&id)? else {
            self.reply(id, "You have no transactions to reset.").await;
            return Ok(());
        };
        self.payment_signals.unregister(id);
        self.invoices.delete(&id)?;
        if let Err(e) = self
            .payments
            .cancel_invoice(WalletKind::Cashbox, &invoice.reference)
            .await
        {
            warn!(participant = id, %e, "can't cancel invoice");
        }
        info!(participant = id, reference = %invoice.reference, "payment request reset");
        self.reply(id, "Your payment request has been reset successfully.")
            .await;
        Ok(())
    }

    async fn start_edit(self: &Arc<Self>, id: ParticipantId, kind: EditKind) -> Result<(), StoreError> {
        if self.subscribed(id).await?.is_none() {
            return Ok(());
        }
        let Ok(signal) = self.edit_signals.register(id) else {
            self.reply(
                id,
                "You're already in process of modifying your data. You can reset it with reset.",
            )
            .await;
            return Ok(());
        };
        let prompt = match kind {
            EditKind::Name => "Enter new username please.",
            EditKind::Wallet => "Enter new wallet address please.",
        };
        self.reply(id, prompt).await;

        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.watch_edit(id, kind, signal).await });
        Ok(())
    }

    async fn watch_edit(&self, id: ParticipantId, kind: EditKind, mut signal: SignalReceiver<String>) {
        let watcher = Watcher::new(self.config.poll_interval(), self.config.modify_time());
        let outcome = watcher.wait_for_value(&mut signal).await;
        self.edit_signals.release(&signal);

        let value = match outcome {
            WatchOutcome::Delivered(value) if !value.is_empty() => value,
            _ => {
                self.reply(id, "Request is expired or reset.").await;
                return;
            }
        };
        let reply = match self.apply_edit(id, kind, value.trim()) {
            Ok(reply) => reply,
            Err(e) => {
                error!(participant = id, %e, "can't save profile edit");
                "Something went wrong, please try again."
            }
        };
        self.reply(id, reply).await;
    }

    fn apply_edit(&self, id: ParticipantId, kind: EditKind, value: &str) -> Result<&'static str, StoreError> {
        match kind {
            EditKind::Name => {
                if !validate_name(value) || self.name_taken(value)? {
                    return Ok("This username isn't valid or occupied by someone else, try to change something.");
                }
                self.participants
                    .update(&id, &mut |p| p.name = value.to_string())?;
                Ok("Username set successfully!")
            }
            EditKind::Wallet => {
                if !validate_wallet(value) {
                    return Ok("This wallet isn't valid, try to change something.");
                }
                self.participants
                    .update(&id, &mut |p| p.payout_address = Some(value.to_string()))?;
                Ok("Wallet set successfully!")
            }
        }
    }

    async fn play(&self, id: ParticipantId, hand: Hand) -> Result<(), StoreError> {
        let round = match (self.engine.stage()?, self.engine.current_round()) {
            (TournamentStage::Running, Some(round)) => round,
            _ => {
                self.reply(id, "There is no game in progress. Type status to see the schedule.")
                    .await;
                return Ok(());
            }
        };
        match self.participants.get(&id)? {
            Some(p) if p.in_tournament => {}
            _ => {
                self.reply(id, "You're not playing in this tournament.").await;
                return Ok(());
            }
        }

        let mut rejected = None;
        let updated = self.participants.update(&id, &mut |p| {
            rejected = p.moves.submit(round, hand).err();
        })?;
        let reply = match (rejected, updated) {
            (Some(e), _) => {
                debug!(participant = id, %e, "move rejected");
                "This round is already resolved, wait for the next one.".to_string()
            }
            (None, Some(p)) => format!("Your moves for now: {}", p.moves.render()),
            (None, None) => "You're not playing in this tournament.".to_string(),
        };
        self.reply(id, &reply).await;
        Ok(())
    }

    async fn status(&self, id: ParticipantId) -> Result<(), StoreError> {
        let Some(p) = self.subscribed(id).await? else {
            return Ok(());
        };
        let total = self.participants.len()?;
        let next = self.schedule.next_after(Utc::now());
        let mut text = format!("_{}_ ({})\n", p.name, p.id);
        text.push_str(&format!("\nTicket price: *{}*", self.config.ticket_price));
        text.push_str(&format!(
            "\nNext game launch: *{}*",
            next.format("%a, %d %b %Y %H:%M:%S UTC")
        ));
        if let Some(round) = self.engine.current_round() {
            text.push_str(&format!("\nA tournament is running, round *{round}*"));
        }
        text.push_str(if p.has_ticket {
            "\nYou *have* a ticket"
        } else {
            "\nYou *have no* ticket"
        });
        text.push_str(&format!(
            "\nYour wallet address: *{}*",
            p.payout_address.as_deref().unwrap_or("not set")
        ));
        text.push_str(&format!("\nYour total won amount: *{}*", p.total_winnings));
        text.push_str(&format!(
            "\nYour position in the leaderboard is *{}* of *{}*",
            p.leaderboard_position, total
        ));
        self.reply(id, &text).await;
        Ok(())
    }

    async fn leaderboard(&self, id: ParticipantId) -> Result<(), StoreError> {
        if !self.participants.exists(&id)? {
            self.reply(id, "To perform this operation you need to subscribe.")
                .await;
            return Ok(());
        }
        let standings = self.engine.standings()?;
        self.reply(id, &leaderboard::render(&standings, LEADERBOARD_SIZE))
            .await;
        Ok(())
    }
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod commands_tests;
