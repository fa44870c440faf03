//! Tournament engine: bracket formation, the round loop, payouts and crash
//! recovery.
//!
//! The persisted [`TournamentStage`] is the only durable marker of progress.
//! Participants of the bracket carry `in_tournament`, the bank pool is kept
//! under [`POOL_KEY`], and together these are enough to resume a run after a
//! restart.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rps_core::{
    KeyValueStore, Participant, ParticipantId, Sats, StoreError, TournamentStage, STAGE_KEY,
};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::bracket::Bracket;
use crate::config::TournamentConfig;
use crate::error::TournamentError;
use crate::leaderboard::{self, Standing};
use crate::ports::{notify_many, Notifier, PaymentProvider, WalletKind};
use crate::report::RunReport;
use crate::round::{RoundExecutor, RoundOutcome};

/// Flag key of the remaining bank pool of the running tournament.
pub const POOL_KEY: &str = "pool";
/// Flag key of credited winnings that could not be paid out.
pub const HELD_KEY: &str = "held";

pub type ParticipantStore = Arc<dyn KeyValueStore<ParticipantId, Participant>>;
pub type FlagStore = Arc<dyn KeyValueStore<String, String>>;

/// How a trigger or a restore ended. Policy outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunSummary {
    /// Another run is in progress or the stage is not Idle
    Busy,
    /// Fewer than two ticket holders
    NotEnoughPlayers(usize),
    /// Nothing to resume
    NothingToRestore,
    Finished {
        champion: Option<ParticipantId>,
        rounds: u32,
    },
}

enum Preparation {
    Ready(Bracket, RunReport),
    TooFew(usize),
}

pub struct TournamentEngine {
    config: TournamentConfig,
    participants: ParticipantStore,
    flags: FlagStore,
    notifier: Arc<dyn Notifier>,
    payments: Arc<dyn PaymentProvider>,
    executor: Arc<RoundExecutor>,
    rng: Mutex<StdRng>,
    run_lock: tokio::sync::Mutex<()>,
    round: AtomicU32,
    report_path: Option<PathBuf>,
    last_report: Mutex<Option<RunReport>>,
}

impl TournamentEngine {
    pub fn new(
        config: TournamentConfig,
        participants: ParticipantStore,
        flags: FlagStore,
        notifier: Arc<dyn Notifier>,
        payments: Arc<dyn PaymentProvider>,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let executor = Arc::new(RoundExecutor::new(
            participants.clone(),
            notifier.clone(),
            config.decision_window(),
        ));
        Self {
            config,
            participants,
            flags,
            notifier,
            payments,
            executor,
            rng: Mutex::new(rng),
            run_lock: tokio::sync::Mutex::new(()),
            round: AtomicU32::new(0),
            report_path: None,
            last_report: Mutex::new(None),
        }
    }

    /// Also write every finished run to `path` as JSON.
    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    pub fn config(&self) -> &TournamentConfig {
        &self.config
    }

    pub fn stage(&self) -> Result<TournamentStage, StoreError> {
        match self.flags.get(&STAGE_KEY.to_string())? {
            Some(value) => value.parse(),
            None => Ok(TournamentStage::Idle),
        }
    }

    fn set_stage(&self, stage: TournamentStage) -> Result<(), StoreError> {
        debug!(%stage, "stage");
        self.flags
            .put(STAGE_KEY.to_string(), stage.as_str().to_string())
    }

    /// Round that moves are currently accepted for, while a tournament runs.
    pub fn current_round(&self) -> Option<u32> {
        match self.round.load(Ordering::SeqCst) {
            0 => None,
            round => Some(round),
        }
    }

    /// Whether a run or a restore holds the engine.
    pub fn is_busy(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    pub fn last_report(&self) -> Option<RunReport> {
        self.last_report
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pool(&self) -> Result<Sats, StoreError> {
        self.read_amount(POOL_KEY)
    }

    fn read_amount(&self, key: &str) -> Result<Sats, StoreError> {
        match self.flags.get(&key.to_string())? {
            Some(value) => value.parse().map_err(|_| StoreError::Corrupt {
                key: key.to_string(),
                value,
            }),
            None => Ok(0),
        }
    }

    fn set_pool(&self, pool: Sats) -> Result<(), StoreError> {
        self.flags.put(POOL_KEY.to_string(), pool.to_string())
    }

    /// Start a tournament now.
    ///
    /// Suppressed while another run or a restore holds the engine. A stage
    /// left behind by an interrupted run is handled first: a stale
    /// preparation is rolled back before a new one starts, a paid bracket
    /// (Ready or Running) is resumed instead of starting a new run.
    pub async fn trigger(&self) -> Result<RunSummary, TournamentError> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            info!("trigger suppressed, a run is in progress");
            return Ok(RunSummary::Busy);
        };
        match self.stage()? {
            TournamentStage::Idle => {}
            TournamentStage::Preparing => self.roll_back_preparation()?,
            stage @ (TournamentStage::Ready | TournamentStage::Running) => {
                warn!(%stage, "resuming an interrupted tournament");
                return self.guarded(self.resume(stage)).await;
            }
        }

        let (bracket, report) = match self.prepare().await? {
            Preparation::Ready(bracket, report) => (bracket, report),
            Preparation::TooFew(n) => return Ok(RunSummary::NotEnoughPlayers(n)),
        };
        self.guarded(self.run(bracket, report)).await
    }

    /// Await a run of a paid bracket. A failed run is left marked in flight
    /// so the next trigger or restart resumes it.
    async fn guarded(
        &self,
        run: impl Future<Output = Result<RunSummary, TournamentError>>,
    ) -> Result<RunSummary, TournamentError> {
        let result = run.await;
        if let Err(e) = &result {
            self.suspend(e).await;
        }
        result
    }

    async fn suspend(&self, cause: &TournamentError) {
        self.round.store(0, Ordering::SeqCst);
        error!(%cause, "tournament interrupted, it resumes with the next launch");
        match self.stage() {
            Ok(TournamentStage::Idle) => return,
            Ok(TournamentStage::Running) => {}
            _ => {
                if let Err(e) = self.set_stage(TournamentStage::Running) {
                    error!(%e, "can't mark the tournament for resumption");
                }
            }
        }
        match self.in_tournament() {
            Ok(ids) => {
                notify_many(
                    self.notifier.as_ref(),
                    &ids,
                    "The tournament was interrupted by a technical problem, it continues with the next launch.",
                )
                .await
            }
            Err(e) => warn!(%e, "can't notify the bracket about the interruption"),
        }
    }

    /// Idle → Preparing: collect ticket holders, cut the bracket, reset the
    /// bracket members and sweep their tickets into the bank. Any failure
    /// before the sweep completes skips this cycle and keeps the tickets.
    async fn prepare(&self) -> Result<Preparation, TournamentError> {
        self.set_stage(TournamentStage::Preparing)?;

        let ids = match self.eligible() {
            Ok(ids) => ids,
            Err(e) => {
                error!(%e, "can't collect ticket holders, tournament skipped");
                self.skip_cycle(&[], "a technical problem").await;
                return Err(e.into());
            }
        };

        if ids.len() < 2 {
            info!(eligible = ids.len(), "not enough players");
            self.set_stage(TournamentStage::Idle)?;
            notify_many(
                self.notifier.as_ref(),
                &ids,
                "Not enough players for the tournament, your ticket stays valid for the next one.",
            )
            .await;
            return Ok(Preparation::TooFew(ids.len()));
        }

        let (bracket, deferred) = Bracket::align(ids, self.config.capacity);
        notify_many(
            self.notifier.as_ref(),
            &deferred,
            "The bracket is full, your ticket stays valid for the next tournament.",
        )
        .await;

        let pool = bracket.len() as Sats * self.config.ticket_price;
        let entered = self
            .participants
            .batch_update(bracket.players(), &mut |p| p.enter_bracket())
            .and_then(|_| self.set_pool(pool));
        if let Err(e) = entered {
            error!(%e, "can't reset bracket participants, tournament skipped");
            self.skip_cycle(bracket.players(), "a technical problem").await;
            return Err(TournamentError::Aborted(format!("bracket reset failed: {e}")));
        }

        if let Err(e) = self.sweep(pool).await {
            error!(%e, pool, "can't sweep tickets into the bank, tournament skipped");
            self.skip_cycle(bracket.players(), "a payment problem").await;
            return Err(TournamentError::Aborted(format!("sweep failed: {e}")));
        }

        info!(players = bracket.len(), deferred = deferred.len(), pool, "bracket paid");
        let report = RunReport::new(bracket.players().to_vec(), deferred, pool);
        Ok(Preparation::Ready(bracket, report))
    }

    /// Ticket holders ordered by ticket purchase, then id.
    fn eligible(&self) -> Result<Vec<ParticipantId>, StoreError> {
        let mut eligible: Vec<Participant> = self
            .participants
            .all()?
            .into_iter()
            .map(|(_, p)| p)
            .filter(|p| p.has_ticket)
            .collect();
        eligible.sort_by(|a, b| {
            a.last_ticket_at
                .cmp(&b.last_ticket_at)
                .then(a.id.cmp(&b.id))
        });
        Ok(eligible.iter().map(|p| p.id).collect())
    }

    /// Best-effort return to Idle after a failed preparation. A stage that
    /// can't be reset stays Preparing and is rolled back by the next trigger.
    async fn skip_cycle(&self, ids: &[ParticipantId], reason: &str) {
        if let Err(e) = self.rollback_bracket(ids) {
            error!(%e, "can't roll back bracket participants");
        }
        if let Err(e) = self.flags.delete(&POOL_KEY.to_string()) {
            warn!(%e, "can't clear the pool");
        }
        if let Err(e) = self.set_stage(TournamentStage::Idle) {
            error!(%e, "can't reset the stage");
        }
        notify_many(
            self.notifier.as_ref(),
            ids,
            &format!("The tournament was skipped because of {reason}, your ticket stays valid."),
        )
        .await;
    }

    /// Move `pool` from the cashbox to the bank.
    async fn sweep(&self, pool: Sats) -> Result<(), TournamentError> {
        let invoice = self
            .payments
            .create_invoice(WalletKind::Bank, pool)
            .await?;
        if let Err(e) = self
            .payments
            .pay(WalletKind::Cashbox, &invoice.address, pool)
            .await
        {
            if let Err(cancel) = self
                .payments
                .cancel_invoice(WalletKind::Bank, &invoice.reference)
                .await
            {
                warn!(%cancel, "can't cancel bank invoice");
            }
            return Err(e.into());
        }
        if let Err(e) = self.payments.sweep_invoices(WalletKind::Bank).await {
            warn!(%e, "can't sweep bank invoices");
        }
        Ok(())
    }

    fn rollback_bracket(&self, ids: &[ParticipantId]) -> Result<(), StoreError> {
        self.participants.batch_update(ids, &mut |p| {
            p.in_tournament = false;
            p.moves.clear();
        })?;
        Ok(())
    }

    fn roll_back_preparation(&self) -> Result<(), StoreError> {
        let ids = self.in_tournament()?;
        warn!(participants = ids.len(), "rolling back an interrupted preparation");
        self.rollback_bracket(&ids)?;
        self.flags.delete(&POOL_KEY.to_string())?;
        self.set_stage(TournamentStage::Idle)
    }

    /// Ready → Running → Idle for a freshly paid bracket.
    async fn run(
        &self,
        bracket: Bracket,
        mut report: RunReport,
    ) -> Result<RunSummary, TournamentError> {
        self.set_stage(TournamentStage::Ready)?;
        notify_many(
            self.notifier.as_ref(),
            bracket.players(),
            &format!(
                "You are in! {} players, the tournament starts in {} seconds.",
                bracket.len(),
                self.config.ready_delay_secs
            ),
        )
        .await;

        tokio::time::sleep(self.config.ready_delay()).await;
        self.set_stage(TournamentStage::Running)?;
        info!(players = bracket.len(), "tournament running");

        let rounds = self.run_rounds(bracket, 1, &mut report).await?;
        self.finish(report, rounds).await
    }

    /// Play rounds until one participant remains. Returns the number of
    /// rounds played.
    async fn run_rounds(
        &self,
        mut bracket: Bracket,
        first_round: u32,
        report: &mut RunReport,
    ) -> Result<u32, TournamentError> {
        let mut round = first_round;
        let mut played = 0;
        let mut pool = self.pool()?;

        while bracket.len() > 1 {
            self.round.store(round, Ordering::SeqCst);
            tokio::time::sleep(self.config.round_pause()).await;

            let (pairs, seeds) = {
                let mut rng = self.rng();
                bracket.shuffle(&mut *rng);
                let pairs = bracket.pairs();
                let seeds: Vec<u64> = pairs.iter().map(|_| rng.gen()).collect();
                (pairs, seeds)
            };
            info!(round, pairs = pairs.len(), "round started");

            let mut tasks = JoinSet::new();
            for (idx, (&(a, b), seed)) in pairs.iter().zip(seeds).enumerate() {
                let executor = self.executor.clone();
                tasks.spawn(async move {
                    let outcome = executor
                        .play(round, a, b, StdRng::seed_from_u64(seed))
                        .await;
                    (idx, outcome)
                });
            }

            let mut outcomes: Vec<Option<RoundOutcome>> = vec![None; pairs.len()];
            let mut failure = None;
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((idx, Ok(outcome))) => outcomes[idx] = Some(outcome),
                    Ok((idx, Err(e))) => {
                        error!(round, pair = idx, %e, "round failed");
                        failure = Some(e);
                    }
                    Err(e) => {
                        error!(round, %e, "round task panicked");
                        failure = Some(TournamentError::Aborted(format!("round task: {e}")));
                    }
                }
            }
            if let Some(e) = failure {
                return Err(e);
            }
            let outcomes: Vec<RoundOutcome> = outcomes.into_iter().flatten().collect();

            for outcome in &outcomes {
                if let Some(loser) = outcome.loser {
                    bracket.remove(loser);
                    let credited = self.eliminate(loser, round, report).await?;
                    pool = pool.saturating_sub(credited);
                }
            }
            self.set_pool(pool)?;

            for outcome in &outcomes {
                if bracket.len() == 1 {
                    self.crown(outcome.winner, round, report).await?;
                } else {
                    self.advance(outcome.winner, round).await?;
                }
            }

            self.participants
                .batch_update(bracket.players(), &mut |p| {
                    p.moves.seal_open();
                })?;
            report.add_round(round, &outcomes);
            played += 1;
            round += 1;
        }

        Ok(played)
    }

    async fn advance(&self, id: ParticipantId, round: u32) -> Result<(), TournamentError> {
        let price = self.config.ticket_price;
        let updated = self.participants.update(&id, &mut |p| {
            p.last_winnings += price;
        })?;
        if let Some(p) = updated {
            self.notifier
                .notify(
                    id,
                    &format!(
                        "You won round {round}! Your winnings so far: {}",
                        p.last_winnings
                    ),
                )
                .await;
        }
        Ok(())
    }

    /// Credit a participant leaving the bracket its accumulated winnings,
    /// pay them out if possible and consume its ticket. Returns the credited
    /// amount, which leaves the pool whether it was paid or held.
    async fn eliminate(
        &self,
        id: ParticipantId,
        round: u32,
        report: &mut RunReport,
    ) -> Result<Sats, TournamentError> {
        let Some(participant) = self.participants.get(&id)? else {
            warn!(participant = id, "eliminated participant is gone");
            return Ok(0);
        };
        let owed = participant.last_winnings;
        let paid = self
            .pay_out(id, participant.payout_address.as_deref(), owed)
            .await;

        self.participants.update(&id, &mut |p| {
            p.leave_tournament();
            p.total_winnings += owed;
        })?;
        self.record_payout(report, id, round, owed, paid)?;

        let text = if paid > 0 {
            format!("You are out after round {round}. {paid} was sent to your wallet.")
        } else if owed > 0 {
            format!("You are out after round {round}. Your winnings of {owed} are held in the bank, set a wallet and contact the operator.")
        } else {
            format!("You are out after round {round}. Better luck next time!")
        };
        self.notifier.notify(id, &text).await;
        info!(participant = id, round, owed, paid, "eliminated");
        Ok(owed)
    }

    /// The last participant standing is credited everything left in the pool.
    async fn crown(
        &self,
        id: ParticipantId,
        round: u32,
        report: &mut RunReport,
    ) -> Result<(), TournamentError> {
        let pool = self.pool()?;
        let address = self
            .participants
            .get(&id)?
            .and_then(|p| p.payout_address);
        let paid = self.pay_out(id, address.as_deref(), pool).await;

        self.participants.update(&id, &mut |p| {
            p.last_winnings = pool;
            p.total_winnings += pool;
            p.leave_tournament();
        })?;
        self.record_payout(report, id, round, pool, paid)?;
        self.set_pool(0)?;
        report.champion = Some(id);

        let text = if paid > 0 {
            format!("You won the tournament! {paid} was sent to your wallet.")
        } else {
            format!("You won the tournament! Your prize of {pool} is held in the bank, set a wallet and contact the operator.")
        };
        self.notifier.notify(id, &text).await;
        info!(participant = id, pool, paid, "champion");
        Ok(())
    }

    /// Send `amount` from the bank. Returns what was sent, 0 when the
    /// winnings stay held.
    async fn pay_out(&self, id: ParticipantId, address: Option<&str>, amount: Sats) -> Sats {
        if amount == 0 {
            return 0;
        }
        let Some(address) = address else {
            warn!(participant = id, amount, "no payout address, winnings held in the bank");
            return 0;
        };
        match self.payments.pay(WalletKind::Bank, address, amount).await {
            Ok(sent) => sent,
            Err(e) => {
                error!(participant = id, amount, %e, "payout failed, winnings held in the bank");
                0
            }
        }
    }

    fn record_payout(
        &self,
        report: &mut RunReport,
        id: ParticipantId,
        round: u32,
        credited: Sats,
        paid: Sats,
    ) -> Result<(), StoreError> {
        if paid > 0 {
            report.add_payout(id, round, paid);
        }
        let held = credited.saturating_sub(paid);
        if held > 0 {
            report.add_held(id, round, held);
            let total = self.held()? + held;
            self.flags.put(HELD_KEY.to_string(), total.to_string())?;
        }
        Ok(())
    }

    /// Credited winnings kept in the bank across all runs.
    pub fn held(&self) -> Result<Sats, StoreError> {
        self.read_amount(HELD_KEY)
    }

    /// Running → Idle: clear every tournament flag, rebuild the leaderboard
    /// and record the run.
    async fn finish(
        &self,
        mut report: RunReport,
        rounds: u32,
    ) -> Result<RunSummary, TournamentError> {
        let leftovers: Vec<ParticipantId> = self
            .participants
            .all()?
            .into_iter()
            .filter(|(_, p)| p.in_tournament)
            .map(|(id, _)| id)
            .collect();
        self.participants
            .batch_update(&leftovers, &mut |p| p.leave_tournament())?;

        self.round.store(0, Ordering::SeqCst);
        self.flags.delete(&POOL_KEY.to_string())?;
        self.set_stage(TournamentStage::Idle)?;
        leaderboard::rebuild(self.participants.as_ref())?;

        report.finished_at = Some(chrono::Utc::now());
        info!("\n{}", report.generate_report());
        if let Some(path) = &self.report_path {
            if let Err(e) = report.save(path) {
                warn!(%e, "can't save run report");
            }
        }
        let champion = report.champion;
        *self.last_report.lock().unwrap_or_else(|e| e.into_inner()) = Some(report);

        info!(?champion, rounds, "tournament finished");
        Ok(RunSummary::Finished { champion, rounds })
    }

    /// Resume an interrupted tournament after a restart.
    ///
    /// A persisted Preparing stage is rolled back. Ready or Running resume
    /// the paid bracket.
    pub async fn restore(&self) -> Result<RunSummary, TournamentError> {
        let _guard = self.run_lock.lock().await;
        match self.stage()? {
            TournamentStage::Idle => Ok(RunSummary::NothingToRestore),
            TournamentStage::Preparing => {
                self.roll_back_preparation()?;
                Ok(RunSummary::NothingToRestore)
            }
            stage => self.guarded(self.resume(stage)).await,
        }
    }

    /// Rebuild the bracket from the `in_tournament` flags, pay out and
    /// release participants beyond the largest power of two, and continue
    /// from the round after the last resolved one.
    async fn resume(&self, stage: TournamentStage) -> Result<RunSummary, TournamentError> {
        let mut survivors: Vec<Participant> = self
            .participants
            .all()?
            .into_iter()
            .map(|(_, p)| p)
            .filter(|p| p.in_tournament)
            .collect();
        survivors.sort_by(|a, b| {
            a.last_ticket_at
                .cmp(&b.last_ticket_at)
                .then(a.id.cmp(&b.id))
        });
        let last_round = survivors
            .iter()
            .filter_map(|p| p.moves.records().iter().rev().find(|r| !r.state.is_open()))
            .map(|r| r.round)
            .max()
            .unwrap_or(0);
        let next_round = last_round + 1;
        let ids: Vec<ParticipantId> = survivors.iter().map(|p| p.id).collect();
        self.participants.batch_update(&ids, &mut |p| {
            p.moves.discard_open();
        })?;

        let pool = self.pool()?;
        let (bracket, excess) = Bracket::align(ids, self.config.capacity);
        info!(
            %stage,
            survivors = bracket.len(),
            excess = excess.len(),
            next_round,
            pool,
            "restoring tournament"
        );

        let mut report = RunReport::new(bracket.players().to_vec(), Vec::new(), pool);
        report.restored = true;

        let mut remaining = pool;
        for &id in &excess {
            let credited = self.eliminate(id, last_round, &mut report).await?;
            remaining = remaining.saturating_sub(credited);
        }
        self.set_pool(remaining)?;

        notify_many(
            self.notifier.as_ref(),
            bracket.players(),
            "The tournament continues after a restart.",
        )
        .await;
        self.set_stage(TournamentStage::Running)?;

        let rounds = match bracket.players() {
            [] => 0,
            [champion] => {
                self.crown(*champion, last_round, &mut report).await?;
                0
            }
            _ => self.run_rounds(bracket, next_round, &mut report).await?,
        };
        self.finish(report, rounds).await
    }

    fn in_tournament(&self) -> Result<Vec<ParticipantId>, StoreError> {
        Ok(self
            .participants
            .all()?
            .into_iter()
            .filter(|(_, p)| p.in_tournament)
            .map(|(id, _)| id)
            .collect())
    }

    /// Current standings, recomputed from the store.
    pub fn standings(&self) -> Result<Vec<Standing>, StoreError> {
        let participants: Vec<Participant> = self
            .participants
            .all()?
            .into_iter()
            .map(|(_, p)| p)
            .collect();
        Ok(leaderboard::rank(&participants))
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod engine_tests;
