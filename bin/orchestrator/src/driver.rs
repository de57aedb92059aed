//! The withdrawal state machine.
//!
//! One [`Orchestrator`] owns every status transition. Triggers (a new L2 hash,
//! a user action, a store notification, a timer tick) are fed to it as calls or
//! [`Trigger`] messages; it reads the record, runs the step its status calls
//! for and writes the result back with the status it started from as the
//! expected one, so a continuation that lost a race is dropped instead of
//! applied.

use crate::{
    bridge::{Bridge, InitiateRequest},
    error::{classify, user_message, ErrorKind, INSUFFICIENT_GAS, TX_REVERTED},
    inflight::{InFlight, Step},
    metrics::Metrics,
};
use action::{
    finalize::challenge_remaining,
    resolve::{GameStatus, ResolutionPlan},
};
use alloy_primitives::{utils::format_ether, Address, TxHash, U256};
use record::{
    now_ms, RecordKind, RecordMeta, RecordPatch, RecordStore, StoreError, StoreEvent, TxKind,
    WithdrawalRecord, WithdrawalStatus,
};
use std::{
    collections::BTreeMap,
    fmt,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    time::MissedTickBehavior,
};
use tracing::{debug, error, info, warn};
use withdrawal::WithdrawalError;

const CHALLENGER_WON: &str = "Dispute game resolved in favor of the challenger";

/// What a step did to its record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The record moved and now sits in this status.
    Advanced(WithdrawalStatus),
    /// Nothing to do in the record's current status.
    Skipped,
    /// The same step is already running for this record.
    Busy,
    /// The challenge window is still open.
    NotReady { remaining: Duration },
    /// The gas account holds `shortfall` wei less than the configured minimum.
    InsufficientGas { shortfall: U256 },
    /// The wallet refused to sign. The record is back in its ready status.
    Rejected,
    Failed(String),
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advanced(status) => write!(f, "advanced to {status}"),
            Self::Skipped => f.write_str("nothing to do"),
            Self::Busy => f.write_str("already running"),
            Self::NotReady { remaining } => {
                write!(f, "challenge window open for {}s", remaining.as_secs())
            }
            Self::InsufficientGas { shortfall } => {
                write!(f, "{INSUFFICIENT_GAS}, {} ETH short", format_ether(*shortfall))
            }
            Self::Rejected => f.write_str("signature rejected"),
            Self::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

/// Message fed to [`Orchestrator::run`].
#[derive(Debug, Clone)]
pub enum Trigger {
    /// An L2 withdrawal hash was observed.
    Track { l2_tx_hash: TxHash, meta: RecordMeta },
    /// Re-enter the pipeline for a record, retrying a held proof generation.
    Advance(String),
    /// The user clicked one of the four action buttons.
    Act { id: String, kind: TxKind },
}

pub struct Orchestrator<B> {
    store: Arc<RecordStore>,
    bridge: B,
    inflight: InFlight,
    /// Only this account's records are resumed
    owner: Address,
    auto_advance: bool,
    metrics: Metrics,
    /// Records waiting for the user to trigger their next signed step.
    armed: Mutex<BTreeMap<String, TxKind>>,
}

impl<B: Bridge + 'static> Orchestrator<B> {
    pub fn new(store: Arc<RecordStore>, bridge: B, owner: Address) -> Self {
        Self {
            store,
            bridge,
            inflight: InFlight::new(),
            owner,
            auto_advance: false,
            metrics: Metrics::new(),
            armed: Mutex::new(BTreeMap::new()),
        }
    }

    /// Fire signed steps as soon as their record is ready.
    pub const fn with_auto_advance(mut self, auto_advance: bool) -> Self {
        self.auto_advance = auto_advance;
        self
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub const fn bridge(&self) -> &B {
        &self.bridge
    }

    /// Records whose next signed step the user may trigger, with that step.
    pub fn armed(&self) -> Vec<(String, TxKind)> {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, kind)| (id.clone(), *kind))
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Entry points
    // ─────────────────────────────────────────────────────────────────────────────

    /// Start tracking the withdrawal initiated by `l2_tx_hash`.
    ///
    /// Tracking a hash twice returns the existing record.
    pub fn track(&self, l2_tx_hash: TxHash, meta: RecordMeta) -> eyre::Result<WithdrawalRecord> {
        match self.store.create(WithdrawalRecord::new(l2_tx_hash, meta)) {
            Ok(record) => {
                info!(id = %record.id, "Tracking withdrawal");
                Ok(record)
            }
            Err(StoreError::AlreadyExists(id)) => self
                .store
                .get_by_id(&id)
                .ok_or_else(|| eyre::eyre!("Record {id} disappeared while tracking")),
            Err(e) => Err(e.into()),
        }
    }

    /// Initiate a withdrawal on L2 and track it.
    ///
    /// A placeholder record exists while the wallet prompt is open. It is
    /// replaced by the real record once the hash is known, and deleted if the
    /// user rejects or sending fails.
    pub async fn initiate(&self, request: &InitiateRequest) -> eyre::Result<WithdrawalRecord> {
        let meta = RecordMeta {
            kind: RecordKind::Withdrawal,
            amount: format_ether(request.value),
            token: "ETH".to_string(),
            from_address: self.owner,
        };
        let placeholder = self.store.create_placeholder(meta)?;

        match self.bridge.initiate(request).await {
            Ok(l2_tx_hash) => {
                let record = self.store.replace_placeholder(&placeholder.id, l2_tx_hash)?;
                info!(id = %record.id, value = %request.value, "Withdrawal initiated");
                self.metrics.record_withdrawal_initiated();
                Ok(record)
            }
            Err(e) => {
                if let Err(err) = self.store.delete(&placeholder.id) {
                    warn!(id = %placeholder.id, error = %err, "Failed to drop placeholder");
                }
                if classify(&e) == ErrorKind::UserRejected {
                    info!("Withdrawal signature rejected");
                }
                Err(e)
            }
        }
    }

    /// Import untracked, unfinalized withdrawals the owner initiated since `from_block`.
    pub async fn discover(&self, from_block: u64) -> eyre::Result<Vec<WithdrawalRecord>> {
        let found = self.bridge.scan_initiated(from_block, self.owner).await?;
        let mut imported = Vec::new();

        for initiated in found {
            let hash = initiated.details.withdrawal_hash;
            let id = initiated.l2_tx_hash.to_string();
            if self.store.get_by_id(&id).is_some()
                || self.store.find_by_withdrawal_hash(hash).is_some()
            {
                continue;
            }
            if self.bridge.is_finalized(hash).await? {
                debug!(withdrawal_hash = %hash, "Skipping finalized withdrawal");
                continue;
            }

            let meta = RecordMeta {
                kind: RecordKind::Withdrawal,
                amount: format_ether(initiated.details.value),
                token: "ETH".to_string(),
                from_address: initiated.details.sender,
            };
            let record = self
                .store
                .create(WithdrawalRecord::new(initiated.l2_tx_hash, meta))?;
            let patch = RecordPatch::status(WithdrawalStatus::L2Confirmed)
                .expecting(WithdrawalStatus::Pending)
                .details(initiated.details)
                .l2_block(initiated.l2_block);
            let record = match self.apply(&record.id, patch)? {
                Some(updated) => updated,
                None => record,
            };

            info!(id = %record.id, withdrawal_hash = %hash, "Imported withdrawal");
            imported.push(record);
        }

        Ok(imported)
    }

    /// Re-enter the pipeline for one record, retrying a held proof generation.
    pub async fn advance(&self, id: &str) -> eyre::Result<StepOutcome> {
        self.drive(id, true).await
    }

    pub async fn prove(&self, id: &str) -> eyre::Result<StepOutcome> {
        self.signed_step(id, TxKind::Proof).await
    }

    pub async fn resolve_claims(&self, id: &str) -> eyre::Result<StepOutcome> {
        self.signed_step(id, TxKind::ResolveClaims).await
    }

    pub async fn resolve_game(&self, id: &str) -> eyre::Result<StepOutcome> {
        self.signed_step(id, TxKind::ResolveGame).await
    }

    pub async fn finalize(&self, id: &str) -> eyre::Result<StepOutcome> {
        self.signed_step(id, TxKind::Finalize).await
    }

    /// Active records of the owner.
    pub fn resumable(&self) -> Vec<WithdrawalRecord> {
        self.store
            .list_active()
            .into_iter()
            .filter(|r| r.from_address == self.owner)
            .collect()
    }

    /// Drive every resumable record once, oldest first.
    pub async fn resume(&self) -> usize {
        let records = self.resumable();
        for record in &records {
            match self.drive(&record.id, false).await {
                Ok(outcome) => debug!(id = %record.id, %outcome, "Resumed withdrawal"),
                Err(e) => error!(id = %record.id, error = %e, "Failed to resume withdrawal"),
            }
        }
        records.len()
    }

    /// Housekeeping run on every timer tick.
    ///
    /// Picks up writes from other processes and clears a stale insufficient
    /// gas message once the balance recovered.
    pub async fn tick(&self) {
        self.store.sync_external();

        let starved: Vec<_> = self
            .resumable()
            .into_iter()
            .filter(|r| r.error_message.as_deref() == Some(INSUFFICIENT_GAS))
            .collect();
        if !starved.is_empty() {
            match self.bridge.gas_check().await {
                Ok(check) if check.is_sufficient() => {
                    for record in starved {
                        let patch = RecordPatch {
                            expect: Some(record.status),
                            ..Default::default()
                        }
                        .clear_error();
                        if let Err(e) = self.apply(&record.id, patch) {
                            warn!(id = %record.id, error = %e, "Failed to clear gas message");
                        }
                    }
                    info!(%check, "Settlement balance recovered");
                }
                Ok(check) => debug!(%check, "Settlement balance still insufficient"),
                Err(e) => warn!(error = %e, "Gas check failed"),
            }
        }

        for status in WithdrawalStatus::ALL {
            self.metrics
                .set_withdrawals(status, self.store.list_by_status(status).len());
        }
    }

    /// Serve triggers until `shutdown` completes.
    ///
    /// Every resumable record is re-entered on start, after a reload and on
    /// each tick. The per-step tokens make the repeated entries harmless.
    pub async fn run(
        self: Arc<Self>,
        mut triggers: mpsc::Receiver<Trigger>,
        tick: Duration,
        shutdown: impl Future<Output = ()>,
    ) -> eyre::Result<()> {
        let mut events = self.store.subscribe();
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(owner = %self.owner, auto_advance = self.auto_advance, "Orchestrator running");
        self.spawn_resume();

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutting down orchestrator");
                    break;
                }
                Some(trigger) = triggers.recv() => self.handle(trigger),
                event = events.recv() => match event {
                    Ok(StoreEvent::Created(id)) => self.spawn_drive(id, false),
                    Ok(StoreEvent::Reloaded) | Err(RecvError::Lagged(_)) => self.spawn_resume(),
                    Ok(_) => {}
                    Err(RecvError::Closed) => break,
                },
                _ = ticker.tick() => {
                    self.tick().await;
                    self.spawn_resume();
                }
            }
        }

        Ok(())
    }

    fn handle(self: &Arc<Self>, trigger: Trigger) {
        match trigger {
            Trigger::Track { l2_tx_hash, meta } => {
                // The Created notification starts the pipeline.
                if let Err(e) = self.track(l2_tx_hash, meta) {
                    error!(l2_tx_hash = %l2_tx_hash, error = %e, "Failed to track withdrawal");
                }
            }
            Trigger::Advance(id) => self.spawn_drive(id, true),
            Trigger::Act { id, kind } => {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    match this.signed_step(&id, kind).await {
                        Ok(outcome) => info!(id = %id, step = kind.name(), %outcome, "Action handled"),
                        Err(e) => error!(id = %id, step = kind.name(), error = %e, "Action failed"),
                    }
                });
            }
        }
    }

    fn spawn_drive(self: &Arc<Self>, id: String, explicit: bool) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            match this.drive(&id, explicit).await {
                Ok(outcome) => debug!(id = %id, %outcome, "Drive finished"),
                Err(e) => error!(id = %id, error = %e, "Drive failed"),
            }
        });
    }

    fn spawn_resume(self: &Arc<Self>) {
        for record in self.resumable() {
            self.spawn_drive(record.id, false);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Pipeline
    // ─────────────────────────────────────────────────────────────────────────────

    /// Run steps until the record stops moving.
    async fn drive(&self, id: &str, explicit: bool) -> eyre::Result<StepOutcome> {
        let mut last = StepOutcome::Skipped;
        loop {
            let Some(record) = self.store.get_by_id(id) else {
                return Ok(last);
            };
            match self.step(&record, explicit).await? {
                outcome @ StepOutcome::Advanced(_) => last = outcome,
                StepOutcome::Skipped => return Ok(last),
                outcome => return Ok(outcome),
            }
        }
    }

    async fn step(&self, record: &WithdrawalRecord, explicit: bool) -> eyre::Result<StepOutcome> {
        use WithdrawalStatus::*;

        let id = record.id.as_str();
        match record.status {
            Pending => self.extract(record).await,
            L2Confirmed if record.withdrawal_details.is_none() => self.extract(record).await,
            L2Confirmed | WaitingGame => self.locate(record).await,
            GameFound if record.error_message.is_some() && !explicit => {
                // Held after a failed generation until the user retries.
                Ok(StepOutcome::Skipped)
            }
            GameFound => self.generate(record).await,
            GeneratingProof => {
                if self.inflight.is_running(id, Step::Generate) {
                    return Ok(StepOutcome::Busy);
                }
                self.roll_back(record)
            }
            ProofGenerated | ProofConfirmed | ClaimsResolved | GameResolved => {
                let Some(kind) = ready_kind(record.status) else {
                    return Ok(StepOutcome::Skipped);
                };
                self.arm(id, kind);
                if self.auto_advance {
                    self.signed_step(id, kind).await
                } else {
                    Ok(StepOutcome::Skipped)
                }
            }
            WaitingProofSignature
            | WaitingResolveSignature
            | WaitingResolveGameSignature
            | WaitingFinalizeSignature => {
                let Some(kind) = record.status.tx_kind() else {
                    return Ok(StepOutcome::Skipped);
                };
                if self.inflight.is_running(id, Step::Submit(kind)) {
                    return Ok(StepOutcome::Busy);
                }
                // The prompt that put it here is gone.
                self.roll_back(record)
            }
            ProofSubmitted | ResolvingClaims | ResolvingGame | Finalizing => {
                match record.status.tx_kind() {
                    Some(kind) => self.confirm(id, kind).await,
                    None => Ok(StepOutcome::Skipped),
                }
            }
            Completed | Error => Ok(StepOutcome::Skipped),
        }
    }

    async fn extract(&self, record: &WithdrawalRecord) -> eyre::Result<StepOutcome> {
        let Some(l2_tx_hash) = record.l2_tx_hash else {
            // Placeholder, waiting for its hash
            return Ok(StepOutcome::Skipped);
        };
        let Some(_guard) = self.inflight.try_acquire(&record.id, Step::Extract) else {
            return Ok(StepOutcome::Busy);
        };

        let extracted = match self.bridge.extract(l2_tx_hash).await {
            Ok(extracted) => extracted,
            Err(e) => return self.fail(&record.id, record.status, Step::Extract, &e),
        };

        let hash = extracted.details.withdrawal_hash;
        if let Some(owner) = self
            .store
            .find_by_withdrawal_hash(hash)
            .filter(|r| r.id != record.id)
        {
            return self.drop_duplicate(&record.id, &owner.id);
        }

        let patch = RecordPatch::status(WithdrawalStatus::L2Confirmed)
            .expecting(record.status)
            .details(extracted.details)
            .l2_block(extracted.l2_block)
            .clear_error();
        match self.apply(&record.id, patch) {
            Ok(Some(updated)) => {
                info!(
                    id = %record.id,
                    withdrawal_hash = %hash,
                    l2_block = extracted.l2_block,
                    "Withdrawal extracted"
                );
                Ok(StepOutcome::Advanced(updated.status))
            }
            Ok(None) => Ok(StepOutcome::Skipped),
            Err(e) => {
                if let Some(StoreError::DuplicateWithdrawal { existing, .. }) =
                    e.downcast_ref::<StoreError>()
                {
                    let existing = existing.clone();
                    return self.drop_duplicate(&record.id, &existing);
                }
                Err(e)
            }
        }
    }

    async fn locate(&self, record: &WithdrawalRecord) -> eyre::Result<StepOutcome> {
        let id = record.id.as_str();
        let Some(_guard) = self.inflight.try_acquire(id, Step::Locate) else {
            return Ok(StepOutcome::Busy);
        };
        let Some(l2_block) = record.l2_block_number else {
            let e: eyre::Report = WithdrawalError::missing("L2 block number").into();
            return self.fail(id, record.status, Step::Locate, &e);
        };

        if record.status == WithdrawalStatus::L2Confirmed {
            let patch = RecordPatch::status(WithdrawalStatus::WaitingGame)
                .expecting(WithdrawalStatus::L2Confirmed);
            if self.apply(id, patch)?.is_none() {
                return Ok(StepOutcome::Skipped);
            }
        }

        info!(id, l2_block, "Waiting for dispute game");
        match self.bridge.locate_game(l2_block).await {
            Ok(game) => {
                let game_index = game.game_index;
                let patch = RecordPatch::status(WithdrawalStatus::GameFound)
                    .expecting(WithdrawalStatus::WaitingGame)
                    .game(game)
                    .clear_error();
                match self.apply(id, patch)? {
                    Some(updated) => {
                        info!(id, game_index, "Dispute game found");
                        self.metrics.record_step_success("locate");
                        Ok(StepOutcome::Advanced(updated.status))
                    }
                    None => Ok(StepOutcome::Skipped),
                }
            }
            Err(e) => self.fail(id, WithdrawalStatus::WaitingGame, Step::Locate, &e),
        }
    }

    /// Build the proof. A failure holds the record at `game_found`.
    async fn generate(&self, record: &WithdrawalRecord) -> eyre::Result<StepOutcome> {
        let id = record.id.as_str();
        let (Some(hash), Some(game)) = (record.withdrawal_hash(), record.dispute_game.clone())
        else {
            let e: eyre::Report =
                WithdrawalError::missing("Withdrawal details or dispute game").into();
            return self.fail(id, record.status, Step::Generate, &e);
        };
        let Some(_guard) = self.inflight.try_acquire(id, Step::Generate) else {
            return Ok(StepOutcome::Busy);
        };

        let patch = RecordPatch::status(WithdrawalStatus::GeneratingProof)
            .expecting(WithdrawalStatus::GameFound)
            .clear_error();
        if self.apply(id, patch)?.is_none() {
            return Ok(StepOutcome::Skipped);
        }

        match self.bridge.generate_proof(hash, &game).await {
            Ok(proof) => {
                let patch = RecordPatch::status(WithdrawalStatus::ProofGenerated)
                    .expecting(WithdrawalStatus::GeneratingProof)
                    .proof(proof);
                match self.apply(id, patch)? {
                    Some(updated) => {
                        info!(id, "Proof generated");
                        self.metrics.record_step_success("generate");
                        Ok(StepOutcome::Advanced(updated.status))
                    }
                    None => Ok(StepOutcome::Skipped),
                }
            }
            Err(e) => {
                let message = user_message(&e);
                warn!(id, error = %e, "Proof generation failed");
                self.metrics.record_step_failure("generate");
                let patch = RecordPatch::status(WithdrawalStatus::GameFound)
                    .expecting(WithdrawalStatus::GeneratingProof)
                    .error(message.clone());
                self.apply(id, patch)?;
                Ok(StepOutcome::Failed(message))
            }
        }
    }

    /// Prompt, broadcast and confirm one of the four signed transactions.
    async fn signed_step(&self, id: &str, kind: TxKind) -> eyre::Result<StepOutcome> {
        let Some(_guard) = self.inflight.try_acquire(id, Step::Submit(kind)) else {
            return Ok(StepOutcome::Busy);
        };
        let Some(record) = self.store.get_by_id(id) else {
            return Ok(StepOutcome::Skipped);
        };
        if record.status != kind.ready() {
            debug!(id, status = %record.status, step = kind.name(), "Not ready for step");
            return Ok(StepOutcome::Skipped);
        }

        match self.preflight(&record, kind).await {
            Ok(Some(outcome)) => return Ok(outcome),
            Ok(None) => {}
            Err(e) => {
                warn!(id, step = kind.name(), error = %e, "Preflight check failed");
                return Ok(StepOutcome::Failed(user_message(&e)));
            }
        }

        match self.bridge.gas_check().await {
            Ok(check) if !check.is_sufficient() => {
                warn!(id, step = kind.name(), %check, "Insufficient gas");
                let patch = RecordPatch {
                    expect: Some(kind.ready()),
                    ..Default::default()
                }
                .error(INSUFFICIENT_GAS);
                self.apply(id, patch)?;
                return Ok(StepOutcome::InsufficientGas {
                    shortfall: check.shortfall(),
                });
            }
            Ok(_) => {}
            Err(e) => warn!(id, error = %e, "Gas check failed, submitting anyway"),
        }

        let patch = RecordPatch::status(kind.waiting())
            .expecting(kind.ready())
            .clear_error();
        if self.apply(id, patch)?.is_none() {
            return Ok(StepOutcome::Skipped);
        }

        let prompted = Instant::now();
        match self.send(&record, kind).await {
            Ok(tx_hash) => {
                info!(id, step = kind.name(), tx_hash = %tx_hash, "Transaction submitted");
                let patch = RecordPatch::status(kind.submitted())
                    .expecting(kind.waiting())
                    .tx(kind, tx_hash);
                if self.apply(id, patch)?.is_none() {
                    return Ok(StepOutcome::Skipped);
                }
                let outcome = self.confirm(id, kind).await?;
                if matches!(outcome, StepOutcome::Advanced(_)) {
                    self.metrics
                        .record_signed_step_duration(kind.name(), prompted.elapsed());
                }
                Ok(outcome)
            }
            Err(e) => self.submit_failed(id, kind, &e),
        }
    }

    /// Short-circuit a step the chain already shows as done.
    async fn preflight(
        &self,
        record: &WithdrawalRecord,
        kind: TxKind,
    ) -> eyre::Result<Option<StepOutcome>> {
        let id = record.id.as_str();
        match kind {
            TxKind::Proof => {
                let Some(hash) = record.withdrawal_hash() else {
                    return Ok(None);
                };
                if !self.bridge.is_proven(hash).await? {
                    return Ok(None);
                }
                info!(id, "Withdrawal already proven");
                let patch = RecordPatch::status(WithdrawalStatus::ProofConfirmed)
                    .expecting(kind.ready())
                    .clear_error();
                self.shortcut(id, patch)
            }
            TxKind::ResolveClaims => {
                let Some(game) = &record.dispute_game else {
                    return Ok(None);
                };
                match self.bridge.game_plan(game).await? {
                    ResolutionPlan::Claims(_) => Ok(None),
                    ResolutionPlan::NoClaims => {
                        info!(id, "Game has no claims to resolve");
                        let patch = RecordPatch::status(WithdrawalStatus::ClaimsResolved)
                            .expecting(kind.ready())
                            .clear_error();
                        self.shortcut(id, patch)
                    }
                    ResolutionPlan::AlreadyResolved(GameStatus::DefenderWins) => {
                        info!(id, "Game already resolved");
                        let patch = RecordPatch::status(WithdrawalStatus::ClaimsResolved)
                            .expecting(kind.ready())
                            .clear_error();
                        if self.apply(id, patch)?.is_none() {
                            return Ok(Some(StepOutcome::Skipped));
                        }
                        let patch = RecordPatch::status(WithdrawalStatus::GameResolved)
                            .expecting(WithdrawalStatus::ClaimsResolved)
                            .game_resolved_at(now_ms());
                        self.shortcut(id, patch)
                    }
                    ResolutionPlan::AlreadyResolved(GameStatus::ChallengerWins) => {
                        self.challenger_won(id, kind.ready()).map(Some)
                    }
                    ResolutionPlan::AlreadyResolved(GameStatus::InProgress) => Ok(None),
                }
            }
            TxKind::ResolveGame => {
                let Some(game) = &record.dispute_game else {
                    return Ok(None);
                };
                match self.bridge.game_status(game).await? {
                    GameStatus::InProgress => Ok(None),
                    GameStatus::DefenderWins => {
                        info!(id, "Game already resolved");
                        let patch = RecordPatch::status(WithdrawalStatus::GameResolved)
                            .expecting(kind.ready())
                            .game_resolved_at(now_ms())
                            .clear_error();
                        self.shortcut(id, patch)
                    }
                    GameStatus::ChallengerWins => self.challenger_won(id, kind.ready()).map(Some),
                }
            }
            TxKind::Finalize => {
                let Some(hash) = record.withdrawal_hash() else {
                    return Ok(None);
                };
                if self.bridge.is_finalized(hash).await? {
                    info!(id, "Withdrawal already finalized");
                    let patch = RecordPatch::status(WithdrawalStatus::Completed)
                        .expecting(kind.ready())
                        .completed_at(now_ms())
                        .clear_error();
                    return self.shortcut(id, patch);
                }

                let window = self.bridge.challenge_window().await?;
                let resolved_at = match record.game_resolved_at {
                    Some(at) => at,
                    None => {
                        let now = now_ms();
                        let patch = RecordPatch {
                            expect: Some(kind.ready()),
                            ..Default::default()
                        }
                        .game_resolved_at(now);
                        self.apply(id, patch)?;
                        now
                    }
                };
                let remaining = challenge_remaining(resolved_at, window, now_ms());
                if remaining.is_zero() {
                    Ok(None)
                } else {
                    debug!(id, remaining_secs = remaining.as_secs(), "Challenge window open");
                    Ok(Some(StepOutcome::NotReady { remaining }))
                }
            }
        }
    }

    async fn send(&self, record: &WithdrawalRecord, kind: TxKind) -> eyre::Result<TxHash> {
        match kind {
            TxKind::Proof => self.bridge.submit_proof(record).await,
            TxKind::ResolveClaims => {
                let game = record
                    .dispute_game
                    .as_ref()
                    .ok_or_else(|| WithdrawalError::missing("Dispute game"))?;
                self.bridge.resolve_claims(game).await
            }
            TxKind::ResolveGame => {
                let game = record
                    .dispute_game
                    .as_ref()
                    .ok_or_else(|| WithdrawalError::missing("Dispute game"))?;
                self.bridge.resolve_game(game).await
            }
            TxKind::Finalize => {
                let details = record
                    .withdrawal_details
                    .as_ref()
                    .ok_or_else(|| WithdrawalError::missing("Withdrawal details"))?;
                self.bridge.finalize(details).await
            }
        }
    }

    fn submit_failed(
        &self,
        id: &str,
        kind: TxKind,
        e: &eyre::Report,
    ) -> eyre::Result<StepOutcome> {
        match classify(e) {
            ErrorKind::UserRejected => {
                info!(id, step = kind.name(), "Signature rejected");
                self.metrics.record_rejection(kind.name());
                let patch = RecordPatch::status(kind.ready())
                    .expecting(kind.waiting())
                    .clear_error();
                self.apply(id, patch)?;
                Ok(StepOutcome::Rejected)
            }
            ErrorKind::DataIntegrity => self.fail(id, kind.waiting(), Step::Submit(kind), e),
            ErrorKind::Recoverable | ErrorKind::Transient => {
                let message = user_message(e);
                warn!(id, step = kind.name(), error = %e, "Submission failed");
                self.metrics.record_step_failure(kind.name());
                let patch = RecordPatch::status(kind.ready())
                    .expecting(kind.waiting())
                    .error(message.clone());
                self.apply(id, patch)?;
                Ok(StepOutcome::Failed(message))
            }
        }
    }

    /// Watch the submitted transaction of `kind` until it is mined.
    async fn confirm(&self, id: &str, kind: TxKind) -> eyre::Result<StepOutcome> {
        let Some(_guard) = self.inflight.try_acquire(id, Step::Confirm(kind)) else {
            return Ok(StepOutcome::Busy);
        };
        let Some(record) = self.store.get_by_id(id) else {
            return Ok(StepOutcome::Skipped);
        };
        if record.status != kind.submitted() {
            return Ok(StepOutcome::Skipped);
        }
        let Some(tx_hash) = record.tx_hash(kind) else {
            warn!(id, step = kind.name(), "Submitted without a transaction hash");
            return self.roll_back(&record);
        };

        match self.bridge.wait_for_receipt(tx_hash).await {
            Ok(true) => {
                let now = now_ms();
                let mut patch = RecordPatch::status(kind.confirmed())
                    .expecting(kind.submitted())
                    .clear_error();
                match kind {
                    TxKind::ResolveGame => patch = patch.game_resolved_at(now),
                    TxKind::Finalize => patch = patch.completed_at(now),
                    TxKind::Proof | TxKind::ResolveClaims => {}
                }
                let Some(updated) = self.apply(id, patch)? else {
                    return Ok(StepOutcome::Skipped);
                };

                info!(id, step = kind.name(), tx_hash = %tx_hash, status = %updated.status, "Transaction confirmed");
                self.metrics.record_step_success(kind.name());
                match kind {
                    TxKind::Proof => self.metrics.record_withdrawal_proven(),
                    TxKind::ResolveGame => self.metrics.record_game_resolved(),
                    TxKind::Finalize => self.metrics.record_withdrawal_finalized(),
                    TxKind::ResolveClaims => {}
                }

                if kind == TxKind::ResolveGame {
                    if let Some(game) = &updated.dispute_game {
                        match self.bridge.game_status(game).await {
                            Ok(GameStatus::ChallengerWins) => {
                                return self.challenger_won(id, updated.status);
                            }
                            Ok(_) => {}
                            Err(e) => warn!(id, error = %e, "Failed to read game outcome"),
                        }
                    }
                }
                Ok(StepOutcome::Advanced(updated.status))
            }
            Ok(false) => {
                warn!(id, step = kind.name(), tx_hash = %tx_hash, "Transaction reverted");
                self.metrics.record_step_failure(kind.name());
                let patch = RecordPatch::status(kind.ready())
                    .expecting(kind.submitted())
                    .discard_tx(kind)
                    .error(TX_REVERTED);
                self.apply(id, patch)?;
                Ok(StepOutcome::Failed(TX_REVERTED.to_string()))
            }
            Err(e) => {
                // Left in the submitted status; the next pass watches again.
                let message = user_message(&e);
                warn!(id, step = kind.name(), tx_hash = %tx_hash, error = %e, "Receipt watch failed");
                let patch = RecordPatch {
                    expect: Some(kind.submitted()),
                    ..Default::default()
                }
                .error(message.clone());
                self.apply(id, patch)?;
                Ok(StepOutcome::Failed(message))
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────────────

    /// Apply `patch`, treating a record that moved on or vanished as a no-op.
    fn apply(&self, id: &str, patch: RecordPatch) -> eyre::Result<Option<WithdrawalRecord>> {
        match self.store.update(id, patch) {
            Ok(record) => {
                match ready_kind(record.status) {
                    Some(kind) => self.arm(id, kind),
                    None => self.disarm(id),
                }
                Ok(Some(record))
            }
            Err(e @ (StoreError::StaleStatus { .. } | StoreError::NotFound(_))) => {
                debug!(id, reason = %e, "Dropping stale update");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn shortcut(&self, id: &str, patch: RecordPatch) -> eyre::Result<Option<StepOutcome>> {
        Ok(Some(match self.apply(id, patch)? {
            Some(updated) => StepOutcome::Advanced(updated.status),
            None => StepOutcome::Skipped,
        }))
    }

    /// Move a record whose in-progress status was abandoned back to its
    /// actionable predecessor. Obtained data stays on the record.
    fn roll_back(&self, record: &WithdrawalRecord) -> eyre::Result<StepOutcome> {
        let Some(target) = record.status.rollback_target() else {
            return Ok(StepOutcome::Skipped);
        };
        info!(id = %record.id, from = %record.status, to = %target, "Rolling back abandoned step");
        let patch = RecordPatch::status(target)
            .expecting(record.status)
            .clear_error();
        Ok(match self.apply(&record.id, patch)? {
            Some(updated) => StepOutcome::Advanced(updated.status),
            None => StepOutcome::Skipped,
        })
    }

    /// Record an unrecoverable failure.
    fn fail(
        &self,
        id: &str,
        expected: WithdrawalStatus,
        step: Step,
        e: &eyre::Report,
    ) -> eyre::Result<StepOutcome> {
        let message = user_message(e);
        error!(id, %step, error = %e, "Withdrawal failed");
        self.metrics.record_step_failure(&step.to_string());
        let patch = RecordPatch::status(WithdrawalStatus::Error)
            .expecting(expected)
            .error(message.clone());
        self.apply(id, patch)?;
        Ok(StepOutcome::Failed(message))
    }

    fn challenger_won(&self, id: &str, expected: WithdrawalStatus) -> eyre::Result<StepOutcome> {
        error!(id, "Dispute game resolved CHALLENGER_WINS");
        let patch = RecordPatch::status(WithdrawalStatus::Error)
            .expecting(expected)
            .error(CHALLENGER_WON);
        self.apply(id, patch)?;
        Ok(StepOutcome::Failed(CHALLENGER_WON.to_string()))
    }

    /// Another record already owns the withdrawal; this one goes.
    fn drop_duplicate(&self, id: &str, existing: &str) -> eyre::Result<StepOutcome> {
        warn!(id, existing, "Withdrawal already tracked, dropping duplicate record");
        match self.store.delete(id) {
            Ok(_) | Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.disarm(id);
        Ok(StepOutcome::Skipped)
    }

    fn arm(&self, id: &str, kind: TxKind) {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), kind);
    }

    fn disarm(&self, id: &str) {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }
}

/// The signed step a ready status is waiting for.
fn ready_kind(status: WithdrawalStatus) -> Option<TxKind> {
    TxKind::ALL.into_iter().find(|kind| kind.ready() == status)
}
