//! Staking service: the context object every caller goes through.
//!
//! One `StakingService` owns the transport, the store, the clock and the
//! settings. Mutating operations are serialized per identity; reads are not
//! and may observe state that an in-flight mutation is about to change
//! (`PositionView::in_flight` says so).

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use solana_sdk::{
    instruction::Instruction, pubkey::Pubkey, signature::Signature, transaction::Transaction,
};

use seedstable_protocol::{
    address, instruction, ProtocolState, StakingKeys, StakingPoolAccount, TokenAccount,
    TransactionDraft, UserStakeAccount, DEFAULT_APY_BASIS_POINTS, DEFAULT_MIN_STAKE_UNITS,
    PROTOCOL_PROGRAM_ID, SDAO_DECIMALS, SDAO_MINT, STAKING_PROGRAM_ID,
};

use crate::accrual::{Phase, RewardRate, StakePosition};
use crate::clock::Clock;
use crate::error::{ClientError, ErrorKind};
use crate::signer::TransactionSigner;
use crate::store::{PositionPatch, PositionStore, TransactionKind, TransactionRecord};
use crate::transport::{ConfirmationStatus, LedgerTransport};

// ============================================================================
// Settings and result types
// ============================================================================

/// A pending entry still unseen by the ledger this long after it was signed
/// can no longer land: its blockhash has expired.
pub const PENDING_EXPIRY_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub protocol_program_id: Pubkey,
    pub staking_program_id: Pubkey,
    pub mint: Pubkey,
    pub rate: RewardRate,
    /// Smallest accepted stake, base units.
    pub min_stake: u64,
    pub decimals: u8,
    pub confirm_timeout: Duration,
    pub confirm_poll_interval: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            protocol_program_id: PROTOCOL_PROGRAM_ID,
            staking_program_id: STAKING_PROGRAM_ID,
            mint: SDAO_MINT,
            rate: RewardRate::from_basis_points(DEFAULT_APY_BASIS_POINTS),
            min_stake: DEFAULT_MIN_STAKE_UNITS,
            decimals: SDAO_DECIMALS,
            confirm_timeout: Duration::from_secs(60),
            confirm_poll_interval: Duration::from_secs(2),
        }
    }
}

/// Outcome of a mutating operation, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub success: bool,
    pub submission_id: Option<String>,
    pub message: String,
    pub error: Option<ErrorKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorState {
    pub kind: ErrorKind,
    pub message: String,
}

/// Read model for one identity, recomputed on every call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionView {
    pub owner: String,
    pub phase: Phase,
    pub staked_amount: u64,
    pub staked_ui: f64,
    pub stake_start_time: i64,
    pub last_claim_time: i64,
    /// Pending rewards in base units, floating point.
    pub pending_rewards: f64,
    pub pending_rewards_ui: f64,
    /// What a claim would pay right now, base units.
    pub claimable_units: u64,
    pub apy_percent: f64,
    /// A mutation is in flight; treat the numbers as stale.
    pub in_flight: bool,
    pub last_error: Option<ErrorState>,
    /// Most recent first.
    pub history: Vec<TransactionRecord>,
    pub as_of: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResumeReport {
    pub confirmed: Vec<String>,
    pub failed: Vec<String>,
    pub still_pending: Vec<String>,
}

/// Successful mutation. `warning` is set when the ledger accepted the
/// operation but a local follow-up (persistence) failed.
struct Completed {
    signature: Signature,
    message: String,
    warning: Option<ClientError>,
}

// ============================================================================
// In-flight guard
// ============================================================================

struct InFlight<'a> {
    set: &'a Mutex<HashSet<Pubkey>>,
    identity: Pubkey,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.identity);
    }
}

// ============================================================================
// Service
// ============================================================================

pub struct StakingService {
    transport: Arc<dyn LedgerTransport>,
    store: PositionStore,
    clock: Arc<dyn Clock>,
    settings: ServiceSettings,
    keys: StakingKeys,
    in_flight: Mutex<HashSet<Pubkey>>,
    last_errors: Mutex<HashMap<Pubkey, ErrorState>>,
}

impl StakingService {
    pub fn new(
        transport: Arc<dyn LedgerTransport>,
        store: PositionStore,
        clock: Arc<dyn Clock>,
        settings: ServiceSettings,
    ) -> Result<Self, ClientError> {
        let keys = StakingKeys::derive(&settings.staking_program_id, &settings.mint)?;
        Ok(Self {
            transport,
            store,
            clock,
            settings,
            keys,
            in_flight: Mutex::new(HashSet::new()),
            last_errors: Mutex::new(HashMap::new()),
        })
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn staking_keys(&self) -> &StakingKeys {
        &self.keys
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Local position with pending rewards recomputed at the current time.
    pub fn get_position(&self, identity: &Pubkey) -> PositionView {
        let now = self.clock.now();
        let stored = self.store.load(identity);
        let p = stored.position;
        let rate = self.settings.rate;
        let scale = 10f64.powi(i32::from(self.settings.decimals));
        let pending = p.pending_rewards(now, rate);

        PositionView {
            owner: identity.to_string(),
            phase: p.phase(),
            staked_amount: p.staked_amount,
            staked_ui: p.staked_amount as f64 / scale,
            stake_start_time: p.stake_start_time,
            last_claim_time: p.last_claim_time,
            pending_rewards: pending,
            pending_rewards_ui: pending / scale,
            claimable_units: p.pending_units(now, rate),
            apy_percent: rate.apy_percent(),
            in_flight: self.is_in_flight(identity),
            last_error: self.last_error(identity),
            history: stored.history.into_iter().rev().collect(),
            as_of: now,
        }
    }

    /// Decoded protocol singleton; `None` when it has not been initialized.
    /// Fetched fresh on every call.
    pub async fn get_protocol_state(&self) -> Result<Option<ProtocolState>, ClientError> {
        let (state_pda, _) = address::protocol_state(&self.settings.protocol_program_id)?;
        let data = self.transport.get_account_bytes(&state_pda).await?;
        Ok(ProtocolState::decode(data.as_deref())?)
    }

    pub async fn get_staking_pool(&self) -> Result<Option<StakingPoolAccount>, ClientError> {
        let data = self.transport.get_account_bytes(&self.keys.pool).await?;
        Ok(StakingPoolAccount::decode(data.as_deref())?)
    }

    pub async fn get_onchain_stake(
        &self,
        identity: &Pubkey,
    ) -> Result<Option<UserStakeAccount>, ClientError> {
        let pda = self.keys.user_stake(identity)?;
        let data = self.transport.get_account_bytes(&pda).await?;
        Ok(UserStakeAccount::decode(data.as_deref())?)
    }

    /// Wallet balance of the staking token, base units. A missing token
    /// account is a zero balance.
    pub async fn token_balance(&self, identity: &Pubkey) -> Result<u64, ClientError> {
        let ata = self.keys.user_token_account(identity)?;
        let data = self.transport.get_account_bytes(&ata).await?;
        Ok(TokenAccount::decode(data.as_deref())?.map_or(0, |t| t.amount))
    }

    pub fn last_error(&self, identity: &Pubkey) -> Option<ErrorState> {
        self.last_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
    }

    pub fn is_in_flight(&self, identity: &Pubkey) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(identity)
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    pub async fn stake(&self, signer: &dyn TransactionSigner, amount: u64) -> OperationResult {
        let identity = signer.pubkey();
        let outcome = self.run_stake(signer, amount).await;
        self.finish(&identity, "stake", outcome)
    }

    pub async fn unstake(&self, signer: &dyn TransactionSigner, amount: u64) -> OperationResult {
        let identity = signer.pubkey();
        let outcome = self.run_unstake(signer, amount).await;
        self.finish(&identity, "unstake", outcome)
    }

    pub async fn claim(&self, signer: &dyn TransactionSigner) -> OperationResult {
        let identity = signer.pubkey();
        let outcome = self.run_claim(signer).await;
        self.finish(&identity, "claim", outcome)
    }

    /// Toggle the protocol's emergency pause. Only the recorded authority
    /// may do this.
    pub async fn set_paused(&self, signer: &dyn TransactionSigner, pause: bool) -> OperationResult {
        let identity = signer.pubkey();
        let outcome = self.run_set_paused(signer, pause).await;
        self.finish(&identity, if pause { "pause" } else { "unpause" }, outcome)
    }

    async fn run_stake(
        &self,
        signer: &dyn TransactionSigner,
        amount: u64,
    ) -> Result<Completed, ClientError> {
        let identity = signer.pubkey();
        let _guard = self.begin(identity)?;

        if amount < self.settings.min_stake {
            return Err(ClientError::BelowMinimumStake {
                amount,
                minimum: self.settings.min_stake,
            });
        }
        let available = self.token_balance(&identity).await?;
        if amount > available {
            return Err(ClientError::InsufficientBalance {
                requested: amount,
                available,
            });
        }

        let now = self.clock.now();
        let rate = self.settings.rate;
        let current = self.store.load(&identity).position;
        current.apply_stake(amount, now, rate)?;
        let frozen = match current.phase() {
            Phase::Staked => Some(current.pending_units(now, rate)),
            Phase::Idle => None,
        };

        let ix = instruction::stake_tokens(&self.keys, &identity, amount)?;
        let (signature, warning) = self
            .submit_tracked(signer, ix, pending_record(TransactionKind::Stake, amount, frozen, now))
            .await?;
        Ok(Completed {
            signature,
            message: format!("staked {amount} units"),
            warning,
        })
    }

    async fn run_unstake(
        &self,
        signer: &dyn TransactionSigner,
        amount: u64,
    ) -> Result<Completed, ClientError> {
        let identity = signer.pubkey();
        let _guard = self.begin(identity)?;

        let now = self.clock.now();
        let current = self.store.load(&identity).position;
        let (_, paid) = current.apply_unstake(amount, now, self.settings.rate)?;

        let ix = instruction::unstake_tokens(&self.keys, &identity, amount)?;
        let (signature, warning) = self
            .submit_tracked(signer, ix, pending_record(TransactionKind::Unstake, amount, Some(paid), now))
            .await?;
        Ok(Completed {
            signature,
            message: format!("unstaked {amount} units, {paid} units of rewards claimed"),
            warning,
        })
    }

    async fn run_claim(&self, signer: &dyn TransactionSigner) -> Result<Completed, ClientError> {
        let identity = signer.pubkey();
        let _guard = self.begin(identity)?;

        let now = self.clock.now();
        let current = self.store.load(&identity).position;
        let (_, paid) = current.apply_claim(now, self.settings.rate)?;

        let ix = instruction::claim_rewards(&self.keys, &identity)?;
        let (signature, warning) = self
            .submit_tracked(signer, ix, pending_record(TransactionKind::Claim, paid, Some(paid), now))
            .await?;
        Ok(Completed {
            signature,
            message: format!("claimed {paid} units"),
            warning,
        })
    }

    async fn run_set_paused(
        &self,
        signer: &dyn TransactionSigner,
        pause: bool,
    ) -> Result<Completed, ClientError> {
        let identity = signer.pubkey();
        let _guard = self.begin(identity)?;

        let state = self
            .get_protocol_state()
            .await?
            .ok_or(ClientError::NotInitialized("ProtocolState"))?;
        if state.authority != identity {
            return Err(ClientError::Unauthorized {
                signer: identity,
                authority: state.authority,
            });
        }

        let ix = instruction::emergency_pause(&self.settings.protocol_program_id, &identity, pause)?;
        let tx = self.sign_transaction(signer, ix).await?;
        let signature = self.transport.submit(&tx).await?;
        tracing::info!(identity = %identity, tx = %signature, "Submitted transaction");
        self.await_confirmation(&signature).await?;
        Ok(Completed {
            signature,
            message: if pause { "protocol paused" } else { "protocol resumed" }.to_string(),
            warning: None,
        })
    }

    /// Settle history entries still pending from an earlier session, a
    /// timeout, or an ambiguous send.
    ///
    /// Entries that landed are reconciled from the on-chain stake account,
    /// never by replaying their local delta, so running `sync` first cannot
    /// double-count. Entries that failed, or that are still unseen after
    /// [`PENDING_EXPIRY_SECS`], are marked failed. One bad entry never
    /// blocks the ones after it.
    pub async fn resume_pending(&self, identity: &Pubkey) -> Result<ResumeReport, ClientError> {
        let _guard = self.begin(*identity)?;
        let now = self.clock.now();
        let mut report = ResumeReport::default();
        let mut landed = Vec::new();

        for record in self.store.unconfirmed(identity) {
            let id = record.submission_id;
            let Ok(signature) = Signature::from_str(&id) else {
                tracing::warn!(identity = %identity, "Unparseable submission id '{id}'");
                self.settle_failed(identity, &id);
                report.failed.push(id);
                continue;
            };
            match self.transport.confirm(&signature).await {
                Ok(ConfirmationStatus::Confirmed) => landed.push(id),
                Ok(ConfirmationStatus::Failed(reason)) => {
                    tracing::warn!(identity = %identity, tx = %signature, "Submission failed on-chain: {reason}");
                    self.settle_failed(identity, &id);
                    report.failed.push(id);
                }
                Ok(ConfirmationStatus::Pending)
                    if now.saturating_sub(record.timestamp) > PENDING_EXPIRY_SECS =>
                {
                    tracing::warn!(identity = %identity, tx = %signature, "Submission expired without landing");
                    self.settle_failed(identity, &id);
                    report.failed.push(id);
                }
                Ok(ConfirmationStatus::Pending) => report.still_pending.push(id),
                Err(e) => {
                    tracing::warn!(identity = %identity, tx = %signature, "Status query failed: {e}");
                    report.still_pending.push(id);
                }
            }
        }

        if !landed.is_empty() {
            self.reconcile_from_chain(identity, &landed).await?;
            tracing::info!(identity = %identity, count = landed.len(), "Late confirmations reconciled");
            report.confirmed = landed;
        }
        Ok(report)
    }

    /// Overwrite the local scalar fields from the on-chain stake record.
    /// Returns `false` (and changes nothing) when no on-chain record exists.
    pub async fn sync(&self, identity: &Pubkey) -> Result<bool, ClientError> {
        let _guard = self.begin(*identity)?;
        let Some(onchain) = self.get_onchain_stake(identity).await? else {
            return Ok(false);
        };
        self.store.save(
            identity,
            PositionPatch {
                position: Some(position_from_chain(identity, Some(&onchain))),
                append: Vec::new(),
            },
        )?;
        tracing::info!(identity = %identity, staked = onchain.amount, "Synced position from chain");
        Ok(true)
    }

    /// Unsigned stake transaction sealed against a fresh blockhash, for an
    /// external signer.
    pub async fn draft_stake(&self, identity: &Pubkey, amount: u64) -> Result<String, ClientError> {
        let ix = instruction::stake_tokens(&self.keys, identity, amount)?;
        let blockhash = self.transport.latest_blockhash().await?;
        let tx = TransactionDraft::new(*identity)
            .with_instruction(ix)
            .seal(blockhash);
        Ok(seedstable_protocol::transaction::to_base64(&tx)?)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn begin(&self, identity: Pubkey) -> Result<InFlight<'_>, ClientError> {
        let mut set = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(identity) {
            return Err(ClientError::OperationInProgress(identity));
        }
        Ok(InFlight {
            set: &self.in_flight,
            identity,
        })
    }

    /// Seal against a blockhash fetched now and sign.
    async fn sign_transaction(
        &self,
        signer: &dyn TransactionSigner,
        ix: Instruction,
    ) -> Result<Transaction, ClientError> {
        let draft = TransactionDraft::new(signer.pubkey()).with_instruction(ix);
        let blockhash = self.transport.latest_blockhash().await?;
        let mut tx = draft.seal(blockhash);
        signer.sign(&mut tx, blockhash)?;
        Ok(tx)
    }

    /// Sign, record `record` as pending, send once, wait for confirmation,
    /// then apply the transition and confirm the entry in one store write.
    ///
    /// The pending entry exists before the transaction leaves the process,
    /// so a cancelled caller, a crash or an ambiguous send always leaves
    /// something for [`Self::resume_pending`] to settle. If the entry cannot
    /// be written nothing is sent.
    async fn submit_tracked(
        &self,
        signer: &dyn TransactionSigner,
        ix: Instruction,
        mut record: TransactionRecord,
    ) -> Result<(Signature, Option<ClientError>), ClientError> {
        let identity = signer.pubkey();
        let tx = self.sign_transaction(signer, ix).await?;
        let signature = tx
            .signatures
            .first()
            .copied()
            .ok_or_else(|| ClientError::SignerUnavailable("transaction left unsigned".into()))?;
        record.submission_id = signature.to_string();
        self.store.save(
            &identity,
            PositionPatch {
                position: None,
                append: vec![record.clone()],
            },
        )?;

        match self.transport.submit(&tx).await {
            Ok(_) => tracing::info!(identity = %identity, tx = %signature, "Submitted transaction"),
            Err(e @ ClientError::TransactionRejected(_)) => {
                self.settle_failed(&identity, &record.submission_id);
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(identity = %identity, tx = %signature, "Send outcome unknown, left pending: {e}");
                return Err(e);
            }
        }

        match self.await_confirmation(&signature).await {
            Ok(()) => {}
            Err(e @ ClientError::TransactionRejected(_)) => {
                self.settle_failed(&identity, &record.submission_id);
                return Err(e);
            }
            // Timeout: the entry stays pending.
            Err(e) => return Err(e),
        }

        let current = self.store.load(&identity).position;
        let warning = match apply_record(&current, &record, self.settings.rate) {
            Ok(next) => self
                .store
                .settle(&identity, Some(next), &[record.submission_id.clone()])
                .err(),
            Err(e) => {
                tracing::warn!(identity = %identity, tx = %signature, "Local transition failed ({e}), reconciling from chain");
                self.reconcile_from_chain(&identity, &[record.submission_id.clone()])
                    .await
                    .err()
            }
        };
        Ok((signature, warning))
    }

    /// Overwrite the scalar fields from the on-chain stake account and
    /// confirm `submission_ids` in the same store write.
    async fn reconcile_from_chain(
        &self,
        identity: &Pubkey,
        submission_ids: &[String],
    ) -> Result<(), ClientError> {
        let onchain = self.get_onchain_stake(identity).await?;
        let position = position_from_chain(identity, onchain.as_ref());
        self.store.settle(identity, Some(position), submission_ids)?;
        Ok(())
    }

    fn settle_failed(&self, identity: &Pubkey, submission_id: &str) {
        if let Err(e) = self.store.mark_failed(identity, submission_id) {
            tracing::warn!(identity = %identity, "Could not mark {submission_id} failed: {e}");
        }
    }

    async fn await_confirmation(&self, signature: &Signature) -> Result<(), ClientError> {
        let poll = self.settings.confirm_poll_interval;
        let waited = tokio::time::timeout(self.settings.confirm_timeout, async {
            loop {
                match self.transport.confirm(signature).await {
                    Ok(ConfirmationStatus::Confirmed) => return Ok(()),
                    Ok(ConfirmationStatus::Failed(reason)) => {
                        return Err(ClientError::TransactionRejected(reason))
                    }
                    Ok(ConfirmationStatus::Pending) => {}
                    Err(e) => tracing::warn!(tx = %signature, "Confirmation poll failed: {e}"),
                }
                tokio::time::sleep(poll).await;
            }
        })
        .await;

        match waited {
            Ok(result) => {
                if result.is_ok() {
                    tracing::info!(tx = %signature, "Transaction confirmed");
                }
                result
            }
            Err(_) => Err(ClientError::Timeout {
                signature: *signature,
                secs: self.settings.confirm_timeout.as_secs(),
            }),
        }
    }

    fn finish(
        &self,
        identity: &Pubkey,
        op: &'static str,
        outcome: Result<Completed, ClientError>,
    ) -> OperationResult {
        let mut errors = self.last_errors.lock().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            Ok(done) => {
                match &done.warning {
                    Some(w) => {
                        errors.insert(
                            *identity,
                            ErrorState {
                                kind: w.kind(),
                                message: w.to_string(),
                            },
                        );
                    }
                    None => {
                        errors.remove(identity);
                    }
                }
                OperationResult {
                    success: true,
                    submission_id: Some(done.signature.to_string()),
                    message: done.message,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(identity = %identity, op, "Operation failed: {e}");
                errors.insert(
                    *identity,
                    ErrorState {
                        kind: e.kind(),
                        message: e.to_string(),
                    },
                );
                let submission_id = match &e {
                    ClientError::Timeout { signature, .. } => Some(signature.to_string()),
                    _ => None,
                };
                OperationResult {
                    success: false,
                    submission_id,
                    message: e.to_string(),
                    error: Some(e.kind()),
                }
            }
        }
    }
}

/// A history entry for a transaction about to be sent.
fn pending_record(
    kind: TransactionKind,
    amount: u64,
    rewards_at_time: Option<u64>,
    timestamp: i64,
) -> TransactionRecord {
    TransactionRecord {
        kind,
        amount,
        rewards_at_time,
        submission_id: String::new(),
        timestamp,
        confirmed: false,
        failed: false,
    }
}

/// The local transition a confirmed entry stands for, evaluated at the time
/// it was signed so it matches the amounts recorded with it.
fn apply_record(
    current: &StakePosition,
    record: &TransactionRecord,
    rate: RewardRate,
) -> Result<StakePosition, ClientError> {
    let at = record.timestamp;
    match record.kind {
        TransactionKind::Stake => current.apply_stake(record.amount, at, rate),
        TransactionKind::Unstake => current.apply_unstake(record.amount, at, rate).map(|(p, _)| p),
        TransactionKind::Claim => current.apply_claim(at, rate).map(|(p, _)| p),
    }
}

/// Local position mirroring the on-chain stake account. Frozen rewards are
/// a local notion and do not survive.
fn position_from_chain(identity: &Pubkey, onchain: Option<&UserStakeAccount>) -> StakePosition {
    match onchain {
        Some(a) if a.amount > 0 => StakePosition {
            owner: *identity,
            staked_amount: a.amount,
            stake_start_time: a.stake_time,
            last_claim_time: a.last_claim_time,
            frozen_rewards: 0,
        },
        _ => StakePosition::empty(*identity),
    }
}
