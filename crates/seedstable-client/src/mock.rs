//! Test doubles: an in-memory ledger and a hand-driven clock.
//!
//! `MockLedger` implements the same [`LedgerTransport`] as the RPC client and
//! never touches the network. It is compiled only for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use seedstable_protocol::{TokenAccount, UserStakeAccount};
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    transaction::Transaction,
};

use crate::clock::Clock;
use crate::error::ClientError;
use crate::service::{ServiceSettings, StakingService};
use crate::signer::{KeypairSigner, TransactionSigner};
use crate::store::PositionStore;
use crate::transport::{ConfirmationStatus, LedgerTransport};

#[derive(Default)]
pub struct MockLedger {
    accounts: Mutex<HashMap<Pubkey, Vec<u8>>>,
    submitted: Mutex<Vec<Transaction>>,
    /// Status returned by `confirm` for every signature without a script.
    default_status: Mutex<Option<ConfirmationStatus>>,
    /// Per-signature scripted statuses, consumed front to back; the last one
    /// sticks.
    scripted: Mutex<HashMap<Signature, VecDeque<ConfirmationStatus>>>,
    reject_next: Mutex<Option<String>>,
    /// Accept the next submission but report a dropped connection.
    lose_next_response: Mutex<bool>,
    read_failures: AtomicU32,
    blockhashes: AtomicU64,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_account(&self, address: Pubkey, data: Vec<u8>) {
        self.accounts.lock().unwrap().insert(address, data);
    }

    /// Status for all signatures (default: `Confirmed`).
    pub fn set_default_status(&self, status: ConfirmationStatus) {
        *self.default_status.lock().unwrap() = Some(status);
    }

    pub fn script_status(&self, signature: Signature, statuses: Vec<ConfirmationStatus>) {
        self.scripted
            .lock()
            .unwrap()
            .insert(signature, statuses.into());
    }

    pub fn reject_next_submit(&self, reason: &str) {
        *self.reject_next.lock().unwrap() = Some(reason.to_string());
    }

    /// The next submission lands but the caller sees `NetworkFailure`.
    pub fn lose_next_submit_response(&self) {
        *self.lose_next_response.lock().unwrap() = true;
    }

    /// The next `n` reads fail with `NetworkFailure`.
    pub fn fail_next_reads(&self, n: u32) {
        self.read_failures.store(n, Ordering::SeqCst);
    }

    pub fn submitted(&self) -> Vec<Transaction> {
        self.submitted.lock().unwrap().clone()
    }

    fn read_gate(&self) -> Result<(), ClientError> {
        let failed = self
            .read_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ClientError::NetworkFailure("mock: connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerTransport for MockLedger {
    async fn get_account_bytes(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, ClientError> {
        self.read_gate()?;
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn latest_blockhash(&self) -> Result<Hash, ClientError> {
        self.read_gate()?;
        let n = self.blockhashes.fetch_add(1, Ordering::SeqCst) + 1;
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&n.to_le_bytes());
        Ok(Hash::new_from_array(bytes))
    }

    async fn submit(&self, tx: &Transaction) -> Result<Signature, ClientError> {
        if let Some(reason) = self.reject_next.lock().unwrap().take() {
            return Err(ClientError::TransactionRejected(reason));
        }
        let signature = tx
            .signatures
            .first()
            .copied()
            .ok_or_else(|| ClientError::TransactionRejected("mock: unsigned".into()))?;
        self.submitted.lock().unwrap().push(tx.clone());
        if std::mem::take(&mut *self.lose_next_response.lock().unwrap()) {
            return Err(ClientError::NetworkFailure("mock: response lost".into()));
        }
        Ok(signature)
    }

    async fn confirm(&self, signature: &Signature) -> Result<ConfirmationStatus, ClientError> {
        let mut scripted = self.scripted.lock().unwrap();
        if let Some(queue) = scripted.get_mut(signature) {
            if queue.len() > 1 {
                if let Some(next) = queue.pop_front() {
                    return Ok(next);
                }
            }
            if let Some(last) = queue.front() {
                return Ok(last.clone());
            }
        }
        Ok(self
            .default_status
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(ConfirmationStatus::Confirmed))
    }
}

/// Clock that only moves when told to.
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Service harness
// ============================================================================

pub const START: i64 = 1_700_000_000;

pub struct Harness {
    pub service: Arc<StakingService>,
    pub ledger: Arc<MockLedger>,
    pub clock: Arc<ManualClock>,
    pub store: PositionStore,
    pub signer: KeypairSigner,
}

impl Harness {
    /// Service over a fresh ledger with min stake 1, 10 s confirmation
    /// timeout and 1 s polling.
    pub fn new() -> Self {
        Self::with_store(PositionStore::new())
    }

    pub fn with_store(store: PositionStore) -> Self {
        Self::build(store, KeypairSigner::new(Keypair::new()))
    }

    pub fn build(store: PositionStore, signer: KeypairSigner) -> Self {
        let ledger = Arc::new(MockLedger::new());
        let clock = Arc::new(ManualClock::new(START));
        let settings = ServiceSettings {
            min_stake: 1,
            confirm_timeout: Duration::from_secs(10),
            confirm_poll_interval: Duration::from_secs(1),
            ..ServiceSettings::default()
        };
        let service = StakingService::new(ledger.clone(), store.clone(), clock.clone(), settings)
            .expect("derive staking keys");
        Self {
            service: Arc::new(service),
            ledger,
            clock,
            store,
            signer,
        }
    }

    pub fn identity(&self) -> Pubkey {
        self.signer.pubkey()
    }

    /// Put `amount` base units in the signer's token account.
    pub fn fund(&self, amount: u64) {
        let keys = self.service.staking_keys();
        let ata = keys.user_token_account(&self.identity()).expect("ata");
        let account = TokenAccount {
            mint: keys.mint,
            owner: self.identity(),
            amount,
        };
        self.ledger.set_account(ata, account.to_bytes());
    }

    /// Write the signer's on-chain stake account; `amount == 0` models an
    /// emptied stake.
    pub fn put_onchain_stake(&self, amount: u64, stake_time: i64, last_claim_time: i64) {
        let account = UserStakeAccount {
            user: self.identity(),
            amount,
            stake_time,
            last_claim_time,
        };
        let pda = self
            .service
            .staking_keys()
            .user_stake(&self.identity())
            .expect("user stake pda");
        self.ledger.set_account(pda, account.to_bytes());
    }
}
