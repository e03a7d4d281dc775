//! Staking client for the SeedStable programs.
//!
//! Wire-level work (addresses, instruction payloads, account layouts) lives in
//! `seedstable-protocol`. This crate adds the ledger transport, the reward
//! accrual engine, the local position store and the [`StakingService`] that
//! ties them together.

pub mod accrual;
pub mod clock;
pub mod config;
pub mod error;
pub mod service;
pub mod signer;
pub mod store;
pub mod ticker;
pub mod transport;

#[cfg(test)]
pub mod mock;

pub use accrual::{Phase, RewardRate, StakePosition};
pub use clock::{Clock, SystemClock};
pub use error::{ClientError, ErrorKind};
pub use service::{OperationResult, PositionView, ServiceSettings, StakingService};
pub use signer::{detect_signer, KeypairSigner, TransactionSigner};
pub use store::{PositionStore, TransactionKind, TransactionRecord};
pub use ticker::RewardTicker;
pub use transport::{LedgerTransport, RpcTransport};
