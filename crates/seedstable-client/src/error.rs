use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use thiserror::Error;

use seedstable_protocol::ProtocolError;

/// Machine-readable failure class, surfaced in every operation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotInitialized,
    InsufficientBalance,
    BelowMinimumStake,
    Unauthorized,
    Decode,
    Encode,
    DerivationExhausted,
    NetworkFailure,
    TransactionRejected,
    Timeout,
    OperationInProgress,
    InvalidAmount,
    NothingToClaim,
    SignerUnavailable,
    Store,
}

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("{0} account not initialized")]
    NotInitialized(&'static str),

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u64, available: u64 },

    #[error("amount {amount} below minimum stake {minimum}")]
    BelowMinimumStake { amount: u64, minimum: u64 },

    #[error("signer {signer} is not the protocol authority {authority}")]
    Unauthorized { signer: Pubkey, authority: Pubkey },

    #[error("decode: {0}")]
    Decode(ProtocolError),

    #[error("encode: {0}")]
    Encode(ProtocolError),

    #[error("no valid bump seed for program {0}")]
    DerivationExhausted(Pubkey),

    #[error("network: {0}")]
    NetworkFailure(String),

    #[error("transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("transaction {signature} not confirmed within {secs}s")]
    Timeout { signature: Signature, secs: u64 },

    #[error("an operation is already in flight for {0}")]
    OperationInProgress(Pubkey),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("no rewards to claim")]
    NothingToClaim,

    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),

    #[error("store: {0}")]
    Store(String),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInitialized(_) => ErrorKind::NotInitialized,
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::BelowMinimumStake { .. } => ErrorKind::BelowMinimumStake,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Encode(_) => ErrorKind::Encode,
            Self::DerivationExhausted(_) => ErrorKind::DerivationExhausted,
            Self::NetworkFailure(_) => ErrorKind::NetworkFailure,
            Self::TransactionRejected(_) => ErrorKind::TransactionRejected,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::OperationInProgress(_) => ErrorKind::OperationInProgress,
            Self::InvalidAmount(_) => ErrorKind::InvalidAmount,
            Self::NothingToClaim => ErrorKind::NothingToClaim,
            Self::SignerUnavailable(_) => ErrorKind::SignerUnavailable,
            Self::Store(_) => ErrorKind::Store,
        }
    }
}

impl From<ProtocolError> for ClientError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::DerivationExhausted { program_id } => Self::DerivationExhausted(program_id),
            e if e.is_decode_error() => Self::Decode(e),
            e => Self::Encode(e),
        }
    }
}

impl From<rusqlite::Error> for ClientError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.to_string())
    }
}
