//! Ledger transport: the only code that talks to the network.
//!
//! Reads are idempotent and retried with exponential backoff. Submissions
//! move value and are sent exactly once; a caller that wants to retry must
//! build and sign a new transaction.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use solana_rpc_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::Transaction,
};

use crate::error::ClientError;

/// Read attempts before giving up with `NetworkFailure`.
pub const READ_ATTEMPTS: u32 = 3;
const READ_BACKOFF_BASE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// Not yet seen at the requested commitment.
    Pending,
    Confirmed,
    /// Landed but the program returned an error.
    Failed(String),
}

#[async_trait]
pub trait LedgerTransport: Send + Sync {
    /// Raw account data; `None` when the account does not exist.
    async fn get_account_bytes(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, ClientError>;

    async fn latest_blockhash(&self) -> Result<Hash, ClientError>;

    /// Send once. `TransactionRejected` means the transaction cannot land;
    /// `NetworkFailure` leaves that open.
    async fn submit(&self, tx: &Transaction) -> Result<Signature, ClientError>;

    async fn confirm(&self, signature: &Signature) -> Result<ConfirmationStatus, ClientError>;
}

// ============================================================================
// JSON-RPC implementation
// ============================================================================

pub struct RpcTransport {
    rpc: RpcClient,
}

impl RpcTransport {
    pub fn new(rpc_url: String) -> Self {
        Self {
            rpc: RpcClient::new_with_commitment(rpc_url, CommitmentConfig::confirmed()),
        }
    }

    pub fn url(&self) -> String {
        self.rpc.url()
    }
}

#[async_trait]
impl LedgerTransport for RpcTransport {
    async fn get_account_bytes(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, ClientError> {
        // get_multiple_accounts returns None for a missing account instead of
        // an AccountNotFound error.
        with_read_retry("get_account", || async move {
            let accounts = self
                .rpc
                .get_multiple_accounts(&[*address])
                .await
                .map_err(|e| ClientError::NetworkFailure(e.to_string()))?;
            Ok(accounts.into_iter().next().flatten().map(|a| a.data))
        })
        .await
    }

    async fn latest_blockhash(&self) -> Result<Hash, ClientError> {
        with_read_retry("get_latest_blockhash", || async move {
            self.rpc
                .get_latest_blockhash()
                .await
                .map_err(|e| ClientError::NetworkFailure(e.to_string()))
        })
        .await
    }

    async fn submit(&self, tx: &Transaction) -> Result<Signature, ClientError> {
        self.rpc.send_transaction(tx).await.map_err(|e| {
            // Preflight simulation failures carry the program's error.
            match e.get_transaction_error() {
                Some(tx_err) => ClientError::TransactionRejected(tx_err.to_string()),
                None => ClientError::NetworkFailure(e.to_string()),
            }
        })
    }

    async fn confirm(&self, signature: &Signature) -> Result<ConfirmationStatus, ClientError> {
        // Search history too: a late reconciliation may ask about a
        // transaction older than the node's recent status cache.
        let status = with_read_retry("get_signature_status", || async move {
            self.rpc
                .get_signature_status_with_commitment_and_history(
                    signature,
                    CommitmentConfig::confirmed(),
                    true,
                )
                .await
                .map_err(|e| ClientError::NetworkFailure(e.to_string()))
        })
        .await?;
        Ok(match status {
            None => ConfirmationStatus::Pending,
            Some(Ok(())) => ConfirmationStatus::Confirmed,
            Some(Err(e)) => ConfirmationStatus::Failed(e.to_string()),
        })
    }
}

/// Run an idempotent read up to [`READ_ATTEMPTS`] times. Only
/// `NetworkFailure` is retried; anything else is returned at once.
pub async fn with_read_retry<T, F, Fut>(op: &'static str, mut f: F) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Err(ClientError::NetworkFailure(msg)) if attempt < READ_ATTEMPTS => {
                let delay = READ_BACKOFF_BASE * 2u32.pow(attempt - 1);
                tracing::warn!(op, attempt, ?delay, "read failed: {msg}; retrying");
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn read_retry_succeeds_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out = with_read_retry("test", || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(ClientError::NetworkFailure("flaky".into()))
            } else {
                Ok(n)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn read_retry_gives_up_after_bound() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = with_read_retry("test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ClientError::NetworkFailure("down".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ClientError::NetworkFailure(_)));
        assert_eq!(calls.load(Ordering::SeqCst), READ_ATTEMPTS);
    }

    #[tokio::test]
    async fn non_network_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = with_read_retry("test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ClientError::NotInitialized("ProtocolState"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ClientError::NotInitialized(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
