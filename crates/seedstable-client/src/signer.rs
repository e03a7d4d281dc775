//! Signing capability.
//!
//! The service never sees key material, only a [`TransactionSigner`]. Wallet
//! detection is a function returning `Option<KeypairSigner>` that callers
//! match on.

use std::path::Path;

use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{keypair_from_seed, read_keypair_file, Keypair},
    signer::Signer,
    transaction::Transaction,
};

use crate::error::ClientError;

pub trait TransactionSigner: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    /// Fill this signer's signature slot in a sealed transaction.
    fn sign(&self, tx: &mut Transaction, recent_blockhash: Hash) -> Result<(), ClientError>;
}

pub struct KeypairSigner {
    keypair: Keypair,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// Load a keypair file. Accepts the Solana CLI JSON array (64 bytes) or a
    /// raw 32-byte Ed25519 secret.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if let Ok(keypair) = read_keypair_file(path) {
            return Ok(Self::new(keypair));
        }
        let bytes = std::fs::read(path)?;
        if bytes.len() != 32 {
            anyhow::bail!(
                "invalid key file {}: expected JSON keypair or 32-byte secret, got {} bytes",
                path.display(),
                bytes.len()
            );
        }
        let keypair =
            keypair_from_seed(&bytes).map_err(|e| anyhow::anyhow!("keypair conversion: {e}"))?;
        Ok(Self::new(keypair))
    }
}

impl TransactionSigner for KeypairSigner {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn sign(&self, tx: &mut Transaction, recent_blockhash: Hash) -> Result<(), ClientError> {
        tx.try_partial_sign(&[&self.keypair], recent_blockhash)
            .map_err(|e| ClientError::SignerUnavailable(e.to_string()))
    }
}

/// Probe for a usable local signer. `None` when no path is configured or the
/// file is missing or unreadable.
pub fn detect_signer(path: Option<&Path>) -> Option<KeypairSigner> {
    let path = path?;
    if !path.exists() {
        tracing::debug!("no keypair at {}", path.display());
        return None;
    }
    match KeypairSigner::load(path) {
        Ok(signer) => {
            tracing::info!(identity = %signer.pubkey(), "Loaded signer from {}", path.display());
            Some(signer)
        }
        Err(e) => {
            tracing::warn!("Keypair at {} unusable: {e}", path.display());
            None
        }
    }
}
