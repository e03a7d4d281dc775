//! Transaction assembly.
//!
//! A [`TransactionDraft`] holds the fee payer and instructions but no
//! blockhash. The blockhash is attached by [`TransactionDraft::seal`] right
//! before signing, so a draft that sat around (slow confirmation prompt,
//! user retry) is always re-sealed against a fresh one.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use solana_sdk::{
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::Message,
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};

use crate::error::ProtocolError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    fee_payer: Pubkey,
    instructions: Vec<Instruction>,
}

impl TransactionDraft {
    pub fn new(fee_payer: Pubkey) -> Self {
        Self {
            fee_payer,
            instructions: Vec::new(),
        }
    }

    pub fn with_instruction(mut self, ix: Instruction) -> Self {
        self.instructions.push(ix);
        self
    }

    pub fn push(&mut self, ix: Instruction) {
        self.instructions.push(ix);
    }

    pub fn fee_payer(&self) -> &Pubkey {
        &self.fee_payer
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Account references of every instruction, in the order supplied.
    pub fn account_refs(&self) -> impl Iterator<Item = &AccountMeta> {
        self.instructions.iter().flat_map(|ix| ix.accounts.iter())
    }

    /// Compile against `recent_blockhash`. Signature slots are zeroed; the
    /// signer fills them.
    pub fn seal(&self, recent_blockhash: Hash) -> Transaction {
        let message =
            Message::new_with_blockhash(&self.instructions, Some(&self.fee_payer), &recent_blockhash);
        Transaction {
            signatures: vec![Signature::default(); message.header.num_required_signatures as usize],
            message,
        }
    }
}

/// Wire encoding used by wallets and `sendTransaction`: base64(bincode(tx)).
pub fn to_base64(tx: &Transaction) -> Result<String, ProtocolError> {
    let bytes = bincode::serialize(tx).map_err(|e| ProtocolError::Serialize(e.to_string()))?;
    Ok(BASE64.encode(bytes))
}

pub fn from_base64(encoded: &str) -> Result<Transaction, ProtocolError> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| ProtocolError::Serialize(e.to_string()))?;
    bincode::deserialize(&bytes).map_err(|e| ProtocolError::Serialize(e.to_string()))
}
