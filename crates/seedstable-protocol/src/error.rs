use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::encoder::ArgKind;
use crate::layout::FieldType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("{schema} data too short: {actual} bytes (min {required})")]
    BufferTooShort {
        schema: &'static str,
        required: usize,
        actual: usize,
    },

    #[error("{schema} discriminator mismatch")]
    DiscriminatorMismatch { schema: &'static str },

    #[error("{schema} record has no field `{field}`")]
    MissingField {
        schema: &'static str,
        field: &'static str,
    },

    #[error("{schema}.{field} holds {found:?}, expected {expected:?}")]
    FieldTypeMismatch {
        schema: &'static str,
        field: &'static str,
        expected: FieldType,
        found: FieldType,
    },

    #[error("{schema}: expected {expected} values, got {actual}")]
    FieldCount {
        schema: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{instruction}: expected {expected} arguments, got {actual}")]
    ArgumentCount {
        instruction: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{instruction}: argument {index} is {found:?}, expected {expected:?}")]
    ArgumentKind {
        instruction: &'static str,
        index: usize,
        expected: ArgKind,
        found: ArgKind,
    },

    #[error("too many seeds: {count} (max {limit})")]
    TooManySeeds { count: usize, limit: usize },

    #[error("seed {index} too long: {len} bytes (max {limit})")]
    SeedTooLong {
        index: usize,
        len: usize,
        limit: usize,
    },

    #[error("no off-curve bump seed exists for program {program_id}")]
    DerivationExhausted { program_id: Pubkey },

    #[error("transaction encoding: {0}")]
    Serialize(String),
}

impl ProtocolError {
    /// True for failures caused by malformed or short account bytes.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::BufferTooShort { .. }
                | Self::DiscriminatorMismatch { .. }
                | Self::MissingField { .. }
                | Self::FieldTypeMismatch { .. }
                | Self::FieldCount { .. }
        )
    }
}
