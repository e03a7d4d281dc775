//! Instruction payload encoder.
//!
//! Payload = 8-byte discriminator followed by the arguments in declaration
//! order, Borsh-encoded (little-endian fixed widths, 1-byte bools, 1-byte enum
//! discriminants, 1-byte option tags). Widths and order are a hard contract
//! with the on-chain program: a mismatch is either rejected or, worse,
//! silently misread.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};

use solana_sdk::pubkey::Pubkey;

use crate::discriminator::{instruction_discriminator, Discriminator, DISCRIMINATOR_LEN};
use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    U8,
    U16,
    U64,
    I64,
    Bool,
    Pubkey,
    Enum,
    Option,
}

/// One typed instruction argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    U8(u8),
    U16(u16),
    U64(u64),
    I64(i64),
    Bool(bool),
    Pubkey(Pubkey),
    /// Discriminant byte, then the variant's fields in order.
    Enum { variant: u8, fields: Vec<Arg> },
    /// Tag byte 0 for `None`; tag byte 1 then the value for `Some`.
    Option(Option<Box<Arg>>),
}

impl Arg {
    pub fn kind(&self) -> ArgKind {
        match self {
            Arg::U8(_) => ArgKind::U8,
            Arg::U16(_) => ArgKind::U16,
            Arg::U64(_) => ArgKind::U64,
            Arg::I64(_) => ArgKind::I64,
            Arg::Bool(_) => ArgKind::Bool,
            Arg::Pubkey(_) => ArgKind::Pubkey,
            Arg::Enum { .. } => ArgKind::Enum,
            Arg::Option(_) => ArgKind::Option,
        }
    }

    /// Unit enum variant (no payload).
    pub fn variant(variant: u8) -> Self {
        Arg::Enum { variant, fields: Vec::new() }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        match self {
            Arg::U8(v) => out.push(*v),
            Arg::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Arg::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Arg::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Arg::Bool(v) => out.push(u8::from(*v)),
            Arg::Pubkey(k) => out.extend_from_slice(k.as_ref()),
            Arg::Enum { variant, fields } => {
                out.push(*variant);
                for f in fields {
                    f.write(out);
                }
            }
            Arg::Option(None) => out.push(0),
            Arg::Option(Some(inner)) => {
                out.push(1);
                inner.write(out);
            }
        }
    }
}

/// Encode an ad-hoc instruction by name.
///
/// The discriminator is looked up in a process-wide cache keyed by name, so
/// repeated calls reuse the first computation. Prefer a declared
/// [`InstructionSchema`], which also checks argument kinds.
pub fn encode(instruction_name: &str, args: &[Arg]) -> Vec<u8> {
    let mut data = Vec::with_capacity(DISCRIMINATOR_LEN + 32);
    data.extend_from_slice(&cached_discriminator(instruction_name));
    for arg in args {
        arg.write(&mut data);
    }
    data
}

fn cached_discriminator(name: &str) -> Discriminator {
    static CACHE: OnceLock<Mutex<HashMap<String, Discriminator>>> = OnceLock::new();
    let mut cache = CACHE
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    *cache
        .entry(name.to_owned())
        .or_insert_with(|| instruction_discriminator(name))
}

/// Declared argument list of one program instruction.
pub struct InstructionSchema {
    name: &'static str,
    args: &'static [ArgKind],
    discriminator: OnceLock<Discriminator>,
}

impl InstructionSchema {
    pub const fn new(name: &'static str, args: &'static [ArgKind]) -> Self {
        Self {
            name,
            args,
            discriminator: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn args(&self) -> &'static [ArgKind] {
        self.args
    }

    pub fn discriminator(&self) -> Discriminator {
        *self
            .discriminator
            .get_or_init(|| instruction_discriminator(self.name))
    }

    /// Encode `args` after checking count and kinds against the declaration.
    pub fn encode(&self, args: &[Arg]) -> Result<Vec<u8>, ProtocolError> {
        if args.len() != self.args.len() {
            return Err(ProtocolError::ArgumentCount {
                instruction: self.name,
                expected: self.args.len(),
                actual: args.len(),
            });
        }
        for (index, (arg, expected)) in args.iter().zip(self.args).enumerate() {
            if arg.kind() != *expected {
                return Err(ProtocolError::ArgumentKind {
                    instruction: self.name,
                    index,
                    expected: *expected,
                    found: arg.kind(),
                });
            }
        }

        let mut data = Vec::with_capacity(DISCRIMINATOR_LEN + 8 * args.len());
        data.extend_from_slice(&self.discriminator());
        for arg in args {
            arg.write(&mut data);
        }
        Ok(data)
    }
}

impl std::fmt::Debug for InstructionSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstructionSchema")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static DEMO: InstructionSchema =
        InstructionSchema::new("demo", &[ArgKind::U64, ArgKind::I64, ArgKind::Bool]);

    #[test]
    fn fixed_width_little_endian_layout() {
        let data = DEMO
            .encode(&[Arg::U64(0x0102), Arg::I64(-1), Arg::Bool(true)])
            .unwrap();
        assert_eq!(data.len(), 8 + 8 + 8 + 1);
        assert_eq!(&data[..8], &instruction_discriminator("demo"));
        assert_eq!(&data[8..16], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&data[16..24], &[0xff; 8]);
        assert_eq!(data[24], 1);
    }

    #[test]
    fn schema_and_ad_hoc_paths_agree() {
        let args = [Arg::U64(7), Arg::I64(3), Arg::Bool(false)];
        assert_eq!(DEMO.encode(&args).unwrap(), encode("demo", &args));
    }

    #[test]
    fn schema_rejects_wrong_count() {
        let err = DEMO.encode(&[Arg::U64(1)]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::ArgumentCount {
                instruction: "demo",
                expected: 3,
                actual: 1
            }
        );
    }

    #[test]
    fn schema_rejects_wrong_kind() {
        let err = DEMO
            .encode(&[Arg::U64(1), Arg::U64(2), Arg::Bool(true)])
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::ArgumentKind { index: 1, expected: ArgKind::I64, found: ArgKind::U64, .. }
        ));
    }

    #[test]
    fn enum_writes_discriminant_then_payload() {
        let mut out = Vec::new();
        Arg::Enum { variant: 2, fields: vec![Arg::U16(0x0304)] }.write(&mut out);
        assert_eq!(out, vec![2, 0x04, 0x03]);

        let mut unit = Vec::new();
        Arg::variant(1).write(&mut unit);
        assert_eq!(unit, vec![1]);
    }

    #[test]
    fn option_writes_tag_byte() {
        let mut none = Vec::new();
        Arg::Option(None).write(&mut none);
        assert_eq!(none, vec![0]);

        let mut some = Vec::new();
        Arg::Option(Some(Box::new(Arg::Bool(true)))).write(&mut some);
        assert_eq!(some, vec![1, 1]);
    }

    #[test]
    fn cached_discriminator_is_stable() {
        let a = encode("emergency_pause", &[]);
        let b = encode("emergency_pause", &[]);
        assert_eq!(a, b);
        assert_eq!(a, instruction_discriminator("emergency_pause").to_vec());
    }
}
