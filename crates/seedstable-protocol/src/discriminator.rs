use sha2::{Digest, Sha256};

/// Length of every Anchor discriminator (instruction and account).
pub const DISCRIMINATOR_LEN: usize = 8;

pub type Discriminator = [u8; DISCRIMINATOR_LEN];

/// Anchor instruction discriminator: sha256("global:<name>")[..8].
///
/// Callers building payloads should go through an [`InstructionSchema`],
/// which computes this once per instruction and caches it.
///
/// [`InstructionSchema`]: crate::encoder::InstructionSchema
pub fn instruction_discriminator(name: &str) -> Discriminator {
    prefixed_hash("global", name)
}

/// Anchor account discriminator: sha256("account:<TypeName>")[..8].
pub fn account_discriminator(type_name: &str) -> Discriminator {
    prefixed_hash("account", type_name)
}

fn prefixed_hash(namespace: &str, name: &str) -> Discriminator {
    let hash = Sha256::digest(format!("{namespace}:{name}").as_bytes());
    let mut out = [0u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(&hash[..DISCRIMINATOR_LEN]);
    out
}
