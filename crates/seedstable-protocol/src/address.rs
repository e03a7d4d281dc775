//! Program-derived addresses.
//!
//! `sha256(seed_0 ‖ … ‖ seed_n ‖ bump ‖ program_id ‖ "ProgramDerivedAddress")`,
//! accepted only when the digest is not a valid Ed25519 point, so no private
//! key can exist for it. Bumps are searched from 255 downward, which yields
//! the same canonical bump the on-chain runtime and Anchor's `seeds`/`bump`
//! constraints expect.

use curve25519_dalek::edwards::CompressedEdwardsY;
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;

use crate::constants::{
    ASSOCIATED_TOKEN_PROGRAM_ID, DAO_STAKE_SEED, DAO_STATE_SEED, PROPOSAL_SEED, PROTOCOL_SEED,
    SPL_TOKEN_PROGRAM_ID, STAKING_AUTHORITY_SEED, STAKING_POOL_SEED, STAKING_VAULT_SEED,
    TREASURY_SEED, USER_STAKE_SEED, VOTE_SEED,
};
use crate::error::ProtocolError;

/// Maximum seed slices per derivation, bump included.
pub const MAX_SEEDS: usize = 16;
pub const MAX_SEED_LEN: usize = 32;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Find the canonical derived address and its bump for `seeds`.
pub fn derive(program_id: &Pubkey, seeds: &[&[u8]]) -> Result<(Pubkey, u8), ProtocolError> {
    if seeds.len() >= MAX_SEEDS {
        return Err(ProtocolError::TooManySeeds {
            count: seeds.len(),
            limit: MAX_SEEDS - 1,
        });
    }
    for (index, seed) in seeds.iter().enumerate() {
        if seed.len() > MAX_SEED_LEN {
            return Err(ProtocolError::SeedTooLong {
                index,
                len: seed.len(),
                limit: MAX_SEED_LEN,
            });
        }
    }

    for bump in (0..=u8::MAX).rev() {
        if let Some(address) = create_address(program_id, seeds, bump) {
            return Ok((address, bump));
        }
    }
    Err(ProtocolError::DerivationExhausted {
        program_id: *program_id,
    })
}

/// Hash one candidate. `None` when the digest lies on the curve.
pub fn create_address(program_id: &Pubkey, seeds: &[&[u8]], bump: u8) -> Option<Pubkey> {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update([bump]);
    hasher.update(program_id.as_ref());
    hasher.update(PDA_MARKER);
    let digest: [u8; 32] = hasher.finalize().into();

    if is_on_curve(&digest) {
        return None;
    }
    Some(Pubkey::new_from_array(digest))
}

fn is_on_curve(bytes: &[u8; 32]) -> bool {
    CompressedEdwardsY(*bytes).decompress().is_some()
}

// ============================================================================
// Well-known accounts
// ============================================================================

pub fn protocol_state(program_id: &Pubkey) -> Result<(Pubkey, u8), ProtocolError> {
    derive(program_id, &[PROTOCOL_SEED])
}

pub fn treasury(program_id: &Pubkey) -> Result<(Pubkey, u8), ProtocolError> {
    derive(program_id, &[TREASURY_SEED])
}

pub fn staking_pool(program_id: &Pubkey) -> Result<(Pubkey, u8), ProtocolError> {
    derive(program_id, &[STAKING_POOL_SEED])
}

pub fn staking_authority(program_id: &Pubkey) -> Result<(Pubkey, u8), ProtocolError> {
    derive(program_id, &[STAKING_AUTHORITY_SEED])
}

pub fn staking_vault(program_id: &Pubkey) -> Result<(Pubkey, u8), ProtocolError> {
    derive(program_id, &[STAKING_VAULT_SEED])
}

pub fn user_stake(program_id: &Pubkey, user: &Pubkey) -> Result<(Pubkey, u8), ProtocolError> {
    derive(program_id, &[USER_STAKE_SEED, user.as_ref()])
}

/// Associated token account of `wallet` for `mint` (classic SPL token program).
pub fn associated_token_address(wallet: &Pubkey, mint: &Pubkey) -> Result<Pubkey, ProtocolError> {
    derive(
        &ASSOCIATED_TOKEN_PROGRAM_ID,
        &[wallet.as_ref(), SPL_TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
    )
    .map(|(address, _)| address)
}

pub fn dao_state(program_id: &Pubkey) -> Result<(Pubkey, u8), ProtocolError> {
    derive(program_id, &[DAO_STATE_SEED])
}

pub fn proposal(
    program_id: &Pubkey,
    dao_state: &Pubkey,
    proposal_id: u64,
) -> Result<(Pubkey, u8), ProtocolError> {
    derive(
        program_id,
        &[PROPOSAL_SEED, dao_state.as_ref(), &proposal_id.to_le_bytes()],
    )
}

pub fn vote(
    program_id: &Pubkey,
    proposal: &Pubkey,
    voter: &Pubkey,
) -> Result<(Pubkey, u8), ProtocolError> {
    derive(program_id, &[VOTE_SEED, proposal.as_ref(), voter.as_ref()])
}

pub fn dao_stake(
    program_id: &Pubkey,
    dao_state: &Pubkey,
    voter: &Pubkey,
) -> Result<(Pubkey, u8), ProtocolError> {
    derive(program_id, &[DAO_STAKE_SEED, dao_state.as_ref(), voter.as_ref()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{PROTOCOL_PROGRAM_ID, SDAO_MINT, STAKING_PROGRAM_ID};

    #[test]
    fn matches_runtime_derivation() {
        let user = Pubkey::new_from_array([7u8; 32]);
        let cases: Vec<(Pubkey, Vec<&[u8]>)> = vec![
            (PROTOCOL_PROGRAM_ID, vec![PROTOCOL_SEED]),
            (PROTOCOL_PROGRAM_ID, vec![TREASURY_SEED]),
            (STAKING_PROGRAM_ID, vec![STAKING_POOL_SEED]),
            (STAKING_PROGRAM_ID, vec![USER_STAKE_SEED, user.as_ref()]),
        ];
        for (program, seeds) in cases {
            let ours = derive(&program, &seeds).unwrap();
            let runtime = Pubkey::find_program_address(&seeds, &program);
            assert_eq!(ours, runtime);
        }
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = protocol_state(&PROTOCOL_PROGRAM_ID).unwrap();
        let b = protocol_state(&PROTOCOL_PROGRAM_ID).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn derived_address_is_off_curve() {
        let (address, bump) = staking_vault(&STAKING_PROGRAM_ID).unwrap();
        assert!(!is_on_curve(&address.to_bytes()));
        assert_eq!(
            create_address(&STAKING_PROGRAM_ID, &[STAKING_VAULT_SEED], bump),
            Some(address)
        );
    }

    #[test]
    fn different_seeds_give_different_addresses() {
        let (pool, _) = staking_pool(&STAKING_PROGRAM_ID).unwrap();
        let (authority, _) = staking_authority(&STAKING_PROGRAM_ID).unwrap();
        assert_ne!(pool, authority);
    }

    #[test]
    fn associated_token_address_uses_token_program_seed() {
        let wallet = Pubkey::new_from_array([1u8; 32]);
        let expected = Pubkey::find_program_address(
            &[wallet.as_ref(), SPL_TOKEN_PROGRAM_ID.as_ref(), SDAO_MINT.as_ref()],
            &ASSOCIATED_TOKEN_PROGRAM_ID,
        )
        .0;
        assert_eq!(associated_token_address(&wallet, &SDAO_MINT).unwrap(), expected);
    }

    #[test]
    fn rejects_long_seed() {
        let long = [0u8; 33];
        let err = derive(&PROTOCOL_PROGRAM_ID, &[&b"ok"[..], &long[..]]).unwrap_err();
        assert_eq!(err, ProtocolError::SeedTooLong { index: 1, len: 33, limit: 32 });
    }

    #[test]
    fn rejects_too_many_seeds() {
        let seeds: Vec<&[u8]> = vec![&b"s"[..]; MAX_SEEDS];
        let err = derive(&PROTOCOL_PROGRAM_ID, &seeds).unwrap_err();
        assert_eq!(err, ProtocolError::TooManySeeds { count: 16, limit: 15 });
    }
}
