//! Program IDs, PDA seeds and economic constants shared by client and tests.

use solana_sdk::pubkey::Pubkey;

// ============================================================================
// Program IDs (devnet deployment)
// ============================================================================

/// SeedStable collateral protocol (owns the `ProtocolState` singleton).
pub const PROTOCOL_PROGRAM_ID_STR: &str = "HBktVPq8VSR42ugq3WoeHhqWqjSP8y2S4coVN7iRAAVD";
/// SDAO staking program (pool, vault, per-user stake records).
pub const STAKING_PROGRAM_ID_STR: &str = "AnwNEDsBwSHqy3CdKLv2kieXD5QLqNqdVxEB8zCfPrrC";
/// SeedDAO governance program.
pub const DAO_PROGRAM_ID_STR: &str = "imhPqBdTKnajpiWiKY88kssdWC4eiwHvaLfQNu5vEvR";
/// SDAO token mint.
pub const SDAO_MINT_STR: &str = "9N1zAerRJnQEqoCvabYmPzbokai2TMK5F8Jb8cEBZSvt";

pub const SPL_TOKEN_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJe1bJo");
pub const SYSTEM_PROGRAM_ID: Pubkey = solana_sdk::pubkey!("11111111111111111111111111111111");
pub const RENT_SYSVAR_ID: Pubkey =
    solana_sdk::pubkey!("SysvarRent111111111111111111111111111111111");

pub const PROTOCOL_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("HBktVPq8VSR42ugq3WoeHhqWqjSP8y2S4coVN7iRAAVD");
pub const STAKING_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("AnwNEDsBwSHqy3CdKLv2kieXD5QLqNqdVxEB8zCfPrrC");
pub const DAO_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("imhPqBdTKnajpiWiKY88kssdWC4eiwHvaLfQNu5vEvR");
pub const SDAO_MINT: Pubkey = solana_sdk::pubkey!("9N1zAerRJnQEqoCvabYmPzbokai2TMK5F8Jb8cEBZSvt");

// ============================================================================
// PDA seeds
// ============================================================================

pub const PROTOCOL_SEED: &[u8] = b"protocol";
pub const TREASURY_SEED: &[u8] = b"treasury";
pub const STAKING_POOL_SEED: &[u8] = b"staking_pool";
pub const STAKING_AUTHORITY_SEED: &[u8] = b"staking_authority";
pub const STAKING_VAULT_SEED: &[u8] = b"staking_vault";
pub const USER_STAKE_SEED: &[u8] = b"user_stake";
pub const DAO_STATE_SEED: &[u8] = b"dao_state";
pub const PROPOSAL_SEED: &[u8] = b"proposal";
pub const VOTE_SEED: &[u8] = b"vote";
pub const DAO_STAKE_SEED: &[u8] = b"stake";

// ============================================================================
// Staking economics (must match the staking program)
// ============================================================================

/// 18.5% APY.
pub const DEFAULT_APY_BASIS_POINTS: u64 = 1_850;
/// 100 SDAO at 6 decimals.
pub const DEFAULT_MIN_STAKE_UNITS: u64 = 100_000_000;
pub const SDAO_DECIMALS: u8 = 6;
pub const BASIS_POINTS_DENOMINATOR: u64 = 10_000;
/// 365 days; the program ignores leap years.
pub const SECONDS_PER_YEAR: i64 = 365 * 24 * 60 * 60;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_ids_match_typed_ids() {
        assert_eq!(PROTOCOL_PROGRAM_ID.to_string(), PROTOCOL_PROGRAM_ID_STR);
        assert_eq!(STAKING_PROGRAM_ID.to_string(), STAKING_PROGRAM_ID_STR);
        assert_eq!(DAO_PROGRAM_ID.to_string(), DAO_PROGRAM_ID_STR);
        assert_eq!(SDAO_MINT.to_string(), SDAO_MINT_STR);
    }
}
