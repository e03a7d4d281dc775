//! Typed views over the program accounts the client reads.
//!
//! Each type pairs a static [`Schema`] with a struct. `decode(None)` is
//! `Ok(None)` (account not created yet), matching `Schema::decode`.

use solana_sdk::pubkey::Pubkey;

use crate::error::ProtocolError;
use crate::layout::{Field, FieldType, Record, Schema, Value};

// ============================================================================
// ProtocolState (collateral protocol singleton, seeds ["protocol"])
// ============================================================================

pub static PROTOCOL_STATE_LAYOUT: Schema = Schema::new(
    "ProtocolState",
    Some("ProtocolState"),
    &[
        Field::new("discriminator", 0, FieldType::Discriminator),
        Field::new("authority", 8, FieldType::Pubkey),
        Field::new("stablecoin_mint", 40, FieldType::Pubkey),
        Field::new("treasury", 72, FieldType::Pubkey),
        Field::new("total_collateral_value", 104, FieldType::U64),
        Field::new("total_supply", 112, FieldType::U64),
        Field::new("collateral_ratio", 120, FieldType::U64),
        Field::new("min_collateral_ratio", 128, FieldType::U64),
        Field::new("peg_deviation_threshold", 136, FieldType::U64),
        Field::new("is_paused", 144, FieldType::Bool),
        Field::new("last_rebalance_time", 145, FieldType::I64),
        Field::new("bump", 153, FieldType::U8),
    ],
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolState {
    pub authority: Pubkey,
    pub asset_mint: Pubkey,
    pub treasury: Pubkey,
    pub total_collateral_value: u64,
    pub total_supply: u64,
    pub collateral_ratio: u64,
    pub min_collateral_ratio: u64,
    pub peg_deviation_threshold: u64,
    pub is_paused: bool,
    pub last_rebalance_time: i64,
    pub bump: u8,
}

impl ProtocolState {
    pub const LEN: usize = 154;

    pub fn decode(data: Option<&[u8]>) -> Result<Option<Self>, ProtocolError> {
        PROTOCOL_STATE_LAYOUT
            .decode(data)?
            .map(|r| Self::from_record(&r))
            .transpose()
    }

    fn from_record(r: &Record) -> Result<Self, ProtocolError> {
        Ok(Self {
            authority: r.pubkey("authority")?,
            asset_mint: r.pubkey("stablecoin_mint")?,
            treasury: r.pubkey("treasury")?,
            total_collateral_value: r.u64("total_collateral_value")?,
            total_supply: r.u64("total_supply")?,
            collateral_ratio: r.u64("collateral_ratio")?,
            min_collateral_ratio: r.u64("min_collateral_ratio")?,
            peg_deviation_threshold: r.u64("peg_deviation_threshold")?,
            is_paused: r.bool("is_paused")?,
            last_rebalance_time: r.i64("last_rebalance_time")?,
            bump: r.u8("bump")?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let disc = PROTOCOL_STATE_LAYOUT.discriminator().unwrap_or_default();
        Record::from_values(
            &PROTOCOL_STATE_LAYOUT,
            vec![
                Value::Discriminator(disc),
                Value::Pubkey(self.authority),
                Value::Pubkey(self.asset_mint),
                Value::Pubkey(self.treasury),
                Value::U64(self.total_collateral_value),
                Value::U64(self.total_supply),
                Value::U64(self.collateral_ratio),
                Value::U64(self.min_collateral_ratio),
                Value::U64(self.peg_deviation_threshold),
                Value::Bool(self.is_paused),
                Value::I64(self.last_rebalance_time),
                Value::U8(self.bump),
            ],
        )
        .to_bytes()
    }
}

// ============================================================================
// StakingPool (seeds ["staking_pool"])
// ============================================================================

pub static STAKING_POOL_LAYOUT: Schema = Schema::new(
    "StakingPool",
    Some("StakingPool"),
    &[
        Field::new("discriminator", 0, FieldType::Discriminator),
        Field::new("authority", 8, FieldType::Pubkey),
        Field::new("authority_bump", 40, FieldType::U8),
        Field::new("sdao_mint", 41, FieldType::Pubkey),
        Field::new("vault", 73, FieldType::Pubkey),
        Field::new("total_staked", 105, FieldType::U64),
        Field::new("apy_basis_points", 113, FieldType::U16),
        Field::new("min_stake_amount", 115, FieldType::U64),
    ],
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakingPoolAccount {
    pub authority: Pubkey,
    pub authority_bump: u8,
    pub mint: Pubkey,
    pub vault: Pubkey,
    pub total_staked: u64,
    pub apy_basis_points: u16,
    pub min_stake_amount: u64,
}

impl StakingPoolAccount {
    pub const LEN: usize = 123;

    pub fn decode(data: Option<&[u8]>) -> Result<Option<Self>, ProtocolError> {
        let Some(r) = STAKING_POOL_LAYOUT.decode(data)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            authority: r.pubkey("authority")?,
            authority_bump: r.u8("authority_bump")?,
            mint: r.pubkey("sdao_mint")?,
            vault: r.pubkey("vault")?,
            total_staked: r.u64("total_staked")?,
            apy_basis_points: r.u16("apy_basis_points")?,
            min_stake_amount: r.u64("min_stake_amount")?,
        }))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let disc = STAKING_POOL_LAYOUT.discriminator().unwrap_or_default();
        Record::from_values(
            &STAKING_POOL_LAYOUT,
            vec![
                Value::Discriminator(disc),
                Value::Pubkey(self.authority),
                Value::U8(self.authority_bump),
                Value::Pubkey(self.mint),
                Value::Pubkey(self.vault),
                Value::U64(self.total_staked),
                Value::U16(self.apy_basis_points),
                Value::U64(self.min_stake_amount),
            ],
        )
        .to_bytes()
    }
}

// ============================================================================
// UserStake (seeds ["user_stake", user])
// ============================================================================

pub static USER_STAKE_LAYOUT: Schema = Schema::new(
    "UserStake",
    Some("UserStake"),
    &[
        Field::new("discriminator", 0, FieldType::Discriminator),
        Field::new("user", 8, FieldType::Pubkey),
        Field::new("amount", 40, FieldType::U64),
        Field::new("stake_time", 48, FieldType::I64),
        Field::new("last_claim_time", 56, FieldType::I64),
    ],
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserStakeAccount {
    pub user: Pubkey,
    pub amount: u64,
    pub stake_time: i64,
    pub last_claim_time: i64,
}

impl UserStakeAccount {
    pub const LEN: usize = 64;

    pub fn decode(data: Option<&[u8]>) -> Result<Option<Self>, ProtocolError> {
        let Some(r) = USER_STAKE_LAYOUT.decode(data)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            user: r.pubkey("user")?,
            amount: r.u64("amount")?,
            stake_time: r.i64("stake_time")?,
            last_claim_time: r.i64("last_claim_time")?,
        }))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let disc = USER_STAKE_LAYOUT.discriminator().unwrap_or_default();
        Record::from_values(
            &USER_STAKE_LAYOUT,
            vec![
                Value::Discriminator(disc),
                Value::Pubkey(self.user),
                Value::U64(self.amount),
                Value::I64(self.stake_time),
                Value::I64(self.last_claim_time),
            ],
        )
        .to_bytes()
    }
}

// ============================================================================
// SPL token account (prefix only)
// ============================================================================

pub static TOKEN_ACCOUNT_LAYOUT: Schema = Schema::new(
    "TokenAccount",
    None,
    &[
        Field::new("mint", 0, FieldType::Pubkey),
        Field::new("owner", 32, FieldType::Pubkey),
        Field::new("amount", 64, FieldType::U64),
    ],
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccount {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
}

impl TokenAccount {
    pub fn decode(data: Option<&[u8]>) -> Result<Option<Self>, ProtocolError> {
        let Some(r) = TOKEN_ACCOUNT_LAYOUT.decode(data)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            mint: r.pubkey("mint")?,
            owner: r.pubkey("owner")?,
            amount: r.u64("amount")?,
        }))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        Record::from_values(
            &TOKEN_ACCOUNT_LAYOUT,
            vec![
                Value::Pubkey(self.mint),
                Value::Pubkey(self.owner),
                Value::U64(self.amount),
            ],
        )
        .to_bytes()
    }
}
