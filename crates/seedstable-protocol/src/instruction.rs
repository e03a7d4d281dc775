//! Instruction builders for the protocol, staking and DAO programs.
//!
//! Account order in every builder is the exact order of the program's
//! `#[derive(Accounts)]` struct. The fixture tests at the bottom pin it.

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

use crate::address;
use crate::constants::{RENT_SYSVAR_ID, SPL_TOKEN_PROGRAM_ID, SYSTEM_PROGRAM_ID};
use crate::encoder::{Arg, ArgKind, InstructionSchema};
use crate::error::ProtocolError;

// ============================================================================
// Argument schemas
// ============================================================================

pub static INITIALIZE: InstructionSchema = InstructionSchema::new("initialize", &[ArgKind::U8]);
pub static EMERGENCY_PAUSE: InstructionSchema =
    InstructionSchema::new("emergency_pause", &[ArgKind::Bool]);
pub static INITIALIZE_STAKING: InstructionSchema =
    InstructionSchema::new("initialize_staking", &[ArgKind::U8]);
pub static STAKE_TOKENS: InstructionSchema =
    InstructionSchema::new("stake_tokens", &[ArgKind::U64]);
pub static UNSTAKE_TOKENS: InstructionSchema =
    InstructionSchema::new("unstake_tokens", &[ArgKind::U64]);
pub static CLAIM_REWARDS: InstructionSchema = InstructionSchema::new("claim_rewards", &[]);
pub static VOTE_PROPOSAL: InstructionSchema =
    InstructionSchema::new("vote_proposal", &[ArgKind::Enum]);

// ============================================================================
// Protocol program
// ============================================================================

/// `initialize(bump)`: creates the protocol singleton. The stablecoin mint
/// is a fresh keypair and must co-sign.
pub fn initialize(
    program_id: &Pubkey,
    authority: &Pubkey,
    stablecoin_mint: &Pubkey,
) -> Result<Instruction, ProtocolError> {
    let (protocol_state, bump) = address::protocol_state(program_id)?;
    let (treasury, _) = address::treasury(program_id)?;
    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*authority, true),              // authority
            AccountMeta::new(protocol_state, false),         // protocol_state
            AccountMeta::new(*stablecoin_mint, true),        // stablecoin_mint
            AccountMeta::new(treasury, false),               // treasury
            AccountMeta::new_readonly(SPL_TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::new_readonly(RENT_SYSVAR_ID, false),
        ],
        data: INITIALIZE.encode(&[Arg::U8(bump)])?,
    })
}

pub fn emergency_pause(
    program_id: &Pubkey,
    authority: &Pubkey,
    pause: bool,
) -> Result<Instruction, ProtocolError> {
    let (protocol_state, _) = address::protocol_state(program_id)?;
    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(*authority, true), // authority
            AccountMeta::new(protocol_state, false),     // protocol_state
        ],
        data: EMERGENCY_PAUSE.encode(&[Arg::Bool(pause)])?,
    })
}

// ============================================================================
// Staking program
// ============================================================================

/// Program-owned accounts shared by every staking instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakingKeys {
    pub program_id: Pubkey,
    pub mint: Pubkey,
    pub pool: Pubkey,
    pub authority: Pubkey,
    pub authority_bump: u8,
    pub vault: Pubkey,
}

impl StakingKeys {
    pub fn derive(program_id: &Pubkey, mint: &Pubkey) -> Result<Self, ProtocolError> {
        let (pool, _) = address::staking_pool(program_id)?;
        let (authority, authority_bump) = address::staking_authority(program_id)?;
        let (vault, _) = address::staking_vault(program_id)?;
        Ok(Self {
            program_id: *program_id,
            mint: *mint,
            pool,
            authority,
            authority_bump,
            vault,
        })
    }

    pub fn user_stake(&self, user: &Pubkey) -> Result<Pubkey, ProtocolError> {
        address::user_stake(&self.program_id, user).map(|(k, _)| k)
    }

    pub fn user_token_account(&self, user: &Pubkey) -> Result<Pubkey, ProtocolError> {
        address::associated_token_address(user, &self.mint)
    }
}

pub fn initialize_staking(keys: &StakingKeys, admin: &Pubkey) -> Result<Instruction, ProtocolError> {
    Ok(Instruction {
        program_id: keys.program_id,
        accounts: vec![
            AccountMeta::new(keys.pool, false),                // staking_pool
            AccountMeta::new_readonly(keys.authority, false),  // staking_authority
            AccountMeta::new(*admin, true),                    // authority
            AccountMeta::new_readonly(keys.mint, false),       // sdao_mint
            AccountMeta::new(keys.vault, false),               // vault
            AccountMeta::new_readonly(SPL_TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::new_readonly(RENT_SYSVAR_ID, false),
        ],
        data: INITIALIZE_STAKING.encode(&[Arg::U8(keys.authority_bump)])?,
    })
}

pub fn stake_tokens(
    keys: &StakingKeys,
    user: &Pubkey,
    amount: u64,
) -> Result<Instruction, ProtocolError> {
    Ok(Instruction {
        program_id: keys.program_id,
        accounts: vec![
            AccountMeta::new(keys.pool, false),                      // staking_pool
            AccountMeta::new(keys.user_stake(user)?, false),         // user_stake
            AccountMeta::new(*user, true),                           // user
            AccountMeta::new(keys.user_token_account(user)?, false), // user_token_account
            AccountMeta::new(keys.vault, false),                     // vault
            AccountMeta::new_readonly(SPL_TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::new_readonly(RENT_SYSVAR_ID, false),
        ],
        data: STAKE_TOKENS.encode(&[Arg::U64(amount)])?,
    })
}

pub fn unstake_tokens(
    keys: &StakingKeys,
    user: &Pubkey,
    amount: u64,
) -> Result<Instruction, ProtocolError> {
    Ok(Instruction {
        program_id: keys.program_id,
        accounts: vec![
            AccountMeta::new(keys.pool, false),                      // staking_pool
            AccountMeta::new(keys.user_stake(user)?, false),         // user_stake
            AccountMeta::new_readonly(keys.authority, false),        // staking_authority
            AccountMeta::new(*user, true),                           // user
            AccountMeta::new(keys.user_token_account(user)?, false), // user_token_account
            AccountMeta::new(keys.vault, false),                     // vault
            AccountMeta::new_readonly(SPL_TOKEN_PROGRAM_ID, false),
        ],
        data: UNSTAKE_TOKENS.encode(&[Arg::U64(amount)])?,
    })
}

pub fn claim_rewards(keys: &StakingKeys, user: &Pubkey) -> Result<Instruction, ProtocolError> {
    Ok(Instruction {
        program_id: keys.program_id,
        accounts: vec![
            AccountMeta::new_readonly(keys.pool, false),             // staking_pool
            AccountMeta::new(keys.user_stake(user)?, false),         // user_stake
            AccountMeta::new_readonly(keys.authority, false),        // staking_authority
            AccountMeta::new(*user, true),                           // user
            AccountMeta::new(keys.user_token_account(user)?, false), // user_token_account
            AccountMeta::new(keys.vault, false),                     // vault
            AccountMeta::new_readonly(SPL_TOKEN_PROGRAM_ID, false),
        ],
        data: CLAIM_REWARDS.encode(&[])?,
    })
}

// ============================================================================
// DAO program
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VoteChoice {
    For = 0,
    Against = 1,
    Abstain = 2,
}

pub fn vote_proposal(
    program_id: &Pubkey,
    voter: &Pubkey,
    sdao_mint: &Pubkey,
    proposal_id: u64,
    choice: VoteChoice,
) -> Result<Instruction, ProtocolError> {
    let (dao_state, _) = address::dao_state(program_id)?;
    let (proposal, _) = address::proposal(program_id, &dao_state, proposal_id)?;
    let (vote, _) = address::vote(program_id, &proposal, voter)?;
    let (stake_account, _) = address::dao_stake(program_id, &dao_state, voter)?;
    let voter_tokens = address::associated_token_address(voter, sdao_mint)?;
    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(dao_state, false),     // dao_state
            AccountMeta::new(proposal, false),               // proposal
            AccountMeta::new(vote, false),                   // vote
            AccountMeta::new_readonly(stake_account, false), // stake_account
            AccountMeta::new_readonly(voter_tokens, false),  // voter_sdao_account
            AccountMeta::new(*voter, true),                  // voter
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ],
        data: VOTE_PROPOSAL.encode(&[Arg::variant(choice as u8)])?,
    })
}
