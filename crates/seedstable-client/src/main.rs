//! seedstable: command-line front end for the staking service.
//!
//! Every command prints one JSON document on stdout (`watch` prints one per
//! tick). Mutating commands need `--keypair`; read-only commands accept
//! `--owner` instead.

use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;

use seedstable_client::config::{parse_pubkey, Command, Config};
use seedstable_client::{
    detect_signer, ErrorKind, KeypairSigner, OperationResult, PositionStore, RewardTicker,
    RpcTransport, StakingService, SystemClock, TransactionSigner,
};
use seedstable_protocol::{address, ProtocolState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("seedstable_client=info,seedstable_protocol=info")
            }),
        )
        .init();

    let config = Config::parse();
    let settings = config.service_settings()?;

    let store = match &config.db_path {
        Some(path) => match PositionStore::with_db(path) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!("{e}; continuing with in-memory state only");
                PositionStore::new()
            }
        },
        None => PositionStore::new(),
    };

    let transport = RpcTransport::new(config.rpc_url.clone());
    tracing::info!(rpc = %transport.url(), "seedstable starting");

    let service = Arc::new(StakingService::new(
        Arc::new(transport),
        store,
        Arc::new(SystemClock),
        settings,
    )?);
    let signer = detect_signer(config.keypair.as_deref());

    match config.command.clone() {
        Command::Addresses { owner } => {
            let owner = resolve_owner(owner.as_deref(), signer.as_ref()).ok();
            print_json(&addresses(&config, &service, owner)?)?;
        }
        Command::ProtocolState => {
            let state = service.get_protocol_state().await?;
            print_json(&state.map(protocol_state_json))?;
        }
        Command::Position { owner } => {
            let owner = resolve_owner(owner.as_deref(), signer.as_ref())?;
            print_json(&service.get_position(&owner))?;
        }
        Command::Stake { amount } => {
            let amount = config.units(&amount)?;
            let result = match &signer {
                Some(s) => service.stake(s, amount).await,
                None => signer_missing(),
            };
            report(&result)?;
        }
        Command::Unstake { amount } => {
            let amount = config.units(&amount)?;
            let result = match &signer {
                Some(s) => service.unstake(s, amount).await,
                None => signer_missing(),
            };
            report(&result)?;
        }
        Command::Claim => {
            let result = match &signer {
                Some(s) => service.claim(s).await,
                None => signer_missing(),
            };
            report(&result)?;
        }
        Command::Pause { lift } => {
            let result = match &signer {
                Some(s) => service.set_paused(s, !lift).await,
                None => signer_missing(),
            };
            report(&result)?;
        }
        Command::ResumePending { owner } => {
            let owner = resolve_owner(owner.as_deref(), signer.as_ref())?;
            print_json(&service.resume_pending(&owner).await?)?;
        }
        Command::Sync { owner } => {
            let owner = resolve_owner(owner.as_deref(), signer.as_ref())?;
            let found = service.sync(&owner).await?;
            if !found {
                tracing::info!(identity = %owner, "No on-chain stake account");
            }
            print_json(&service.get_position(&owner))?;
        }
        Command::Watch { owner } => {
            let owner = resolve_owner(owner.as_deref(), signer.as_ref())?;
            watch(service, owner, config.tick_period()).await?;
        }
        Command::DraftStake { owner, amount } => {
            let owner = parse_pubkey(&owner)?;
            let amount = config.units(&amount)?;
            let encoded = service.draft_stake(&owner, amount).await?;
            print_json(&json!({ "owner": owner.to_string(), "amount": amount, "transaction": encoded }))?;
        }
    }
    Ok(())
}

fn resolve_owner(owner: Option<&str>, signer: Option<&KeypairSigner>) -> anyhow::Result<Pubkey> {
    match (owner, signer) {
        (Some(s), _) => parse_pubkey(s),
        (None, Some(signer)) => Ok(signer.pubkey()),
        (None, None) => anyhow::bail!("pass --owner or --keypair"),
    }
}

fn signer_missing() -> OperationResult {
    OperationResult {
        success: false,
        submission_id: None,
        message: "no signer available; pass --keypair".to_string(),
        error: Some(ErrorKind::SignerUnavailable),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print the result; a failed operation exits non-zero.
fn report(result: &OperationResult) -> anyhow::Result<()> {
    print_json(result)?;
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn watch(
    service: Arc<StakingService>,
    owner: Pubkey,
    period: std::time::Duration,
) -> anyhow::Result<()> {
    let ticker = RewardTicker::spawn(service, owner, period);
    let mut rx = ticker.subscribe();
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = rx.borrow_and_update().clone();
                println!("{}", serde_json::to_string(&view)?);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }
    ticker.cancel();
    Ok(())
}

fn addresses(
    config: &Config,
    service: &StakingService,
    owner: Option<Pubkey>,
) -> anyhow::Result<serde_json::Value> {
    let protocol = config.protocol_program_id()?;
    let dao = config.dao_program_id()?;
    let keys = service.staking_keys();

    let (protocol_state, protocol_bump) = address::protocol_state(&protocol)?;
    let (treasury, _) = address::treasury(&protocol)?;
    let (dao_state, _) = address::dao_state(&dao)?;

    let mut out = json!({
        "protocol_program": protocol.to_string(),
        "protocol_state": protocol_state.to_string(),
        "protocol_bump": protocol_bump,
        "treasury": treasury.to_string(),
        "staking_program": keys.program_id.to_string(),
        "staking_pool": keys.pool.to_string(),
        "staking_authority": keys.authority.to_string(),
        "staking_authority_bump": keys.authority_bump,
        "staking_vault": keys.vault.to_string(),
        "mint": keys.mint.to_string(),
        "dao_program": dao.to_string(),
        "dao_state": dao_state.to_string(),
    });
    if let Some(owner) = owner {
        let (dao_stake, _) = address::dao_stake(&dao, &dao_state, &owner)?;
        out["owner"] = json!(owner.to_string());
        out["user_stake"] = json!(keys.user_stake(&owner)?.to_string());
        out["user_token_account"] = json!(keys.user_token_account(&owner)?.to_string());
        out["dao_stake"] = json!(dao_stake.to_string());
    }
    Ok(out)
}

fn protocol_state_json(state: ProtocolState) -> serde_json::Value {
    json!({
        "authority": state.authority.to_string(),
        "asset_mint": state.asset_mint.to_string(),
        "treasury": state.treasury.to_string(),
        "total_collateral_value": state.total_collateral_value,
        "total_supply": state.total_supply,
        "collateral_ratio": state.collateral_ratio,
        "min_collateral_ratio": state.min_collateral_ratio,
        "peg_deviation_threshold": state.peg_deviation_threshold,
        "is_paused": state.is_paused,
        "last_rebalance_time": state.last_rebalance_time,
        "bump": state.bump,
    })
}
