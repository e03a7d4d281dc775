use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;

use seedstable_protocol::{
    DAO_PROGRAM_ID_STR, DEFAULT_APY_BASIS_POINTS, PROTOCOL_PROGRAM_ID_STR, SDAO_DECIMALS,
    SDAO_MINT_STR, STAKING_PROGRAM_ID_STR,
};

use crate::accrual::RewardRate;
use crate::service::ServiceSettings;

// ============================================================================
// CLI
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "seedstable", about = "SeedStable staking client")]
pub struct Config {
    /// Solana RPC endpoint.
    #[arg(
        long,
        env = "SEEDSTABLE_RPC_URL",
        default_value = "https://api.devnet.solana.com"
    )]
    pub rpc_url: String,

    /// Stablecoin protocol program id (base58 or hex).
    #[arg(long, env = "SEEDSTABLE_PROTOCOL_PROGRAM", default_value = PROTOCOL_PROGRAM_ID_STR)]
    pub protocol_program: String,

    /// Staking program id (base58 or hex).
    #[arg(long, env = "SEEDSTABLE_STAKING_PROGRAM", default_value = STAKING_PROGRAM_ID_STR)]
    pub staking_program: String,

    /// Governance program id (base58 or hex).
    #[arg(long, env = "SEEDSTABLE_DAO_PROGRAM", default_value = DAO_PROGRAM_ID_STR)]
    pub dao_program: String,

    /// Staked token mint (base58 or hex).
    #[arg(long, env = "SEEDSTABLE_MINT", default_value = SDAO_MINT_STR)]
    pub mint: String,

    /// Solana keypair file (JSON array) or raw 32-byte secret.
    /// Without it only read-only commands are available.
    #[arg(long, env = "SEEDSTABLE_KEYPAIR")]
    pub keypair: Option<PathBuf>,

    /// SQLite file for positions and history.
    /// If absent, state lives in memory and is lost on exit.
    #[arg(long, env = "SEEDSTABLE_DB")]
    pub db_path: Option<PathBuf>,

    /// Reward rate in basis points per year (1850 = 18.5%).
    #[arg(long, env = "SEEDSTABLE_APY_BPS", default_value_t = DEFAULT_APY_BASIS_POINTS)]
    pub apy_bps: u64,

    /// Smallest accepted stake, in tokens (decimal).
    #[arg(long, env = "SEEDSTABLE_MIN_STAKE", default_value = "100")]
    pub min_stake: String,

    /// Token decimals.
    #[arg(long, env = "SEEDSTABLE_DECIMALS", default_value_t = SDAO_DECIMALS)]
    pub decimals: u8,

    /// Seconds to wait for a submitted transaction to confirm.
    #[arg(long, default_value_t = 60)]
    pub confirm_timeout_secs: u64,

    /// Seconds between confirmation polls.
    #[arg(long, default_value_t = 2)]
    pub confirm_poll_secs: u64,

    /// Seconds between reward recomputations in `watch`.
    #[arg(long, default_value_t = 1)]
    pub tick_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print every derived program address.
    Addresses {
        /// Wallet to derive per-user addresses for. Defaults to the signer.
        #[arg(long)]
        owner: Option<String>,
    },
    /// Fetch and decode the protocol singleton.
    ProtocolState,
    /// Show the local position with pending rewards.
    Position {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Stake tokens (decimal amount, e.g. 150.5).
    Stake { amount: String },
    /// Unstake tokens and collect pending rewards.
    Unstake { amount: String },
    /// Claim pending rewards.
    Claim,
    /// Set the emergency pause (authority only).
    Pause {
        /// Lift the pause instead of setting it.
        #[arg(long)]
        lift: bool,
    },
    /// Re-check confirmation of submissions that timed out.
    ResumePending {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Overwrite the local position from the on-chain stake account.
    Sync {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Print the position every tick until interrupted.
    Watch {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Print an unsigned stake transaction (base64) for an external signer.
    DraftStake {
        #[arg(long)]
        owner: String,
        amount: String,
    },
}

impl Config {
    pub fn protocol_program_id(&self) -> anyhow::Result<Pubkey> {
        parse_pubkey(&self.protocol_program)
            .map_err(|e| anyhow::anyhow!("invalid protocol_program: {e}"))
    }

    pub fn staking_program_id(&self) -> anyhow::Result<Pubkey> {
        parse_pubkey(&self.staking_program)
            .map_err(|e| anyhow::anyhow!("invalid staking_program: {e}"))
    }

    pub fn dao_program_id(&self) -> anyhow::Result<Pubkey> {
        parse_pubkey(&self.dao_program).map_err(|e| anyhow::anyhow!("invalid dao_program: {e}"))
    }

    pub fn mint_pubkey(&self) -> anyhow::Result<Pubkey> {
        parse_pubkey(&self.mint).map_err(|e| anyhow::anyhow!("invalid mint: {e}"))
    }

    /// Amount argument in base units at the configured decimals.
    pub fn units(&self, amount: &str) -> anyhow::Result<u64> {
        parse_ui_amount(amount, self.decimals)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(self.tick_secs.max(1))
    }

    pub fn service_settings(&self) -> anyhow::Result<ServiceSettings> {
        Ok(ServiceSettings {
            protocol_program_id: self.protocol_program_id()?,
            staking_program_id: self.staking_program_id()?,
            mint: self.mint_pubkey()?,
            rate: RewardRate::from_basis_points(self.apy_bps),
            min_stake: parse_ui_amount(&self.min_stake, self.decimals)
                .map_err(|e| anyhow::anyhow!("invalid min_stake: {e}"))?,
            decimals: self.decimals,
            confirm_timeout: Duration::from_secs(self.confirm_timeout_secs),
            confirm_poll_interval: Duration::from_secs(self.confirm_poll_secs.max(1)),
        })
    }
}

/// Parse a public key.
///
/// Accepts both formats:
///   - base58 (standard Solana format)
///   - hex, 64 digits with optional "0x" prefix
pub fn parse_pubkey(s: &str) -> anyhow::Result<Pubkey> {
    let s = s.trim();
    let is_hex = s.starts_with("0x")
        || (s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit()));
    let bytes = if is_hex {
        hex::decode(s.trim_start_matches("0x")).map_err(|e| anyhow::anyhow!("bad hex: {e}"))?
    } else {
        bs58::decode(s)
            .into_vec()
            .map_err(|e| anyhow::anyhow!("bad base58: {e}"))?
    };
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("public key must be 32 bytes"))?;
    Ok(Pubkey::new_from_array(arr))
}

/// Decimal token amount to integer base units, e.g. `"1.5"` at 6 decimals is
/// `1_500_000`. Rejects more fractional digits than `decimals`.
pub fn parse_ui_amount(s: &str, decimals: u8) -> anyhow::Result<u64> {
    let s = s.trim();
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    if whole.is_empty() && frac.is_empty() {
        anyhow::bail!("empty amount");
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        anyhow::bail!("'{s}' is not a decimal amount");
    }
    if frac.len() > usize::from(decimals) {
        anyhow::bail!("'{s}' has more than {decimals} decimal places");
    }

    let scale = 10u64
        .checked_pow(u32::from(decimals))
        .ok_or_else(|| anyhow::anyhow!("decimals {decimals} out of range"))?;
    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse()? };
    let frac_units: u64 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<width$}", width = usize::from(decimals));
        padded.parse()?
    };

    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac_units))
        .ok_or_else(|| anyhow::anyhow!("'{s}' overflows"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedstable_protocol::{SDAO_MINT, STAKING_PROGRAM_ID};

    #[test]
    fn ui_amounts() {
        assert_eq!(parse_ui_amount("100", 6).unwrap(), 100_000_000);
        assert_eq!(parse_ui_amount("1.5", 6).unwrap(), 1_500_000);
        assert_eq!(parse_ui_amount("0.000001", 6).unwrap(), 1);
        assert_eq!(parse_ui_amount(".25", 6).unwrap(), 250_000);
        assert_eq!(parse_ui_amount("7.", 6).unwrap(), 7_000_000);
        assert_eq!(parse_ui_amount("42", 0).unwrap(), 42);
    }

    #[test]
    fn ui_amount_rejects_garbage() {
        assert!(parse_ui_amount("", 6).is_err());
        assert!(parse_ui_amount(".", 6).is_err());
        assert!(parse_ui_amount("-1", 6).is_err());
        assert!(parse_ui_amount("1.2.3", 6).is_err());
        assert!(parse_ui_amount("1e6", 6).is_err());
        assert!(parse_ui_amount("0.0000001", 6).is_err());
        assert!(parse_ui_amount("18446744073709551615", 6).is_err());
    }

    #[test]
    fn pubkey_in_either_encoding() {
        let b58 = SDAO_MINT.to_string();
        assert_eq!(parse_pubkey(&b58).unwrap(), SDAO_MINT);

        let hex = hex::encode(STAKING_PROGRAM_ID.to_bytes());
        assert_eq!(parse_pubkey(&hex).unwrap(), STAKING_PROGRAM_ID);
        assert_eq!(parse_pubkey(&format!("0x{hex}")).unwrap(), STAKING_PROGRAM_ID);

        assert!(parse_pubkey("abcd").is_err());
        assert!(parse_pubkey("0xzz").is_err());
    }

    #[test]
    fn defaults_produce_service_settings() {
        let config = Config::parse_from(["seedstable", "claim"]);
        let settings = config.service_settings().unwrap();
        assert_eq!(settings.min_stake, 100_000_000);
        assert_eq!(settings.rate.apy_basis_points, 1_850);
        assert_eq!(settings.staking_program_id, STAKING_PROGRAM_ID);
        assert_eq!(settings.mint, SDAO_MINT);
        assert_eq!(settings.confirm_timeout, Duration::from_secs(60));
        assert_eq!(settings.confirm_poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn subcommand_arguments() {
        let config = Config::parse_from(["seedstable", "--decimals", "2", "stake", "3.25"]);
        let Command::Stake { amount } = &config.command else {
            panic!("expected stake");
        };
        assert_eq!(config.units(amount).unwrap(), 325);

        let config = Config::parse_from(["seedstable", "pause", "--lift"]);
        assert!(matches!(config.command, Command::Pause { lift: true }));
    }
}
