//! Reward accrual engine.
//!
//! Pending rewards are a pure function of `(staked, rate, now - last_claim)`.
//! Nothing here accumulates per tick: a reader that wakes up late, or a
//! process that restarts, computes the same number as one that polled every
//! second.
//!
//! Authoritative amounts are integer base units, computed the way the staking
//! program computes them (128-bit intermediate, floor). The `f64` path is for
//! display only.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use seedstable_protocol::constants::{BASIS_POINTS_DENOMINATOR, SECONDS_PER_YEAR};

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRate {
    pub apy_basis_points: u64,
}

impl RewardRate {
    pub const fn from_basis_points(apy_basis_points: u64) -> Self {
        Self { apy_basis_points }
    }

    pub fn apy_percent(&self) -> f64 {
        self.apy_basis_points as f64 / 100.0
    }
}

/// Seconds since the last claim, clamped at zero when the clock stepped back.
pub fn elapsed_seconds(last_claim_time: i64, now: i64) -> i64 {
    now.saturating_sub(last_claim_time).max(0)
}

/// Display accrual: `staked * (apy% / 100) * elapsed / seconds_per_year`.
pub fn accrued(staked: f64, apy_percent: f64, elapsed: i64) -> f64 {
    let elapsed = elapsed.max(0) as f64;
    staked * (apy_percent / 100.0) * elapsed / SECONDS_PER_YEAR as f64
}

/// Integer accrual as the program pays it: floor of
/// `staked * bps * elapsed / 10_000 / seconds_per_year`. Saturates at `u64::MAX`.
pub fn accrued_units(staked: u64, apy_basis_points: u64, elapsed: i64) -> u64 {
    let elapsed = elapsed.max(0) as u128;
    let Some(product) = (staked as u128)
        .checked_mul(apy_basis_points as u128)
        .and_then(|p| p.checked_mul(elapsed))
    else {
        return u64::MAX;
    };
    let reward = product / BASIS_POINTS_DENOMINATOR as u128 / SECONDS_PER_YEAR as u128;
    u64::try_from(reward).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Staked,
}

/// Scalar part of one identity's staking position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakePosition {
    pub owner: Pubkey,
    pub staked_amount: u64,
    pub stake_start_time: i64,
    pub last_claim_time: i64,
    /// Rewards frozen by a top-up stake, paid out on the next claim/unstake.
    pub frozen_rewards: u64,
}

impl StakePosition {
    /// Zero state: nothing staked, nothing owed.
    pub fn empty(owner: Pubkey) -> Self {
        Self {
            owner,
            staked_amount: 0,
            stake_start_time: 0,
            last_claim_time: 0,
            frozen_rewards: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.staked_amount == 0 {
            Phase::Idle
        } else {
            Phase::Staked
        }
    }

    /// Claimable base units at `now`.
    pub fn pending_units(&self, now: i64, rate: RewardRate) -> u64 {
        let live = accrued_units(
            self.staked_amount,
            rate.apy_basis_points,
            elapsed_seconds(self.last_claim_time, now),
        );
        self.frozen_rewards.saturating_add(live)
    }

    /// Claimable amount at `now` in base units, floating point, for display.
    pub fn pending_rewards(&self, now: i64, rate: RewardRate) -> f64 {
        self.frozen_rewards as f64
            + accrued(
                self.staked_amount as f64,
                rate.apy_percent(),
                elapsed_seconds(self.last_claim_time, now),
            )
    }

    /// Stake `amount` more. From `Idle` this opens the position; from
    /// `Staked` the rewards accrued so far are frozen and the clock restarts.
    ///
    /// The on-chain `stake_tokens` instruction also resets `last_claim_time`
    /// on a top-up but pays nothing and stores nothing for the time already
    /// accrued. Frozen units therefore exist only in this local record: a
    /// later on-chain claim or unstake will not pay them, and a position
    /// rebuilt from chain starts with none.
    pub fn apply_stake(
        &self,
        amount: u64,
        now: i64,
        rate: RewardRate,
    ) -> Result<StakePosition, ClientError> {
        if amount == 0 {
            return Err(ClientError::InvalidAmount("stake amount must be positive".into()));
        }
        let staked_amount = self
            .staked_amount
            .checked_add(amount)
            .ok_or_else(|| ClientError::InvalidAmount("stake amount overflows".into()))?;

        let next = match self.phase() {
            Phase::Idle => StakePosition {
                owner: self.owner,
                staked_amount,
                stake_start_time: now,
                last_claim_time: now,
                frozen_rewards: self.frozen_rewards,
            },
            Phase::Staked => StakePosition {
                owner: self.owner,
                staked_amount,
                stake_start_time: self.stake_start_time,
                last_claim_time: now,
                // local only; see above
                frozen_rewards: self.pending_units(now, rate),
            },
        };
        Ok(next)
    }

    /// Remove `amount` from the stake and pay out everything pending.
    /// Returns the new position and the rewards paid.
    pub fn apply_unstake(
        &self,
        amount: u64,
        now: i64,
        rate: RewardRate,
    ) -> Result<(StakePosition, u64), ClientError> {
        if amount == 0 {
            return Err(ClientError::InvalidAmount("unstake amount must be positive".into()));
        }
        if amount > self.staked_amount {
            return Err(ClientError::InsufficientBalance {
                requested: amount,
                available: self.staked_amount,
            });
        }
        let paid = self.pending_units(now, rate);
        let remaining = self.staked_amount - amount;
        let next = if remaining == 0 {
            StakePosition::empty(self.owner)
        } else {
            StakePosition {
                owner: self.owner,
                staked_amount: remaining,
                stake_start_time: self.stake_start_time,
                last_claim_time: now,
                frozen_rewards: 0,
            }
        };
        Ok((next, paid))
    }

    /// Pay out pending rewards; the stake is untouched.
    pub fn apply_claim(&self, now: i64, rate: RewardRate) -> Result<(StakePosition, u64), ClientError> {
        let paid = self.pending_units(now, rate);
        if paid == 0 {
            return Err(ClientError::NothingToClaim);
        }
        let next = StakePosition {
            last_claim_time: now,
            frozen_rewards: 0,
            ..*self
        };
        Ok((next, paid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000;
    const RATE: RewardRate = RewardRate::from_basis_points(1_850);

    fn owner() -> Pubkey {
        Pubkey::new_from_array([3u8; 32])
    }

    fn staked(amount: u64) -> StakePosition {
        StakePosition::empty(owner()).apply_stake(amount, T0, RATE).unwrap()
    }

    #[test]
    fn one_year_at_18_5_percent() {
        let pos = staked(1000);
        let pending = pos.pending_rewards(T0 + SECONDS_PER_YEAR, RATE);
        assert!((pending - 185.0).abs() <= 185.0 * 1e-6, "got {pending}");
        assert_eq!(pos.pending_units(T0 + SECONDS_PER_YEAR, RATE), 185);
    }

    #[test]
    fn integer_accrual_floors() {
        // 1000 units * 18.5% for one day = 0.5068... units
        assert_eq!(accrued_units(1000, 1850, 86_400), 0);
        assert_eq!(accrued_units(1_000_000_000, 1850, 86_400), 506_849);
    }

    #[test]
    fn integer_accrual_does_not_overflow() {
        assert_eq!(accrued_units(u64::MAX, 10_000, SECONDS_PER_YEAR), u64::MAX);
        assert_eq!(accrued_units(u64::MAX, u64::MAX, i64::MAX), u64::MAX);
    }

    #[test]
    fn accrual_is_monotonic_without_claims() {
        let pos = staked(5_000_000);
        let mut last = 0.0;
        let mut last_units = 0;
        for dt in [0, 1, 59, 3_600, 86_400, 1_000_000, SECONDS_PER_YEAR * 3] {
            let p = pos.pending_rewards(T0 + dt, RATE);
            let u = pos.pending_units(T0 + dt, RATE);
            assert!(p >= last);
            assert!(u >= last_units);
            last = p;
            last_units = u;
        }
    }

    #[test]
    fn backwards_clock_is_clamped() {
        let pos = staked(1_000_000);
        assert_eq!(elapsed_seconds(T0, T0 - 30), 0);
        assert_eq!(pos.pending_rewards(T0 - 30, RATE), 0.0);
        assert_eq!(pos.pending_units(T0 - 30, RATE), 0);
    }

    #[test]
    fn claim_resets_pending_and_clock() {
        let pos = staked(1_000_000_000);
        let now = T0 + 86_400;
        let (after, paid) = pos.apply_claim(now, RATE).unwrap();
        assert_eq!(paid, 506_849);
        assert_eq!(after.last_claim_time, now);
        assert_eq!(after.pending_units(now, RATE), 0);
        assert_eq!(after.pending_rewards(now, RATE), 0.0);
        assert_eq!(after.staked_amount, pos.staked_amount);
    }

    #[test]
    fn claim_with_nothing_pending_fails() {
        let pos = staked(1000);
        assert!(matches!(pos.apply_claim(T0, RATE), Err(ClientError::NothingToClaim)));
        let idle = StakePosition::empty(owner());
        assert!(matches!(idle.apply_claim(T0, RATE), Err(ClientError::NothingToClaim)));
    }

    #[test]
    fn top_up_freezes_then_resets() {
        let first = staked(100);
        assert_eq!(first.stake_start_time, T0);

        let later = T0 + SECONDS_PER_YEAR;
        let second = first.apply_stake(50, later, RATE).unwrap();
        assert_eq!(second.staked_amount, 150);
        assert_eq!(second.last_claim_time, later);
        assert_eq!(second.stake_start_time, T0);
        // 100 * 18.5% for a year, floored
        assert_eq!(second.frozen_rewards, 18);
        assert_eq!(second.pending_units(later, RATE), 18);

        let (_, paid) = second.apply_claim(later + SECONDS_PER_YEAR, RATE).unwrap();
        assert_eq!(paid, 18 + 27);
    }

    #[test]
    fn unstake_more_than_staked_leaves_position_unchanged() {
        let pos = staked(100);
        let before = pos;
        let err = pos.apply_unstake(101, T0 + 10, RATE).unwrap_err();
        assert!(matches!(
            err,
            ClientError::InsufficientBalance { requested: 101, available: 100 }
        ));
        assert_eq!(pos, before);
    }

    #[test]
    fn unstake_pays_pending_and_full_unstake_resets() {
        let pos = staked(1_000_000_000);
        let now = T0 + 86_400;

        let (partial, paid) = pos.apply_unstake(400_000_000, now, RATE).unwrap();
        assert_eq!(paid, 506_849);
        assert_eq!(partial.staked_amount, 600_000_000);
        assert_eq!(partial.last_claim_time, now);
        assert_eq!(partial.phase(), Phase::Staked);

        let (gone, _) = partial.apply_unstake(600_000_000, now + 10, RATE).unwrap();
        assert_eq!(gone, StakePosition::empty(owner()));
        assert_eq!(gone.phase(), Phase::Idle);
    }

    #[test]
    fn zero_amounts_are_rejected() {
        let pos = staked(10);
        assert!(matches!(pos.apply_stake(0, T0, RATE), Err(ClientError::InvalidAmount(_))));
        assert!(matches!(pos.apply_unstake(0, T0, RATE), Err(ClientError::InvalidAmount(_))));
    }
}
