//! Reward schedule: maps position age to a reward level and converts a
//! level's weekly interest into a per-second flowrate.
//!
//! Levels are 1-based. Level `n` is `schedule[n - 1]` and becomes available
//! once a position's age reaches that entry's `min_age`.

use soroban_sdk::{contracttype, vec, Env, Vec};

use crate::ContractError;

pub const SECONDS_PER_DAY: u64 = 86_400;
pub const SECONDS_PER_WEEK: u64 = 7 * SECONDS_PER_DAY;

/// Basis-point denominator for `weekly_interest_bps`.
pub const BPS_DENOMINATOR: i128 = 10_000;

#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RewardLevel {
    /// Minimum position age (seconds) at which this level unlocks.
    pub min_age: u64,
    /// Weekly interest on the reference value, in basis points.
    pub weekly_interest_bps: u32,
}

/// The default six-level table: 0.2% weekly from day 0 up to 1.6% weekly
/// after 360 days.
pub fn canonical_schedule(env: &Env) -> Vec<RewardLevel> {
    vec![
        env,
        RewardLevel { min_age: 0, weekly_interest_bps: 20 },
        RewardLevel { min_age: 7 * SECONDS_PER_DAY, weekly_interest_bps: 40 },
        RewardLevel { min_age: 30 * SECONDS_PER_DAY, weekly_interest_bps: 60 },
        RewardLevel { min_age: 90 * SECONDS_PER_DAY, weekly_interest_bps: 90 },
        RewardLevel { min_age: 180 * SECONDS_PER_DAY, weekly_interest_bps: 120 },
        RewardLevel { min_age: 360 * SECONDS_PER_DAY, weekly_interest_bps: 160 },
    ]
}

/// Check that a schedule is usable: non-empty, starts at age 0, and neither
/// column ever decreases.
pub fn validate(schedule: &Vec<RewardLevel>) -> Result<(), ContractError> {
    let mut prev = schedule.first().ok_or(ContractError::ScheduleOutOfRange)?;
    if prev.min_age != 0 {
        return Err(ContractError::InvalidSchedule);
    }
    for level in schedule.iter().skip(1) {
        if level.min_age < prev.min_age || level.weekly_interest_bps < prev.weekly_interest_bps {
            return Err(ContractError::InvalidSchedule);
        }
        prev = level;
    }
    Ok(())
}

/// Highest level whose `min_age` is reached at `age`.
pub fn level_at(schedule: &Vec<RewardLevel>, age: u64) -> Result<u32, ContractError> {
    if schedule.is_empty() {
        return Err(ContractError::ScheduleOutOfRange);
    }
    let mut level = 1u32;
    for (index, entry) in schedule.iter().enumerate() {
        if entry.min_age > age {
            break;
        }
        level = index as u32 + 1;
    }
    Ok(level)
}

/// Age at which the level after `level_at(age)` unlocks, or `None` at the top.
pub fn next_boundary(schedule: &Vec<RewardLevel>, age: u64) -> Result<Option<u64>, ContractError> {
    let level = level_at(schedule, age)?;
    // `level` is 1-based, so it is also the 0-based index of the next entry.
    Ok(schedule.get(level).map(|next| next.min_age))
}

pub fn interest_bps(schedule: &Vec<RewardLevel>, level: u32) -> Result<u32, ContractError> {
    level
        .checked_sub(1)
        .and_then(|index| schedule.get(index))
        .map(|entry| entry.weekly_interest_bps)
        .ok_or(ContractError::ScheduleOutOfRange)
}

/// Per-second rate paid on `reference_value` at `weekly_interest_bps`,
/// rounded toward zero. `None` if the intermediate product overflows.
pub fn flowrate(reference_value: i128, weekly_interest_bps: u32) -> Option<i128> {
    reference_value
        .checked_mul(weekly_interest_bps as i128)
        .map(|weekly| weekly / BPS_DENOMINATOR / SECONDS_PER_WEEK as i128)
}
