//! Aggregate flowrate ledger.
//!
//! Tracks the total per-second rate the farm has committed to (`used`), the
//! ceiling it may never exceed, and the per-owner sum of position rates.
//! Every mutation keeps `used == Σ owner_rate` and `used <= ceiling`.

use soroban_sdk::{panic_with_error, Address, Env};

use crate::{ContractError, DataKey, TTL_EXTEND_TO, TTL_THRESHOLD};

pub fn ceiling(env: &Env) -> i128 {
    env.storage()
        .instance()
        .get(&DataKey::MaxFlowrate)
        .unwrap_or(0)
}

pub fn used(env: &Env) -> i128 {
    env.storage()
        .instance()
        .get(&DataKey::UsedFlowrate)
        .unwrap_or(0)
}

pub fn remaining(env: &Env) -> i128 {
    ceiling(env) - used(env)
}

pub fn owner_rate(env: &Env, owner: &Address) -> i128 {
    env.storage()
        .persistent()
        .get(&DataKey::OwnerFlowrate(owner.clone()))
        .unwrap_or(0)
}

fn set_used(env: &Env, value: i128) {
    env.storage().instance().set(&DataKey::UsedFlowrate, &value);
}

fn set_owner_rate(env: &Env, owner: &Address, rate: i128) {
    let key = DataKey::OwnerFlowrate(owner.clone());
    if rate == 0 {
        env.storage().persistent().remove(&key);
    } else {
        env.storage().persistent().set(&key, &rate);
        env.storage()
            .persistent()
            .extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
}

/// Commit `delta` more flowrate to `owner`, failing with `NoCapacity` if the
/// ceiling would be breached.
pub fn reserve(env: &Env, owner: &Address, delta: i128) -> Result<(), ContractError> {
    let new_used = used(env)
        .checked_add(delta)
        .ok_or(ContractError::NoCapacity)?;
    if new_used > ceiling(env) {
        return Err(ContractError::NoCapacity);
    }
    let new_owner_rate = owner_rate(env, owner)
        .checked_add(delta)
        .ok_or(ContractError::NoCapacity)?;

    set_used(env, new_used);
    set_owner_rate(env, owner, new_owner_rate);
    Ok(())
}

/// Return `delta` flowrate previously reserved for `owner`.
///
/// Releasing more than was reserved means the books are already wrong, so
/// this halts with `LedgerCorruption` instead of saturating.
pub fn release(env: &Env, owner: &Address, delta: i128) {
    let new_used = used(env).checked_sub(delta).filter(|v| *v >= 0);
    let new_owner_rate = owner_rate(env, owner)
        .checked_sub(delta)
        .filter(|v| *v >= 0);

    match (new_used, new_owner_rate) {
        (Some(new_used), Some(new_owner_rate)) => {
            set_used(env, new_used);
            set_owner_rate(env, owner, new_owner_rate);
        }
        _ => panic_with_error!(env, ContractError::LedgerCorruption),
    }
}

/// Move `rate` from one owner to another. Aggregate usage is unchanged, so
/// the ceiling is not consulted.
pub fn reassign(env: &Env, from: &Address, to: &Address, rate: i128) {
    if from == to {
        return;
    }
    let from_rate = owner_rate(env, from)
        .checked_sub(rate)
        .filter(|v| *v >= 0)
        .unwrap_or_else(|| panic_with_error!(env, ContractError::LedgerCorruption));
    let to_rate = owner_rate(env, to)
        .checked_add(rate)
        .unwrap_or_else(|| panic_with_error!(env, ContractError::LedgerCorruption));

    set_owner_rate(env, from, from_rate);
    set_owner_rate(env, to, to_rate);
}

/// Replace the ceiling, returning the previous value. The new ceiling may
/// not drop below what is already committed.
pub fn set_ceiling(env: &Env, new_ceiling: i128) -> Result<i128, ContractError> {
    if new_ceiling < used(env) {
        return Err(ContractError::BelowCurrentUsage);
    }
    let old = ceiling(env);
    env.storage()
        .instance()
        .set(&DataKey::MaxFlowrate, &new_ceiling);
    Ok(old)
}
