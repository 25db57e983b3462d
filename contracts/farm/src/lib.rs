#![no_std]

mod actuator;
pub mod interfaces;
mod ledger;
mod metadata;
mod schedule;

use soroban_sdk::{
    contract, contractimpl, contracttype, log, symbol_short, token, Address, Env, String, Vec,
    I256,
};

use interfaces::{CertificateClient, PairClient};
use metadata::LevelView;

pub use schedule::{canonical_schedule, RewardLevel, SECONDS_PER_DAY, SECONDS_PER_WEEK};

/// Ledgers below which a persistent entry's TTL is extended on write.
pub(crate) const TTL_THRESHOLD: u32 = 17280;
/// TTL (in ledgers) persistent entries are extended to.
pub(crate) const TTL_EXTEND_TO: u32 = 120960;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// Global configuration for the farm.
#[contracttype]
#[derive(Clone, Debug)]
pub struct Config {
    pub admin: Address,
    pub stake_token: Address,
    pub reward_token: Address,
    pub pair: Address,
    pub flow_engine: Address,
    pub certificate: Address,
}

#[contracttype]
#[derive(Clone, Debug)]
pub struct FarmParams {
    pub admin: Address,
    pub stake_token: Address,
    pub reward_token: Address,
    pub pair: Address,
    pub flow_engine: Address,
    pub certificate: Address,
    pub max_aggregate_flowrate: i128,
    pub schedule: Vec<RewardLevel>,
}

/// A staked deposit. The owner lives in the certificate registry.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Position {
    pub stake_amount: i128,
    /// Stake valued in reward-token units at creation; never updated.
    pub reference_value: i128,
    pub creation_time: u64,
    /// Level currently paid out. Only ever advances.
    pub level: u32,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PositionInfo {
    pub creation_time: u64,
    pub stake_amount: i128,
    pub reference_value: i128,
    pub current_owner: Address,
    pub set_level: u32,
    pub available_level: u32,
    /// When the level after `available_level` unlocks; 0 at the top level.
    pub next_level_time: u64,
}

#[soroban_sdk::contracterror]
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum ContractError {
    UnknownPosition = 1,
    NotOwner = 2,
    NotAdmin = 3,
    ForbiddenAsset = 4,
    BelowCurrentUsage = 5,
    NoCapacity = 6,
    TransferFailed = 7,
    StreamActuatorFailure = 8,
    LedgerCorruption = 9,
    InvalidAmount = 10,
    InvalidConfig = 11,
    InvalidSchedule = 12,
    ScheduleOutOfRange = 13,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FarmEvent {
    Staked(Address, u64, i128),
    Unstaked(u64),
    LevelUpgraded(u64, u32),
    CeilingChanged(i128, i128),
}

/// Namespace for all contract storage keys.
#[contracttype]
pub enum DataKey {
    Config,                  // Instance: addresses and admin.
    Schedule,                // Instance: reward levels, frozen at init.
    NextPositionId,          // Instance: position id counter, never rewound.
    MaxFlowrate,             // Instance: aggregate flowrate ceiling.
    UsedFlowrate,            // Instance: aggregate flowrate committed.
    Position(u64),           // Persistent: one entry per live position.
    OwnerFlowrate(Address),  // Persistent: sum of rates of an owner's positions.
}

// ---------------------------------------------------------------------------
// Storage helpers
// ---------------------------------------------------------------------------

fn get_config(env: &Env) -> Config {
    env.storage()
        .instance()
        .get(&DataKey::Config)
        .expect("contract not initialised: missing config")
}

fn get_schedule(env: &Env) -> Vec<RewardLevel> {
    env.storage()
        .instance()
        .get(&DataKey::Schedule)
        .expect("contract not initialised: missing schedule")
}

fn allocate_position_id(env: &Env) -> u64 {
    let position_id: u64 = env
        .storage()
        .instance()
        .get(&DataKey::NextPositionId)
        .unwrap_or(1u64);
    env.storage()
        .instance()
        .set(&DataKey::NextPositionId, &(position_id + 1));
    position_id
}

fn load_position(env: &Env, position_id: u64) -> Result<Position, ContractError> {
    env.storage()
        .persistent()
        .get(&DataKey::Position(position_id))
        .ok_or(ContractError::UnknownPosition)
}

fn save_position(env: &Env, position_id: u64, position: &Position) {
    let key = DataKey::Position(position_id);
    env.storage().persistent().set(&key, position);
    env.storage()
        .persistent()
        .extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);
}

fn remove_position(env: &Env, position_id: u64) {
    env.storage()
        .persistent()
        .remove(&DataKey::Position(position_id));
}

// ---------------------------------------------------------------------------
// Internal Helpers
// ---------------------------------------------------------------------------

impl FluxoraFarm {
    fn require_admin(env: &Env, caller: &Address) -> Result<Config, ContractError> {
        caller.require_auth();
        let config = get_config(env);
        if *caller != config.admin {
            return Err(ContractError::NotAdmin);
        }
        Ok(config)
    }

    /// Value `amount` stake tokens in reward tokens using the pair's current
    /// reserves: `amount * reward_reserve / total_shares`, rounded down.
    /// A value that does not fit in i128 fails with `NoCapacity`.
    fn reference_value(env: &Env, config: &Config, amount: i128) -> Result<i128, ContractError> {
        let pair = PairClient::new(env, &config.pair);
        let (reserve_0, reserve_1) = pair.get_reserves();
        let reward_reserve = if pair.token_0() == config.reward_token {
            reserve_0
        } else if pair.token_1() == config.reward_token {
            reserve_1
        } else {
            return Err(ContractError::InvalidConfig);
        };

        let total_shares = pair.total_shares();
        if total_shares <= 0 || reward_reserve < 0 {
            return Err(ContractError::InvalidConfig);
        }

        // The product routinely exceeds i128 at 18-decimal scales.
        let value = I256::from_i128(env, amount)
            .mul(&I256::from_i128(env, reward_reserve))
            .div(&I256::from_i128(env, total_shares));
        value.to_i128().ok_or(ContractError::NoCapacity)
    }

    fn age(env: &Env, position: &Position) -> u64 {
        env.ledger()
            .timestamp()
            .saturating_sub(position.creation_time)
    }

    fn available_level(
        env: &Env,
        schedule: &Vec<RewardLevel>,
        position: &Position,
    ) -> Result<u32, ContractError> {
        schedule::level_at(schedule, Self::age(env, position))
    }

    fn position_flowrate(
        schedule: &Vec<RewardLevel>,
        position: &Position,
    ) -> Result<i128, ContractError> {
        let bps = schedule::interest_bps(schedule, position.level)?;
        // A rate too large for i128 is beyond any ceiling.
        schedule::flowrate(position.reference_value, bps).ok_or(ContractError::NoCapacity)
    }

    fn transfer_token(
        env: &Env,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: i128,
    ) -> Result<(), ContractError> {
        match token::Client::new(env, token).try_transfer(from, to, &amount) {
            Ok(Ok(())) => Ok(()),
            _ => Err(ContractError::TransferFailed),
        }
    }
}

// ---------------------------------------------------------------------------
// Contract Implementation
// ---------------------------------------------------------------------------

#[contract]
pub struct FluxoraFarm;

#[contractimpl]
impl FluxoraFarm {
    /// Initialise the farm.
    ///
    /// Must be called exactly once. Persists the token, oracle, engine and
    /// certificate addresses, the admin, the aggregate flowrate ceiling and
    /// the reward schedule. The schedule cannot be changed afterwards.
    ///
    /// # Errors
    /// - `InvalidConfig` if the stake and reward tokens are the same
    /// - `InvalidAmount` if `max_aggregate_flowrate` is negative
    /// - `ScheduleOutOfRange` if the schedule is empty
    /// - `InvalidSchedule` if the schedule does not start at age 0 or either
    ///   column decreases
    ///
    /// # Panics
    /// - If called more than once
    pub fn init(env: Env, params: FarmParams) -> Result<(), ContractError> {
        if env.storage().instance().has(&DataKey::Config) {
            panic!("already initialised");
        }
        if params.stake_token == params.reward_token {
            return Err(ContractError::InvalidConfig);
        }
        if params.max_aggregate_flowrate < 0 {
            return Err(ContractError::InvalidAmount);
        }
        schedule::validate(&params.schedule)?;

        let config = Config {
            admin: params.admin,
            stake_token: params.stake_token,
            reward_token: params.reward_token,
            pair: params.pair,
            flow_engine: params.flow_engine,
            certificate: params.certificate,
        };
        let storage = env.storage().instance();
        storage.set(&DataKey::Config, &config);
        storage.set(&DataKey::Schedule, &params.schedule);
        storage.set(&DataKey::NextPositionId, &1u64);
        storage.set(&DataKey::MaxFlowrate, &params.max_aggregate_flowrate);
        storage.set(&DataKey::UsedFlowrate, &0i128);

        storage.extend_ttl(TTL_THRESHOLD, TTL_EXTEND_TO);
        Ok(())
    }

    /// Stake `amount` stake tokens and open a new position.
    ///
    /// The position starts at level 1 and its reference value is fixed from
    /// the pair's reserves at this moment. A certificate for the position is
    /// minted to `user`, and `user`'s reward flow is raised by the position's
    /// level-1 rate.
    ///
    /// # Returns
    /// - The new position id. Ids start at 1 and are never reused.
    ///
    /// # Authorization
    /// - Requires authorization from `user`
    ///
    /// # Errors
    /// - `InvalidAmount` if `amount <= 0`
    /// - `NoCapacity` if the ceiling is already fully used, or the new rate
    ///   would push aggregate usage above it
    /// - `TransferFailed` if the stake tokens cannot be pulled from `user`
    /// - `StreamActuatorFailure` if the flow engine rejects the update
    ///
    /// # Events
    /// - `staked(user)` with `FarmEvent::Staked(user, position_id, amount)`
    ///
    /// # Usage Notes
    /// - Two stakes from the same user are two independent positions
    /// - There is no minimum amount; a tiny stake may earn a zero rate
    pub fn stake(env: Env, user: Address, amount: i128) -> Result<u64, ContractError> {
        user.require_auth();
        if amount <= 0 {
            return Err(ContractError::InvalidAmount);
        }

        let config = get_config(&env);
        let schedule = get_schedule(&env);

        if ledger::remaining(&env) <= 0 {
            return Err(ContractError::NoCapacity);
        }

        let position = Position {
            stake_amount: amount,
            reference_value: Self::reference_value(&env, &config, amount)?,
            creation_time: env.ledger().timestamp(),
            level: 1,
        };
        let rate = Self::position_flowrate(&schedule, &position)?;

        // Bookkeeping first; every external call below aborts the whole
        // invocation on failure.
        let position_id = allocate_position_id(&env);
        save_position(&env, position_id, &position);
        ledger::reserve(&env, &user, rate)?;

        Self::transfer_token(
            &env,
            &config.stake_token,
            &user,
            &env.current_contract_address(),
            amount,
        )?;
        CertificateClient::new(&env, &config.certificate).mint(&user, &position_id);
        actuator::reconcile(&env, &config.flow_engine, &user)?;

        env.events().publish(
            (symbol_short!("staked"), user.clone()),
            FarmEvent::Staked(user, position_id, amount),
        );
        Ok(position_id)
    }

    /// Close a position and return its stake.
    ///
    /// Releases the position's rate, shrinks or deletes the owner's flow,
    /// pays back exactly the staked amount, burns the certificate and
    /// deletes the position.
    ///
    /// # Authorization
    /// - Requires authorization from `user`, who must hold the certificate
    ///
    /// # Errors
    /// - `UnknownPosition` if the position does not exist
    /// - `NotOwner` if `user` does not hold the certificate
    ///
    /// # Usage Notes
    /// - Works when the owner has deleted their incoming flow themselves, so
    ///   staked tokens stay redeemable whatever the reward reservoir holds
    pub fn unstake(env: Env, user: Address, position_id: u64) -> Result<(), ContractError> {
        user.require_auth();

        let position = load_position(&env, position_id)?;
        let config = get_config(&env);
        let certificate = CertificateClient::new(&env, &config.certificate);
        if certificate.owner_of(&position_id) != user {
            return Err(ContractError::NotOwner);
        }

        let rate = Self::position_flowrate(&get_schedule(&env), &position)?;
        remove_position(&env, position_id);
        ledger::release(&env, &user, rate);

        actuator::reconcile(&env, &config.flow_engine, &user)?;
        Self::transfer_token(
            &env,
            &config.stake_token,
            &env.current_contract_address(),
            &user,
            position.stake_amount,
        )?;
        certificate.burn(&position_id);

        env.events().publish(
            (symbol_short!("unstaked"), position_id),
            FarmEvent::Unstaked(position_id),
        );
        Ok(())
    }

    /// Whether the position has aged into a level above the one it pays.
    pub fn can_upgrade_level(env: Env, position_id: u64) -> Result<bool, ContractError> {
        let position = load_position(&env, position_id)?;
        let available = Self::available_level(&env, &get_schedule(&env), &position)?;
        Ok(available > position.level)
    }

    /// Advance a position by one level if its age allows it.
    ///
    /// Anyone may call this; the position's current owner receives the
    /// higher rate. Exactly one level is gained per call even if several
    /// are available, so catching up takes repeated calls.
    ///
    /// # Errors
    /// - `UnknownPosition` if the position does not exist
    /// - `NoCapacity` if the rate increase would breach the ceiling
    ///
    /// # Events
    /// - `upgraded(position_id)` with `FarmEvent::LevelUpgraded(id, level)`
    ///   (only when a level was gained)
    pub fn upgrade_level(env: Env, position_id: u64) -> Result<(), ContractError> {
        let mut position = load_position(&env, position_id)?;
        let schedule = get_schedule(&env);
        if Self::available_level(&env, &schedule, &position)? <= position.level {
            return Ok(());
        }

        let old_rate = Self::position_flowrate(&schedule, &position)?;
        position.level += 1;
        let new_rate = Self::position_flowrate(&schedule, &position)?;
        save_position(&env, position_id, &position);

        let config = get_config(&env);
        let owner = CertificateClient::new(&env, &config.certificate).owner_of(&position_id);
        ledger::reserve(&env, &owner, new_rate - old_rate)?;
        actuator::reconcile(&env, &config.flow_engine, &owner)?;

        env.events().publish(
            (symbol_short!("upgraded"), position_id),
            FarmEvent::LevelUpgraded(position_id, position.level),
        );
        Ok(())
    }

    /// Certificate ownership hook, called by the registry on every transfer.
    ///
    /// Moves the position's rate from `from` to `to` and reconciles both
    /// flows, `from` first. A self-transfer therefore re-creates a flow the
    /// owner deleted on their own.
    ///
    /// # Authorization
    /// - Only the configured certificate contract
    pub fn on_transfer(
        env: Env,
        from: Address,
        to: Address,
        position_id: u64,
    ) -> Result<(), ContractError> {
        let config = get_config(&env);
        config.certificate.require_auth();

        let position = load_position(&env, position_id)?;
        let rate = Self::position_flowrate(&get_schedule(&env), &position)?;
        ledger::reassign(&env, &from, &to, rate);

        actuator::reconcile(&env, &config.flow_engine, &from)?;
        actuator::reconcile(&env, &config.flow_engine, &to)
    }

    /// Full view of a position, including its current owner.
    pub fn get_position_info(env: Env, position_id: u64) -> Result<PositionInfo, ContractError> {
        let position = load_position(&env, position_id)?;
        let schedule = get_schedule(&env);
        let config = get_config(&env);

        let age = Self::age(&env, &position);
        let next_level_time = schedule::next_boundary(&schedule, age)?
            .map(|min_age| position.creation_time.saturating_add(min_age))
            .unwrap_or(0);

        Ok(PositionInfo {
            creation_time: position.creation_time,
            stake_amount: position.stake_amount,
            reference_value: position.reference_value,
            current_owner: CertificateClient::new(&env, &config.certificate)
                .owner_of(&position_id),
            set_level: position.level,
            available_level: schedule::level_at(&schedule, age)?,
            next_level_time,
        })
    }

    /// Per-second rate the position currently pays its owner.
    pub fn flowrate_of(env: Env, position_id: u64) -> Result<i128, ContractError> {
        let position = load_position(&env, position_id)?;
        Self::position_flowrate(&get_schedule(&env), &position)
    }

    /// Certificate metadata as a `data:` URI.
    ///
    /// Reads only farm state so the certificate contract can call it from
    /// inside its own `token_uri`.
    pub fn token_uri(env: Env, position_id: u64) -> Result<String, ContractError> {
        let position = load_position(&env, position_id)?;
        let schedule = get_schedule(&env);
        let view = LevelView {
            available_level: Self::available_level(&env, &schedule, &position)?,
            weekly_interest_bps: schedule::interest_bps(&schedule, position.level)?,
            flowrate: Self::position_flowrate(&schedule, &position)?,
        };
        Ok(metadata::position_uri(&env, position_id, &position, &view))
    }

    pub fn reward_schedule(env: Env) -> Vec<RewardLevel> {
        get_schedule(&env)
    }

    pub fn max_aggregate_flowrate(env: Env) -> i128 {
        ledger::ceiling(&env)
    }

    pub fn remaining_available_flowrate(env: Env) -> i128 {
        ledger::remaining(&env)
    }

    /// Sum of the rates of every live position.
    pub fn aggregate_flowrate(env: Env) -> i128 {
        ledger::used(&env)
    }

    /// Sum of the rates of the positions `owner` currently holds.
    pub fn owner_flowrate(env: Env, owner: Address) -> i128 {
        ledger::owner_rate(&env, &owner)
    }

    pub fn get_config(env: Env) -> Config {
        get_config(&env)
    }

    pub fn stake_token(env: Env) -> Address {
        get_config(&env).stake_token
    }

    pub fn reward_token(env: Env) -> Address {
        get_config(&env).reward_token
    }

    pub fn certificate(env: Env) -> Address {
        get_config(&env).certificate
    }
}

#[contractimpl]
impl FluxoraFarm {
    /// Change the aggregate flowrate ceiling.
    ///
    /// # Authorization
    /// - `caller` must authorize and be the admin
    ///
    /// # Errors
    /// - `NotAdmin` if `caller` is not the admin
    /// - `BelowCurrentUsage` if `value` is below the rate already committed
    ///
    /// # Events
    /// - `ceiling/updated` with `FarmEvent::CeilingChanged(old, new)`
    ///
    /// # Usage Notes
    /// - Setting the ceiling to exactly the committed rate closes the farm to
    ///   new stakes and upgrades without affecting running flows
    pub fn set_max_aggregate_flowrate(
        env: Env,
        caller: Address,
        value: i128,
    ) -> Result<(), ContractError> {
        Self::require_admin(&env, &caller)?;
        let old = ledger::set_ceiling(&env, value)?;
        log!(&env, "ceiling changed", old, value);

        env.events().publish(
            (symbol_short!("ceiling"), symbol_short!("updated")),
            FarmEvent::CeilingChanged(old, value),
        );
        Ok(())
    }

    /// Send tokens held by the farm to `to`.
    ///
    /// The reward token may be withdrawn; the admin controls the reservoir.
    /// The stake token may not, as it backs every open position.
    ///
    /// # Errors
    /// - `NotAdmin` if `caller` is not the admin
    /// - `ForbiddenAsset` if `token` is the stake token
    /// - `InvalidAmount` if `amount <= 0`
    /// - `TransferFailed` if the farm does not hold enough of `token`
    pub fn rescue_token(
        env: Env,
        caller: Address,
        token: Address,
        to: Address,
        amount: i128,
    ) -> Result<(), ContractError> {
        let config = Self::require_admin(&env, &caller)?;
        if token == config.stake_token {
            return Err(ContractError::ForbiddenAsset);
        }
        if amount <= 0 {
            return Err(ContractError::InvalidAmount);
        }
        Self::transfer_token(&env, &token, &env.current_contract_address(), &to, amount)
    }

    /// Hand the admin role to `new_admin`.
    ///
    /// # Events
    /// - `admin/updated` with `(old_admin, new_admin)`
    pub fn set_admin(env: Env, caller: Address, new_admin: Address) -> Result<(), ContractError> {
        let mut config = Self::require_admin(&env, &caller)?;
        let old_admin = config.admin.clone();

        config.admin = new_admin.clone();
        env.storage().instance().set(&DataKey::Config, &config);

        env.events().publish(
            (symbol_short!("admin"), symbol_short!("updated")),
            (old_admin, new_admin),
        );
        Ok(())
    }
}
