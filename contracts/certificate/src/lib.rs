#![no_std]

use soroban_sdk::{
    contract, contractclient, contractimpl, contracttype, panic_with_error, symbol_short, Address,
    Env, String,
};

const TTL_THRESHOLD: u32 = 17280;
const TTL_EXTEND_TO: u32 = 120960;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

#[soroban_sdk::contracterror]
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum CertificateError {
    NotFound = 1,
    NotOwner = 2,
    NotApproved = 3,
    AlreadyMinted = 4,
    InvalidRecipient = 5,
}

/// Namespace for all contract storage keys.
#[contracttype]
pub enum DataKey {
    Farm,             // Instance: the farm allowed to mint/burn and notified on transfer.
    Owner(u64),       // Persistent: holder of a certificate.
    Balance(Address), // Persistent: number of certificates an address holds.
    Approval(u64),    // Persistent: address allowed to move a single certificate.
}

/// The hooks the registry calls back into the farm.
#[contractclient(name = "FarmHookClient")]
pub trait FarmHook {
    fn on_transfer(env: Env, from: Address, to: Address, position_id: u64);
    fn token_uri(env: Env, position_id: u64) -> String;
}

// ---------------------------------------------------------------------------
// Storage helpers
// ---------------------------------------------------------------------------

fn get_farm(env: &Env) -> Address {
    env.storage()
        .instance()
        .get(&DataKey::Farm)
        .expect("contract not initialised: missing farm")
}

fn load_owner(env: &Env, position_id: u64) -> Result<Address, CertificateError> {
    env.storage()
        .persistent()
        .get(&DataKey::Owner(position_id))
        .ok_or(CertificateError::NotFound)
}

fn save_owner(env: &Env, position_id: u64, owner: &Address) {
    let key = DataKey::Owner(position_id);
    env.storage().persistent().set(&key, owner);
    env.storage()
        .persistent()
        .extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);
}

fn get_balance(env: &Env, owner: &Address) -> u32 {
    env.storage()
        .persistent()
        .get(&DataKey::Balance(owner.clone()))
        .unwrap_or(0)
}

fn set_balance(env: &Env, owner: &Address, balance: u32) {
    let key = DataKey::Balance(owner.clone());
    if balance == 0 {
        env.storage().persistent().remove(&key);
    } else {
        env.storage().persistent().set(&key, &balance);
        env.storage()
            .persistent()
            .extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
}

fn clear_approval(env: &Env, position_id: u64) {
    env.storage()
        .persistent()
        .remove(&DataKey::Approval(position_id));
}

// ---------------------------------------------------------------------------
// Contract Implementation
// ---------------------------------------------------------------------------

#[contract]
pub struct FluxoraCertificate;

impl FluxoraCertificate {
    /// Move a certificate and notify the farm. The farm hook runs inside the
    /// same invocation, so a failing hook reverts the move.
    ///
    /// The farm and the registry itself cannot hold certificates: neither
    /// can receive a reward flow or ever move the certificate on.
    fn move_certificate(
        env: &Env,
        from: Address,
        to: Address,
        position_id: u64,
    ) -> Result<(), CertificateError> {
        let farm = get_farm(env);
        if to == farm || to == env.current_contract_address() {
            return Err(CertificateError::InvalidRecipient);
        }

        if from != to {
            set_balance(env, &from, get_balance(env, &from) - 1);
            set_balance(env, &to, get_balance(env, &to) + 1);
            save_owner(env, position_id, &to);
        }
        clear_approval(env, position_id);

        FarmHookClient::new(env, &farm).on_transfer(&from, &to, &position_id);

        env.events()
            .publish((symbol_short!("transfer"), from, to), position_id);
        Ok(())
    }
}

#[contractimpl]
impl FluxoraCertificate {
    /// Bind the registry to its farm. Must be called exactly once.
    ///
    /// # Panics
    /// - If called more than once
    pub fn init(env: Env, farm: Address) {
        if env.storage().instance().has(&DataKey::Farm) {
            panic!("already initialised");
        }
        env.storage().instance().set(&DataKey::Farm, &farm);
        env.storage()
            .instance()
            .extend_ttl(TTL_THRESHOLD, TTL_EXTEND_TO);
    }

    pub fn name(env: Env) -> String {
        String::from_str(&env, "Fluxora Farm Position")
    }

    pub fn symbol(env: Env) -> String {
        String::from_str(&env, "FXFP")
    }

    pub fn farm(env: Env) -> Address {
        get_farm(&env)
    }

    /// Issue the certificate for a freshly opened position.
    ///
    /// # Authorization
    /// - Only the farm
    ///
    /// # Panics
    /// - `AlreadyMinted` if a certificate with this id exists
    pub fn mint(env: Env, to: Address, position_id: u64) {
        get_farm(&env).require_auth();
        if env
            .storage()
            .persistent()
            .has(&DataKey::Owner(position_id))
        {
            panic_with_error!(&env, CertificateError::AlreadyMinted);
        }

        save_owner(&env, position_id, &to);
        set_balance(&env, &to, get_balance(&env, &to) + 1);

        env.events()
            .publish((symbol_short!("mint"), to), position_id);
    }

    /// Destroy the certificate of a closed position.
    ///
    /// # Authorization
    /// - Only the farm
    pub fn burn(env: Env, position_id: u64) -> Result<(), CertificateError> {
        get_farm(&env).require_auth();
        let owner = load_owner(&env, position_id)?;

        env.storage()
            .persistent()
            .remove(&DataKey::Owner(position_id));
        clear_approval(&env, position_id);
        set_balance(&env, &owner, get_balance(&env, &owner) - 1);

        env.events()
            .publish((symbol_short!("burn"), position_id), owner);
        Ok(())
    }

    pub fn owner_of(env: Env, position_id: u64) -> Result<Address, CertificateError> {
        load_owner(&env, position_id)
    }

    pub fn balance(env: Env, owner: Address) -> u32 {
        get_balance(&env, &owner)
    }

    /// Allow `spender` to move one certificate. Replaces any earlier approval;
    /// cleared on transfer and burn.
    pub fn approve(
        env: Env,
        owner: Address,
        spender: Address,
        position_id: u64,
    ) -> Result<(), CertificateError> {
        owner.require_auth();
        if load_owner(&env, position_id)? != owner {
            return Err(CertificateError::NotOwner);
        }

        let key = DataKey::Approval(position_id);
        env.storage().persistent().set(&key, &spender);
        env.storage()
            .persistent()
            .extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);
        Ok(())
    }

    pub fn get_approved(env: Env, position_id: u64) -> Option<Address> {
        env.storage()
            .persistent()
            .get(&DataKey::Approval(position_id))
    }

    /// Transfer a certificate held by `from`. The position's reward flow
    /// follows the certificate.
    ///
    /// # Authorization
    /// - Requires authorization from `from`
    ///
    /// # Errors
    /// - `NotFound` if no such certificate exists
    /// - `NotOwner` if `from` does not hold it
    /// - `InvalidRecipient` if `to` is the farm or this registry
    ///
    /// # Usage Notes
    /// - A transfer to oneself changes no ownership but still runs the farm
    ///   hook, which re-creates a reward flow the holder deleted
    pub fn transfer(
        env: Env,
        from: Address,
        to: Address,
        position_id: u64,
    ) -> Result<(), CertificateError> {
        from.require_auth();
        if load_owner(&env, position_id)? != from {
            return Err(CertificateError::NotOwner);
        }
        Self::move_certificate(&env, from, to, position_id)
    }

    /// Transfer a certificate on behalf of its holder.
    ///
    /// # Authorization
    /// - Requires authorization from `spender`, who must be the holder or the
    ///   approved address for this certificate
    pub fn transfer_from(
        env: Env,
        spender: Address,
        from: Address,
        to: Address,
        position_id: u64,
    ) -> Result<(), CertificateError> {
        spender.require_auth();
        if load_owner(&env, position_id)? != from {
            return Err(CertificateError::NotOwner);
        }
        let approved = Self::get_approved(env.clone(), position_id);
        if spender != from && approved.as_ref() != Some(&spender) {
            return Err(CertificateError::NotApproved);
        }
        Self::move_certificate(&env, from, to, position_id)
    }

    /// Metadata URI, rendered by the farm from the position's state.
    pub fn token_uri(env: Env, position_id: u64) -> Result<String, CertificateError> {
        load_owner(&env, position_id)?;
        Ok(FarmHookClient::new(&env, &get_farm(&env)).token_uri(&position_id))
    }
}
