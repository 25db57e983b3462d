//! Client interfaces for the contracts the farm talks to.

use soroban_sdk::{contractclient, Address, Env};

/// Continuous money-stream engine. A flow moves `flow_rate` units of the
/// reward token per second from `sender` to `receiver` until deleted.
#[contractclient(name = "FlowEngineClient")]
pub trait FlowEngine {
    fn create_flow(env: Env, sender: Address, receiver: Address, flow_rate: i128);
    fn update_flow(env: Env, sender: Address, receiver: Address, flow_rate: i128);
    fn delete_flow(env: Env, sender: Address, receiver: Address);
    /// Current rate of the `sender -> receiver` flow, 0 if none exists.
    fn get_flow(env: Env, sender: Address, receiver: Address) -> i128;
}

/// Constant-product liquidity pair whose share token is the stake token.
#[contractclient(name = "PairClient")]
pub trait LiquidityPair {
    fn token_0(env: Env) -> Address;
    fn token_1(env: Env) -> Address;
    fn get_reserves(env: Env) -> (i128, i128);
    fn total_shares(env: Env) -> i128;
}

/// Position certificate registry. Mint and burn are reserved to the farm.
#[contractclient(name = "CertificateClient")]
pub trait CertificateRegistry {
    fn mint(env: Env, to: Address, position_id: u64);
    fn burn(env: Env, position_id: u64);
    fn owner_of(env: Env, position_id: u64) -> Address;
}
