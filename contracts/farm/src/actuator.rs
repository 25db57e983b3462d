//! Bridges the flowrate ledger to the external flow engine.
//!
//! `reconcile` is idempotent: it reads the live `farm -> owner` flow every
//! time and only issues a call when it differs from the ledger. Because the
//! live rate is re-read, a flow the owner deleted on their own is recreated
//! by the next reconcile for that owner.

use soroban_sdk::{log, Address, Env};

use crate::interfaces::FlowEngineClient;
use crate::{ledger, ContractError};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlowAction {
    Keep,
    Create(i128),
    Update(i128),
    Delete,
}

/// Decide which engine call brings a flow at `actual` to `target`.
pub fn plan(actual: i128, target: i128) -> FlowAction {
    match (actual > 0, target > 0) {
        (false, false) => FlowAction::Keep,
        (false, true) => FlowAction::Create(target),
        (true, false) => FlowAction::Delete,
        (true, true) if actual == target => FlowAction::Keep,
        (true, true) => FlowAction::Update(target),
    }
}

fn settled<T, E, F>(result: Result<Result<T, E>, F>) -> Result<T, ContractError> {
    match result {
        Ok(Ok(value)) => Ok(value),
        _ => Err(ContractError::StreamActuatorFailure),
    }
}

/// Bring the live flow to `owner` in line with the ledger's owner rate.
/// Must run after the caller's ledger mutation.
pub fn reconcile(env: &Env, flow_engine: &Address, owner: &Address) -> Result<(), ContractError> {
    let farm = env.current_contract_address();
    let engine = FlowEngineClient::new(env, flow_engine);

    let target = ledger::owner_rate(env, owner);
    let actual = settled(engine.try_get_flow(&farm, owner))?;

    match plan(actual, target) {
        FlowAction::Keep => Ok(()),
        FlowAction::Create(rate) => {
            log!(env, "reconcile: create flow", owner.clone(), rate);
            settled(engine.try_create_flow(&farm, owner, &rate))
        }
        FlowAction::Update(rate) => {
            log!(env, "reconcile: update flow", owner.clone(), actual, rate);
            settled(engine.try_update_flow(&farm, owner, &rate))
        }
        FlowAction::Delete => {
            log!(env, "reconcile: delete flow", owner.clone());
            settled(engine.try_delete_flow(&farm, owner))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_covers_every_transition() {
        assert_eq!(plan(0, 0), FlowAction::Keep);
        assert_eq!(plan(0, 7), FlowAction::Create(7));
        assert_eq!(plan(7, 0), FlowAction::Delete);
        assert_eq!(plan(7, 9), FlowAction::Update(9));
        assert_eq!(plan(9, 9), FlowAction::Keep);
    }

    #[test]
    fn negative_live_rate_counts_as_no_flow() {
        assert_eq!(plan(-3, 5), FlowAction::Create(5));
        assert_eq!(plan(-3, 0), FlowAction::Keep);
    }
}
