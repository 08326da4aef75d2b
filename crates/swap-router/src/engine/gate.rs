//! Executability gate for the aggregator route.
//!
//! Decides whether the aggregator route can be submitted straight to the
//! aggregator's router (`DirectCall`) or must go through the wrapper path
//! (`ViaRouterContract`). Checks run top-down and the first match wins:
//!
//! 1. no connected wallet
//! 2. allowance not `Sufficient`
//! 3. balance unknown or not strictly above the input amount
//! 4. gas estimate of the direct call, which must succeed and exceed
//!    [`MIN_TRANSFER_GAS`]

use std::cmp::Ordering;

use alloy_primitives::Address;
use num_bigint::BigUint;
use tracing::{debug, warn};

use crate::sources::GasEstimator;
use crate::types::{AllowanceState, Amount, CallOverrides, ContractCall, ExecutionMode, Quote, Result};

/// Gas of a plain value transfer. An estimate at or below this means the call
/// is not running contract logic, which is read as a revert-in-waiting.
pub const MIN_TRANSFER_GAS: u64 = 21_000;

/// Snapshot of everything the gate reads.
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    pub account: Option<Address>,
    pub allowance: AllowanceState,
    pub balance: Option<&'a Amount>,
    pub input_amount: &'a Amount,
    /// The input is the chain's native asset and travels as call value.
    pub native_input: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    Settled(ExecutionMode),
    NeedsGasEstimate,
}

/// The synchronous part of the gate: rows 1-3.
pub fn precheck(ctx: &GateContext<'_>) -> GateVerdict {
    if ctx.account.is_none() {
        return GateVerdict::Settled(ExecutionMode::ViaRouterContract);
    }
    if ctx.allowance != AllowanceState::Sufficient {
        return GateVerdict::Settled(ExecutionMode::ViaRouterContract);
    }
    match ctx.balance.and_then(|b| b.cmp_value(ctx.input_amount)) {
        Some(Ordering::Greater) => GateVerdict::NeedsGasEstimate,
        _ => GateVerdict::Settled(ExecutionMode::ViaRouterContract),
    }
}

/// Map a gas estimate outcome onto an execution mode.
pub fn classify_estimate(estimate: &Result<u64>) -> ExecutionMode {
    match estimate {
        Ok(gas) if *gas > MIN_TRANSFER_GAS => ExecutionMode::DirectCall,
        Ok(gas) => {
            debug!(gas, "gas estimate at or below the transfer floor");
            ExecutionMode::ViaRouterContract
        }
        Err(e) => {
            debug!(error = %e, "gas estimate failed");
            ExecutionMode::ViaRouterContract
        }
    }
}

/// The direct router call for an aggregator quote, if it carries one.
pub fn direct_call(quote: &Quote, from: Address, native_input: bool) -> Option<(ContractCall, CallOverrides)> {
    let route = quote.aggregator_route()?;
    let value = if native_input { quote.input_amount.raw.clone() } else { BigUint::default() };
    Some((
        ContractCall { to: route.router, data: route.calldata.clone() },
        CallOverrides { from, value },
    ))
}

/// Full gate evaluation, including the asynchronous gas probe.
pub async fn probe(ctx: &GateContext<'_>, quote: &Quote, estimator: &dyn GasEstimator) -> ExecutionMode {
    if let GateVerdict::Settled(mode) = precheck(ctx) {
        return mode;
    }
    let Some(from) = ctx.account else {
        return ExecutionMode::ViaRouterContract;
    };
    let Some((call, overrides)) = direct_call(quote, from, ctx.native_input) else {
        warn!("aggregator quote has no router call to estimate");
        return ExecutionMode::ViaRouterContract;
    };
    classify_estimate(&estimator.estimate(&call, &overrides).await)
}
