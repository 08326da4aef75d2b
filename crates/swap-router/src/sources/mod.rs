//! Collaborator interfaces consumed by the decision engine, and their implementations.

pub mod amm;
pub mod memory;
pub mod aggregator;

#[cfg(feature = "http")]
pub mod rpc;

use alloy_primitives::Address;
use async_trait::async_trait;

use crate::types::{AllowanceState, Amount, CallOverrides, ContractCall, Currency, Quote, QuoteSourceId, Result, SwapInput};

/// A router able to price a trade. Errors are treated as an empty quote by the engine.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    fn id(&self) -> QuoteSourceId;

    async fn get_quote(&self, input: &SwapInput) -> Result<Quote>;
}

/// Reads and requests ERC-20 spending permission for a router.
#[async_trait]
pub trait AllowanceTracker: Send + Sync {
    async fn get_state(
        &self,
        owner: Address,
        spender: Address,
        token: &Currency,
        required: &Amount,
    ) -> Result<AllowanceState>;

    /// Submit an approval and resolve once it has either landed (`Sufficient`)
    /// or failed (`Insufficient`).
    async fn approve(&self, owner: Address, spender: Address, token: &Currency) -> Result<AllowanceState>;
}

#[async_trait]
pub trait GasEstimator: Send + Sync {
    /// Gas units the call would consume. Rejects on revert or invalid call.
    async fn estimate(&self, call: &ContractCall, overrides: &CallOverrides) -> Result<u64>;
}

#[async_trait]
pub trait BalanceProvider: Send + Sync {
    async fn get_balance(&self, owner: Address, currency: &Currency) -> Result<Amount>;
}
