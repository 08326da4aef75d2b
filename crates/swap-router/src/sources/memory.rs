//! In-memory collaborators for offline scenarios and tests.

use std::collections::HashMap;
use std::sync::RwLock;

use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use num_bigint::BigUint;
use tracing::info;

use crate::slippage;
use crate::sources::{AllowanceTracker, BalanceProvider, GasEstimator, QuoteSource};
use crate::types::{
    AggregatorRoute, AllowanceState, Amount, AmountBound, BridgeHop, CallOverrides, ContractCall, Currency, CurrencyId, Quote,
    QuoteSourceId, Result, RouteData, RouterError, SwapInput, TradeSide,
};

type AllowanceKey = (Address, Address, CurrencyId);

/// Allowances keyed by `(owner, spender, token)`. `approve` grants an
/// unlimited allowance unless approvals are configured to fail.
#[derive(Default)]
pub struct InMemoryAllowances {
    allowances: RwLock<HashMap<AllowanceKey, BigUint>>,
    reject_approvals: bool,
}

impl InMemoryAllowances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting_approvals() -> Self {
        Self { reject_approvals: true, ..Self::default() }
    }

    pub fn set_allowance(&self, owner: Address, spender: Address, token: &Currency, amount: impl Into<BigUint>) -> Result<()> {
        let mut book = self.allowances.write().map_err(|_| RouterError::AllowanceCheckFailed("allowance book poisoned".to_string()))?;
        book.insert((owner, spender, token.id), amount.into());
        Ok(())
    }
}

#[async_trait]
impl AllowanceTracker for InMemoryAllowances {
    async fn get_state(&self, owner: Address, spender: Address, token: &Currency, required: &Amount) -> Result<AllowanceState> {
        if token.is_native() {
            return Ok(AllowanceState::Sufficient);
        }
        let book = self.allowances.read().map_err(|_| RouterError::AllowanceCheckFailed("allowance book poisoned".to_string()))?;
        match book.get(&(owner, spender, token.id)) {
            Some(granted) if granted >= &required.raw => Ok(AllowanceState::Sufficient),
            _ => Ok(AllowanceState::Insufficient),
        }
    }

    async fn approve(&self, owner: Address, spender: Address, token: &Currency) -> Result<AllowanceState> {
        if self.reject_approvals {
            info!(%owner, %spender, token = %token.symbol, "approval rejected");
            return Ok(AllowanceState::Insufficient);
        }
        let unlimited = BigUint::from_bytes_be(&[0xff; 32]);
        self.set_allowance(owner, spender, token, unlimited)?;
        Ok(AllowanceState::Sufficient)
    }
}

/// Read-only balance snapshot. Unknown entries read as zero.
#[derive(Default, Clone)]
pub struct StaticBalances {
    balances: HashMap<(Address, CurrencyId), BigUint>,
}

impl StaticBalances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(mut self, owner: Address, currency: &Currency, amount: impl Into<BigUint>) -> Self {
        self.balances.insert((owner, currency.id), amount.into());
        self
    }
}

#[async_trait]
impl BalanceProvider for StaticBalances {
    async fn get_balance(&self, owner: Address, currency: &Currency) -> Result<Amount> {
        let raw = self.balances.get(&(owner, currency.id)).cloned().unwrap_or_default();
        Ok(Amount::new(currency, raw))
    }
}

/// Answers every exact-input request with the same output amount. Exact-output
/// requests and an unset output yield an empty quote.
pub struct FixedQuoteSource {
    id: QuoteSourceId,
    amount_out: Option<BigUint>,
    router: Address,
    bridge: Vec<BridgeHop>,
    slippage_bps: u32,
}

impl FixedQuoteSource {
    pub fn new(id: QuoteSourceId, amount_out: Option<BigUint>, router: Address) -> Self {
        Self { id, amount_out, router, bridge: Vec::new(), slippage_bps: slippage::DEFAULT_SLIPPAGE_BPS }
    }

    pub fn with_bridge(mut self, bridge: Vec<BridgeHop>) -> Self {
        self.bridge = bridge;
        self
    }
}

#[async_trait]
impl QuoteSource for FixedQuoteSource {
    fn id(&self) -> QuoteSourceId {
        self.id
    }

    async fn get_quote(&self, input: &SwapInput) -> Result<Quote> {
        let Some(amount_out) = self.amount_out.clone().filter(|_| input.side == TradeSide::ExactInput) else {
            return Ok(Quote::empty(self.id, input));
        };
        let amount_out_min = slippage::minimum_amount_out(&amount_out, self.slippage_bps)?;
        let route = match self.id {
            QuoteSourceId::Amm => {
                RouteData::Amm { path: vec![input.input.id, input.output.id], bound: AmountBound::MinOut(amount_out_min) }
            }
            QuoteSourceId::Aggregator => RouteData::Aggregator(AggregatorRoute {
                router: self.router,
                calldata: Bytes::from_static(&[0x5c, 0x11, 0xd7, 0x95]),
                amount_out_min,
                bridge: self.bridge.clone(),
            }),
        };
        Ok(Quote {
            source: self.id,
            input_amount: Amount::new(&input.input, input.typed_amount.clone()),
            output_amount: Amount::new(&input.output, amount_out),
            route,
            is_empty: false,
        })
    }
}

/// Returns the same estimate for every call; `None` simulates a revert.
pub struct FixedGasEstimate(pub Option<u64>);

#[async_trait]
impl GasEstimator for FixedGasEstimate {
    async fn estimate(&self, call: &ContractCall, overrides: &CallOverrides) -> Result<u64> {
        self.0.ok_or_else(|| {
            RouterError::GasEstimateFailed(format!("execution reverted: {} from {}", call.to, overrides.from))
        })
    }
}
