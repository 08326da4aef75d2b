//! Shared fixtures for the swap-router integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use num_bigint::BigUint;
use swap_router::chains::{get_chain, ChainConfig};
use swap_router::sources::memory::{FixedGasEstimate, FixedQuoteSource, InMemoryAllowances, StaticBalances};
use swap_router::sources::{GasEstimator, QuoteSource};
use swap_router::sources::{AllowanceTracker, BalanceProvider};
use swap_router::types::{AggregatorRoute, AmountBound, BridgeHop, CallOverrides, ContractCall, RouteData};
use tracing_subscriber::EnvFilter;
use swap_router::{
    Address, AllowanceState, Amount, Bytes, Collaborators, Currency, Quote, QuoteSourceId, RouterError, SwapInput,
};

/// Send engine logs to the test output. `RUST_LOG` overrides the default `warn`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

pub fn bsc() -> ChainConfig {
    get_chain(56).unwrap()
}

pub fn tin() -> Currency {
    Currency::token(Address::repeat_byte(0x11), "TIN", 18)
}

pub fn tout() -> Currency {
    Currency::token(Address::repeat_byte(0x22), "TOUT", 18)
}

pub fn account() -> Address {
    Address::repeat_byte(0xA1)
}

pub fn router() -> Address {
    Address::repeat_byte(0xAA)
}

pub fn exact_in(amount: u64) -> SwapInput {
    SwapInput::exact_in(tin(), tout(), amount)
}

pub fn amm_quote(input: &SwapInput, amount_out: u64) -> Quote {
    Quote {
        source: QuoteSourceId::Amm,
        input_amount: Amount::new(&input.input, input.typed_amount.clone()),
        output_amount: Amount::new(&input.output, amount_out),
        route: RouteData::Amm {
            path: vec![input.input.id, input.output.id],
            bound: AmountBound::MinOut(BigUint::from(amount_out)),
        },
        is_empty: false,
    }
}

pub fn aggregator_quote(input: &SwapInput, amount_out: u64, bridge: Vec<BridgeHop>) -> Quote {
    Quote {
        source: QuoteSourceId::Aggregator,
        input_amount: Amount::new(&input.input, input.typed_amount.clone()),
        output_amount: Amount::new(&input.output, amount_out),
        route: RouteData::Aggregator(AggregatorRoute {
            router: router(),
            calldata: Bytes::from_static(&[0x01, 0x02]),
            amount_out_min: BigUint::from(amount_out),
            bridge,
        }),
        is_empty: false,
    }
}

pub fn stargate_hop() -> BridgeHop {
    BridgeHop { from_chain_id: 56, to_chain_id: 1116, bridge: "stargate".to_string() }
}

/// Wraps a quote source and delays every answer.
pub struct SlowQuote {
    pub inner: FixedQuoteSource,
    pub delay: Duration,
}

#[async_trait]
impl QuoteSource for SlowQuote {
    fn id(&self) -> QuoteSourceId {
        self.inner.id()
    }

    async fn get_quote(&self, input: &SwapInput) -> swap_router::Result<Quote> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_quote(input).await
    }
}

/// The first estimate takes `delay` and succeeds with `first`; every later
/// estimate reverts immediately.
pub struct SlowFirstGas {
    calls: AtomicUsize,
    pub delay: Duration,
    pub first: u64,
}

impl SlowFirstGas {
    pub fn new(delay: Duration, first: u64) -> Self {
        Self { calls: AtomicUsize::new(0), delay, first }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GasEstimator for SlowFirstGas {
    async fn estimate(&self, _call: &ContractCall, _overrides: &CallOverrides) -> swap_router::Result<u64> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(self.delay).await;
            Ok(self.first)
        } else {
            Err(RouterError::GasEstimateFailed("execution reverted".to_string()))
        }
    }
}

/// Every allowance read fails; approvals fail too.
pub struct FailingAllowances;

#[async_trait]
impl AllowanceTracker for FailingAllowances {
    async fn get_state(
        &self,
        _owner: Address,
        _spender: Address,
        _token: &Currency,
        _required: &Amount,
    ) -> swap_router::Result<AllowanceState> {
        Err(RouterError::AllowanceCheckFailed("node unreachable".to_string()))
    }

    async fn approve(&self, _owner: Address, _spender: Address, _token: &Currency) -> swap_router::Result<AllowanceState> {
        Err(RouterError::AllowanceCheckFailed("node unreachable".to_string()))
    }
}

/// Every balance read fails.
pub struct FailingBalances;

#[async_trait]
impl BalanceProvider for FailingBalances {
    async fn get_balance(&self, _owner: Address, _currency: &Currency) -> swap_router::Result<Amount> {
        Err(RouterError::BalanceUnavailable("node unreachable".to_string()))
    }
}

pub fn fixed_amm(amount_out: u64) -> FixedQuoteSource {
    FixedQuoteSource::new(QuoteSourceId::Amm, Some(BigUint::from(amount_out)), router())
}

pub fn fixed_aggregator(amount_out: u64) -> FixedQuoteSource {
    FixedQuoteSource::new(QuoteSourceId::Aggregator, Some(BigUint::from(amount_out)), router())
}

/// In-memory collaborators: AMM and aggregator answering fixed outputs, the
/// test account holding `balance` of the input token with `allowance`
/// granted to the aggregator router.
pub fn collaborators(
    amm_out: u64,
    aggregator_out: u64,
    balance: u64,
    allowance: Option<u64>,
    gas: Arc<dyn GasEstimator>,
) -> Collaborators {
    let allowances = InMemoryAllowances::new();
    if let Some(granted) = allowance {
        allowances.set_allowance(account(), router(), &tin(), granted).unwrap();
    }
    Collaborators {
        amm: Arc::new(fixed_amm(amm_out)),
        aggregator: Arc::new(fixed_aggregator(aggregator_out)),
        allowances: Arc::new(allowances),
        balances: Arc::new(StaticBalances::new().with_balance(account(), &tin(), balance)),
        gas,
    }
}

pub fn gas(estimate: Option<u64>) -> Arc<dyn GasEstimator> {
    Arc::new(FixedGasEstimate(estimate))
}
