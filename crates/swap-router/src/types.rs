//! Common types, enums, error handling, data models.

use std::cmp::Ordering;
use std::fmt;

use alloy_primitives::{Address, Bytes};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};

/// Common error type for the swap-router system.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("Quote unavailable from {source_id}: {reason}")]
    QuoteUnavailable { source_id: QuoteSourceId, reason: String },
    #[error("Allowance check failed: {0}")]
    AllowanceCheckFailed(String),
    #[error("Gas estimate failed: {0}")]
    GasEstimateFailed(String),
    #[error("Balance read failed: {0}")]
    BalanceUnavailable(String),
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Decision engine is no longer running")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, RouterError>;

/// Identity of a currency on a single chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CurrencyId {
    Native,
    Token(Address),
}

impl fmt::Display for CurrencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrencyId::Native => write!(f, "native"),
            CurrencyId::Token(addr) => write!(f, "{}", addr),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency {
    pub id: CurrencyId,
    pub symbol: String,
    pub decimals: u8,
}

impl Currency {
    pub fn native(symbol: impl Into<String>, decimals: u8) -> Self {
        Self { id: CurrencyId::Native, symbol: symbol.into(), decimals }
    }

    pub fn token(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self { id: CurrencyId::Token(address), symbol: symbol.into(), decimals }
    }

    pub fn is_native(&self) -> bool {
        self.id == CurrencyId::Native
    }

    /// Token address, if this is not the chain's native asset.
    pub fn address(&self) -> Option<Address> {
        match self.id {
            CurrencyId::Native => None,
            CurrencyId::Token(addr) => Some(addr),
        }
    }
}

/// An exact raw amount of a currency. Never converted through floating point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    pub currency: CurrencyId,
    pub decimals: u8,
    pub raw: BigUint,
}

fn pow10(exp: u8) -> BigUint {
    let mut value = BigUint::one();
    let ten = BigUint::from(10u8);
    for _ in 0..exp {
        value *= &ten;
    }
    value
}

impl Amount {
    pub fn new(currency: &Currency, raw: impl Into<BigUint>) -> Self {
        Self { currency: currency.id, decimals: currency.decimals, raw: raw.into() }
    }

    pub fn zero(currency: &Currency) -> Self {
        Self::new(currency, BigUint::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    /// Parse a human-readable decimal string ("1.25") into raw units.
    pub fn parse_units(value: &str, currency: &Currency) -> Result<Amount> {
        let value = value.trim();
        let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(RouterError::InvalidAmount("empty amount".to_string()));
        }
        if fraction.len() > currency.decimals as usize {
            return Err(RouterError::InvalidAmount(format!(
                "{} has more than {} fractional digits",
                value, currency.decimals
            )));
        }
        let digits = format!("{}{:0<width$}", whole, fraction, width = currency.decimals as usize);
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RouterError::InvalidAmount(format!("{} is not a decimal number", value)));
        }
        let raw = BigUint::parse_bytes(digits.as_bytes(), 10)
            .ok_or_else(|| RouterError::InvalidAmount(format!("{} is not a decimal number", value)))?;
        Ok(Amount::new(currency, raw))
    }

    /// Re-express the amount with `decimals` fractional digits.
    ///
    /// Scaling up is always exact. Scaling down returns `None` when it would
    /// drop non-zero digits.
    pub fn rescale(&self, decimals: u8) -> Option<Amount> {
        let raw = match decimals.cmp(&self.decimals) {
            Ordering::Equal => self.raw.clone(),
            Ordering::Greater => &self.raw * pow10(decimals - self.decimals),
            Ordering::Less => {
                let divisor = pow10(self.decimals - decimals);
                if !(&self.raw % &divisor).is_zero() {
                    return None;
                }
                &self.raw / divisor
            }
        };
        Some(Amount { currency: self.currency, decimals, raw })
    }

    /// Compare the value of two amounts of the same currency, normalising scale
    /// first. Returns `None` when the amounts denominate different currencies.
    pub fn cmp_value(&self, other: &Amount) -> Option<Ordering> {
        if self.currency != other.currency {
            return None;
        }
        let scale = self.decimals.max(other.decimals);
        let lhs = self.rescale(scale)?;
        let rhs = other.rescale(scale)?;
        Some(lhs.raw.cmp(&rhs.raw))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {} dp)", self.raw, self.currency, self.decimals)
    }
}

/// Which side of the trade the user typed (the independent field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    #[default]
    ExactInput,
    ExactOutput,
}

/// The user input tuple every decision is keyed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SwapInput {
    pub input: Currency,
    pub output: Currency,
    pub typed_amount: BigUint,
    pub side: TradeSide,
}

impl SwapInput {
    pub fn exact_in(input: Currency, output: Currency, amount: impl Into<BigUint>) -> Self {
        Self { input, output, typed_amount: amount.into(), side: TradeSide::ExactInput }
    }

    pub fn exact_out(input: Currency, output: Currency, amount: impl Into<BigUint>) -> Self {
        Self { input, output, typed_amount: amount.into(), side: TradeSide::ExactOutput }
    }

    /// The typed amount, denominated in whichever currency the side refers to.
    pub fn typed(&self) -> Amount {
        match self.side {
            TradeSide::ExactInput => Amount::new(&self.input, self.typed_amount.clone()),
            TradeSide::ExactOutput => Amount::new(&self.output, self.typed_amount.clone()),
        }
    }
}

/// Generation number of an input tuple. Async results are applied only while
/// their ticket is still the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct InputTicket(pub u64);

impl InputTicket {
    pub fn next(self) -> Self {
        InputTicket(self.0 + 1)
    }
}

impl fmt::Display for InputTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSourceId {
    Amm,
    Aggregator,
}

impl fmt::Display for QuoteSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuoteSourceId::Amm => write!(f, "amm"),
            QuoteSourceId::Aggregator => write!(f, "aggregator"),
        }
    }
}

/// A cross-chain step inside an aggregator route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeHop {
    #[serde(default)]
    pub from_chain_id: u64,
    #[serde(default)]
    pub to_chain_id: u64,
    #[serde(default)]
    pub bridge: String,
}

/// Everything needed to submit the aggregator route straight to its router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorRoute {
    pub router: Address,
    pub calldata: Bytes,
    pub amount_out_min: BigUint,
    pub bridge: Vec<BridgeHop>,
}

/// Slippage limit of an AMM swap: a floor on the output for exact-input
/// trades, a ceiling on the input for exact-output trades.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountBound {
    MinOut(BigUint),
    MaxIn(BigUint),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteData {
    Amm { path: Vec<CurrencyId>, bound: AmountBound },
    Aggregator(AggregatorRoute),
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub source: QuoteSourceId,
    pub input_amount: Amount,
    pub output_amount: Amount,
    pub route: RouteData,
    /// No viable path was found.
    pub is_empty: bool,
}

impl Quote {
    pub fn empty(source: QuoteSourceId, input: &SwapInput) -> Self {
        Self {
            source,
            input_amount: Amount::zero(&input.input),
            output_amount: Amount::zero(&input.output),
            route: RouteData::None,
            is_empty: true,
        }
    }

    pub fn bridge_hops(&self) -> &[BridgeHop] {
        match &self.route {
            RouteData::Aggregator(route) => &route.bridge,
            _ => &[],
        }
    }

    pub fn requires_bridge(&self) -> bool {
        !self.bridge_hops().is_empty()
    }

    pub fn aggregator_route(&self) -> Option<&AggregatorRoute> {
        match &self.route {
            RouteData::Aggregator(route) => Some(route),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AllowanceState {
    #[default]
    Unknown,
    Insufficient,
    Pending,
    Sufficient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Submit straight to the aggregator's router.
    DirectCall,
    /// Fall back to the wrapper execution path.
    ViaRouterContract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapType {
    NotApplicable,
    Wrap,
    Unwrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionMode {
    /// Native <-> wrapped native; no router is involved.
    Wrap(WrapType),
    Route { preferred_source: QuoteSourceId, execution_mode: ExecutionMode },
    /// Neither source produced a usable quote, or there is nothing to trade.
    NoTrade,
}

/// The reconciled decision for one input tuple. Superseded, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapDecision {
    pub ticket: InputTicket,
    pub mode: DecisionMode,
    /// No quote, read or probe for this ticket is still outstanding.
    pub settled: bool,
}

impl SwapDecision {
    pub fn preferred_source(&self) -> Option<QuoteSourceId> {
        match self.mode {
            DecisionMode::Route { preferred_source, .. } => Some(preferred_source),
            _ => None,
        }
    }

    pub fn execution_mode(&self) -> Option<ExecutionMode> {
        match self.mode {
            DecisionMode::Route { execution_mode, .. } => Some(execution_mode),
            _ => None,
        }
    }

    pub fn is_wrap(&self) -> bool {
        matches!(self.mode, DecisionMode::Wrap(_))
    }
}

/// A contract call to be gas-estimated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOverrides {
    pub from: Address,
    pub value: BigUint,
}
