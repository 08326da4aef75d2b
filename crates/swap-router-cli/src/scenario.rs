//! Offline scenario files: pools, balances, allowances, a canned aggregator
//! answer and a fixed gas estimate, so a decision can be reproduced without
//! any network access.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use num_bigint::BigUint;
use serde::Deserialize;
use swap_router::chains::ChainConfig;
use swap_router::sources::amm::ConstantProductSource;
use swap_router::sources::memory::{FixedGasEstimate, FixedQuoteSource, InMemoryAllowances, StaticBalances};
use swap_router::types::BridgeHop;
use swap_router::{Address, Currency, QuoteSourceId};

#[derive(Debug, Deserialize)]
pub struct TokenEntry {
    pub symbol: String,
    pub address: Address,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

fn default_decimals() -> u8 {
    18
}

#[derive(Debug, Deserialize)]
pub struct PoolEntry {
    pub a: String,
    pub b: String,
    pub reserve_a: String,
    pub reserve_b: String,
}

#[derive(Debug, Deserialize)]
pub struct BalanceEntry {
    pub currency: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct AllowanceEntry {
    pub token: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct AggregatorEntry {
    /// Raw output for any exact-input request; omit for "no route".
    pub amount_out: Option<String>,
    pub router: Option<Address>,
    #[serde(default)]
    pub bridge: Vec<BridgeHop>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
    #[serde(default)]
    pub pools: Vec<PoolEntry>,
    #[serde(default)]
    pub balances: Vec<BalanceEntry>,
    #[serde(default)]
    pub allowances: Vec<AllowanceEntry>,
    pub aggregator: Option<AggregatorEntry>,
    /// Gas units every estimate returns; omit to make estimates revert.
    pub gas_estimate: Option<u64>,
    #[serde(default)]
    pub reject_approvals: bool,
}

fn parse_raw(field: &str, value: &str) -> Result<BigUint> {
    BigUint::parse_bytes(value.trim().as_bytes(), 10).ok_or_else(|| anyhow!("{} is not a raw integer amount: '{}'", field, value))
}

impl Scenario {
    pub fn from_path(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path).with_context(|| format!("reading scenario {}", path))?;
        toml::from_str(&contents).with_context(|| format!("parsing scenario {}", path))
    }

    /// Resolve a currency reference against the scenario's token list first,
    /// then against the chain table.
    pub fn resolve(&self, chain: &ChainConfig, reference: &str) -> Result<Currency> {
        if let Some(token) = self.tokens.iter().find(|t| t.symbol.eq_ignore_ascii_case(reference)) {
            return Ok(Currency::token(token.address, token.symbol.clone(), token.decimals));
        }
        let decimals = reference
            .parse::<Address>()
            .ok()
            .and_then(|addr| self.tokens.iter().find(|t| t.address == addr))
            .map(|t| t.decimals);
        Ok(chain.resolve_currency(reference, decimals)?)
    }

    pub fn amm(&self, chain: &ChainConfig, fee_bps: u32, slippage_bps: u32) -> Result<ConstantProductSource> {
        let mut amm = ConstantProductSource::new(&chain.wrapped_native, fee_bps, slippage_bps)?;
        for pool in &self.pools {
            let a = self.resolve(chain, &pool.a)?;
            let b = self.resolve(chain, &pool.b)?;
            amm = amm.with_pair(&a, &b, parse_raw("reserve_a", &pool.reserve_a)?, parse_raw("reserve_b", &pool.reserve_b)?);
        }
        Ok(amm)
    }

    /// The canned aggregator, if the scenario defines one.
    pub fn aggregator(&self, default_router: Option<Address>) -> Result<Option<FixedQuoteSource>> {
        let Some(entry) = &self.aggregator else {
            return Ok(None);
        };
        let amount_out = entry.amount_out.as_deref().map(|v| parse_raw("aggregator.amount_out", v)).transpose()?;
        let router = entry
            .router
            .or(default_router)
            .ok_or_else(|| anyhow!("scenario aggregator needs a router (or --aggregator-router)"))?;
        Ok(Some(FixedQuoteSource::new(QuoteSourceId::Aggregator, amount_out, router).with_bridge(entry.bridge.clone())))
    }

    pub fn balances(&self, chain: &ChainConfig, account: Option<Address>) -> Result<StaticBalances> {
        let mut balances = StaticBalances::new();
        let Some(owner) = account else {
            return Ok(balances);
        };
        for entry in &self.balances {
            let currency = self.resolve(chain, &entry.currency)?;
            balances = balances.with_balance(owner, &currency, parse_raw("balance", &entry.amount)?);
        }
        Ok(balances)
    }

    pub fn allowances(&self, chain: &ChainConfig, account: Option<Address>, spender: Option<Address>) -> Result<InMemoryAllowances> {
        let allowances = if self.reject_approvals { InMemoryAllowances::rejecting_approvals() } else { InMemoryAllowances::new() };
        let (Some(owner), Some(spender)) = (account, spender) else {
            return Ok(allowances);
        };
        for entry in &self.allowances {
            let token = self.resolve(chain, &entry.token)?;
            allowances.set_allowance(owner, spender, &token, parse_raw("allowance", &entry.amount)?)?;
        }
        Ok(allowances)
    }

    pub fn gas(&self) -> Arc<FixedGasEstimate> {
        Arc::new(FixedGasEstimate(self.gas_estimate))
    }

    pub fn aggregator_router(&self) -> Option<Address> {
        self.aggregator.as_ref().and_then(|a| a.router)
    }
}
