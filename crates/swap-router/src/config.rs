//! Configuration loading, env vars, CLI flags.

use std::env;
use std::str::FromStr;

use alloy_primitives::Address;
use serde::Deserialize;
use tracing::info;

#[cfg(feature = "cli")]
use clap::Parser;

use crate::slippage::{BPS_DENOMINATOR, DEFAULT_SLIPPAGE_BPS};
use crate::sources::amm::DEFAULT_FEE_BPS;
use crate::types::{Result, RouterError, TradeSide};

pub const DEFAULT_CHAIN_ID: u64 = 56;
pub const DEFAULT_QUOTE_TIMEOUT_MS: u64 = 8_000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub chain_id: u64,
    pub rpc_url: Option<String>,
    pub aggregator_url: Option<String>,
    pub aggregator_router: Option<Address>,
    pub amm_fee_bps: u32,
    pub slippage_bps: u32,
    pub quote_timeout_ms: u64,
    pub account: Option<Address>,
    pub sell_token: Option<String>,
    pub buy_token: Option<String>,
    pub amount: Option<String>,
    pub side: TradeSide,
    pub scenario_file: Option<String>,
}

/// One configuration layer. Also the shape of the TOML config file.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileConfig {
    pub chain_id: Option<u64>,
    pub rpc_url: Option<String>,
    pub aggregator_url: Option<String>,
    pub aggregator_router: Option<String>,
    pub amm_fee_bps: Option<u32>,
    pub slippage_bps: Option<u32>,
    pub quote_timeout_ms: Option<u64>,
    pub account: Option<String>,
    pub sell_token: Option<String>,
    pub buy_token: Option<String>,
    pub amount: Option<String>,
    pub side: Option<String>,
    pub scenario_file: Option<String>,
}

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(author, version, about = "Decide how a swap should be routed and executed", long_about = None)]
pub struct CliConfig {
    /// Path to a TOML config file.
    #[arg(long)]
    pub config: Option<String>,
    #[arg(long)]
    pub chain_id: Option<u64>,
    #[arg(long)]
    pub rpc_url: Option<String>,
    #[arg(long)]
    pub aggregator_url: Option<String>,
    #[arg(long)]
    pub aggregator_router: Option<String>,
    #[arg(long)]
    pub amm_fee_bps: Option<u32>,
    #[arg(long)]
    pub slippage_bps: Option<u32>,
    #[arg(long)]
    pub quote_timeout_ms: Option<u64>,
    /// Connected wallet address.
    #[arg(long)]
    pub account: Option<String>,
    /// Input currency: native symbol, wrapped symbol or token address.
    #[arg(long)]
    pub sell_token: Option<String>,
    #[arg(long)]
    pub buy_token: Option<String>,
    /// Human-readable amount of the typed side, e.g. "1.5".
    #[arg(long)]
    pub amount: Option<String>,
    /// exact-in or exact-out.
    #[arg(long)]
    pub side: Option<String>,
    /// Offline scenario with pools, balances, allowances and gas.
    #[arg(long)]
    pub scenario: Option<String>,
    /// Keep printing superseding decisions until Ctrl-C.
    #[arg(long, default_value_t = false)]
    pub watch: bool,
    /// Request router approval once the first decision settles.
    #[arg(long, default_value_t = false)]
    pub approve: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    fn layer(&self) -> FileConfig {
        FileConfig {
            chain_id: self.chain_id,
            rpc_url: self.rpc_url.clone(),
            aggregator_url: self.aggregator_url.clone(),
            aggregator_router: self.aggregator_router.clone(),
            amm_fee_bps: self.amm_fee_bps,
            slippage_bps: self.slippage_bps,
            quote_timeout_ms: self.quote_timeout_ms,
            account: self.account.clone(),
            sell_token: self.sell_token.clone(),
            buy_token: self.buy_token.clone(),
            amount: self.amount.clone(),
            side: self.side.clone(),
            scenario_file: self.scenario.clone(),
        }
    }
}

impl FileConfig {
    pub fn from_path(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RouterError::Config(format!("Cannot read config file {}: {}", path, e)))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| RouterError::Config(format!("Invalid config file: {}", e)))
    }

    /// Values from the process environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            chain_id: env_parse("CHAIN_ID")?,
            rpc_url: env::var("RPC_URL").ok(),
            aggregator_url: env::var("AGGREGATOR_URL").ok(),
            aggregator_router: env::var("AGGREGATOR_ROUTER").ok(),
            amm_fee_bps: env_parse("AMM_FEE_BPS")?,
            slippage_bps: env_parse("SLIPPAGE_BPS")?,
            quote_timeout_ms: env_parse("QUOTE_TIMEOUT_MS")?,
            account: env::var("ACCOUNT").ok(),
            sell_token: env::var("SELL_TOKEN").ok(),
            buy_token: env::var("BUY_TOKEN").ok(),
            amount: env::var("AMOUNT").ok(),
            side: env::var("SIDE").ok(),
            scenario_file: env::var("SCENARIO_FILE").ok(),
        })
    }

    /// Fill every unset field of `self` from `lower`.
    pub fn or(self, lower: FileConfig) -> FileConfig {
        FileConfig {
            chain_id: self.chain_id.or(lower.chain_id),
            rpc_url: self.rpc_url.or(lower.rpc_url),
            aggregator_url: self.aggregator_url.or(lower.aggregator_url),
            aggregator_router: self.aggregator_router.or(lower.aggregator_router),
            amm_fee_bps: self.amm_fee_bps.or(lower.amm_fee_bps),
            slippage_bps: self.slippage_bps.or(lower.slippage_bps),
            quote_timeout_ms: self.quote_timeout_ms.or(lower.quote_timeout_ms),
            account: self.account.or(lower.account),
            sell_token: self.sell_token.or(lower.sell_token),
            buy_token: self.buy_token.or(lower.buy_token),
            amount: self.amount.or(lower.amount),
            side: self.side.or(lower.side),
            scenario_file: self.scenario_file.or(lower.scenario_file),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| RouterError::Config(format!("{}={}: {}", key, value, e))),
        Err(_) => Ok(None),
    }
}

fn parse_address(field: &str, value: Option<String>) -> Result<Option<Address>> {
    value
        .map(|v| Address::from_str(v.trim()).map_err(|e| RouterError::Config(format!("Invalid {} '{}': {}", field, v, e))))
        .transpose()
}

pub fn parse_side(value: &str) -> Result<TradeSide> {
    match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
        "exact-in" | "exact-input" | "in" => Ok(TradeSide::ExactInput),
        "exact-out" | "exact-output" | "out" => Ok(TradeSide::ExactOutput),
        other => Err(RouterError::Config(format!("Unknown trade side '{}'", other))),
    }
}

impl AppConfig {
    /// Environment variables over defaults.
    pub fn load() -> Result<Self> {
        Self::from_layer(FileConfig::from_env()?)
    }

    /// CLI flags over the config file over environment variables over defaults.
    #[cfg(feature = "cli")]
    pub fn load_with_cli() -> Result<(Self, CliConfig)> {
        let cli = CliConfig::parse();
        let file_config = match cli.config {
            Some(ref path) => FileConfig::from_path(path)?,
            None => FileConfig::default(),
        };
        let config = Self::from_layer(cli.layer().or(file_config).or(FileConfig::from_env()?))?;
        Ok((config, cli))
    }

    /// Apply defaults to a merged layer and validate it.
    pub fn from_layer(layer: FileConfig) -> Result<Self> {
        let slippage_bps = layer.slippage_bps.unwrap_or(DEFAULT_SLIPPAGE_BPS);
        if slippage_bps > BPS_DENOMINATOR {
            return Err(RouterError::Config(format!("slippage_bps {} exceeds {}", slippage_bps, BPS_DENOMINATOR)));
        }
        let amm_fee_bps = layer.amm_fee_bps.unwrap_or(DEFAULT_FEE_BPS);
        if amm_fee_bps >= BPS_DENOMINATOR {
            return Err(RouterError::Config(format!("amm_fee_bps {} must be below {}", amm_fee_bps, BPS_DENOMINATOR)));
        }
        let side = layer.side.as_deref().map(parse_side).transpose()?.unwrap_or_default();
        if layer.rpc_url.is_none() && layer.scenario_file.is_none() {
            info!("RPC_URL not set; using the chain's default public endpoint.");
        }

        Ok(Self {
            chain_id: layer.chain_id.unwrap_or(DEFAULT_CHAIN_ID),
            rpc_url: layer.rpc_url,
            aggregator_url: layer.aggregator_url,
            aggregator_router: parse_address("aggregator_router", layer.aggregator_router)?,
            amm_fee_bps,
            slippage_bps,
            quote_timeout_ms: layer.quote_timeout_ms.unwrap_or(DEFAULT_QUOTE_TIMEOUT_MS),
            account: parse_address("account", layer.account)?,
            sell_token: layer.sell_token,
            buy_token: layer.buy_token,
            amount: layer.amount,
            side,
            scenario_file: layer.scenario_file,
        })
    }
}
