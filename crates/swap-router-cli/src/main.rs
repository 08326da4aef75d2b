mod scenario;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures_util::StreamExt;
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use rust_decimal::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scenario::Scenario;
use swap_router::chains::{get_chain, ChainConfig};
use swap_router::config::AppConfig;
use swap_router::sources::aggregator::AggregatorClient;
use swap_router::sources::amm::ConstantProductSource;
use swap_router::sources::memory::FixedQuoteSource;
use swap_router::sources::rpc::{JsonRpcAllowances, JsonRpcBalances, JsonRpcClient, JsonRpcGasEstimator};
use swap_router::sources::QuoteSource;
use swap_router::{
    Address, Amount, Collaborators, Currency, DecisionMode, EngineSettings, ExecutionMode, QuoteSourceId,
    SwapDecision, SwapDecisionEngine, SwapInput, TradeSide, WrapType,
};

// Helper to format a raw amount to a human-readable string
fn format_amount(raw: &BigUint, decimals: u8) -> String {
    let scaled = raw
        .to_i128()
        .and_then(|value| Decimal::try_from_i128_with_scale(value, decimals as u32).ok());
    match scaled {
        Some(value) => value.round_dp(6).normalize().to_string(),
        // Too large for a Decimal; show raw units.
        None => format!("{} (raw)", raw),
    }
}

fn describe(decision: &SwapDecision) -> String {
    let mode = match decision.mode {
        DecisionMode::Wrap(WrapType::Wrap) => "wrap native into its wrapped token".to_string(),
        DecisionMode::Wrap(WrapType::Unwrap) => "unwrap into the native asset".to_string(),
        DecisionMode::Wrap(WrapType::NotApplicable) | DecisionMode::NoTrade => "no trade".to_string(),
        DecisionMode::Route { preferred_source, execution_mode } => {
            let source = match preferred_source {
                QuoteSourceId::Amm => "AMM",
                QuoteSourceId::Aggregator => "aggregator",
            };
            let execution = match execution_mode {
                ExecutionMode::DirectCall => "direct call to the aggregator router",
                ExecutionMode::ViaRouterContract => "via the router contract",
            };
            format!("route through {}, execute {}", source, execution)
        }
    };
    let state = if decision.settled { "settled" } else { "pending" };
    format!("[{}] {} ({})", decision.ticket, mode, state)
}

fn build_collaborators(config: &AppConfig, chain: &ChainConfig, scenario: Option<&Scenario>) -> Result<Collaborators> {
    let timeout = Duration::from_millis(config.quote_timeout_ms);
    let router = config.aggregator_router.or_else(|| scenario.and_then(Scenario::aggregator_router));

    let amm = match scenario {
        Some(s) => s.amm(chain, config.amm_fee_bps, config.slippage_bps)?,
        None => {
            warn!("No scenario file; the AMM source has no pools.");
            ConstantProductSource::new(&chain.wrapped_native, config.amm_fee_bps, config.slippage_bps)?
        }
    };

    let aggregator: Arc<dyn QuoteSource> = match (&config.aggregator_url, scenario) {
        (Some(url), _) => Arc::new(AggregatorClient::new(url.clone(), chain.chain_id, router, config.slippage_bps, timeout)?),
        (None, Some(s)) => match s.aggregator(router)? {
            Some(fixed) => Arc::new(fixed),
            None => Arc::new(FixedQuoteSource::new(QuoteSourceId::Aggregator, None, Address::ZERO)),
        },
        (None, None) => {
            warn!("No AGGREGATOR_URL; aggregator quotes will be empty.");
            Arc::new(FixedQuoteSource::new(QuoteSourceId::Aggregator, None, Address::ZERO))
        }
    };

    if let Some(s) = scenario {
        return Ok(Collaborators {
            amm: Arc::new(amm),
            aggregator,
            allowances: Arc::new(s.allowances(chain, config.account, router)?),
            balances: Arc::new(s.balances(chain, config.account)?),
            gas: s.gas(),
        });
    }

    let rpc_url = config.rpc_url.clone().unwrap_or_else(|| chain.default_rpc_url.to_string());
    info!(%rpc_url, "using JSON-RPC collaborators");
    Ok(Collaborators {
        amm: Arc::new(amm),
        aggregator,
        allowances: Arc::new(JsonRpcAllowances::new(JsonRpcClient::new(rpc_url.clone(), timeout)?)),
        balances: Arc::new(JsonRpcBalances::new(JsonRpcClient::new(rpc_url.clone(), timeout)?)),
        gas: Arc::new(JsonRpcGasEstimator::new(JsonRpcClient::new(rpc_url, timeout)?)),
    })
}

fn resolve(chain: &ChainConfig, scenario: Option<&Scenario>, reference: &str) -> Result<Currency> {
    match scenario {
        Some(s) => s.resolve(chain, reference),
        None => Ok(chain.resolve_currency(reference, None)?),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // CLI args, then config file, then env vars
    let (config, cli) = AppConfig::load_with_cli()?;
    let chain = get_chain(config.chain_id)?;
    let scenario = config.scenario_file.as_deref().map(Scenario::from_path).transpose()?;

    let sell_token = config.sell_token.as_deref().ok_or_else(|| anyhow!("--sell-token is required"))?;
    let buy_token = config.buy_token.as_deref().ok_or_else(|| anyhow!("--buy-token is required"))?;
    let amount = config.amount.as_deref().ok_or_else(|| anyhow!("--amount is required"))?;

    let input_currency = resolve(&chain, scenario.as_ref(), sell_token)?;
    let output_currency = resolve(&chain, scenario.as_ref(), buy_token)?;
    let typed_currency = match config.side {
        TradeSide::ExactInput => &input_currency,
        TradeSide::ExactOutput => &output_currency,
    };
    let typed = Amount::parse_units(amount, typed_currency)?;
    println!(
        "Chain: {} ({}) | {} {} {} -> {}",
        chain.name,
        chain.chain_id,
        match config.side {
            TradeSide::ExactInput => "selling",
            TradeSide::ExactOutput => "buying",
        },
        format_amount(&typed.raw, typed.decimals),
        input_currency.symbol,
        output_currency.symbol
    );

    let collaborators = build_collaborators(&config, &chain, scenario.as_ref())?;
    let engine = SwapDecisionEngine::new(chain.clone(), collaborators, EngineSettings::from_config(&config));
    let (handle, task) = engine.spawn();

    handle.set_account(config.account)?;
    handle.set_input(SwapInput { input: input_currency, output: output_currency, typed_amount: typed.raw, side: config.side })?;

    // Every fetch is bounded by the quote timeout; leave room for reads and the probe.
    let wait = Duration::from_millis(config.quote_timeout_ms.saturating_mul(3));
    match tokio::time::timeout(wait, handle.settled()).await {
        Ok(decision) => println!("Decision: {}", describe(&decision?)),
        Err(_) => println!("Decision (unsettled after {:?}): {}", wait, describe(&handle.current())),
    }

    if cli.approve {
        handle.approve()?;
        match tokio::time::timeout(wait, handle.settled()).await {
            Ok(decision) => println!("After approval: {}", describe(&decision?)),
            Err(_) => println!("Approval still pending after {:?}", wait),
        }
    }

    if cli.watch {
        println!("Watching for superseding decisions (Ctrl-C to stop)...");
        let changes = handle.changes();
        tokio::pin!(changes);
        loop {
            tokio::select! {
                next = changes.next() => match next {
                    Some(decision) => println!("Decision: {}", describe(&decision)),
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }
    }

    handle.shutdown()?;
    task.await?;
    Ok(())
}
