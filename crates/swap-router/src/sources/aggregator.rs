//! External aggregator router: response model and (with `http`) the HTTP client.

use alloy_primitives::{Address, Bytes};
use num_bigint::BigUint;
use serde::Deserialize;

use crate::types::{AggregatorRoute, Amount, BridgeHop, Quote, QuoteSourceId, Result, RouteData, RouterError, SwapInput};

/// Placeholder address aggregators use for the chain's native asset.
pub const NATIVE_PLACEHOLDER: Address = Address::new([0xee; 20]);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    pub return_amount_wei: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteArgs {
    pub amount_in: String,
    pub amount_out_min: String,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub bridge: Vec<BridgeHop>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteTx {
    pub to: Address,
    pub data: Bytes,
}

/// Body returned by the aggregator's route endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteResponse {
    pub route: Option<RouteSummary>,
    pub args: Option<RouteArgs>,
    #[serde(default)]
    pub tx: Option<RouteTx>,
}

fn parse_wei(field: &str, value: &str) -> Result<BigUint> {
    BigUint::parse_bytes(value.trim().as_bytes(), 10)
        .ok_or_else(|| RouterError::InvalidAmount(format!("{} is not a decimal integer: '{}'", field, value)))
}

impl RouteResponse {
    /// Convert into a quote for `input`. A response without route data is an
    /// empty quote; `default_router` is used when the service omits `tx.to`.
    pub fn into_quote(self, input: &SwapInput, default_router: Option<Address>) -> Result<Quote> {
        let (Some(summary), Some(args)) = (self.route, self.args) else {
            return Ok(Quote::empty(QuoteSourceId::Aggregator, input));
        };
        let amount_in = parse_wei("amountIn", &args.amount_in)?;
        let return_amount = parse_wei("returnAmountWei", &summary.return_amount_wei)?;
        let amount_out_min = parse_wei("amountOutMin", &args.amount_out_min)?;

        let (router, calldata) = match self.tx {
            Some(tx) => (tx.to, tx.data),
            None => {
                let router = default_router.ok_or_else(|| RouterError::QuoteUnavailable {
                    source_id: QuoteSourceId::Aggregator,
                    reason: "route has no router address".to_string(),
                })?;
                (router, args.data)
            }
        };

        Ok(Quote {
            source: QuoteSourceId::Aggregator,
            input_amount: Amount::new(&input.input, amount_in),
            output_amount: Amount::new(&input.output, return_amount.clone()),
            route: RouteData::Aggregator(AggregatorRoute { router, calldata, amount_out_min, bridge: args.bridge }),
            is_empty: return_amount == BigUint::default(),
        })
    }
}

#[cfg(feature = "http")]
pub use client::AggregatorClient;

#[cfg(feature = "http")]
mod client {
    use std::time::Duration;

    use alloy_primitives::Address;
    use async_trait::async_trait;
    use tracing::{debug, warn};

    use super::{RouteResponse, NATIVE_PLACEHOLDER};
    use crate::sources::QuoteSource;
    use crate::types::{Currency, Quote, QuoteSourceId, Result, RouterError, SwapInput, TradeSide};

    /// Queries `{base_url}/route` for the single best external route.
    pub struct AggregatorClient {
        http: reqwest::Client,
        base_url: String,
        chain_id: u64,
        router: Option<Address>,
        slippage_bps: u32,
    }

    fn token_param(currency: &Currency) -> String {
        currency.address().unwrap_or(NATIVE_PLACEHOLDER).to_string()
    }

    impl AggregatorClient {
        pub fn new(base_url: impl Into<String>, chain_id: u64, router: Option<Address>, slippage_bps: u32, timeout: Duration) -> Result<Self> {
            let http = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| RouterError::Http(e.to_string()))?;
            Ok(Self { http, base_url: base_url.into().trim_end_matches('/').to_string(), chain_id, router, slippage_bps })
        }
    }

    #[async_trait]
    impl QuoteSource for AggregatorClient {
        fn id(&self) -> QuoteSourceId {
            QuoteSourceId::Aggregator
        }

        async fn get_quote(&self, input: &SwapInput) -> Result<Quote> {
            if input.side == TradeSide::ExactOutput {
                return Err(RouterError::QuoteUnavailable {
                    source_id: QuoteSourceId::Aggregator,
                    reason: "exact-output trades are not routed by the aggregator".to_string(),
                });
            }
            let url = format!("{}/route", self.base_url);
            let query = [
                ("chainId", self.chain_id.to_string()),
                ("tokenIn", token_param(&input.input)),
                ("tokenOut", token_param(&input.output)),
                ("amount", input.typed_amount.to_string()),
                ("slippageBps", self.slippage_bps.to_string()),
            ];
            debug!(%url, amount = %input.typed_amount, "requesting aggregator route");
            let resp = self
                .http
                .get(&url)
                .query(&query)
                .send()
                .await
                .map_err(|e| RouterError::Http(e.to_string()))?;
            if !resp.status().is_success() {
                warn!(status = %resp.status(), "aggregator returned an error status");
                return Err(RouterError::QuoteUnavailable {
                    source_id: QuoteSourceId::Aggregator,
                    reason: format!("HTTP {}", resp.status()),
                });
            }
            let body: RouteResponse = resp.json().await.map_err(|e| RouterError::Http(e.to_string()))?;
            body.into_quote(input, self.router)
        }
    }
}
