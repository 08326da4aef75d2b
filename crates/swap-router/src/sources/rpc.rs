//! JSON-RPC backed collaborators: gas estimation, balances and allowance reads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use num_bigint::BigUint;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::sources::{AllowanceTracker, BalanceProvider, GasEstimator};
use crate::types::{AllowanceState, Amount, CallOverrides, ContractCall, Currency, Result, RouterError};

const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];
const ALLOWANCE_SELECTOR: [u8; 4] = [0xdd, 0x62, 0xed, 0x3e];

/// Minimal JSON-RPC 2.0 client over HTTP.
pub struct JsonRpcClient {
    http: Client,
    url: String,
    next_id: AtomicU64,
}

fn parse_quantity(value: &Value) -> Result<BigUint> {
    let hex = value
        .as_str()
        .ok_or_else(|| RouterError::Rpc(format!("expected hex string, got {}", value)))?
        .trim_start_matches("0x");
    if hex.is_empty() {
        return Ok(BigUint::default());
    }
    BigUint::parse_bytes(hex.as_bytes(), 16).ok_or_else(|| RouterError::Rpc(format!("invalid hex quantity '{}'", hex)))
}

fn to_hex_quantity(value: &BigUint) -> String {
    format!("0x{}", value.to_str_radix(16))
}

fn encode_address_call(selector: [u8; 4], args: &[Address]) -> Bytes {
    let mut data = Vec::with_capacity(4 + 32 * args.len());
    data.extend_from_slice(&selector);
    for arg in args {
        data.extend_from_slice(arg.into_word().as_slice());
    }
    Bytes::from(data)
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build().map_err(|e| RouterError::Http(e.to_string()))?;
        Ok(Self { http, url: url.into(), next_id: AtomicU64::new(1) })
    }

    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id
        });
        debug!(method, id, "json-rpc request");
        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RouterError::Http(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_else(|_| "Failed to read error body".to_string());
            warn!("RPC request failed with status: {}. Body: {}", status, text);
            return Err(RouterError::Rpc(format!("HTTP {}: {}", status, text)));
        }
        let mut body: Value = response.json().await.map_err(|e| RouterError::Rpc(e.to_string()))?;
        if let Some(err) = body.get("error") {
            return Err(RouterError::Rpc(err.to_string()));
        }
        body.get_mut("result")
            .map(Value::take)
            .ok_or_else(|| RouterError::Rpc(format!("response without result: {}", body)))
    }

    async fn eth_call(&self, to: Address, data: Bytes) -> Result<BigUint> {
        let result = self.request("eth_call", json!([{ "to": to, "data": data }, "latest"])).await?;
        parse_quantity(&result)
    }
}

pub struct JsonRpcGasEstimator {
    client: JsonRpcClient,
}

impl JsonRpcGasEstimator {
    pub fn new(client: JsonRpcClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GasEstimator for JsonRpcGasEstimator {
    async fn estimate(&self, call: &ContractCall, overrides: &CallOverrides) -> Result<u64> {
        let tx = json!({
            "from": overrides.from,
            "to": call.to,
            "data": call.data,
            "value": to_hex_quantity(&overrides.value),
        });
        let result = self
            .client
            .request("eth_estimateGas", json!([tx]))
            .await
            .map_err(|e| RouterError::GasEstimateFailed(e.to_string()))?;
        let gas = parse_quantity(&result).map_err(|e| RouterError::GasEstimateFailed(e.to_string()))?;
        u64::try_from(gas).map_err(|e| RouterError::GasEstimateFailed(e.to_string()))
    }
}

pub struct JsonRpcBalances {
    client: JsonRpcClient,
}

impl JsonRpcBalances {
    pub fn new(client: JsonRpcClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BalanceProvider for JsonRpcBalances {
    async fn get_balance(&self, owner: Address, currency: &Currency) -> Result<Amount> {
        let raw = match currency.address() {
            None => {
                let result = self
                    .client
                    .request("eth_getBalance", json!([owner, "latest"]))
                    .await
                    .map_err(|e| RouterError::BalanceUnavailable(e.to_string()))?;
                parse_quantity(&result)?
            }
            Some(token) => self
                .client
                .eth_call(token, encode_address_call(BALANCE_OF_SELECTOR, &[owner]))
                .await
                .map_err(|e| RouterError::BalanceUnavailable(e.to_string()))?,
        };
        Ok(Amount::new(currency, raw))
    }
}

/// Reads `allowance(owner, spender)` on-chain. Submitting approvals needs a
/// wallet signer, so `approve` always fails here.
pub struct JsonRpcAllowances {
    client: JsonRpcClient,
}

impl JsonRpcAllowances {
    pub fn new(client: JsonRpcClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AllowanceTracker for JsonRpcAllowances {
    async fn get_state(&self, owner: Address, spender: Address, token: &Currency, required: &Amount) -> Result<AllowanceState> {
        let Some(token_address) = token.address() else {
            return Ok(AllowanceState::Sufficient);
        };
        let granted = self
            .client
            .eth_call(token_address, encode_address_call(ALLOWANCE_SELECTOR, &[owner, spender]))
            .await
            .map_err(|e| RouterError::AllowanceCheckFailed(e.to_string()))?;
        Ok(if granted >= required.raw { AllowanceState::Sufficient } else { AllowanceState::Insufficient })
    }

    async fn approve(&self, _owner: Address, _spender: Address, token: &Currency) -> Result<AllowanceState> {
        Err(RouterError::AllowanceCheckFailed(format!(
            "approving {} requires a wallet signer",
            token.symbol
        )))
    }
}
