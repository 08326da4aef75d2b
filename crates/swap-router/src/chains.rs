//! Per-chain native/wrapped-native currencies and default RPC endpoints.

use alloy_primitives::{address, Address};

use crate::types::{Currency, RouterError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: &'static str,
    pub native: Currency,
    pub wrapped_native: Currency,
    pub default_rpc_url: &'static str,
}

fn chain(
    chain_id: u64,
    name: &'static str,
    native_symbol: &str,
    wrapped_address: Address,
    wrapped_symbol: &str,
    default_rpc_url: &'static str,
) -> ChainConfig {
    ChainConfig {
        chain_id,
        name,
        native: Currency::native(native_symbol, 18),
        wrapped_native: Currency::token(wrapped_address, wrapped_symbol, 18),
        default_rpc_url,
    }
}

/// All chains the frontend ships swap support for.
pub fn supported_chains() -> Vec<ChainConfig> {
    vec![
        chain(56, "BNB Smart Chain", "BNB", address!("bb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c"), "WBNB", "https://bsc-dataseed.binance.org"),
        chain(1116, "Core", "CORE", address!("40375C92d9FAf44d2f9db9Bd9ba41a3317a2404f"), "WCORE", "https://rpc.coredao.org"),
        chain(8453, "Base", "ETH", address!("4200000000000000000000000000000000000006"), "WETH", "https://mainnet.base.org"),
        chain(81457, "Blast L2", "ETH", address!("4300000000000000000000000000000000000004"), "WETH", "https://rpc.blast.io"),
        chain(534352, "Scroll", "ETH", address!("5300000000000000000000000000000000000004"), "WETH", "https://rpc.scroll.io"),
        chain(40, "Telos EVM", "TLOS", address!("D102cE6A4dB07D247fcc28F366A623Df0938CA9E"), "WTLOS", "https://mainnet.telos.net/evm"),
    ]
}

pub fn get_chain(chain_id: u64) -> Result<ChainConfig> {
    supported_chains()
        .into_iter()
        .find(|c| c.chain_id == chain_id)
        .ok_or_else(|| RouterError::Config(format!("Unsupported chain id: {}", chain_id)))
}

impl ChainConfig {
    /// Resolve a user-supplied currency reference: the native symbol, the
    /// wrapped symbol, or a raw token address (assumed 18 decimals unless given).
    pub fn resolve_currency(&self, reference: &str, decimals: Option<u8>) -> Result<Currency> {
        if reference.eq_ignore_ascii_case(&self.native.symbol) || reference.eq_ignore_ascii_case("native") {
            return Ok(self.native.clone());
        }
        if reference.eq_ignore_ascii_case(&self.wrapped_native.symbol) {
            return Ok(self.wrapped_native.clone());
        }
        let address: Address = reference
            .parse()
            .map_err(|e| RouterError::Config(format!("Invalid token reference '{}': {}", reference, e)))?;
        if Some(address) == self.wrapped_native.address() {
            return Ok(self.wrapped_native.clone());
        }
        Ok(Currency::token(address, address.to_string(), decimals.unwrap_or(18)))
    }
}
