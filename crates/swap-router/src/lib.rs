// Library entry point for swap-router

pub mod chains;
pub mod config;
pub mod engine;
pub mod slippage;
pub mod sources;
pub mod types;
pub mod wrap;

pub use alloy_primitives::{Address, Bytes};
pub use engine::{Collaborators, EngineSettings, SwapDecisionEngine, SwapDecisionHandle};
pub use types::{
    AllowanceState, Amount, Currency, DecisionMode, ExecutionMode, Quote, QuoteSourceId, Result, RouterError,
    SwapDecision, SwapInput, TradeSide, WrapType,
};
