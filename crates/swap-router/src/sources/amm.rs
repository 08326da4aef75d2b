//! Constant-product AMM quoting over known pair reserves.

use std::collections::HashMap;

use async_trait::async_trait;
use num_bigint::BigUint;
use num_traits::Zero;
use tracing::debug;

use crate::slippage::{self, BPS_DENOMINATOR};
use crate::sources::QuoteSource;
use crate::types::{
    Amount, AmountBound, Currency, CurrencyId, Quote, QuoteSourceId, Result, RouteData, RouterError, SwapInput, TradeSide,
};

/// 0.25 % LP fee, as charged by the frontend's own router.
pub const DEFAULT_FEE_BPS: u32 = 25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reserves {
    pub reserve_in: BigUint,
    pub reserve_out: BigUint,
}

/// `amount_in * fee * reserve_out / (reserve_in * 10000 + amount_in * fee)`,
/// where `fee = 10000 - fee_bps`.
pub fn get_amount_out(amount_in: &BigUint, reserves: &Reserves, fee_bps: u32) -> Option<BigUint> {
    if amount_in.is_zero() || reserves.reserve_in.is_zero() || reserves.reserve_out.is_zero() {
        return None;
    }
    let amount_in_with_fee = amount_in * fee_factor(fee_bps)?;
    let numerator = &amount_in_with_fee * &reserves.reserve_out;
    let denominator = &reserves.reserve_in * BPS_DENOMINATOR + amount_in_with_fee;
    Some(numerator / denominator)
}

/// Input required to receive exactly `amount_out`; `None` if the pool cannot supply it.
pub fn get_amount_in(amount_out: &BigUint, reserves: &Reserves, fee_bps: u32) -> Option<BigUint> {
    if amount_out.is_zero() || reserves.reserve_in.is_zero() || amount_out >= &reserves.reserve_out {
        return None;
    }
    let numerator = &reserves.reserve_in * amount_out * BPS_DENOMINATOR;
    let denominator = (&reserves.reserve_out - amount_out) * fee_factor(fee_bps)?;
    Some(numerator / denominator + 1u8)
}

// Share of the input left after the LP fee, in bps. A fee of 100 % or more
// leaves nothing to swap.
fn fee_factor(fee_bps: u32) -> Option<u32> {
    BPS_DENOMINATOR.checked_sub(fee_bps).filter(|factor| *factor > 0)
}

/// Prices trades through direct pairs, or through the wrapped native token
/// when that gives a better result.
pub struct ConstantProductSource {
    pairs: HashMap<(CurrencyId, CurrencyId), Reserves>,
    wrapped_native: CurrencyId,
    fee_bps: u32,
    slippage_bps: u32,
}

impl ConstantProductSource {
    /// Fails when the fee leaves nothing to swap or the slippage exceeds 100 %.
    pub fn new(wrapped_native: &Currency, fee_bps: u32, slippage_bps: u32) -> Result<Self> {
        if fee_factor(fee_bps).is_none() {
            return Err(RouterError::Config(format!("AMM fee {} bps must be below {}", fee_bps, BPS_DENOMINATOR)));
        }
        if slippage_bps > BPS_DENOMINATOR {
            return Err(RouterError::Config(format!("slippage {} bps exceeds {}", slippage_bps, BPS_DENOMINATOR)));
        }
        Ok(Self { pairs: HashMap::new(), wrapped_native: wrapped_native.id, fee_bps, slippage_bps })
    }

    /// Register a pair with its current reserves. Both directions become quotable.
    pub fn with_pair(mut self, a: &Currency, b: &Currency, reserve_a: impl Into<BigUint>, reserve_b: impl Into<BigUint>) -> Self {
        let (reserve_a, reserve_b) = (reserve_a.into(), reserve_b.into());
        let (a, b) = (self.pool_key(a.id), self.pool_key(b.id));
        self.pairs.insert((a, b), Reserves { reserve_in: reserve_a.clone(), reserve_out: reserve_b.clone() });
        self.pairs.insert((b, a), Reserves { reserve_in: reserve_b, reserve_out: reserve_a });
        self
    }

    // Pools only ever hold the wrapped form of the native asset.
    fn pool_key(&self, id: CurrencyId) -> CurrencyId {
        match id {
            CurrencyId::Native => self.wrapped_native,
            other => other,
        }
    }

    fn candidate_paths(&self, input: CurrencyId, output: CurrencyId) -> Vec<Vec<CurrencyId>> {
        let (from, to) = (self.pool_key(input), self.pool_key(output));
        let mut paths = Vec::new();
        if self.pairs.contains_key(&(from, to)) {
            paths.push(vec![from, to]);
        }
        let hub = self.wrapped_native;
        if from != hub && to != hub && self.pairs.contains_key(&(from, hub)) && self.pairs.contains_key(&(hub, to)) {
            paths.push(vec![from, hub, to]);
        }
        paths
    }

    fn simulate_exact_in(&self, path: &[CurrencyId], amount_in: &BigUint) -> Option<BigUint> {
        let mut amount = amount_in.clone();
        for hop in path.windows(2) {
            let reserves = self.pairs.get(&(hop[0], hop[1]))?;
            amount = get_amount_out(&amount, reserves, self.fee_bps)?;
        }
        Some(amount)
    }

    fn simulate_exact_out(&self, path: &[CurrencyId], amount_out: &BigUint) -> Option<BigUint> {
        let mut amount = amount_out.clone();
        for hop in path.windows(2).rev() {
            let reserves = self.pairs.get(&(hop[0], hop[1]))?;
            amount = get_amount_in(&amount, reserves, self.fee_bps)?;
        }
        Some(amount)
    }
}

#[async_trait]
impl QuoteSource for ConstantProductSource {
    fn id(&self) -> QuoteSourceId {
        QuoteSourceId::Amm
    }

    async fn get_quote(&self, input: &SwapInput) -> Result<Quote> {
        if input.typed_amount.is_zero() {
            return Err(RouterError::InvalidAmount("amount must be positive".to_string()));
        }
        let paths = self.candidate_paths(input.input.id, input.output.id);

        // Best path: most output for exact-in, least input for exact-out.
        let best = match input.side {
            TradeSide::ExactInput => paths
                .into_iter()
                .filter_map(|p| self.simulate_exact_in(&p, &input.typed_amount).map(|out| (p, input.typed_amount.clone(), out)))
                .max_by(|a, b| a.2.cmp(&b.2)),
            TradeSide::ExactOutput => paths
                .into_iter()
                .filter_map(|p| self.simulate_exact_out(&p, &input.typed_amount).map(|amt_in| (p, amt_in, input.typed_amount.clone())))
                .min_by(|a, b| a.1.cmp(&b.1)),
        };

        let Some((path, amount_in, amount_out)) = best else {
            debug!(input = %input.input.id, output = %input.output.id, "no constant-product path");
            return Ok(Quote::empty(QuoteSourceId::Amm, input));
        };
        if amount_out.is_zero() {
            return Ok(Quote::empty(QuoteSourceId::Amm, input));
        }

        let bound = match input.side {
            TradeSide::ExactInput => AmountBound::MinOut(slippage::minimum_amount_out(&amount_out, self.slippage_bps)?),
            TradeSide::ExactOutput => AmountBound::MaxIn(slippage::maximum_amount_in(&amount_in, self.slippage_bps)?),
        };
        Ok(Quote {
            source: QuoteSourceId::Amm,
            input_amount: Amount::new(&input.input, amount_in),
            output_amount: Amount::new(&input.output, amount_out),
            route: RouteData::Amm { path, bound },
            is_empty: false,
        })
    }
}
