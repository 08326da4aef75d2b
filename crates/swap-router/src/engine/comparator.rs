//! Route comparison between the AMM and the aggregator.

use std::cmp::Ordering;

use crate::types::{Quote, QuoteSourceId, TradeSide};

fn usable(quote: Option<&Quote>) -> Option<&Quote> {
    quote.filter(|q| !q.is_empty)
}

/// Pick the better route. Pure and deterministic.
///
/// The aggregator must strictly beat the AMM: more output for exact-input
/// trades, less input for exact-output trades. Bridged aggregator routes and
/// amounts that cannot be compared like-for-like always fall back to the AMM.
pub fn compare(amm: Option<&Quote>, aggregator: Option<&Quote>, side: TradeSide) -> QuoteSourceId {
    let Some(aggregator) = usable(aggregator) else {
        return QuoteSourceId::Amm;
    };
    if aggregator.requires_bridge() {
        return QuoteSourceId::Amm;
    }
    let Some(amm) = usable(amm) else {
        return QuoteSourceId::Aggregator;
    };

    let aggregator_wins = match side {
        TradeSide::ExactInput => aggregator.output_amount.cmp_value(&amm.output_amount) == Some(Ordering::Greater),
        TradeSide::ExactOutput => aggregator.input_amount.cmp_value(&amm.input_amount) == Some(Ordering::Less),
    };
    if aggregator_wins {
        QuoteSourceId::Aggregator
    } else {
        QuoteSourceId::Amm
    }
}
