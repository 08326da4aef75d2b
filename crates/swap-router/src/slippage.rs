//! Slippage-bounded amounts. Tolerances are in basis points (10 000 bps = 100 %).

use num_bigint::BigUint;
use num_traits::Zero;

use crate::types::{RouterError, Result};

pub const BPS_DENOMINATOR: u32 = 10_000;
/// 0.5 %, the frontend's default tolerance.
pub const DEFAULT_SLIPPAGE_BPS: u32 = 50;

fn check_bps(slippage_bps: u32) -> Result<()> {
    if slippage_bps > BPS_DENOMINATOR {
        return Err(RouterError::InvalidAmount(format!(
            "slippage of {} bps exceeds {} bps",
            slippage_bps, BPS_DENOMINATOR
        )));
    }
    Ok(())
}

/// Smallest output accepted for an exact-input trade, rounded down.
pub fn minimum_amount_out(amount_out: &BigUint, slippage_bps: u32) -> Result<BigUint> {
    check_bps(slippage_bps)?;
    Ok(amount_out * (BPS_DENOMINATOR - slippage_bps) / BPS_DENOMINATOR)
}

/// Largest input spent on an exact-output trade, rounded up.
pub fn maximum_amount_in(amount_in: &BigUint, slippage_bps: u32) -> Result<BigUint> {
    check_bps(slippage_bps)?;
    let scaled = amount_in * (BPS_DENOMINATOR + slippage_bps);
    let denominator = BigUint::from(BPS_DENOMINATOR);
    let quotient = &scaled / &denominator;
    if (scaled % denominator).is_zero() {
        Ok(quotient)
    } else {
        Ok(quotient + 1u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimum_out_rounds_down() {
        let out = BigUint::from(1_001u32);
        assert_eq!(minimum_amount_out(&out, 50).unwrap(), BigUint::from(995u32));
        assert_eq!(minimum_amount_out(&out, 0).unwrap(), out);
        assert!(minimum_amount_out(&out, 10_001).is_err());
    }

    #[test]
    fn maximum_in_rounds_up() {
        assert_eq!(maximum_amount_in(&BigUint::from(1_001u32), 50).unwrap(), BigUint::from(1_007u32));
        assert_eq!(maximum_amount_in(&BigUint::from(10_000u32), 50).unwrap(), BigUint::from(10_050u32));
    }
}
