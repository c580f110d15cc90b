//! Exact rate arithmetic
//!
//! History multipliers are stored as f64, but every product of a stored rate
//! with a token amount is evaluated exactly: the double is split into its
//! integer mantissa and binary exponent, multiplied in u128 and rounded
//! half-to-even once. The outcome depends only on the stored bits.

use crate::{Result, StipendError};

const MANTISSA_BITS: u32 = 52;
const EXPONENT_BIAS: i32 = 1075;

/// Daily rate represented by a stored growth multiplier.
///
/// Unwritten slots hold 0.0 and supply never shrinks, so anything below 1.0
/// carries no growth.
pub fn rate_from_multiplier(multiplier: f64) -> f64 {
    if multiplier.is_finite() && multiplier > 1.0 {
        multiplier - 1.0
    } else {
        0.0
    }
}

/// `round_half_even(rate * amount)` computed without intermediate rounding
pub fn mul_round_half_even(rate: f64, amount: u64) -> Result<u64> {
    if !rate.is_finite() || rate < 0.0 {
        return Err(StipendError::ArithmeticOverflow);
    }
    if rate == 0.0 || amount == 0 {
        return Ok(0);
    }

    let bits = rate.to_bits();
    let biased_exponent = ((bits >> MANTISSA_BITS) & 0x7ff) as i32;
    let fraction = bits & ((1u64 << MANTISSA_BITS) - 1);
    let (mantissa, exponent) = if biased_exponent == 0 {
        (fraction, 1 - EXPONENT_BIAS)
    } else {
        (fraction | (1u64 << MANTISSA_BITS), biased_exponent - EXPONENT_BIAS)
    };

    // mantissa < 2^53 and amount < 2^64, so the product fits in 117 bits
    let product = u128::from(mantissa) * u128::from(amount);

    if exponent >= 0 {
        let shift = exponent as u32;
        if shift >= product.leading_zeros() {
            return Err(StipendError::ArithmeticOverflow);
        }
        return u64::try_from(product << shift).map_err(|_| StipendError::ArithmeticOverflow);
    }

    let shift = exponent.unsigned_abs();
    if shift > 118 {
        // value is below 2^-1, rounds to zero
        return Ok(0);
    }
    let quotient = product >> shift;
    let remainder = product & ((1u128 << shift) - 1);
    let half = 1u128 << (shift - 1);
    let rounded = if remainder > half || (remainder == half && quotient & 1 == 1) {
        quotient + 1
    } else {
        quotient
    };
    u64::try_from(rounded).map_err(|_| StipendError::ArithmeticOverflow)
}

/// `floor(amount * numerator / denominator)` in u128
pub fn mul_div_floor(amount: u64, numerator: u64, denominator: u64) -> Result<u64> {
    if denominator == 0 {
        return Err(StipendError::ArithmeticOverflow);
    }
    let value = u128::from(amount) * u128::from(numerator) / u128::from(denominator);
    u64::try_from(value).map_err(|_| StipendError::ArithmeticOverflow)
}
