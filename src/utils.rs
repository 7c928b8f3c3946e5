use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use web3::types::U256;

use crate::types::{Error, Result};

/// Scale of Aave's ray encoding (1e27).
pub const RAY_DECIMALS: u32 = 27;
/// Scale of Compound's per-block mantissa (1e18).
pub const MANTISSA_DECIMALS: u32 = 18;
pub const BLOCKS_PER_DAY: u32 = 6570;
pub const DAYS_PER_YEAR: u64 = 365;

// Decimal carries a 96-bit mantissa.
const MAX_MANTISSA_BITS: usize = 96;

fn to_scaled_decimal(raw: U256, scale: u32) -> Result<Decimal> {
    if raw.bits() > MAX_MANTISSA_BITS {
        return Err(Error::RateOverflow(format!(
            "{} does not fit a 96-bit mantissa",
            raw
        )));
    }
    Decimal::try_from_i128_with_scale(raw.as_u128() as i128, scale)
        .map_err(|e| Error::RateOverflow(format!("{}: {}", raw, e)))
}

/// Converts a ray-encoded rate into a fraction: `raw / 1e27`, exactly.
pub fn ray_to_fraction(raw: U256) -> Result<Decimal> {
    Ok(to_scaled_decimal(raw, RAY_DECIMALS)?.normalize())
}

/// Annualizes a per-block mantissa rate: `(1 + raw * 6570 / 1e18) ^ 365 - 1`.
pub fn rate_per_block_to_apy(raw: U256) -> Result<Decimal> {
    let per_block = to_scaled_decimal(raw, MANTISSA_DECIMALS)?;
    let overflow = || Error::RateOverflow(format!("{} per block cannot be annualized", raw));

    let daily = per_block
        .checked_mul(Decimal::from(BLOCKS_PER_DAY))
        .ok_or_else(overflow)?;
    let yearly = (Decimal::ONE + daily)
        .checked_powu(DAYS_PER_YEAR)
        .ok_or_else(overflow)?;

    Ok((yearly - Decimal::ONE).normalize())
}

/// Formats a fraction as a percentage with two decimals, e.g. `0.035` as `3.50%`.
pub fn format_percentage(rate: Decimal) -> String {
    let percent = (rate * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.2}%", percent)
}
