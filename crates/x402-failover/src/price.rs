//! Dollar price strings to atomic token amounts.
//!
//! Parsing is integer-only: "$0.001" with 6 decimals becomes 1000 without
//! ever passing through a float.

use crate::error::PriceError;

/// Parse a price such as `"$0.01"`, `"0.05"` or `"$2"` into atomic units.
///
/// Everything except ASCII digits and `.` is ignored. Fractional digits
/// beyond `decimals` are truncated.
pub fn parse_price(price: &str, decimals: u32) -> Result<u64, PriceError> {
    let cleaned: String = price
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if cleaned.is_empty() || cleaned == "." {
        return Err(PriceError::Empty(price.to_string()));
    }

    let (whole, frac) = cleaned.split_once('.').unwrap_or((cleaned.as_str(), ""));
    if frac.contains('.') {
        return Err(PriceError::Malformed {
            price: price.to_string(),
            reason: "more than one decimal point".to_string(),
        });
    }

    let overflow = || PriceError::Overflow(price.to_string());
    let multiplier = 10u64.checked_pow(decimals).ok_or_else(overflow)?;

    let whole_units = parse_digits(whole, price)?
        .checked_mul(multiplier)
        .ok_or_else(overflow)?;

    let width = decimals as usize;
    let kept = &frac[..frac.len().min(width)];
    let padding = 10u64
        .checked_pow((width - kept.len()) as u32)
        .ok_or_else(overflow)?;
    let frac_units = parse_digits(kept, price)?
        .checked_mul(padding)
        .ok_or_else(overflow)?;

    whole_units.checked_add(frac_units).ok_or_else(overflow)
}

fn parse_digits(digits: &str, price: &str) -> Result<u64, PriceError> {
    if digits.is_empty() {
        return Ok(0);
    }
    digits.parse::<u64>().map_err(|e| match e.kind() {
        std::num::IntErrorKind::PosOverflow => PriceError::Overflow(price.to_string()),
        _ => PriceError::Malformed {
            price: price.to_string(),
            reason: e.to_string(),
        },
    })
}
