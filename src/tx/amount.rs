//! Coin amounts. Everything internal is integer sats; decimals only at the edges.

use serde_json::Value;

use crate::error::{VaultError, VaultResult};

pub const SATS_PER_COIN: u64 = 100_000_000;
const DECIMALS: usize = 8;

/// Parse a decimal coin amount ("1.5", "0.00000001") into sats, exactly.
pub fn parse_coin_amount(value: &str) -> VaultResult<u64> {
    let value = value.trim();
    let invalid = || VaultError::validation(format!("invalid amount: {value:?}"));
    if value.is_empty() || value.starts_with('-') || value.starts_with('+') {
        return Err(invalid());
    }
    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };
    if (whole.is_empty() && frac.is_empty())
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !frac.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }
    if frac.len() > DECIMALS {
        return Err(VaultError::validation(format!(
            "amount {value} has more than {DECIMALS} decimals"
        )));
    }
    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
    let frac_sats: u64 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<width$}", width = DECIMALS).parse().map_err(|_| invalid())?
    };
    whole
        .checked_mul(SATS_PER_COIN)
        .and_then(|sats| sats.checked_add(frac_sats))
        .ok_or_else(invalid)
}

/// Accept a JSON number or numeric string, as pages send either.
pub fn parse_coin_value(value: &Value) -> VaultResult<u64> {
    match value {
        Value::String(s) => parse_coin_amount(s),
        Value::Number(n) => match n.as_u64() {
            Some(whole) => whole
                .checked_mul(SATS_PER_COIN)
                .ok_or_else(|| VaultError::validation("amount out of range")),
            None => match n.as_f64() {
                Some(f) if f.is_finite() && f >= 0.0 => parse_coin_amount(&format!("{f}")),
                _ => Err(VaultError::validation(format!("invalid amount: {n}"))),
            },
        },
        other => Err(VaultError::validation(format!("invalid amount: {other}"))),
    }
}

pub fn format_coin_amount(sats: u64) -> String {
    let whole = sats / SATS_PER_COIN;
    let frac = sats % SATS_PER_COIN;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:08}");
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_exact() {
        assert_eq!(parse_coin_amount("1").unwrap(), SATS_PER_COIN);
        assert_eq!(parse_coin_amount("0.00000001").unwrap(), 1);
        assert_eq!(parse_coin_amount("12.5").unwrap(), 1_250_000_000);
        assert_eq!(parse_coin_amount(".5").unwrap(), 50_000_000);
        assert_eq!(parse_coin_amount("0.1").unwrap(), 10_000_000);
    }

    #[test]
    fn test_parse_rejects() {
        for bad in ["", "-1", "abc", "1.000000001", "1.2.3", ".", "NaN", "1e5"] {
            assert!(parse_coin_amount(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_json_values() {
        assert_eq!(parse_coin_value(&json!(2)).unwrap(), 200_000_000);
        assert_eq!(parse_coin_value(&json!(0.001)).unwrap(), 100_000);
        assert_eq!(parse_coin_value(&json!("0.001")).unwrap(), 100_000);
        assert!(parse_coin_value(&json!(-1)).is_err());
        assert!(parse_coin_value(&json!(null)).is_err());
    }

    #[test]
    fn test_format() {
        assert_eq!(format_coin_amount(0), "0");
        assert_eq!(format_coin_amount(15_000), "0.00015");
        assert_eq!(format_coin_amount(250_000_000), "2.5");
        assert_eq!(format_coin_amount(SATS_PER_COIN * 3), "3");
    }
}
