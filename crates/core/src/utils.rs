use alloy::primitives::{Address, B256, U256};
use anyhow::anyhow;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub fn parse_address(s: &str) -> anyhow::Result<Address> {
    Address::from_str(s.trim()).map_err(|e| anyhow!("invalid address {s}: {e}"))
}

pub fn parse_b256(s: &str) -> anyhow::Result<B256> {
    let stripped = s.trim().trim_start_matches("0x");
    B256::from_str(stripped).map_err(|e| anyhow!("invalid b256 {s}: {e}"))
}

pub fn u256_to_f64(value: U256) -> Option<f64> {
    value.to_string().parse::<f64>().ok()
}

/// Raw integer amount to human units, e.g. wei to whole native tokens.
pub fn to_units(value: U256, decimals: u8) -> Option<f64> {
    let raw = u256_to_f64(value)?;
    Some(raw / 10f64.powi(decimals as i32))
}

/// Human units back to a raw integer amount, rounded to the token's decimals.
/// Amounts beyond u128 range saturate, which no realistic trade size reaches.
pub fn from_units(units: f64, decimals: u8) -> U256 {
    if !units.is_finite() || units <= 0.0 {
        return U256::ZERO;
    }
    let raw = units * 10f64.powi(decimals as i32);
    if raw >= u128::MAX as f64 {
        return U256::from(u128::MAX);
    }
    U256::from(raw.round() as u128)
}

pub fn gwei_to_wei(gwei: u64) -> u128 {
    (gwei as u128) * 1_000_000_000u128
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_round_trip() {
        let one_token = U256::from(10u128.pow(18));
        assert_eq!(to_units(one_token, 18), Some(1.0));
        assert_eq!(from_units(1.0, 18), one_token);
    }

    #[test]
    fn from_units_rounds_to_decimals() {
        // 1.5 of a 6-decimal token
        assert_eq!(from_units(1.5, 6), U256::from(1_500_000u64));
        // sub-resolution dust rounds away
        assert_eq!(from_units(0.000_000_4, 6), U256::ZERO);
    }

    #[test]
    fn from_units_rejects_non_positive() {
        assert_eq!(from_units(0.0, 18), U256::ZERO);
        assert_eq!(from_units(-3.0, 18), U256::ZERO);
        assert_eq!(from_units(f64::NAN, 18), U256::ZERO);
    }

    #[test]
    fn parse_address_trims_whitespace() {
        let addr = parse_address(" 0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7 ").unwrap();
        assert_eq!(
            format!("{addr:#x}"),
            "0xb31f66aa3c1e785363f0875a1b74e27b85fd66c7"
        );
    }
}
