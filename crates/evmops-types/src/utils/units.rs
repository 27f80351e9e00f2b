//! Parsing of human readable ether amounts.
//!
//! Accepted forms:
//! - `"<amount> ether"` and `"<amount> gwei"`, where amount may have a fractional part
//! - `0x` prefixed hexadecimal wei
//! - plain decimal wei

use alloy::primitives::utils::parse_units;
use alloy::primitives::U256;
use thiserror::Error;

/// Errors produced while parsing a value string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitError {
	#[error("Empty value")]
	Empty,
	#[error("Value cannot be negative: {0}")]
	Negative(String),
	#[error("Failed to decode value '{value}': {reason}")]
	Invalid { value: String, reason: String },
}

const UNIT_SUFFIXES: [(&str, &str); 2] = [(" gwei", "gwei"), (" ether", "ether")];

/// Parses a value string into wei.
pub fn parse_ether_value(input: &str) -> Result<U256, UnitError> {
	let value = input.trim();
	if value.is_empty() {
		return Err(UnitError::Empty);
	}
	if value.starts_with('-') {
		return Err(UnitError::Negative(value.to_string()));
	}

	for (suffix, unit) in UNIT_SUFFIXES {
		if let Some(amount) = value.strip_suffix(suffix) {
			let parsed = parse_units(amount.trim(), unit).map_err(|e| UnitError::Invalid {
				value: value.to_string(),
				reason: e.to_string(),
			})?;
			return Ok(parsed.get_absolute());
		}
	}

	let (digits, radix) = match value
		.strip_prefix("0x")
		.or_else(|| value.strip_prefix("0X"))
	{
		Some(hex) => (hex, 16),
		None => (value, 10),
	};

	U256::from_str_radix(digits, radix).map_err(|e| UnitError::Invalid {
		value: value.to_string(),
		reason: e.to_string(),
	})
}
