//! Hex string helpers used when printing hashes and parsing keys.

use alloy::primitives::B256;

/// Truncates an identifier to its first 10 characters for log output.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(10) {
		Some((end, _)) => format!("{}..", &id[..end]),
		None => id.to_string(),
	}
}

/// Short form of a transaction or block hash, e.g. `0x5fbdb231..`.
pub fn short_hash(hash: &B256) -> String {
	truncate_id(&hash.to_string())
}

/// Adds a `0x` prefix unless one (of either case) is already present.
pub fn with_0x_prefix(hex_str: &str) -> String {
	if hex_str.starts_with("0x") || hex_str.starts_with("0X") {
		hex_str.to_string()
	} else {
		format!("0x{}", hex_str)
	}
}

/// Strips a leading `0x` or `0X`, if any.
pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("0x12345678"), "0x12345678");
		assert_eq!(truncate_id("0x1234567890abcdef"), "0x12345678..");
	}

	#[test]
	fn test_truncate_id_multibyte() {
		// Byte 10 falls inside the second 'é'
		assert_eq!(truncate_id("0x12345éé7890"), "0x12345éé7..");
		assert_eq!(truncate_id("ééééééééé"), "ééééééééé");
		assert_eq!(truncate_id("ééééééééééé"), "éééééééééé..");
	}

	#[test]
	fn test_short_hash() {
		let hash = B256::repeat_byte(0xab);
		assert_eq!(short_hash(&hash), "0xabababab..");
	}

	#[test]
	fn test_prefix_helpers() {
		let bare = "5fbdb2315678afecb367f032d93f642f64180aa3";
		let prefixed = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

		assert_eq!(with_0x_prefix(bare), prefixed);
		assert_eq!(with_0x_prefix(prefixed), prefixed);
		assert_eq!(with_0x_prefix("0Xabc"), "0Xabc");

		assert_eq!(without_0x_prefix(prefixed), bare);
		assert_eq!(without_0x_prefix(bare), bare);
		assert_eq!(without_0x_prefix("0Xabc"), "abc");
	}
}
