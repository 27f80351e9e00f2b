//! Utility functions for hex strings and value conversions.

pub mod formatting;
pub mod units;

pub use formatting::{short_hash, truncate_id, with_0x_prefix, without_0x_prefix};
pub use units::{parse_ether_value, UnitError};
