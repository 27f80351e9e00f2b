//! Block scanning types for the evmops system.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Criteria for finding the first matching transaction in a block range.
///
/// Immutable for the lifetime of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
	/// Only match transactions sent by this account.
	pub from: Option<Address>,
	/// Only match transactions sent to this account.
	pub to: Option<Address>,
	/// `Some(true)` matches value transfers only, `Some(false)` excludes them.
	pub is_transfer: Option<bool>,
	/// First block to scan.
	pub start_block: u64,
	/// Maximum number of blocks past `start_block` that may be scanned.
	pub limit_blocks: Option<u64>,
}

impl FilterCriteria {
	/// Creates criteria that match any transaction from `start_block` on.
	pub fn from_block(start_block: u64) -> Self {
		Self {
			start_block,
			..Default::default()
		}
	}

	/// Highest block number that may be scanned, if a limit is set.
	pub fn last_allowed_block(&self) -> Option<u64> {
		self.limit_blocks
			.map(|limit| self.start_block.saturating_add(limit))
	}
}
