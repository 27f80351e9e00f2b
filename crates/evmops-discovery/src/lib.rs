//! Block scanning module for the evmops system.
//!
//! The [`BlockFilterScanner`] walks blocks from a start height up to the chain's
//! moving head and returns the hash of the first transaction accepted by
//! [`matches`]. Once the known blocks are exhausted it waits for the head to
//! advance, until a match is found, the scan depth limit is hit, or the caller
//! cancels.

use evmops_types::{BlockSource, BlockTag, ChainError, ChainTransaction, FilterCriteria, B256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Default delay between two head lookups while waiting for new blocks.
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_secs(5);

/// Errors that can occur while scanning blocks.
#[derive(Debug, Error)]
pub enum DiscoveryError {
	/// The requested start block is beyond the chain head.
	#[error("Start block {start} is after the chain head {head}")]
	StartAfterHead { start: u64, head: u64 },
	/// The scan would go past `start_block + limit_blocks`.
	#[error("No match within {limit} blocks after block {start}")]
	DepthLimitExceeded { start: u64, limit: u64 },
	/// The caller cancelled the scan.
	#[error("Scan cancelled")]
	Cancelled,
	/// The node does not report a head block.
	#[error("Chain head unavailable")]
	HeadUnavailable,
	/// The node does not know a block at or below its reported head.
	#[error("Block {0} not found")]
	BlockNotFound(u64),
	/// Error returned by the block source.
	#[error(transparent)]
	Chain(#[from] ChainError),
}

/// Returns true when `tx` satisfies every filter set in `criteria`.
///
/// Unset filters are ignored. A recipient filter never matches a contract
/// creation.
pub fn matches(tx: &ChainTransaction, criteria: &FilterCriteria) -> bool {
	if let Some(from) = criteria.from {
		if tx.from != from {
			return false;
		}
	}

	if let Some(to) = criteria.to {
		if tx.to != Some(to) {
			return false;
		}
	}

	match criteria.is_transfer {
		Some(true) if tx.value.is_none() => false,
		Some(false) if tx.value.is_some() => false,
		_ => true,
	}
}

/// Scan progress. `lower..upper` is the range still to visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScanCursor {
	initial: u64,
	lower: u64,
	upper: u64,
}

impl ScanCursor {
	fn new(initial: u64, head: u64) -> Self {
		Self {
			initial,
			lower: initial,
			upper: head,
		}
	}

	/// Marks the current batch as consumed.
	fn finish_batch(&mut self) {
		self.lower = self.upper;
	}

	/// Adopts a new head. Returns false when the head did not advance.
	fn advance_to(&mut self, head: u64) -> bool {
		if head > self.upper {
			self.upper = head;
			true
		} else {
			false
		}
	}
}

/// Finds the first transaction matching a [`FilterCriteria`].
///
/// Blocks are visited in ascending order, each exactly once. The block at the
/// reported head is only visited once a newer head has been seen.
pub struct BlockFilterScanner<S: BlockSource + ?Sized> {
	source: Arc<S>,
	wait_interval: Duration,
}

impl<S: BlockSource + ?Sized> BlockFilterScanner<S> {
	/// Creates a scanner over `source` with the default wait interval.
	pub fn new(source: Arc<S>) -> Self {
		Self {
			source,
			wait_interval: DEFAULT_WAIT_INTERVAL,
		}
	}

	/// Sets how long to wait between head lookups once caught up.
	pub fn with_wait_interval(mut self, wait_interval: Duration) -> Self {
		self.wait_interval = wait_interval;
		self
	}

	/// Scans until a matching transaction is found and returns its hash.
	#[instrument(skip_all, fields(start = criteria.start_block, limit = ?criteria.limit_blocks))]
	pub async fn run(
		&self,
		criteria: &FilterCriteria,
		cancel: &CancellationToken,
	) -> Result<B256, DiscoveryError> {
		let head = until_cancelled(cancel, self.head()).await?;
		if criteria.start_block > head {
			return Err(DiscoveryError::StartAfterHead {
				start: criteria.start_block,
				head,
			});
		}

		let mut cursor = ScanCursor::new(criteria.start_block, head);
		tracing::info!(head, "Starting block scan");

		loop {
			for number in cursor.lower..cursor.upper {
				self.check_depth(criteria, number)?;

				let found = until_cancelled(cancel, self.scan_block(number, criteria)).await?;
				if let Some(hash) = found {
					tracing::info!(block = number, tx_hash = %hash, "Found matching transaction");
					return Ok(hash);
				}

				if cancel.is_cancelled() {
					return Err(DiscoveryError::Cancelled);
				}
			}
			cursor.finish_batch();

			// Fail now rather than after the next head advance
			self.check_depth(criteria, cursor.lower)?;

			self.wait_for_head(&mut cursor, cancel).await?;
		}
	}

	async fn head(&self) -> Result<u64, DiscoveryError> {
		self.source
			.get_block(BlockTag::Latest, false)
			.await?
			.map(|block| block.number)
			.ok_or(DiscoveryError::HeadUnavailable)
	}

	fn check_depth(&self, criteria: &FilterCriteria, number: u64) -> Result<(), DiscoveryError> {
		match (criteria.last_allowed_block(), criteria.limit_blocks) {
			(Some(last), Some(limit)) if number > last => Err(DiscoveryError::DepthLimitExceeded {
				start: criteria.start_block,
				limit,
			}),
			_ => Ok(()),
		}
	}

	async fn scan_block(
		&self,
		number: u64,
		criteria: &FilterCriteria,
	) -> Result<Option<B256>, DiscoveryError> {
		let block = self
			.source
			.get_block(BlockTag::Number(number), true)
			.await?
			.ok_or(DiscoveryError::BlockNotFound(number))?;

		tracing::debug!(
			block = number,
			transactions = block.transactions.len(),
			"Scanning block"
		);

		Ok(block
			.transactions
			.iter()
			.find(|tx| matches(tx, criteria))
			.map(|tx| tx.hash))
	}

	/// Sleeps until the head moves past the cursor's upper bound.
	async fn wait_for_head(
		&self,
		cursor: &mut ScanCursor,
		cancel: &CancellationToken,
	) -> Result<(), DiscoveryError> {
		loop {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
				_ = tokio::time::sleep(self.wait_interval) => {}
			}

			let head = until_cancelled(cancel, self.head()).await?;
			if cursor.advance_to(head) {
				tracing::debug!(
					from = cursor.lower,
					to = cursor.upper,
					scanned_since = cursor.initial,
					"Chain head advanced"
				);
				return Ok(());
			}
		}
	}
}

/// Drives a node request unless `cancel` fires first.
async fn until_cancelled<T>(
	cancel: &CancellationToken,
	request: impl Future<Output = Result<T, DiscoveryError>>,
) -> Result<T, DiscoveryError> {
	tokio::select! {
		biased;
		_ = cancel.cancelled() => Err(DiscoveryError::Cancelled),
		result = request => result,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use evmops_types::{Address, Bytes, ChainBlock, U256};
	use std::collections::{HashMap, VecDeque};
	use std::sync::Mutex;

	fn tx(seed: u8, from: Address, to: Option<Address>, value: Option<u64>) -> ChainTransaction {
		ChainTransaction {
			hash: B256::repeat_byte(seed),
			from,
			to,
			value: value.map(U256::from),
			input: Bytes::new(),
			nonce: 0,
		}
	}

	const ALICE: Address = Address::new([0xa1; 20]);
	const BOB: Address = Address::new([0xb0; 20]);

	/// Chain whose head follows a script: each head lookup pops the next
	/// entry, and the last entry sticks.
	struct FakeBlocks {
		heads: Mutex<VecDeque<u64>>,
		current_head: Mutex<u64>,
		transactions: HashMap<u64, Vec<ChainTransaction>>,
		queried: Mutex<Vec<u64>>,
		cancel_after: Option<(u64, CancellationToken)>,
		stall_after_script: bool,
		stall_block: Option<u64>,
	}

	impl FakeBlocks {
		fn new(heads: &[u64]) -> Self {
			Self {
				heads: Mutex::new(heads.iter().copied().collect()),
				current_head: Mutex::new(0),
				transactions: HashMap::new(),
				queried: Mutex::new(Vec::new()),
				cancel_after: None,
				stall_after_script: false,
				stall_block: None,
			}
		}

		/// Head lookups hang once the scripted heads are used up.
		fn stall_after_script(mut self) -> Self {
			self.stall_after_script = true;
			self
		}

		/// Fetching `block` hangs.
		fn stall_block(mut self, block: u64) -> Self {
			self.stall_block = Some(block);
			self
		}

		fn with_transactions(mut self, block: u64, txs: Vec<ChainTransaction>) -> Self {
			self.transactions.insert(block, txs);
			self
		}

		fn cancel_after(mut self, block: u64, token: CancellationToken) -> Self {
			self.cancel_after = Some((block, token));
			self
		}

		fn queried(&self) -> Vec<u64> {
			self.queried.lock().unwrap().clone()
		}

		fn block(number: u64, transactions: Vec<ChainTransaction>) -> ChainBlock {
			ChainBlock {
				number,
				hash: B256::with_last_byte(number as u8),
				timestamp: 1_700_000_000 + number,
				transactions,
			}
		}
	}

	#[async_trait]
	impl BlockSource for FakeBlocks {
		async fn get_block(
			&self,
			tag: BlockTag,
			include_bodies: bool,
		) -> Result<Option<ChainBlock>, ChainError> {
			match tag {
				BlockTag::Latest => {
					let head = {
						let mut current = self.current_head.lock().unwrap();
						match self.heads.lock().unwrap().pop_front() {
							Some(next) => {
								*current = next;
								Some(next)
							},
							None if self.stall_after_script => None,
							None => Some(*current),
						}
					};
					match head {
						Some(head) => Ok(Some(Self::block(head, Vec::new()))),
						None => {
							tokio::time::sleep(Duration::from_secs(3600)).await;
							Ok(None)
						},
					}
				},
				BlockTag::Number(n) => {
					assert!(include_bodies);
					if n > *self.current_head.lock().unwrap() {
						return Ok(None);
					}
					self.queried.lock().unwrap().push(n);
					if self.stall_block == Some(n) {
						tokio::time::sleep(Duration::from_secs(3600)).await;
					}
					if let Some((after, token)) = &self.cancel_after {
						if n == *after {
							token.cancel();
						}
					}
					let txs = self.transactions.get(&n).cloned().unwrap_or_default();
					Ok(Some(Self::block(n, txs)))
				},
			}
		}
	}

	fn scanner(source: Arc<FakeBlocks>) -> BlockFilterScanner<FakeBlocks> {
		BlockFilterScanner::new(source).with_wait_interval(Duration::from_millis(5))
	}

	#[test]
	fn test_matches_sender_filter() {
		let criteria = FilterCriteria {
			from: Some(ALICE),
			..Default::default()
		};
		assert!(matches(&tx(1, ALICE, Some(BOB), None), &criteria));
		assert!(!matches(&tx(2, BOB, Some(ALICE), None), &criteria));
	}

	#[test]
	fn test_matches_recipient_filter() {
		let criteria = FilterCriteria {
			to: Some(BOB),
			..Default::default()
		};
		assert!(matches(&tx(1, ALICE, Some(BOB), None), &criteria));
		assert!(!matches(&tx(2, ALICE, Some(ALICE), None), &criteria));
		// Contract creation has no recipient
		assert!(!matches(&tx(3, ALICE, None, None), &criteria));
	}

	#[test]
	fn test_matches_transfer_filter() {
		let transfer = tx(1, ALICE, Some(BOB), Some(10));
		let call = tx(2, ALICE, Some(BOB), None);

		let only_transfers = FilterCriteria {
			is_transfer: Some(true),
			..Default::default()
		};
		assert!(matches(&transfer, &only_transfers));
		assert!(!matches(&call, &only_transfers));

		let no_transfers = FilterCriteria {
			is_transfer: Some(false),
			..Default::default()
		};
		assert!(!matches(&transfer, &no_transfers));
		assert!(matches(&call, &no_transfers));

		let any = FilterCriteria::default();
		assert!(matches(&transfer, &any));
		assert!(matches(&call, &any));
	}

	#[test]
	fn test_matches_combined_filters() {
		let criteria = FilterCriteria {
			from: Some(ALICE),
			to: Some(BOB),
			is_transfer: Some(true),
			..Default::default()
		};
		assert!(matches(&tx(1, ALICE, Some(BOB), Some(1)), &criteria));
		assert!(!matches(&tx(2, ALICE, Some(BOB), None), &criteria));
		assert!(!matches(&tx(3, BOB, Some(BOB), Some(1)), &criteria));
	}

	#[test]
	fn test_cursor_advances_only_forward() {
		let mut cursor = ScanCursor::new(1, 11);
		cursor.finish_batch();
		assert_eq!(cursor.lower, 11);
		assert!(!cursor.advance_to(11));
		assert!(!cursor.advance_to(9));
		assert!(cursor.advance_to(16));
		assert_eq!((cursor.initial, cursor.lower, cursor.upper), (1, 11, 16));
	}

	#[tokio::test]
	async fn test_run_follows_moving_head() {
		let cancel = CancellationToken::new();
		let source = Arc::new(FakeBlocks::new(&[11, 11, 16]).cancel_after(15, cancel.clone()));

		let result = scanner(source.clone())
			.run(&FilterCriteria::from_block(1), &cancel)
			.await;

		assert!(matches!(result, Err(DiscoveryError::Cancelled)));
		assert_eq!(source.queried(), (1..=15).collect::<Vec<_>>());
	}

	#[tokio::test]
	async fn test_run_returns_first_match_in_block_order() {
		let source = Arc::new(
			FakeBlocks::new(&[20])
				.with_transactions(3, vec![tx(3, BOB, Some(ALICE), None)])
				.with_transactions(
					5,
					vec![
						tx(4, BOB, Some(BOB), None),
						tx(5, ALICE, Some(BOB), Some(7)),
						tx(6, ALICE, Some(BOB), Some(8)),
					],
				),
		);
		let criteria = FilterCriteria {
			from: Some(ALICE),
			start_block: 1,
			..Default::default()
		};

		let hash = scanner(source.clone())
			.run(&criteria, &CancellationToken::new())
			.await
			.unwrap();

		assert_eq!(hash, B256::repeat_byte(5));
		assert_eq!(source.queried(), vec![1, 2, 3, 4, 5]);
	}

	#[tokio::test]
	async fn test_depth_limit_within_first_batch() {
		let source = Arc::new(FakeBlocks::new(&[1000]));
		let criteria = FilterCriteria {
			start_block: 10,
			limit_blocks: Some(100),
			..Default::default()
		};

		let result = scanner(source.clone())
			.run(&criteria, &CancellationToken::new())
			.await;

		assert!(matches!(
			result,
			Err(DiscoveryError::DepthLimitExceeded { start: 10, limit: 100 })
		));
		assert_eq!(source.queried().last(), Some(&110));
		assert_eq!(source.queried().len(), 101);
	}

	#[tokio::test]
	async fn test_depth_limit_after_head_advance() {
		let source = Arc::new(FakeBlocks::new(&[20, 40]));
		let criteria = FilterCriteria {
			start_block: 10,
			limit_blocks: Some(20),
			..Default::default()
		};

		let result = scanner(source.clone())
			.run(&criteria, &CancellationToken::new())
			.await;

		assert!(matches!(
			result,
			Err(DiscoveryError::DepthLimitExceeded { .. })
		));
		assert_eq!(source.queried(), (10..=30).collect::<Vec<_>>());
	}

	#[tokio::test]
	async fn test_depth_limit_reached_while_waiting() {
		let source = Arc::new(FakeBlocks::new(&[16]));
		let criteria = FilterCriteria {
			start_block: 10,
			limit_blocks: Some(5),
			..Default::default()
		};

		let result = scanner(source.clone())
			.run(&criteria, &CancellationToken::new())
			.await;

		assert!(matches!(
			result,
			Err(DiscoveryError::DepthLimitExceeded { .. })
		));
		assert_eq!(source.queried(), (10..=15).collect::<Vec<_>>());
	}

	#[tokio::test]
	async fn test_start_after_head() {
		let source = Arc::new(FakeBlocks::new(&[5]));
		let result = scanner(source.clone())
			.run(&FilterCriteria::from_block(6), &CancellationToken::new())
			.await;

		assert!(matches!(
			result,
			Err(DiscoveryError::StartAfterHead { start: 6, head: 5 })
		));
		assert!(source.queried().is_empty());
	}

	#[tokio::test]
	async fn test_cancel_while_waiting_for_head() {
		let source = Arc::new(FakeBlocks::new(&[5]));
		let scanner = BlockFilterScanner::new(source.clone())
			.with_wait_interval(Duration::from_secs(3600));
		let cancel = CancellationToken::new();

		let trigger = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(20)).await;
			trigger.cancel();
		});

		let result = tokio::time::timeout(
			Duration::from_secs(5),
			scanner.run(&FilterCriteria::from_block(5), &cancel),
		)
		.await
		.expect("scan should stop on cancel");

		assert!(matches!(result, Err(DiscoveryError::Cancelled)));
		assert!(source.queried().is_empty());
	}

	fn cancel_soon(cancel: &CancellationToken) {
		let trigger = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(50)).await;
			trigger.cancel();
		});
	}

	#[tokio::test]
	async fn test_cancel_interrupts_stalled_head_lookup() {
		let source = Arc::new(FakeBlocks::new(&[5]).stall_after_script());
		let cancel = CancellationToken::new();
		cancel_soon(&cancel);

		let result = tokio::time::timeout(
			Duration::from_secs(2),
			scanner(source.clone()).run(&FilterCriteria::from_block(5), &cancel),
		)
		.await
		.expect("a hanging head lookup must not outlive cancellation");

		assert!(matches!(result, Err(DiscoveryError::Cancelled)));
		assert!(source.queried().is_empty());
	}

	#[tokio::test]
	async fn test_cancel_interrupts_stalled_block_fetch() {
		let source = Arc::new(FakeBlocks::new(&[10]).stall_block(3));
		let cancel = CancellationToken::new();
		cancel_soon(&cancel);

		let result = tokio::time::timeout(
			Duration::from_secs(2),
			scanner(source.clone()).run(&FilterCriteria::from_block(1), &cancel),
		)
		.await
		.expect("a hanging block fetch must not outlive cancellation");

		assert!(matches!(result, Err(DiscoveryError::Cancelled)));
		assert_eq!(source.queried(), vec![1, 2, 3]);
	}

	#[tokio::test]
	async fn test_head_unavailable() {
		struct NoHead;

		#[async_trait]
		impl BlockSource for NoHead {
			async fn get_block(
				&self,
				_tag: BlockTag,
				_include_bodies: bool,
			) -> Result<Option<ChainBlock>, ChainError> {
				Ok(None)
			}
		}

		let scanner = BlockFilterScanner::new(Arc::new(NoHead));
		let result = scanner
			.run(&FilterCriteria::from_block(0), &CancellationToken::new())
			.await;
		assert!(matches!(result, Err(DiscoveryError::HeadUnavailable)));
	}

	#[tokio::test]
	async fn test_chain_errors_are_surfaced() {
		struct Broken;

		#[async_trait]
		impl BlockSource for Broken {
			async fn get_block(
				&self,
				_tag: BlockTag,
				_include_bodies: bool,
			) -> Result<Option<ChainBlock>, ChainError> {
				Err(ChainError::Network("connection refused".to_string()))
			}
		}

		let scanner = BlockFilterScanner::new(Arc::new(Broken));
		let err = scanner
			.run(&FilterCriteria::from_block(0), &CancellationToken::new())
			.await
			.unwrap_err();
		assert!(matches!(err, DiscoveryError::Chain(_)));
		assert!(err.to_string().contains("connection refused"));
	}

	#[tokio::test]
	async fn test_scanner_over_trait_object() {
		let source: Arc<dyn BlockSource> = Arc::new(
			FakeBlocks::new(&[3]).with_transactions(2, vec![tx(9, ALICE, Some(BOB), Some(1))]),
		);
		let hash = BlockFilterScanner::new(source)
			.run(&FilterCriteria::from_block(1), &CancellationToken::new())
			.await
			.unwrap();
		assert_eq!(hash, B256::repeat_byte(9));
	}
}
