//! Chain access types for the evmops system.
//!
//! The remote ledger is only reachable through a request/response JSON-RPC
//! endpoint. Everything the core needs from it is expressed by the two traits in
//! this module: [`BlockSource`] is the read-only view used by the block scanner,
//! and [`ChainReader`] extends it with the calls the submission pipeline and
//! the lookup commands need.

use crate::TransactionReceipt;
use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by chain collaborators.
#[derive(Debug, Error)]
pub enum ChainError {
	/// Error that occurs while talking to the RPC endpoint.
	#[error("Network error: {0}")]
	Network(String),
	/// The endpoint answered with a response that could not be interpreted.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
}

/// Selects which block a query refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
	/// The most recent block known to the node.
	Latest,
	/// A block by its height.
	Number(u64),
}

impl std::fmt::Display for BlockTag {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			BlockTag::Latest => write!(f, "latest"),
			BlockTag::Number(n) => write!(f, "{}", n),
		}
	}
}

/// State view used when asking for an account's next sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceView {
	/// Includes transactions queued in the node's pool but not yet mined.
	Pending,
	/// Only counts transactions included in the latest block.
	Latest,
}

/// A transaction as seen inside a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
	/// Transaction hash.
	pub hash: B256,
	/// Sending account.
	pub from: Address,
	/// Receiving account, `None` for contract creation.
	pub to: Option<Address>,
	/// Transferred value. `None` when the transaction moves no value.
	pub value: Option<U256>,
	/// Call data.
	pub input: Bytes,
	/// Sender's sequence number.
	pub nonce: u64,
}

/// A block header with, optionally, its transaction bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBlock {
	pub number: u64,
	pub hash: B256,
	pub timestamp: u64,
	/// Transactions in block order. Empty when bodies were not requested.
	pub transactions: Vec<ChainTransaction>,
}

/// A transaction looked up by hash, with the fee fields a block view omits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDetails {
	pub hash: B256,
	pub from: Address,
	/// Receiving account, `None` for contract creation.
	pub to: Option<Address>,
	/// Transferred value in wei, zero included.
	pub value: U256,
	pub gas_limit: u64,
	/// Legacy gas price, or the fee cap of a dynamic fee transaction.
	pub gas_price: u128,
	pub nonce: u64,
	pub input: Bytes,
	/// Inclusion height, `None` while pending.
	pub block_number: Option<u64>,
}

/// Description of a call to simulate for gas estimation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
	pub from: Address,
	pub to: Option<Address>,
	pub input: Bytes,
	pub gas_price: u128,
	pub value: U256,
}

/// Read-only block access.
///
/// This is the only view of the chain the block scanner needs.
#[async_trait]
pub trait BlockSource: Send + Sync {
	/// Retrieves a block by tag, with full transaction bodies when
	/// `include_bodies` is set. Returns `Ok(None)` when the node does not know
	/// the block.
	async fn get_block(
		&self,
		tag: BlockTag,
		include_bodies: bool,
	) -> Result<Option<ChainBlock>, ChainError>;
}

/// Full chain access used by the submission pipeline.
#[async_trait]
pub trait ChainReader: BlockSource {
	/// Retrieves the receipt of a transaction, `Ok(None)` if it is not mined yet.
	async fn get_receipt(&self, hash: &B256) -> Result<Option<TransactionReceipt>, ChainError>;

	/// Returns the chain identifier used for replay protection.
	async fn get_chain_id(&self) -> Result<u64, ChainError>;

	/// Returns the current gas price in wei.
	async fn get_gas_price(&self) -> Result<u128, ChainError>;

	/// Simulates a call and returns the gas it would consume.
	async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, ChainError>;

	/// Returns the next unused sequence number of `account` at the given view.
	async fn get_next_nonce(&self, account: Address, view: NonceView) -> Result<u64, ChainError>;

	/// Broadcasts a signed, serialized transaction and returns its hash.
	async fn broadcast_raw(&self, signed: &[u8]) -> Result<B256, ChainError>;

	/// Executes a read-only call against the latest block and returns the raw
	/// return data.
	async fn call(&self, to: Address, input: &Bytes) -> Result<Bytes, ChainError>;

	/// Retrieves a transaction by hash, `Ok(None)` if the node does not know it.
	async fn get_transaction(&self, hash: &B256) -> Result<Option<TransactionDetails>, ChainError>;
}
