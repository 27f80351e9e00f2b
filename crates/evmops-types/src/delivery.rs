//! Transaction submission types for the evmops system.
//!
//! This module defines what a caller hands to the submitter, what the signer
//! produces, and what the chain reports back once a transaction is mined.

use crate::SecretString;
use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// A transaction requested by a caller, before it has a sequence number.
///
/// Owned by the caller until handed to the submitter. Only `gas_limit` may be
/// filled in by the submitter, and only when it is zero.
#[derive(Debug, Clone, Default)]
pub struct PendingTransaction {
	/// Recipient account, `None` for contract creation.
	pub to: Option<Address>,
	/// Call data or creation bytecode.
	pub input: Bytes,
	/// Value transferred, in wei.
	pub value: U256,
	/// Hex encoded private key of the sender.
	pub signer: Option<SecretString>,
	/// Gas limit. Zero requests automatic estimation.
	pub gas_limit: u64,
}

impl PendingTransaction {
	/// Returns true when this transaction deploys a contract.
	pub fn is_creation(&self) -> bool {
		self.to.is_none()
	}
}

/// A fully specified transaction ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
	pub to: Option<Address>,
	pub input: Bytes,
	pub value: U256,
	pub nonce: u64,
	pub gas_limit: u64,
	pub gas_price: u128,
}

/// A signed transaction in its wire encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
	/// Hash of the signed envelope.
	pub hash: B256,
	/// Serialized envelope, ready for broadcast.
	pub raw: Bytes,
}

/// Transaction receipt containing execution details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	/// The hash of the transaction.
	pub hash: B256,
	/// The block number where the transaction was included.
	pub block_number: u64,
	/// Gas consumed by the transaction.
	pub gas_used: u64,
	/// Whether the transaction executed successfully.
	pub success: bool,
	/// Address of the created contract, for contract creation transactions.
	pub contract_address: Option<Address>,
	/// Logs emitted during execution, in emission order.
	#[serde(default)]
	pub logs: Vec<ReceiptLog>,
}

/// An event log attached to a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLog {
	/// Contract that emitted the log.
	pub address: Address,
	/// Indexed topics. The first one is the event selector unless the event
	/// is anonymous.
	pub topics: Vec<B256>,
	/// ABI encoded non-indexed arguments.
	pub data: Bytes,
}

/// Outcome of a confirmed submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
	pub hash: B256,
	pub receipt: TransactionReceipt,
}
