//! Transaction delivery module for the evmops system.
//!
//! This module handles the submission and monitoring of transactions. The
//! [`TransactionSubmitter`] serializes sequence number acquisition across
//! concurrent callers, signs and broadcasts each transaction, and then polls
//! for its receipt outside of the critical section.

use evmops_account::{AccountError, AccountFactory};
use evmops_types::{
	short_hash, CallRequest, ChainError, ChainReader, NonceView, PendingTransaction,
	SubmissionResult, TransactionReceipt, UnsignedTransaction, B256,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Re-export implementations
pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
}

/// Errors that can occur during transaction delivery operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// No signing key was supplied with the transaction.
	#[error("No signing key supplied")]
	MissingSigner,
	/// The signing key could not be turned into an account.
	#[error("Invalid signing key: {0}")]
	InvalidKey(String),
	/// Chain identifier or gas price could not be fetched.
	#[error("Chain query failed: {0}")]
	ChainQuery(#[source] ChainError),
	/// The call simulation used to size the gas limit failed.
	#[error("Gas estimation failed: {0}")]
	GasEstimation(#[source] ChainError),
	/// The sender's next sequence number could not be fetched.
	#[error("Failed to fetch nonce: {0}")]
	Nonce(#[source] ChainError),
	/// Error that occurs when signing the transaction fails.
	#[error("Signing failed: {0}")]
	Signing(String),
	/// The node rejected the signed transaction.
	#[error("Broadcast failed: {0}")]
	Broadcast(#[source] ChainError),
	/// The transaction was mined but its execution failed.
	#[error("Transaction {hash} reverted in block {block_number}")]
	Reverted { hash: B256, block_number: u64 },
	/// No receipt appeared before the confirmation deadline.
	#[error(
		"Transaction {hash} not confirmed within {timeout:?} (last error: {})",
		.last_error.as_deref().unwrap_or("none")
	)]
	ConfirmationTimeout {
		hash: B256,
		timeout: Duration,
		last_error: Option<String>,
	},
	/// The caller cancelled the submission.
	#[error("Submission cancelled")]
	Cancelled,
	/// Error in the configuration of a delivery implementation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl From<AccountError> for DeliveryError {
	fn from(err: AccountError) -> Self {
		match err {
			AccountError::InvalidKey(msg) => DeliveryError::InvalidKey(msg),
			AccountError::SigningFailed(msg) => DeliveryError::Signing(msg),
		}
	}
}

/// Factory function that builds a chain reader from its TOML table.
pub type ChainReaderFactory = fn(&toml::Value) -> Result<Arc<dyn ChainReader>, DeliveryError>;

/// Registry trait for chain reader implementations.
pub trait ChainReaderRegistry:
	evmops_types::ImplementationRegistry<Factory = ChainReaderFactory>
{
}

/// Get all registered chain reader implementations.
///
/// Returns a vector of (name, factory) tuples for all available implementations.
pub fn get_all_implementations() -> Vec<(&'static str, ChainReaderFactory)> {
	use evmops_types::ImplementationRegistry;
	use implementations::evm::alloy;

	vec![(alloy::Registry::NAME, alloy::Registry::factory())]
}

/// Timing parameters of the confirmation poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitterConfig {
	/// Delay between two receipt lookups.
	pub poll_interval: Duration,
	/// Overall deadline for a receipt to appear after broadcast.
	pub confirmation_timeout: Duration,
}

impl Default for SubmitterConfig {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_millis(100),
			confirmation_timeout: Duration::from_secs(15),
		}
	}
}

/// Submits transactions and waits for their confirmation.
///
/// One instance owns one nonce lock. Every submission going through the same
/// instance acquires its sequence number under that lock, so transactions
/// from the same account never share a nonce. The lock is released as soon
/// as the transaction is broadcast, which lets confirmations of many
/// in-flight transactions overlap.
pub struct TransactionSubmitter {
	reader: Arc<dyn ChainReader>,
	account_factory: AccountFactory,
	config: SubmitterConfig,
	nonce_lock: Mutex<()>,
}

impl TransactionSubmitter {
	/// Creates a submitter that signs with local private keys.
	pub fn new(reader: Arc<dyn ChainReader>, config: SubmitterConfig) -> Self {
		Self::with_account_factory(
			reader,
			config,
			evmops_account::implementations::local::create_account,
		)
	}

	/// Creates a submitter with a custom account factory.
	pub fn with_account_factory(
		reader: Arc<dyn ChainReader>,
		config: SubmitterConfig,
		account_factory: AccountFactory,
	) -> Self {
		Self {
			reader,
			account_factory,
			config,
			nonce_lock: Mutex::new(()),
		}
	}

	/// Signs, broadcasts and confirms a transaction.
	///
	/// The gas limit is estimated when `tx.gas_limit` is zero. Nothing is
	/// retried: any failure is returned to the caller as is.
	#[instrument(skip_all, fields(creation = tx.is_creation()))]
	pub async fn submit(
		&self,
		mut tx: PendingTransaction,
		cancel: &CancellationToken,
	) -> Result<SubmissionResult, DeliveryError> {
		let key = tx.signer.take().ok_or(DeliveryError::MissingSigner)?;
		let account = (self.account_factory)(&key)?;
		drop(key);
		let from = account.address();

		let chain_id = self
			.reader
			.get_chain_id()
			.await
			.map_err(DeliveryError::ChainQuery)?;
		let gas_price = self
			.reader
			.get_gas_price()
			.await
			.map_err(DeliveryError::ChainQuery)?;

		if tx.gas_limit == 0 {
			let call = CallRequest {
				from,
				to: tx.to,
				input: tx.input.clone(),
				gas_price,
				value: tx.value,
			};
			tx.gas_limit = self
				.reader
				.estimate_gas(&call)
				.await
				.map_err(DeliveryError::GasEstimation)?;
			tracing::debug!(gas_limit = tx.gas_limit, "Estimated gas limit");
		}

		let hash = {
			let _guard = tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(DeliveryError::Cancelled),
				guard = self.nonce_lock.lock() => guard,
			};

			let nonce = self
				.reader
				.get_next_nonce(from, NonceView::Pending)
				.await
				.map_err(DeliveryError::Nonce)?;

			let unsigned = UnsignedTransaction {
				to: tx.to,
				input: tx.input,
				value: tx.value,
				nonce,
				gas_limit: tx.gas_limit,
				gas_price,
			};
			let signed = account.sign_transaction(&unsigned, chain_id).await?;

			let hash = self
				.reader
				.broadcast_raw(&signed.raw)
				.await
				.map_err(DeliveryError::Broadcast)?;

			tracing::info!(
				tx_hash = %short_hash(&hash),
				nonce,
				chain_id,
				from = %from,
				"Broadcast transaction"
			);
			hash
		};

		let receipt = self.wait_for_confirmation(hash, cancel).await?;
		Ok(SubmissionResult { hash, receipt })
	}

	/// Polls for the receipt of `hash` until it appears, the deadline passes,
	/// or `cancel` fires.
	async fn wait_for_confirmation(
		&self,
		hash: B256,
		cancel: &CancellationToken,
	) -> Result<TransactionReceipt, DeliveryError> {
		let timeout = self.config.confirmation_timeout;
		let deadline = Instant::now() + timeout;
		let mut last_error = None;

		loop {
			let lookup = tokio::select! {
				biased;
				_ = cancel.cancelled() => {
					tracing::warn!(tx_hash = %short_hash(&hash), "Stopped waiting for confirmation");
					return Err(DeliveryError::Cancelled);
				}
				_ = tokio::time::sleep_until(deadline) => {
					return Err(DeliveryError::ConfirmationTimeout {
						hash,
						timeout,
						last_error,
					});
				}
				result = self.reader.get_receipt(&hash) => result,
			};

			match lookup {
				Ok(Some(receipt)) if receipt.success => {
					tracing::info!(
						tx_hash = %short_hash(&hash),
						block = receipt.block_number,
						gas_used = receipt.gas_used,
						"Transaction confirmed"
					);
					return Ok(receipt);
				},
				Ok(Some(receipt)) => {
					return Err(DeliveryError::Reverted {
						hash,
						block_number: receipt.block_number,
					});
				},
				Ok(None) => {
					tracing::debug!(tx_hash = %short_hash(&hash), "Receipt not available yet");
				},
				Err(e) => {
					tracing::warn!(tx_hash = %short_hash(&hash), error = %e, "Receipt lookup failed");
					last_error = Some(e.to_string());
				},
			}

			let now = Instant::now();
			if now >= deadline {
				return Err(DeliveryError::ConfirmationTimeout {
					hash,
					timeout,
					last_error,
				});
			}

			let pause = self.config.poll_interval.min(deadline - now);
			tokio::select! {
				biased;
				_ = cancel.cancelled() => {
					tracing::warn!(tx_hash = %short_hash(&hash), "Stopped waiting for confirmation");
					return Err(DeliveryError::Cancelled);
				}
				_ = tokio::time::sleep(pause) => {}
			}
		}
	}
}
