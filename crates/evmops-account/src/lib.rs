//! Account management module for the evmops system.
//!
//! This module provides the signing capability the submission pipeline relies
//! on: deriving an account address from private key material and turning an
//! unsigned transaction into a signed, serialized envelope.

use async_trait::async_trait;
use evmops_types::{
	Address, ImplementationRegistry, SecretString, SignedTransaction, UnsignedTransaction,
};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// Error that occurs when signing operations fail.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// Error that occurs when a cryptographic key is invalid or malformed.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
}

/// Trait defining the interface for account implementations.
///
/// An account owns one private key. It never exposes the key through logs;
/// [`AccountInterface::private_key`] exists so that freshly generated keys can
/// be handed back to the caller.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Retrieves the address associated with this account.
	fn address(&self) -> Address;

	/// Signs a transaction for the given chain and returns its wire encoding.
	///
	/// The chain identifier is bound into the signature so the transaction
	/// cannot be replayed on another chain.
	async fn sign_transaction(
		&self,
		tx: &UnsignedTransaction,
		chain_id: u64,
	) -> Result<SignedTransaction, AccountError>;

	/// Returns the private key as a SecretString with 0x prefix.
	fn private_key(&self) -> SecretString;
}

/// Builds an account from hex encoded private key material.
pub type AccountFactory = fn(&SecretString) -> Result<Box<dyn AccountInterface>, AccountError>;

/// Registry trait for account implementations.
pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// Get all registered account implementations.
///
/// Returns a vector of (name, factory) tuples for all available account implementations.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}
