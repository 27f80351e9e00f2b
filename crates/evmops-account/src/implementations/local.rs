//! Local wallet implementation.
//!
//! Holds a secp256k1 key in process memory and signs legacy transactions with
//! EIP-155 replay protection.

use crate::{AccountError, AccountFactory, AccountInterface, AccountRegistry};
use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::TxKind;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use evmops_types::{
	Address, Bytes, ImplementationRegistry, SecretString, SignedTransaction, UnsignedTransaction,
};

/// Account backed by a private key held in memory.
#[derive(Debug, Clone)]
pub struct LocalWallet {
	signer: PrivateKeySigner,
}

impl LocalWallet {
	/// Creates a wallet from a hex encoded 32 byte key, with or without `0x`.
	pub fn from_hex_key(private_key: &SecretString) -> Result<Self, AccountError> {
		let bytes = private_key
			.decode_hex()
			.map_err(|e| AccountError::InvalidKey(format!("Malformed hex: {}", e)))?;

		if bytes.len() != 32 {
			return Err(AccountError::InvalidKey(format!(
				"Expected 32 bytes, got {}",
				bytes.len()
			)));
		}

		let signer = PrivateKeySigner::from_slice(&bytes)
			.map_err(|e| AccountError::InvalidKey(e.to_string()))?;

		Ok(Self { signer })
	}

	/// Generates a wallet with a fresh random key.
	pub fn generate() -> Self {
		Self {
			signer: PrivateKeySigner::random(),
		}
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	fn address(&self) -> Address {
		self.signer.address()
	}

	async fn sign_transaction(
		&self,
		tx: &UnsignedTransaction,
		chain_id: u64,
	) -> Result<SignedTransaction, AccountError> {
		let mut legacy = TxLegacy {
			chain_id: Some(chain_id),
			nonce: tx.nonce,
			gas_price: tx.gas_price,
			gas_limit: tx.gas_limit,
			to: match tx.to {
				Some(to) => TxKind::Call(to),
				None => TxKind::Create,
			},
			value: tx.value,
			input: tx.input.clone(),
		};

		let signature = self
			.signer
			.sign_transaction_sync(&mut legacy)
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;

		let envelope = TxEnvelope::Legacy(legacy.into_signed(signature));

		Ok(SignedTransaction {
			hash: *envelope.tx_hash(),
			raw: Bytes::from(envelope.encoded_2718()),
		})
	}

	fn private_key(&self) -> SecretString {
		SecretString::new(self.signer.to_bytes().to_string())
	}
}

/// Factory function to create a local account from a hex encoded key.
pub fn create_account(private_key: &SecretString) -> Result<Box<dyn AccountInterface>, AccountError> {
	let wallet = LocalWallet::from_hex_key(private_key)?;
	tracing::debug!(address = %wallet.signer.address(), "Loaded local account");
	Ok(Box::new(wallet))
}

/// Registry for the local account implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl AccountRegistry for Registry {}
