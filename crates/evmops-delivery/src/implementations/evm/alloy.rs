//! Chain reader implementation backed by Alloy.
//!
//! Talks to a single EVM node over HTTP JSON-RPC and maps Alloy's RPC types onto
//! the block, transaction and receipt views used by the rest of the workspace.

use crate::{ChainReaderFactory, ChainReaderRegistry, DeliveryError};
use alloy::consensus::Transaction as ConsensusTransaction;
use alloy::eips::BlockNumberOrTag;
use alloy::network::TransactionResponse;
use alloy::primitives::TxKind;
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{Block, Transaction, TransactionInput, TransactionRequest};
use async_trait::async_trait;
use evmops_types::{
	Address, BlockSource, BlockTag, Bytes, CallRequest, ChainBlock, ChainError, ChainReader,
	ChainTransaction, ConfigSchema, Field, FieldType, ImplementationRegistry, NonceView,
	ReceiptLog, Schema, TransactionDetails, TransactionReceipt, ValidationError, B256,
};
use std::sync::Arc;

/// Alloy-based EVM chain reader.
///
/// Wraps an HTTP provider without any fillers; every field of the transactions
/// it broadcasts has already been set and signed by the caller.
pub struct AlloyChainReader {
	provider: RootProvider,
}

impl AlloyChainReader {
	/// Creates a reader for the node at `rpc_url`.
	///
	/// No request is made here; an unreachable node surfaces on first use.
	pub fn connect(rpc_url: &str) -> Result<Self, DeliveryError> {
		let url = rpc_url
			.parse()
			.map_err(|e| DeliveryError::Configuration(format!("Invalid RPC URL: {}", e)))?;

		Ok(Self {
			provider: RootProvider::new_http(url),
		})
	}
}

fn block_number_or_tag(tag: BlockTag) -> BlockNumberOrTag {
	match tag {
		BlockTag::Latest => BlockNumberOrTag::Latest,
		BlockTag::Number(n) => BlockNumberOrTag::Number(n),
	}
}

fn convert_transaction(tx: &Transaction) -> ChainTransaction {
	let value = ConsensusTransaction::value(tx);

	ChainTransaction {
		hash: TransactionResponse::tx_hash(tx),
		from: TransactionResponse::from(tx),
		to: ConsensusTransaction::to(tx),
		// A zero value is not a transfer
		value: (!value.is_zero()).then_some(value),
		input: ConsensusTransaction::input(tx).clone(),
		nonce: ConsensusTransaction::nonce(tx),
	}
}

fn convert_details(tx: &Transaction) -> TransactionDetails {
	TransactionDetails {
		hash: TransactionResponse::tx_hash(tx),
		from: TransactionResponse::from(tx),
		to: ConsensusTransaction::to(tx),
		value: ConsensusTransaction::value(tx),
		gas_limit: ConsensusTransaction::gas_limit(tx),
		gas_price: ConsensusTransaction::gas_price(tx)
			.unwrap_or_else(|| ConsensusTransaction::max_fee_per_gas(tx)),
		nonce: ConsensusTransaction::nonce(tx),
		input: ConsensusTransaction::input(tx).clone(),
		block_number: tx.block_number,
	}
}

fn convert_block(block: &Block) -> ChainBlock {
	ChainBlock {
		number: block.header.number,
		hash: block.header.hash,
		timestamp: block.header.timestamp,
		transactions: block.transactions.txns().map(convert_transaction).collect(),
	}
}

#[async_trait]
impl BlockSource for AlloyChainReader {
	async fn get_block(
		&self,
		tag: BlockTag,
		include_bodies: bool,
	) -> Result<Option<ChainBlock>, ChainError> {
		let request = self.provider.get_block_by_number(block_number_or_tag(tag));
		let request = if include_bodies {
			request.full()
		} else {
			request.hashes()
		};

		let block = request
			.await
			.map_err(|e| ChainError::Network(format!("Failed to get block {}: {}", tag, e)))?;

		Ok(block.as_ref().map(convert_block))
	}
}

#[async_trait]
impl ChainReader for AlloyChainReader {
	async fn get_receipt(&self, hash: &B256) -> Result<Option<TransactionReceipt>, ChainError> {
		let receipt = self
			.provider
			.get_transaction_receipt(*hash)
			.await
			.map_err(|e| ChainError::Network(format!("Failed to get receipt: {}", e)))?;

		let Some(receipt) = receipt else {
			return Ok(None);
		};

		// Receipts of pending transactions carry no block number
		let Some(block_number) = receipt.block_number else {
			return Ok(None);
		};

		Ok(Some(TransactionReceipt {
			hash: receipt.transaction_hash,
			block_number,
			gas_used: receipt.gas_used,
			success: receipt.status(),
			contract_address: receipt.contract_address,
			logs: receipt
				.logs()
				.iter()
				.map(|log| ReceiptLog {
					address: log.address(),
					topics: log.topics().to_vec(),
					data: log.data().data.clone(),
				})
				.collect(),
		}))
	}

	async fn get_chain_id(&self) -> Result<u64, ChainError> {
		self.provider
			.get_chain_id()
			.await
			.map_err(|e| ChainError::Network(format!("Failed to get chain id: {}", e)))
	}

	async fn get_gas_price(&self) -> Result<u128, ChainError> {
		self.provider
			.get_gas_price()
			.await
			.map_err(|e| ChainError::Network(format!("Failed to get gas price: {}", e)))
	}

	async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, ChainError> {
		let request = TransactionRequest {
			from: Some(call.from),
			to: Some(match call.to {
				Some(to) => TxKind::Call(to),
				None => TxKind::Create,
			}),
			gas_price: Some(call.gas_price),
			value: Some(call.value),
			input: TransactionInput::new(call.input.clone()),
			..Default::default()
		};

		self.provider
			.estimate_gas(request)
			.await
			.map_err(|e| ChainError::Network(format!("Failed to estimate gas: {}", e)))
	}

	async fn get_next_nonce(&self, account: Address, view: NonceView) -> Result<u64, ChainError> {
		let request = self.provider.get_transaction_count(account);
		let request = match view {
			NonceView::Pending => request.pending(),
			NonceView::Latest => request.latest(),
		};

		request
			.await
			.map_err(|e| ChainError::Network(format!("Failed to get nonce: {}", e)))
	}

	async fn broadcast_raw(&self, signed: &[u8]) -> Result<B256, ChainError> {
		let pending = self
			.provider
			.send_raw_transaction(signed)
			.await
			.map_err(|e| ChainError::Network(format!("Failed to send transaction: {}", e)))?;

		Ok(*pending.tx_hash())
	}

	async fn call(&self, to: Address, input: &Bytes) -> Result<Bytes, ChainError> {
		let request = TransactionRequest {
			to: Some(TxKind::Call(to)),
			input: TransactionInput::new(input.clone()),
			..Default::default()
		};

		self.provider
			.call(request)
			.block(BlockNumberOrTag::Latest.into())
			.await
			.map_err(|e| ChainError::Network(format!("Failed to call {}: {}", to, e)))
	}

	async fn get_transaction(
		&self,
		hash: &B256,
	) -> Result<Option<TransactionDetails>, ChainError> {
		let tx = self
			.provider
			.get_transaction_by_hash(*hash)
			.await
			.map_err(|e| ChainError::Network(format!("Failed to get transaction: {}", e)))?;

		Ok(tx.as_ref().map(convert_details))
	}
}

/// Configuration schema for the Alloy chain reader.
///
/// Requires an `rpc_url` using the http or https scheme.
pub struct AlloyReaderSchema;

impl AlloyReaderSchema {
	/// Static validation method for use before instance creation
	pub fn validate_config(config: &toml::Value) -> Result<(), ValidationError> {
		let instance = Self;
		instance.validate(config)
	}
}

impl ConfigSchema for AlloyReaderSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			// Required fields
			vec![
				Field::new("rpc_url", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
							Ok(())
						},
						_ => Err("rpc_url must be an http or https URL".to_string()),
					}
				}),
			],
			// Optional fields
			vec![],
		);

		schema.validate(config)
	}
}

/// Factory function to create an HTTP chain reader from configuration.
///
/// # Parameters
/// - `config`: TOML table containing:
///   - `rpc_url` (required): HTTP endpoint of the node
pub fn create_chain_reader(config: &toml::Value) -> Result<Arc<dyn ChainReader>, DeliveryError> {
	AlloyReaderSchema::validate_config(config)
		.map_err(|e| DeliveryError::Configuration(format!("Invalid configuration: {}", e)))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| DeliveryError::Configuration("rpc_url is required".to_string()))?;

	tracing::debug!(rpc_url = %rpc_url, "Creating chain reader");
	Ok(Arc::new(AlloyChainReader::connect(rpc_url)?))
}

/// Registry for the HTTP/Alloy chain reader implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "evm_alloy";
	type Factory = ChainReaderFactory;

	fn factory() -> Self::Factory {
		create_chain_reader
	}
}

impl ChainReaderRegistry for Registry {}
