//! Command handlers behind the `evmops` binary.
//!
//! Each handler does one round of work against the chain and returns a
//! serializable result for the binary to print.

use crate::artifact::{self, ArtifactError, NamedValues};
use evmops_account::{
	implementations::local::LocalWallet, AccountError, AccountFactory, AccountInterface,
};
use evmops_delivery::{DeliveryError, TransactionSubmitter};
use evmops_discovery::{BlockFilterScanner, DiscoveryError};
use evmops_types::{
	parse_ether_value, with_0x_prefix, without_0x_prefix, Address, BlockSource, BlockTag, Bytes,
	ChainError, ChainReader, FilterCriteria, PendingTransaction, SecretString, TransactionReceipt,
	UnitError, B256, U256,
};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors surfaced by command handlers.
#[derive(Debug, Error)]
pub enum CommandError {
	#[error(transparent)]
	Artifact(#[from] ArtifactError),
	#[error(transparent)]
	Delivery(#[from] DeliveryError),
	#[error(transparent)]
	Discovery(#[from] DiscoveryError),
	#[error(transparent)]
	Chain(#[from] ChainError),
	#[error(transparent)]
	Account(#[from] AccountError),
	#[error("Invalid value: {0}")]
	Value(#[from] UnitError),
	#[error("Invalid input: {0}")]
	Input(String),
	#[error("Block {0} not found")]
	BlockNotFound(BlockTag),
	#[error("Receipt for {0} not found")]
	ReceiptNotFound(B256),
	#[error("Transaction {0} not found")]
	TransactionNotFound(B256),
	#[error("No '{event}' log in transaction {hash}")]
	NoMatchingLog { event: String, hash: B256 },
}

/// Where the payload of a transaction comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallData {
	/// No payload, a plain value transfer.
	Empty,
	/// Hex encoded bytes, used as is.
	Raw(String),
	/// A typed function signature and its arguments.
	Function { signature: String, args: Vec<String> },
	/// A method of a contract artifact and its arguments.
	Method {
		artifact: String,
		method: String,
		args: Vec<String>,
	},
}

impl CallData {
	/// Produces the encoded payload.
	pub fn encode(&self) -> Result<Bytes, CommandError> {
		match self {
			CallData::Empty => Ok(Bytes::new()),
			CallData::Raw(input) => hex::decode(without_0x_prefix(input.trim()))
				.map(Bytes::from)
				.map_err(|e| CommandError::Input(format!("Invalid hex input: {}", e))),
			CallData::Function { signature, args } => {
				Ok(artifact::encode_signature_call(signature, args)?)
			},
			CallData::Method {
				artifact,
				method,
				args,
			} => {
				let artifact = artifact::resolve_contract(artifact)?;
				Ok(artifact::encode_method_call(&artifact.abi, method, args)?)
			},
		}
	}
}

/// Parameters of the `send` command.
#[derive(Debug, Clone)]
pub struct SendRequest {
	pub to: Address,
	pub value: Option<String>,
	pub gas_limit: u64,
	pub call: CallData,
	pub signer: Option<SecretString>,
}

/// Parameters of the `deploy` command.
#[derive(Debug, Clone)]
pub struct DeployRequest {
	/// `<dir>:<Contract>` reference.
	pub artifact: String,
	pub args: Vec<String>,
	pub value: Option<String>,
	pub gas_limit: u64,
	pub signer: Option<SecretString>,
}

/// Parameters of the `call` command.
#[derive(Debug, Clone)]
pub struct ContractCall {
	pub to: Address,
	/// `<dir>:<Contract>` reference.
	pub artifact: String,
	pub method: String,
	pub args: Vec<String>,
}

/// Parameters of the `event` command.
#[derive(Debug, Clone)]
pub struct EventQuery {
	/// Transaction whose receipt holds the log.
	pub hash: B256,
	/// `<dir>:<Contract>` reference.
	pub artifact: String,
	pub event: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionOutput {
	pub hash: B256,
	pub block_number: u64,
	pub gas_used: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentOutput {
	pub hash: B256,
	pub gas_used: u64,
	pub contract_address: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOutput {
	pub hash: B256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockOutput {
	pub number: u64,
	pub hash: B256,
	pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallOutput {
	pub to: Address,
	pub output: NamedValues,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventOutput {
	pub hash: B256,
	/// Contract that emitted the log.
	pub address: Address,
	pub logs: NamedValues,
}

/// A transaction looked up by hash. The value is in wei, in decimal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionInfoOutput {
	pub hash: B256,
	pub from: Address,
	pub to: Option<Address>,
	pub value: String,
	pub gas: u64,
	pub gas_price: u128,
	pub nonce: u64,
	pub input: Bytes,
	pub block_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GasPriceOutput {
	pub gas_price: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountOutput {
	pub address: Address,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub private_key: Option<String>,
}

/// Parses a block selector: `latest` or a block number.
pub fn parse_block_tag(input: &str) -> Result<BlockTag, String> {
	let input = input.trim();
	if input.eq_ignore_ascii_case("latest") {
		return Ok(BlockTag::Latest);
	}
	input
		.parse::<u64>()
		.map(BlockTag::Number)
		.map_err(|_| format!("expected 'latest' or a block number, got '{}'", input))
}

fn parse_value(value: Option<&str>) -> Result<U256, CommandError> {
	match value {
		Some(value) => Ok(parse_ether_value(value)?),
		None => Ok(U256::ZERO),
	}
}

/// Assembles the pending transaction of a `send` command.
pub fn build_transaction(request: SendRequest) -> Result<PendingTransaction, CommandError> {
	Ok(PendingTransaction {
		to: Some(request.to),
		input: request.call.encode()?,
		value: parse_value(request.value.as_deref())?,
		signer: request.signer,
		gas_limit: request.gas_limit,
	})
}

/// Assembles the creation transaction of a `deploy` command.
pub fn build_deployment(request: DeployRequest) -> Result<PendingTransaction, CommandError> {
	let artifact = artifact::resolve_contract(&request.artifact)?;

	Ok(PendingTransaction {
		to: None,
		input: artifact::encode_constructor(&artifact, &request.args)?,
		value: parse_value(request.value.as_deref())?,
		signer: request.signer,
		gas_limit: request.gas_limit,
	})
}

pub async fn send(
	submitter: &TransactionSubmitter,
	request: SendRequest,
	cancel: &CancellationToken,
) -> Result<TransactionOutput, CommandError> {
	let tx = build_transaction(request)?;
	let result = submitter.submit(tx, cancel).await?;

	Ok(TransactionOutput {
		hash: result.hash,
		block_number: result.receipt.block_number,
		gas_used: result.receipt.gas_used,
	})
}

pub async fn deploy(
	submitter: &TransactionSubmitter,
	request: DeployRequest,
	cancel: &CancellationToken,
) -> Result<DeploymentOutput, CommandError> {
	let tx = build_deployment(request)?;
	let result = submitter.submit(tx, cancel).await?;

	tracing::info!(
		contract = ?result.receipt.contract_address,
		"Contract deployed"
	);

	Ok(DeploymentOutput {
		hash: result.hash,
		gas_used: result.receipt.gas_used,
		contract_address: result.receipt.contract_address,
	})
}

pub async fn filter<S: BlockSource + ?Sized>(
	scanner: &BlockFilterScanner<S>,
	criteria: &FilterCriteria,
	cancel: &CancellationToken,
) -> Result<FilterOutput, CommandError> {
	let hash = scanner.run(criteria, cancel).await?;
	Ok(FilterOutput { hash })
}

pub async fn block(reader: &dyn ChainReader, tag: BlockTag) -> Result<BlockOutput, CommandError> {
	let block = reader
		.get_block(tag, false)
		.await?
		.ok_or(CommandError::BlockNotFound(tag))?;

	Ok(BlockOutput {
		number: block.number,
		hash: block.hash,
		timestamp: block.timestamp,
	})
}

pub async fn gas_price(reader: &dyn ChainReader) -> Result<GasPriceOutput, CommandError> {
	Ok(GasPriceOutput {
		gas_price: reader.get_gas_price().await?,
	})
}

pub async fn receipt(
	reader: &dyn ChainReader,
	hash: B256,
) -> Result<TransactionReceipt, CommandError> {
	reader
		.get_receipt(&hash)
		.await?
		.ok_or(CommandError::ReceiptNotFound(hash))
}

/// Calls a view method of a contract and decodes what it returns.
pub async fn call(
	reader: &dyn ChainReader,
	request: ContractCall,
) -> Result<CallOutput, CommandError> {
	let artifact = artifact::resolve_contract(&request.artifact)?;
	let function = artifact::select_method(&artifact.abi, &request.method, request.args.len())?;
	let input = artifact::encode_call(function, &request.args)?;

	let data = reader.call(request.to, &input).await?;
	tracing::debug!(to = %request.to, method = %request.method, bytes = data.len(), "Call returned");

	Ok(CallOutput {
		to: request.to,
		output: artifact::decode_output(function, &data)?,
	})
}

/// Decodes an event of a contract from the receipt of a mined transaction.
pub async fn event(
	reader: &dyn ChainReader,
	query: EventQuery,
) -> Result<EventOutput, CommandError> {
	let artifact = artifact::resolve_contract(&query.artifact)?;
	let events = artifact::select_event(&artifact.abi, &query.event)?;

	let receipt = reader
		.get_receipt(&query.hash)
		.await?
		.ok_or(CommandError::ReceiptNotFound(query.hash))?;

	let decoded = artifact::decode_event(events, &receipt.logs)?.ok_or_else(|| {
		CommandError::NoMatchingLog {
			event: query.event.clone(),
			hash: query.hash,
		}
	})?;

	Ok(EventOutput {
		hash: query.hash,
		address: decoded.address,
		logs: decoded.values,
	})
}

pub async fn transaction(
	reader: &dyn ChainReader,
	hash: B256,
) -> Result<TransactionInfoOutput, CommandError> {
	let tx = reader
		.get_transaction(&hash)
		.await?
		.ok_or(CommandError::TransactionNotFound(hash))?;

	Ok(TransactionInfoOutput {
		hash: tx.hash,
		from: tx.from,
		to: tx.to,
		value: tx.value.to_string(),
		gas: tx.gas_limit,
		gas_price: tx.gas_price,
		nonce: tx.nonce,
		input: tx.input,
		block_number: tx.block_number,
	})
}

/// Generates a fresh account. The only command that prints a private key.
pub fn account_new() -> AccountOutput {
	let wallet = LocalWallet::generate();
	AccountOutput {
		address: wallet.address(),
		private_key: Some(with_0x_prefix(wallet.private_key().expose_secret())),
	}
}

/// Derives the address of an existing key.
pub fn account_show(
	factory: AccountFactory,
	key: &SecretString,
) -> Result<AccountOutput, CommandError> {
	let account = factory(key)?;
	Ok(AccountOutput {
		address: account.address(),
		private_key: None,
	})
}
