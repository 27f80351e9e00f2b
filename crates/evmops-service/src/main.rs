//! Main entry point for the evmops command line tool.
//!
//! Submits transactions and contract deployments to an EVM node, waits for
//! their confirmation, and scans the chain for the first transaction matching
//! a filter. Read commands call view methods, decode events from receipts and
//! look up blocks and transactions. Results are printed as JSON on stdout;
//! logs go to stderr.

use clap::{Parser, Subcommand};
use evmops_config::Config;
use evmops_delivery::{SubmitterConfig, TransactionSubmitter};
use evmops_discovery::BlockFilterScanner;
use evmops_types::{Address, BlockTag, ChainReader, FilterCriteria, SecretString, B256};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod artifact;
mod commands;
mod factory_registry;

use commands::{CallData, ContractCall, DeployRequest, EventQuery, SendRequest};

/// Command-line arguments for evmops.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file. Defaults apply when omitted.
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// RPC endpoint, overrides the configured one
	#[arg(long, env = "EVMOPS_RPC_URL")]
	rpc_url: Option<String>,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

/// Signing key options shared by the submitting commands.
#[derive(clap::Args, Debug)]
struct SignerArgs {
	/// Hex encoded private key of the sender
	#[arg(long, env = "EVMOPS_PRIVATE_KEY", hide_env_values = true)]
	private_key: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Send a transaction and wait for its receipt
	Send {
		/// Recipient address
		#[arg(long)]
		to: Address,
		/// Value to transfer, e.g. "1 ether", "20 gwei" or a wei amount
		#[arg(long)]
		value: Option<String>,
		/// Gas limit, estimated when omitted
		#[arg(long, default_value_t = 0)]
		gas_limit: u64,
		/// Raw hex call data
		#[arg(long, conflicts_with_all = ["function", "method"])]
		input: Option<String>,
		/// Typed function to call, e.g. "transfer(address,uint256)"
		#[arg(long, conflicts_with = "method")]
		function: Option<String>,
		/// Contract artifact as <dir>:<Contract>, used with --method
		#[arg(long, requires = "method")]
		artifact: Option<String>,
		/// Method of the artifact to call
		#[arg(long, requires = "artifact")]
		method: Option<String>,
		/// Arguments of the function or method
		#[arg(long = "arg")]
		args: Vec<String>,
		#[command(flatten)]
		signer: SignerArgs,
	},
	/// Deploy a contract from its artifact
	Deploy {
		/// Contract artifact as <dir>:<Contract>
		#[arg(long)]
		artifact: String,
		/// Constructor arguments
		#[arg(long = "arg")]
		args: Vec<String>,
		/// Value sent with the deployment
		#[arg(long)]
		value: Option<String>,
		/// Gas limit, estimated when omitted
		#[arg(long, default_value_t = 0)]
		gas_limit: u64,
		#[command(flatten)]
		signer: SignerArgs,
	},
	/// Wait for the first transaction matching a filter
	Filter {
		/// First block to scan
		#[arg(long)]
		start_block: u64,
		/// Maximum number of blocks past the start block to scan
		#[arg(long)]
		limit_blocks: Option<u64>,
		/// Only match transactions from this address
		#[arg(long)]
		from: Option<Address>,
		/// Only match transactions to this address
		#[arg(long)]
		to: Option<Address>,
		/// Only match value transfers (true) or non-transfers (false)
		#[arg(long)]
		is_transfer: Option<bool>,
	},
	/// Show a block by number, or the latest block
	Block {
		#[arg(default_value = "latest", value_parser = commands::parse_block_tag)]
		block: BlockTag,
	},
	/// Show the current gas price
	GasPrice,
	/// Show the receipt of a mined transaction
	Receipt {
		/// Transaction hash
		hash: B256,
	},
	/// Call a view method of a contract and decode its return values
	Call {
		/// Contract address
		#[arg(long)]
		to: Address,
		/// Contract artifact as <dir>:<Contract>
		#[arg(long)]
		artifact: String,
		/// Method of the artifact to call
		#[arg(long)]
		method: String,
		/// Arguments of the method
		#[arg(long = "arg")]
		args: Vec<String>,
	},
	/// Decode an event emitted by a mined transaction
	Event {
		/// Transaction hash
		#[arg(long)]
		hash: B256,
		/// Contract artifact as <dir>:<Contract>
		#[arg(long)]
		artifact: String,
		/// Name of the event in the artifact
		#[arg(long)]
		event: String,
	},
	/// Show a transaction by hash
	Tx {
		/// Transaction hash
		hash: B256,
	},
	/// Manage externally owned accounts
	#[command(subcommand)]
	Account(AccountCommand),
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
	/// Generate a new random account
	New,
	/// Show the address of a private key
	Show {
		#[command(flatten)]
		signer: SignerArgs,
	},
}

impl SignerArgs {
	/// The command line key, or the configured one.
	fn resolve(self, config: &Config) -> Option<SecretString> {
		self.private_key
			.map(SecretString::from)
			.or_else(|| config.account.signing_key().cloned())
	}
}

impl Command {
	fn needs_chain(&self) -> bool {
		!matches!(self, Command::Account(_))
	}
}

fn call_data(
	input: Option<String>,
	function: Option<String>,
	artifact: Option<String>,
	method: Option<String>,
	args: Vec<String>,
) -> CallData {
	match (input, function, artifact, method) {
		(Some(input), ..) => CallData::Raw(input),
		(None, Some(signature), ..) => CallData::Function { signature, args },
		(None, None, Some(artifact), Some(method)) => CallData::Method {
			artifact,
			method,
			args,
		},
		_ => CallData::Empty,
	}
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

/// Main entry point for evmops.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration and applies command line overrides
/// 4. Runs the requested command until it completes or is interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	let mut config = match &args.config {
		Some(path) => {
			let path = path
				.to_str()
				.ok_or("Configuration path is not valid UTF-8")?;
			let config = Config::from_file(path).await?;
			tracing::debug!("Loaded configuration from {}", path);
			config
		},
		None => Config::default(),
	};
	if let Some(rpc_url) = &args.rpc_url {
		config.reader.set_rpc_url(rpc_url);
	}

	let cancel = CancellationToken::new();
	let interrupt = cancel.clone();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			tracing::info!("Interrupted, cancelling");
			interrupt.cancel();
		}
	});

	let reader = if args.command.needs_chain() {
		Some(factory_registry::build_reader(&config)?)
	} else {
		None
	};

	match (args.command, reader) {
		(Command::Account(AccountCommand::New), _) => print_json(&commands::account_new()),
		(Command::Account(AccountCommand::Show { signer }), _) => {
			let key = signer.resolve(&config).ok_or("No private key given")?;
			let factory = factory_registry::account_factory(&config)?;
			print_json(&commands::account_show(factory, &key)?)
		},
		(command, Some(reader)) => run_chain_command(command, reader, &config, &cancel).await,
		(_, None) => Err("No chain reader configured".into()),
	}
}

async fn run_chain_command(
	command: Command,
	reader: Arc<dyn ChainReader>,
	config: &Config,
	cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
	let submitter_config = SubmitterConfig {
		poll_interval: config.delivery.poll_interval(),
		confirmation_timeout: config.delivery.confirmation_timeout(),
	};

	match command {
		Command::Send {
			to,
			value,
			gas_limit,
			input,
			function,
			artifact,
			method,
			args,
			signer,
		} => {
			let submitter = TransactionSubmitter::with_account_factory(
				reader,
				submitter_config,
				factory_registry::account_factory(config)?,
			);
			let request = SendRequest {
				to,
				value,
				gas_limit,
				call: call_data(input, function, artifact, method, args),
				signer: signer.resolve(config),
			};
			print_json(&commands::send(&submitter, request, cancel).await?)
		},
		Command::Deploy {
			artifact,
			args,
			value,
			gas_limit,
			signer,
		} => {
			let submitter = TransactionSubmitter::with_account_factory(
				reader,
				submitter_config,
				factory_registry::account_factory(config)?,
			);
			let request = DeployRequest {
				artifact,
				args,
				value,
				gas_limit,
				signer: signer.resolve(config),
			};
			print_json(&commands::deploy(&submitter, request, cancel).await?)
		},
		Command::Filter {
			start_block,
			limit_blocks,
			from,
			to,
			is_transfer,
		} => {
			let scanner = BlockFilterScanner::new(reader)
				.with_wait_interval(config.discovery.wait_interval());
			let criteria = FilterCriteria {
				from,
				to,
				is_transfer,
				start_block,
				limit_blocks,
			};
			print_json(&commands::filter(&scanner, &criteria, cancel).await?)
		},
		Command::Block { block } => print_json(&commands::block(reader.as_ref(), block).await?),
		Command::GasPrice => print_json(&commands::gas_price(reader.as_ref()).await?),
		Command::Receipt { hash } => print_json(&commands::receipt(reader.as_ref(), hash).await?),
		Command::Call {
			to,
			artifact,
			method,
			args,
		} => {
			let request = ContractCall {
				to,
				artifact,
				method,
				args,
			};
			print_json(&commands::call(reader.as_ref(), request).await?)
		},
		Command::Event {
			hash,
			artifact,
			event,
		} => {
			let query = EventQuery {
				hash,
				artifact,
				event,
			};
			print_json(&commands::event(reader.as_ref(), query).await?)
		},
		Command::Tx { hash } => print_json(&commands::transaction(reader.as_ref(), hash).await?),
		Command::Account(_) => Err("Account commands do not use the chain".into()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(args: &[&str]) -> Result<Args, clap::Error> {
		Args::try_parse_from(std::iter::once("evmops").chain(args.iter().copied()))
	}

	#[test]
	fn test_parse_send_with_function() {
		let args = parse(&[
			"--rpc-url",
			"http://localhost:9545",
			"send",
			"--to",
			"0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
			"--value",
			"1 ether",
			"--function",
			"transfer(address,uint256)",
			"--arg",
			"0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
			"--arg",
			"5",
		])
		.unwrap();

		assert_eq!(args.rpc_url.as_deref(), Some("http://localhost:9545"));
		let Command::Send {
			function,
			args,
			gas_limit,
			..
		} = args.command
		else {
			panic!("expected send");
		};
		assert_eq!(function.as_deref(), Some("transfer(address,uint256)"));
		assert_eq!(args.len(), 2);
		assert_eq!(gas_limit, 0);
	}

	#[test]
	fn test_payload_sources_are_exclusive() {
		let to = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
		assert!(parse(&["send", "--to", to, "--input", "0x00", "--function", "f()"]).is_err());
		assert!(parse(&["send", "--to", to, "--artifact", "out:Counter"]).is_err());
		assert!(parse(&["send", "--to", to, "--artifact", "out:Counter", "--method", "increment"]).is_ok());
	}

	#[test]
	fn test_parse_filter_and_block() {
		let args = parse(&[
			"filter",
			"--start-block",
			"10",
			"--limit-blocks",
			"100",
			"--is-transfer",
			"true",
		])
		.unwrap();
		assert!(matches!(
			args.command,
			Command::Filter {
				start_block: 10,
				limit_blocks: Some(100),
				is_transfer: Some(true),
				from: None,
				to: None,
			}
		));

		let args = parse(&["block"]).unwrap();
		assert!(matches!(args.command, Command::Block { block: BlockTag::Latest }));
		let args = parse(&["block", "12"]).unwrap();
		assert!(matches!(args.command, Command::Block { block: BlockTag::Number(12) }));
		assert!(parse(&["block", "pending"]).is_err());
	}

	#[test]
	fn test_parse_read_commands() {
		let token = "0x7070707070707070707070707070707070707070";
		let hash = format!("0x{}", "ab".repeat(32));

		let args = parse(&[
			"call",
			"--to",
			token,
			"--artifact",
			"out:Token",
			"--method",
			"balanceOf",
			"--arg",
			token,
		])
		.unwrap();
		let Command::Call { method, args, .. } = args.command else {
			panic!("expected call");
		};
		assert_eq!(method, "balanceOf");
		assert_eq!(args, vec![token.to_string()]);
		assert!(parse(&["call", "--to", token, "--artifact", "out:Token"]).is_err());

		let args = parse(&[
			"event",
			"--hash",
			hash.as_str(),
			"--artifact",
			"out:Token",
			"--event",
			"Transfer",
		])
		.unwrap();
		assert!(matches!(args.command, Command::Event { ref event, .. } if event == "Transfer"));

		let args = parse(&["tx", hash.as_str()]).unwrap();
		assert!(matches!(args.command, Command::Tx { hash } if hash == B256::repeat_byte(0xab)));
		assert!(args.command.needs_chain());
		assert!(parse(&["tx", "0x1234"]).is_err());
	}

	#[test]
	fn test_call_data_selection() {
		assert_eq!(call_data(None, None, None, None, vec![]), CallData::Empty);
		assert_eq!(
			call_data(Some("0x01".into()), None, None, None, vec![]),
			CallData::Raw("0x01".into())
		);
		assert_eq!(
			call_data(None, None, Some("out:Counter".into()), Some("increment".into()), vec![]),
			CallData::Method {
				artifact: "out:Counter".into(),
				method: "increment".into(),
				args: vec![],
			}
		);
	}

	#[test]
	fn test_signer_falls_back_to_config() {
		let mut config = Config::default();
		config.account.private_key = Some("0x01".into());

		let from_flag = SignerArgs {
			private_key: Some("0x02".into()),
		}
		.resolve(&config);
		assert_eq!(from_flag.map(|k| k.expose_secret().to_string()).as_deref(), Some("0x02"));

		let from_config = SignerArgs { private_key: None }.resolve(&config);
		assert_eq!(from_config.map(|k| k.expose_secret().to_string()).as_deref(), Some("0x01"));

		config.account.private_key = Some("".into());
		assert!(SignerArgs { private_key: None }.resolve(&config).is_none());
	}

	#[test]
	fn test_account_commands_skip_chain() {
		let args = parse(&["account", "new"]).unwrap();
		assert!(!args.command.needs_chain());
		let args = parse(&["gas-price"]).unwrap();
		assert!(args.command.needs_chain());
	}
}
