//! Contract artifact resolution and ABI encoding of call data.
//!
//! Artifacts are the JSON files written by Foundry (`out/<File>.sol/<Name>.json`,
//! bytecode under `bytecode.object`) or Hardhat (`artifacts/.../<Name>.json`,
//! bytecode as a plain string). Arguments are always given as strings and
//! coerced to the parameter's Solidity type. Decoded return values and event
//! arguments are rendered back to strings, keyed by parameter name or, for
//! unnamed parameters, by position.

use alloy::dyn_abi::{DynSolValue, EventExt, FunctionExt, JsonAbiExt, Specifier};
use alloy::json_abi::{Event, Function, JsonAbi, Param};
use evmops_types::{without_0x_prefix, Address, Bytes, ReceiptLog};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Errors raised while loading artifacts or encoding arguments.
#[derive(Debug, Error)]
pub enum ArtifactError {
	#[error("Invalid artifact reference '{0}', expected <path>:<contract>")]
	InvalidReference(String),
	#[error("Contract '{name}' not found under {}", .dir.display())]
	NotFound { name: String, dir: PathBuf },
	#[error("Failed to walk artifact directory: {0}")]
	Walk(#[from] walkdir::Error),
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Unknown artifact format in {path}: {reason}")]
	Format { path: String, reason: String },
	#[error("Invalid bytecode: {0}")]
	Bytecode(String),
	#[error("Failed to parse function '{signature}': {reason}")]
	Signature { signature: String, reason: String },
	#[error("Method '{0}' not found")]
	MethodNotFound(String),
	#[error("Event '{0}' not found")]
	EventNotFound(String),
	#[error("Expected {expected} arguments, got {actual}")]
	ArgumentCount { expected: usize, actual: usize },
	#[error("Failed to decode argument {index} as {ty}: {reason}")]
	Argument {
		index: usize,
		ty: String,
		reason: String,
	},
	#[error("Failed to abi encode: {0}")]
	Encoding(String),
	#[error("Failed to abi decode: {0}")]
	Decoding(String),
}

/// Decoded values keyed by parameter name, or position when unnamed.
pub type NamedValues = BTreeMap<String, String>;

/// An event decoded from one receipt log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLog {
	/// Contract that emitted the log.
	pub address: Address,
	pub values: NamedValues,
}

/// A compiled contract: its interface and creation bytecode.
#[derive(Debug, Clone)]
pub struct Artifact {
	pub abi: JsonAbi,
	pub bytecode: Bytes,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
	Foundry { object: String },
	Hardhat(String),
}

#[derive(Deserialize)]
struct RawArtifact {
	abi: JsonAbi,
	bytecode: RawBytecode,
}

/// Decodes the contents of an artifact file in either supported layout.
pub fn decode_artifact(data: &str, path: &str) -> Result<Artifact, ArtifactError> {
	let raw: RawArtifact = serde_json::from_str(data).map_err(|e| ArtifactError::Format {
		path: path.to_string(),
		reason: e.to_string(),
	})?;

	let code = match &raw.bytecode {
		RawBytecode::Foundry { object } => object,
		RawBytecode::Hardhat(code) => code,
	};
	let bytecode = hex::decode(without_0x_prefix(code))
		.map_err(|e| ArtifactError::Bytecode(format!("{}: {}", path, e)))?;

	Ok(Artifact {
		abi: raw.abi,
		bytecode: bytecode.into(),
	})
}

/// Resolves a `<dir>:<Contract>` reference to the artifact of that contract.
///
/// `dir` is walked recursively in file name order and the first file named
/// exactly `<Contract>.json` is loaded.
pub fn resolve_contract(reference: &str) -> Result<Artifact, ArtifactError> {
	let (dir, name) = reference
		.rsplit_once(':')
		.filter(|(dir, name)| !dir.is_empty() && !name.is_empty())
		.ok_or_else(|| ArtifactError::InvalidReference(reference.to_string()))?;

	let path = find_artifact(Path::new(dir), name)?;
	tracing::debug!(path = %path.display(), "Loading artifact");

	let data = std::fs::read_to_string(&path)?;
	decode_artifact(&data, &path.display().to_string())
}

fn find_artifact(dir: &Path, name: &str) -> Result<PathBuf, ArtifactError> {
	let file_name = format!("{}.json", name);

	for entry in WalkDir::new(dir).sort_by_file_name() {
		let entry = entry?;
		if entry.file_type().is_file() && entry.file_name().to_str() == Some(file_name.as_str()) {
			return Ok(entry.into_path());
		}
	}

	Err(ArtifactError::NotFound {
		name: name.to_string(),
		dir: dir.to_path_buf(),
	})
}

fn coerce_args(params: &[Param], args: &[String]) -> Result<Vec<DynSolValue>, ArtifactError> {
	if params.len() != args.len() {
		return Err(ArtifactError::ArgumentCount {
			expected: params.len(),
			actual: args.len(),
		});
	}

	params
		.iter()
		.zip(args)
		.enumerate()
		.map(|(index, (param, arg))| {
			let argument_error = |reason: String| ArtifactError::Argument {
				index,
				ty: param.selector_type().into_owned(),
				reason,
			};
			let ty = param.resolve().map_err(|e| argument_error(e.to_string()))?;
			ty.coerce_str(arg).map_err(|e| argument_error(e.to_string()))
		})
		.collect()
}

/// Encodes a call to `function` with string arguments.
pub fn encode_call(function: &Function, args: &[String]) -> Result<Bytes, ArtifactError> {
	let values = coerce_args(&function.inputs, args)?;
	function
		.abi_encode_input(&values)
		.map(Bytes::from)
		.map_err(|e| ArtifactError::Encoding(e.to_string()))
}

/// Encodes a call to a typed function such as `transfer(address,uint256)`.
pub fn encode_signature_call(signature: &str, args: &[String]) -> Result<Bytes, ArtifactError> {
	let function = Function::parse(signature).map_err(|e| ArtifactError::Signature {
		signature: signature.to_string(),
		reason: e.to_string(),
	})?;
	encode_call(&function, args)
}

/// Looks up a method of an artifact's interface.
///
/// Overloaded methods are told apart by their number of arguments.
pub fn select_method<'a>(
	abi: &'a JsonAbi,
	method: &str,
	arg_count: usize,
) -> Result<&'a Function, ArtifactError> {
	let overloads = abi
		.function(method)
		.ok_or_else(|| ArtifactError::MethodNotFound(method.to_string()))?;

	overloads
		.iter()
		.find(|f| f.inputs.len() == arg_count)
		.ok_or_else(|| ArtifactError::ArgumentCount {
			expected: overloads.first().map(|f| f.inputs.len()).unwrap_or_default(),
			actual: arg_count,
		})
}

/// Encodes a call to a method of an artifact's interface.
pub fn encode_method_call(
	abi: &JsonAbi,
	method: &str,
	args: &[String],
) -> Result<Bytes, ArtifactError> {
	encode_call(select_method(abi, method, args.len())?, args)
}

/// Decodes the return data of a call to `function`.
pub fn decode_output(function: &Function, data: &[u8]) -> Result<NamedValues, ArtifactError> {
	let values = function
		.abi_decode_output(data)
		.map_err(|e| ArtifactError::Decoding(e.to_string()))?;

	Ok(function
		.outputs
		.iter()
		.zip(&values)
		.enumerate()
		.map(|(position, (param, value))| (param_key(&param.name, position), format_value(value)))
		.collect())
}

/// Looks up the overloads of an event of an artifact's interface.
pub fn select_event<'a>(abi: &'a JsonAbi, name: &str) -> Result<&'a [Event], ArtifactError> {
	abi.event(name)
		.map(Vec::as_slice)
		.ok_or_else(|| ArtifactError::EventNotFound(name.to_string()))
}

/// Decodes the last log emitted by one of `events`.
///
/// Logs are matched on their first topic, so anonymous events never match.
/// Returns `Ok(None)` when no log matches.
pub fn decode_event(
	events: &[Event],
	logs: &[ReceiptLog],
) -> Result<Option<DecodedLog>, ArtifactError> {
	let matched = logs.iter().rev().find_map(|log| {
		let selector = log.topics.first()?;
		events
			.iter()
			.find(|event| !event.anonymous && event.selector() == *selector)
			.map(|event| (event, log))
	});

	let Some((event, log)) = matched else {
		return Ok(None);
	};

	let decoded = event
		.decode_log_parts(log.topics.iter().copied(), &log.data)
		.map_err(|e| ArtifactError::Decoding(e.to_string()))?;

	let mut indexed = decoded.indexed.iter();
	let mut body = decoded.body.iter();
	let mut values = NamedValues::new();
	for (position, input) in event.inputs.iter().enumerate() {
		let value = if input.indexed {
			indexed.next()
		} else {
			body.next()
		};
		if let Some(value) = value {
			values.insert(param_key(&input.name, position), format_value(value));
		}
	}

	Ok(Some(DecodedLog {
		address: log.address,
		values,
	}))
}

fn param_key(name: &str, position: usize) -> String {
	if name.is_empty() {
		position.to_string()
	} else {
		name.to_string()
	}
}

/// Renders a decoded value: numbers in decimal, byte strings in hex,
/// sequences as `[a, b]`.
pub fn format_value(value: &DynSolValue) -> String {
	match value {
		DynSolValue::Address(address) => address.to_string(),
		DynSolValue::Bool(flag) => flag.to_string(),
		DynSolValue::Int(number, _) => number.to_string(),
		DynSolValue::Uint(number, _) => number.to_string(),
		DynSolValue::FixedBytes(word, size) => {
			format!("0x{}", hex::encode(word.get(..*size).unwrap_or_default()))
		},
		DynSolValue::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
		DynSolValue::String(text) => text.clone(),
		DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
			let items: Vec<String> = items.iter().map(format_value).collect();
			format!("[{}]", items.join(", "))
		},
		other => format!("{:?}", other),
	}
}

/// Builds creation code: the artifact bytecode followed by the encoded
/// constructor arguments.
pub fn encode_constructor(artifact: &Artifact, args: &[String]) -> Result<Bytes, ArtifactError> {
	let mut code = artifact.bytecode.to_vec();

	match &artifact.abi.constructor {
		Some(constructor) => {
			let values = coerce_args(&constructor.inputs, args)?;
			let encoded = constructor
				.abi_encode_input(&values)
				.map_err(|e| ArtifactError::Encoding(e.to_string()))?;
			code.extend_from_slice(&encoded);
		},
		None if !args.is_empty() => {
			return Err(ArtifactError::ArgumentCount {
				expected: 0,
				actual: args.len(),
			});
		},
		None => {},
	}

	Ok(code.into())
}
