//! Configuration module for the evmops system.
//!
//! This module provides the structures backing the optional TOML configuration
//! file of the `evmops` binary. Every section has defaults, so an empty file (or
//! no file at all) yields a working configuration pointing at a local node.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)
//!
//! `${VAR}` and `${VAR:-default}` are replaced with environment variables before
//! the TOML is parsed.

mod loader;

use evmops_types::{Field, FieldType, Schema, SecretString};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub use loader::ConfigLoader;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Name of the chain reader used when the configuration does not pick one.
pub const DEFAULT_READER: &str = "evm_alloy";
/// RPC endpoint used when the configuration does not set one.
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
	/// Which chain reader to use and how to reach the node.
	#[serde(default)]
	pub reader: ReaderConfig,
	/// Confirmation polling of submitted transactions.
	#[serde(default)]
	pub delivery: DeliveryConfig,
	/// Block scanning.
	#[serde(default)]
	pub discovery: DiscoveryConfig,
	/// Default signing account.
	#[serde(default)]
	pub account: AccountConfig,
}

/// Configuration of the chain reader.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReaderConfig {
	/// Which implementation to use as primary.
	#[serde(default = "default_reader")]
	pub primary: String,
	/// Map of reader implementation names to their configurations.
	/// Each implementation validates its own table.
	#[serde(default = "default_reader_implementations")]
	pub implementations: HashMap<String, toml::Value>,
}

fn default_reader() -> String {
	DEFAULT_READER.to_string()
}

fn default_reader_implementations() -> HashMap<String, toml::Value> {
	let mut table = toml::map::Map::new();
	table.insert(
		"rpc_url".to_string(),
		toml::Value::String(DEFAULT_RPC_URL.to_string()),
	);
	HashMap::from([(DEFAULT_READER.to_string(), toml::Value::Table(table))])
}

impl Default for ReaderConfig {
	fn default() -> Self {
		Self {
			primary: default_reader(),
			implementations: default_reader_implementations(),
		}
	}
}

impl ReaderConfig {
	/// Returns the table of the primary implementation.
	pub fn primary_config(&self) -> Option<&toml::Value> {
		self.implementations.get(&self.primary)
	}

	/// Replaces the `rpc_url` of the primary implementation, creating its
	/// table if needed.
	pub fn set_rpc_url(&mut self, rpc_url: &str) {
		let entry = self
			.implementations
			.entry(self.primary.clone())
			.or_insert_with(|| toml::Value::Table(toml::map::Map::new()));

		if !entry.is_table() {
			*entry = toml::Value::Table(toml::map::Map::new());
		}
		if let Some(table) = entry.as_table_mut() {
			table.insert(
				"rpc_url".to_string(),
				toml::Value::String(rpc_url.to_string()),
			);
		}
	}
}

/// Configuration of transaction submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeliveryConfig {
	/// Delay between receipt lookups, in milliseconds.
	/// Defaults to 100 milliseconds if not specified.
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	/// How long to wait for a receipt after broadcast, in seconds.
	/// Defaults to 15 seconds if not specified.
	#[serde(default = "default_confirmation_timeout_secs")]
	pub confirmation_timeout_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
	100
}

fn default_confirmation_timeout_secs() -> u64 {
	15
}

impl Default for DeliveryConfig {
	fn default() -> Self {
		Self {
			poll_interval_ms: default_poll_interval_ms(),
			confirmation_timeout_secs: default_confirmation_timeout_secs(),
		}
	}
}

impl DeliveryConfig {
	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn confirmation_timeout(&self) -> Duration {
		Duration::from_secs(self.confirmation_timeout_secs)
	}
}

/// Configuration of block scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiscoveryConfig {
	/// Delay between head lookups once the scan has caught up, in seconds.
	/// Defaults to 5 seconds if not specified.
	#[serde(default = "default_wait_interval_secs")]
	pub wait_interval_secs: u64,
}

fn default_wait_interval_secs() -> u64 {
	5
}

impl Default for DiscoveryConfig {
	fn default() -> Self {
		Self {
			wait_interval_secs: default_wait_interval_secs(),
		}
	}
}

impl DiscoveryConfig {
	pub fn wait_interval(&self) -> Duration {
		Duration::from_secs(self.wait_interval_secs)
	}
}

/// Configuration of the default signing account.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	/// Which account implementation to use.
	#[serde(default = "default_account")]
	pub primary: String,
	/// Hex encoded private key used when a command does not supply one.
	#[serde(default)]
	pub private_key: Option<SecretString>,
}

fn default_account() -> String {
	"local".to_string()
}

impl Default for AccountConfig {
	fn default() -> Self {
		Self {
			primary: default_account(),
			private_key: None,
		}
	}
}

impl AccountConfig {
	/// Returns the configured key, treating an empty string as unset.
	pub fn signing_key(&self) -> Option<&SecretString> {
		self.private_key.as_ref().filter(|key| !key.is_empty())
	}
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut missing = None;
	let resolved = re.replace_all(input, |caps: &regex::Captures<'_>| {
		let var_name = &caps[1];
		match (std::env::var(var_name), caps.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				missing.get_or_insert_with(|| var_name.to_string());
				String::new()
			},
		}
	});

	match missing {
		Some(var_name) => Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			var_name
		))),
		None => Ok(resolved.into_owned()),
	}
}

impl Config {
	/// Loads configuration from a file, following include directives.
	///
	/// Each top-level section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Validates the configuration.
	///
	/// - The primary reader must have an implementation table
	/// - Polling intervals and timeouts must be within their bounds
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.reader.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Reader primary implementation cannot be empty".into(),
			));
		}
		if self.reader.primary_config().is_none() {
			return Err(ConfigError::Validation(format!(
				"Primary reader '{}' not found in implementations",
				self.reader.primary
			)));
		}

		check_section(
			"delivery",
			&self.delivery,
			vec![
				bounded("poll_interval_ms", 1, 10_000),
				bounded("confirmation_timeout_secs", 1, 3_600),
			],
		)?;
		check_section(
			"discovery",
			&self.discovery,
			vec![bounded("wait_interval_secs", 1, 300)],
		)?;

		if self.account.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Account primary implementation cannot be empty".into(),
			));
		}

		Ok(())
	}
}

fn bounded(name: &str, min: i64, max: i64) -> Field {
	Field::new(
		name,
		FieldType::Integer {
			min: Some(min),
			max: Some(max),
		},
	)
}

/// Checks a typed section against integer bounds on its serialized form.
fn check_section<T: Serialize>(
	section: &str,
	value: &T,
	fields: Vec<Field>,
) -> Result<(), ConfigError> {
	let table = toml::Value::try_from(value)
		.map_err(|e| ConfigError::Validation(format!("[{}] {}", section, e)))?;

	Schema::new(fields, vec![])
		.validate(&table)
		.map_err(|e| ConfigError::Validation(format!("[{}] {}", section, e)))
}

/// Implementation of FromStr trait for Config to enable parsing from string.
///
/// Environment variables are resolved and the configuration is validated
/// after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
