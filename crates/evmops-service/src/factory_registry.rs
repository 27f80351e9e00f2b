//! Factory registry for the pluggable parts of the binary.
//!
//! Chain readers and account implementations register themselves by name; the
//! configuration picks one of each.

use evmops_account::AccountFactory;
use evmops_config::Config;
use evmops_delivery::ChainReaderFactory;
use evmops_types::ChainReader;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Registry of every available implementation factory.
pub struct FactoryRegistry {
	pub reader: HashMap<String, ChainReaderFactory>,
	pub account: HashMap<String, AccountFactory>,
}

impl FactoryRegistry {
	/// Create a new empty registry
	pub fn new() -> Self {
		Self {
			reader: HashMap::new(),
			account: HashMap::new(),
		}
	}

	/// Register a chain reader implementation
	pub fn register_reader(&mut self, name: impl Into<String>, factory: ChainReaderFactory) {
		self.reader.insert(name.into(), factory);
	}

	/// Register an account implementation
	pub fn register_account(&mut self, name: impl Into<String>, factory: AccountFactory) {
		self.account.insert(name.into(), factory);
	}
}

impl Default for FactoryRegistry {
	fn default() -> Self {
		Self::new()
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Get the global factory registry, registering all implementations on first use.
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in evmops_delivery::get_all_implementations() {
			tracing::debug!("Registering reader implementation: {}", name);
			registry.register_reader(name, factory);
		}

		for (name, factory) in evmops_account::get_all_implementations() {
			tracing::debug!("Registering account implementation: {}", name);
			registry.register_account(name, factory);
		}

		registry
	})
}

fn unknown(kind: &str, name: &str, available: Vec<&String>) -> Box<dyn std::error::Error> {
	let mut available: Vec<&str> = available.into_iter().map(String::as_str).collect();
	available.sort_unstable();
	format!(
		"Unknown {} implementation '{}'. Available: [{}]",
		kind,
		name,
		available.join(", ")
	)
	.into()
}

/// Builds the primary chain reader named in the configuration.
pub fn build_reader(config: &Config) -> Result<Arc<dyn ChainReader>, Box<dyn std::error::Error>> {
	let registry = get_registry();
	let name = &config.reader.primary;

	let factory = registry
		.reader
		.get(name)
		.ok_or_else(|| unknown("reader", name, registry.reader.keys().collect()))?;
	let table = config
		.reader
		.primary_config()
		.ok_or_else(|| format!("Missing configuration for reader '{}'", name))?;

	Ok(factory(table)?)
}

/// Returns the factory of the account implementation named in the configuration.
pub fn account_factory(config: &Config) -> Result<AccountFactory, Box<dyn std::error::Error>> {
	let registry = get_registry();
	let name = &config.account.primary;

	registry
		.account
		.get(name)
		.copied()
		.ok_or_else(|| unknown("account", name, registry.account.keys().collect()))
}
