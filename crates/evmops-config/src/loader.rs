//! Configuration loader for multi-file configurations.
//!
//! A file may pull in others with `include`. Included tables are merged into
//! the including file at the top level; a section defined in more than one file
//! is rejected rather than merged.

use crate::{resolve_env_vars, Config, ConfigError};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Loads a configuration file together with the files it includes.
pub struct ConfigLoader {
	/// Base path for resolving relative includes
	base_path: PathBuf,
	/// Canonical paths already read, to reject include cycles
	loaded_files: HashSet<PathBuf>,
	/// Which file each top-level section came from, for error reporting
	section_sources: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	/// Creates a new ConfigLoader with the given base path.
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			loaded_files: HashSet::new(),
			section_sources: HashMap::new(),
		}
	}

	/// Loads, merges and validates a configuration file and its includes.
	pub async fn load_config(
		&mut self,
		config_path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let config_path = self.resolve_path(config_path)?;
		let mut root = self.read_table(&config_path).await?;

		let includes = match root.as_table_mut() {
			Some(table) => extract_includes(table.remove("include"))?,
			None => Vec::new(),
		};
		self.claim_sections(&root, &config_path)?;

		for include in includes {
			let include_path = self.resolve_path(&include)?;
			let included = self.read_table(&include_path).await?;
			if included.get("include").is_some() {
				return Err(ConfigError::Validation(format!(
					"Nested include in {} is not supported",
					include_path.display()
				)));
			}
			self.claim_sections(&included, &include_path)?;

			if let (Some(target), toml::Value::Table(source)) = (root.as_table_mut(), included) {
				target.extend(source);
			}
		}

		let config = Config::deserialize(root)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads a file, resolves environment variables and parses it as TOML.
	async fn read_table(&mut self, path: &Path) -> Result<toml::Value, ConfigError> {
		let canonical_path = path.canonicalize().map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;

		if !self.loaded_files.insert(canonical_path.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical_path.display()
			)));
		}

		let content = tokio::fs::read_to_string(path).await?;
		let resolved = resolve_env_vars(&content)?;
		Ok(toml::from_str(&resolved)?)
	}

	/// Records the top-level sections of `value` as coming from `source`.
	fn claim_sections(&mut self, value: &toml::Value, source: &Path) -> Result<(), ConfigError> {
		let Some(table) = value.as_table() else {
			return Ok(());
		};

		for key in table.keys() {
			if let Some(existing) = self.section_sources.get(key) {
				return Err(ConfigError::Validation(format!(
					"Duplicate section '{}' found in {} and {}. \
					Each top-level section must be unique across all configuration files.",
					key,
					existing.display(),
					source.display()
				)));
			}
			self.section_sources
				.insert(key.clone(), source.to_path_buf());
		}

		Ok(())
	}

	/// Resolves a path relative to the base path.
	fn resolve_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
		let path = path.as_ref();

		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};

		if !resolved.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}

		Ok(resolved)
	}
}

/// Turns an `include` value (a string or an array of strings) into paths.
fn extract_includes(include: Option<toml::Value>) -> Result<Vec<PathBuf>, ConfigError> {
	match include {
		None => Ok(Vec::new()),
		Some(toml::Value::String(path)) => Ok(vec![PathBuf::from(path)]),
		Some(toml::Value::Array(items)) => items
			.into_iter()
			.map(|item| match item {
				toml::Value::String(path) => Ok(PathBuf::from(path)),
				_ => Err(ConfigError::Validation(
					"Include array must contain only strings".into(),
				)),
			})
			.collect(),
		Some(_) => Err(ConfigError::Validation(
			"Include must be a string or array of strings".into(),
		)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_single_file_config() {
		let temp_dir = TempDir::new().unwrap();
		let config_path = temp_dir.path().join("config.toml");

		fs::write(
			&config_path,
			r#"
[reader.implementations.evm_alloy]
rpc_url = "http://localhost:9545"

[delivery]
poll_interval_ms = 50
"#,
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config(&config_path).await.unwrap();

		assert_eq!(config.delivery.poll_interval_ms, 50);
		assert_eq!(config.delivery.confirmation_timeout_secs, 15);
		assert_eq!(
			config.reader.primary_config().and_then(|t| t.get("rpc_url")),
			Some(&toml::Value::String("http://localhost:9545".into()))
		);
	}

	#[tokio::test]
	async fn test_config_with_includes() {
		let temp_dir = TempDir::new().unwrap();

		fs::write(
			temp_dir.path().join("main.toml"),
			r#"
include = ["reader.toml", "timing.toml"]

[account]
private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
"#,
		)
		.unwrap();
		fs::write(
			temp_dir.path().join("reader.toml"),
			r#"
[reader]
primary = "evm_alloy"
[reader.implementations.evm_alloy]
rpc_url = "https://rpc.example.org"
"#,
		)
		.unwrap();
		fs::write(
			temp_dir.path().join("timing.toml"),
			r#"
[delivery]
confirmation_timeout_secs = 30

[discovery]
wait_interval_secs = 1
"#,
		)
		.unwrap();

		let config = Config::from_file(temp_dir.path().join("main.toml").to_str().unwrap())
			.await
			.unwrap();

		assert!(config.account.signing_key().is_some());
		assert_eq!(config.delivery.confirmation_timeout_secs, 30);
		assert_eq!(config.discovery.wait_interval_secs, 1);
		assert_eq!(
			config.reader.primary_config().and_then(|t| t.get("rpc_url")),
			Some(&toml::Value::String("https://rpc.example.org".into()))
		);
	}

	#[tokio::test]
	async fn test_duplicate_section_error() {
		let temp_dir = TempDir::new().unwrap();

		fs::write(
			temp_dir.path().join("main.toml"),
			"include = [\"duplicate.toml\"]\n\n[delivery]\npoll_interval_ms = 10\n",
		)
		.unwrap();
		fs::write(
			temp_dir.path().join("duplicate.toml"),
			"[delivery]\npoll_interval_ms = 20\n",
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let result = loader.load_config("main.toml").await;

		let error_msg = result.unwrap_err().to_string();
		assert!(error_msg.contains("Duplicate section 'delivery'"));
	}

	#[tokio::test]
	async fn test_self_include_detection() {
		let temp_dir = TempDir::new().unwrap();

		fs::write(
			temp_dir.path().join("self.toml"),
			"include = [\"self.toml\"]\n\n[delivery]\npoll_interval_ms = 10\n",
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let result = loader.load_config("self.toml").await;

		let error_msg = result.unwrap_err().to_string();
		assert!(error_msg.contains("already loaded"));
	}

	#[tokio::test]
	async fn test_missing_include() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(temp_dir.path().join("main.toml"), "include = \"absent.toml\"\n").unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let result = loader.load_config("main.toml").await;
		assert!(matches!(result, Err(ConfigError::Io(_))));
	}

	#[test]
	fn test_extract_includes_rejects_non_strings() {
		let value: toml::Value = toml::from_str("include = [1, 2]").unwrap();
		let result = extract_includes(value.get("include").cloned());
		assert!(matches!(result, Err(ConfigError::Validation(_))));

		let value: toml::Value = toml::from_str("include = 7").unwrap();
		assert!(extract_includes(value.get("include").cloned()).is_err());
	}
}
