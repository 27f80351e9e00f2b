//! Registry trait for named implementations.
//!
//! Implementations that can be selected from configuration (for example the
//! chain reader backing the CLI) expose a `Registry` type that pairs the name
//! used in TOML with the factory that builds them.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation,
	/// e.g. `"evm_alloy"` for `[reader.implementations.evm_alloy]`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Returns the factory function for this implementation.
	fn factory() -> Self::Factory;
}
