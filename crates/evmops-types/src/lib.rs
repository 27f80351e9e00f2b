//! Common types module for the evmops system.
//!
//! This module defines the data model shared by the submission pipeline and the
//! block scanner, together with the narrow traits through which both reach the
//! remote chain. Keeping them here lets the delivery and discovery crates depend
//! on the same view of the chain without depending on each other.

/// Chain access traits and the block/transaction views they return.
pub mod chain;
/// Transaction submission types.
pub mod delivery;
/// Block scanning types.
pub mod discovery;
/// Registry trait for named implementations.
pub mod registry;
/// Secret wrapper for private key material.
pub mod secret_string;
/// Utility functions for hex and unit conversions.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use chain::*;
pub use delivery::*;
pub use discovery::*;
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use utils::{
	parse_ether_value, short_hash, truncate_id, with_0x_prefix, without_0x_prefix, UnitError,
};
pub use validation::*;

// Primitive types used across the workspace.
pub use alloy::primitives::{Address, Bytes, B256, U256};
