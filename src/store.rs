//! Raw key/value storage contract consumed by the credential cache, plus an in-memory backend.
//!
//! Backends only move opaque strings around. Key construction and entity (de)serialization live
//! in [`crate::cache`], so swapping a backend never changes which entity a key resolves to.

pub mod memory;

pub use memory::MemoryStorage;

// self
use crate::_prelude::*;

/// Storage backend contract.
///
/// A missing key is a normal outcome (`Ok(None)`), never an error. `set_batch` must apply every
/// entry or none of them, and readers must never observe a partially applied batch.
pub trait StorageBackend
where
	Self: Send + Sync,
{
	/// Reads the serialized entity stored under `key`.
	fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

	/// Stores `value` under `key`, replacing any previous value.
	fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

	/// Lists every stored key, in no particular order.
	fn keys(&self) -> Result<Vec<String>, StoreError>;

	/// Atomically stores a group of entries.
	fn set_batch(&self, entries: Vec<(String, String)>) -> Result<(), StoreError>;
}

/// Error type produced by [`StorageBackend`] implementations and entity decoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// A stored value could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
