//! Thread-safe in-memory [`StorageBackend`] for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{StorageBackend, StoreError},
};

type StoreMap = Arc<RwLock<HashMap<String, String>>>;

/// Storage backend that keeps serialized entities in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage(StoreMap);
impl MemoryStorage {
	/// Number of stored entries.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns true when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl StorageBackend for MemoryStorage {
	fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.0.read().get(key).cloned())
	}

	fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
		self.0.write().insert(key.to_owned(), value);

		Ok(())
	}

	fn keys(&self) -> Result<Vec<String>, StoreError> {
		Ok(self.0.read().keys().cloned().collect())
	}

	fn set_batch(&self, entries: Vec<(String, String)>) -> Result<(), StoreError> {
		let mut guard = self.0.write();

		for (key, value) in entries {
			guard.insert(key, value);
		}

		Ok(())
	}
}
