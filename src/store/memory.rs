//! In-memory [`ArtifactStore`] for tests and dry runs.

// std
use std::path::{Path, PathBuf};
// self
use crate::{
	_prelude::*,
	store::{ArtifactStore, StoreError},
};

/// Records every persisted payload instead of touching the filesystem.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
	path: PathBuf,
	writes: Mutex<Vec<Vec<u8>>>,
	failure: Option<String>,
}
impl MemoryArtifactStore {
	/// Creates a store reporting `path` as its target.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into(), writes: Mutex::default(), failure: None }
	}

	/// Creates a store whose every write fails with `message`.
	pub fn failing(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
		Self { failure: Some(message.into()), ..Self::new(path) }
	}

	/// Number of successful writes.
	pub fn write_count(&self) -> usize {
		self.writes.lock().len()
	}

	/// Most recently persisted payload.
	pub fn latest(&self) -> Option<Vec<u8>> {
		self.writes.lock().last().cloned()
	}
}
impl ArtifactStore for MemoryArtifactStore {
	fn target(&self) -> &Path {
		&self.path
	}

	fn persist(&self, bytes: &[u8]) -> Result<PathBuf, StoreError> {
		if let Some(message) = &self.failure {
			return Err(StoreError::Backend { message: message.clone() });
		}

		self.writes.lock().push(bytes.to_vec());

		Ok(self.path.clone())
	}
}
