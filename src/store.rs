//! Output contracts and built-in artifact stores.

pub mod file;
pub mod memory;

pub use file::FileArtifactStore;
pub use memory::MemoryArtifactStore;

// std
use std::path::{Path, PathBuf};
// self
use crate::_prelude::*;

/// Destination for a validated spreadsheet.
///
/// Implementations replace the previous artifact all at once or not at all; a failed
/// [`ArtifactStore::persist`] leaves whatever was there before untouched.
pub trait ArtifactStore
where
	Self: Send + Sync,
{
	/// Location the artifact is written to.
	fn target(&self) -> &Path;

	/// Replaces the artifact with `bytes` and returns its final location.
	fn persist(&self, bytes: &[u8]) -> Result<PathBuf, StoreError>;
}

/// Error type produced by [`ArtifactStore`] implementations.
#[derive(Debug, ThisError)]
pub enum StoreError {
	/// Filesystem operation failed.
	#[error("Failed to {action} {}: {source}.", .path.display())]
	Io {
		/// Operation that failed (`create`, `chmod`, `write`, `sync`, `replace`).
		action: &'static str,
		/// Path the operation targeted.
		path: PathBuf,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
	/// Backend-level failure for non-filesystem stores.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as _;
	// self
	use super::*;

	#[test]
	fn store_error_converts_into_fetcher_error_with_source() {
		let store_error = StoreError::Io {
			action: "replace",
			path: PathBuf::from("data/boiler_data.xlsx"),
			source: std::io::Error::other("disk full"),
		};
		let rendered = store_error.to_string();
		let error = Error::from(store_error);

		assert!(matches!(error, Error::Storage(_)));
		assert!(!error.is_strategy_soft_failure());
		assert_eq!(error.to_string(), rendered);
		assert!(rendered.contains("disk full"));
		assert!(error.source().is_some());
	}
}
