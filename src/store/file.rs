//! Filesystem [`ArtifactStore`] that swaps the output file atomically.

// std
use std::{
	ffi::OsString,
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::store::{ArtifactStore, StoreError};

/// Writes `<path>.tmp`, syncs it, and renames it over `<path>`.
#[derive(Clone, Debug)]
pub struct FileArtifactStore {
	path: PathBuf,
	#[cfg(unix)]
	mode: Option<u32>,
}
impl FileArtifactStore {
	/// Targets `path`; parent directories are created on first write.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			#[cfg(unix)]
			mode: None,
		}
	}

	/// Applies the Unix permission bits `mode` to the file before it is moved into place.
	#[cfg(unix)]
	pub fn with_mode(mut self, mode: u32) -> Self {
		self.mode = Some(mode);

		self
	}

	fn tmp_path(&self) -> PathBuf {
		let mut name = self.path.file_name().map(OsString::from).unwrap_or_default();

		name.push(".tmp");

		self.path.with_file_name(name)
	}

	fn ensure_parent_exists(&self) -> Result<(), StoreError> {
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|source| StoreError::Io {
				action: "create",
				path: parent.to_path_buf(),
				source,
			})?;
		}

		Ok(())
	}

	fn write_tmp(&self, tmp_path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
		let io = |action: &'static str| {
			move |source: std::io::Error| StoreError::Io { action, path: tmp_path.to_path_buf(), source }
		};
		let mut file = File::create(tmp_path).map_err(io("create"))?;

		#[cfg(unix)]
		if let Some(mode) = self.mode {
			use std::os::unix::fs::PermissionsExt;

			file.set_permissions(fs::Permissions::from_mode(mode)).map_err(io("chmod"))?;
		}

		file.write_all(bytes).map_err(io("write"))?;
		file.sync_all().map_err(io("sync"))
	}
}
impl ArtifactStore for FileArtifactStore {
	fn target(&self) -> &Path {
		&self.path
	}

	fn persist(&self, bytes: &[u8]) -> Result<PathBuf, StoreError> {
		self.ensure_parent_exists()?;

		let tmp_path = self.tmp_path();

		if let Err(e) = self.write_tmp(&tmp_path, bytes) {
			let _ = fs::remove_file(&tmp_path);

			return Err(e);
		}

		fs::rename(&tmp_path, &self.path).map_err(|source| {
			let _ = fs::remove_file(&tmp_path);

			StoreError::Io { action: "replace", path: self.path.clone(), source }
		})?;

		Ok(self.path.clone())
	}
}
