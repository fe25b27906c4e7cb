//! Run configuration assembled once from the process environment.

// std
use std::path::{Path, PathBuf};
// self
use crate::{
	_prelude::*,
	auth::{ClientId, TenantId, TokenSecret},
	error::ConfigError,
	provider::ProviderDescriptor,
};

/// Default target file name.
pub const DEFAULT_FILE_NAME: &str = "boiler_data.xlsx";
/// Default output directory.
pub const DEFAULT_OUTPUT_DIR: &str = "data";

/// Environment variable names read by [`FetchConfig::from_lookup`].
pub struct EnvVar;
impl EnvVar {
	/// Directory (tenant) identifier.
	pub const TENANT_ID: &'static str = "AZURE_TENANT_ID";
	/// Application (client) identifier.
	pub const CLIENT_ID: &'static str = "AZURE_CLIENT_ID";
	/// Confidential client secret.
	pub const CLIENT_SECRET: &'static str = "AZURE_CLIENT_SECRET";
	/// Long-lived delegated refresh token.
	pub const REFRESH_TOKEN: &'static str = "AZURE_REFRESH_TOKEN";
	/// Pre-authenticated share link.
	pub const SHARE_LINK: &'static str = "ONEDRIVE_LINK";
	/// Drive item identifier that skips the lookup step.
	pub const ITEM_ID: &'static str = "ONEDRIVE_ITEM_ID";
	/// Target file name.
	pub const FILE_NAME: &'static str = "ONEDRIVE_FILE_NAME";
	/// Output directory.
	pub const OUTPUT_DIR: &'static str = "FETCH_OUTPUT_DIR";
	/// Identity authority override.
	pub const AUTHORITY: &'static str = "AZURE_AUTHORITY";
	/// Drive API root override.
	pub const DRIVE_ROOT: &'static str = "GRAPH_BASE_URL";
}

/// Credentials available to the run; every field is optional and gates one or more strategies.
#[derive(Clone, Debug, Default)]
pub struct CredentialSet {
	/// Directory (tenant) identifier.
	pub tenant: Option<TenantId>,
	/// Application (client) identifier.
	pub client_id: Option<ClientId>,
	/// Confidential client secret.
	pub client_secret: Option<TokenSecret>,
	/// Delegated refresh token.
	pub refresh_token: Option<TokenSecret>,
	/// Pre-authenticated share link.
	pub share_link: Option<Url>,
}

/// File the fetcher looks for on the drive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetFile {
	/// File name in the drive root; also the local output file name.
	pub name: String,
	/// Known drive item identifier; skips the lookup-by-name step when present.
	pub item_id: Option<String>,
}
impl TargetFile {
	/// Targets `name` without a known item identifier.
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), item_id: None }
	}

	/// Attaches a known drive item identifier.
	pub fn with_item_id(mut self, item_id: impl Into<String>) -> Self {
		self.item_id = Some(item_id.into());

		self
	}
}
impl Default for TargetFile {
	fn default() -> Self {
		Self::new(DEFAULT_FILE_NAME)
	}
}

/// Fully resolved configuration for one fetch run.
#[derive(Clone, Debug)]
pub struct FetchConfig {
	/// Credentials gating each strategy.
	pub credentials: CredentialSet,
	/// Remote file to fetch.
	pub target: TargetFile,
	/// Directory receiving the output file.
	pub output_dir: PathBuf,
	/// Identity and drive endpoints.
	pub descriptor: ProviderDescriptor,
}
impl FetchConfig {
	/// Loads configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Loads configuration through `lookup`; empty or whitespace-only values count as absent.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let env = Lookup(lookup);
		let credentials = CredentialSet {
			tenant: env.parse(EnvVar::TENANT_ID, |v| TenantId::new(v))?,
			client_id: env.parse(EnvVar::CLIENT_ID, |v| ClientId::new(v))?,
			client_secret: env.get(EnvVar::CLIENT_SECRET).map(TokenSecret::new),
			refresh_token: env.get(EnvVar::REFRESH_TOKEN).map(TokenSecret::new),
			share_link: env.parse(EnvVar::SHARE_LINK, Url::parse)?,
		};
		let name = env.get(EnvVar::FILE_NAME).unwrap_or_else(|| DEFAULT_FILE_NAME.into());

		validate_file_name(&name)?;

		let target = TargetFile { name, item_id: env.get(EnvVar::ITEM_ID) };
		let output_dir =
			env.get(EnvVar::OUTPUT_DIR).map(PathBuf::from).unwrap_or_else(|| DEFAULT_OUTPUT_DIR.into());

		Ok(Self { credentials, target, output_dir, descriptor: env.descriptor()? })
	}

	/// Overrides the output directory.
	pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.output_dir = dir.into();

		self
	}

	/// Overrides the target file name, keeping any configured item identifier.
	pub fn with_file_name(mut self, name: impl Into<String>) -> Result<Self, ConfigError> {
		let name = name.into();

		validate_file_name(&name)?;

		self.target.name = name;

		Ok(self)
	}

	/// Final location of the output file.
	pub fn output_path(&self) -> PathBuf {
		self.output_dir.join(&self.target.name)
	}
}

/// Loads only the endpoint overrides from the process environment.
pub fn descriptor_from_env() -> Result<ProviderDescriptor, ConfigError> {
	descriptor_from_lookup(|name| std::env::var(name).ok())
}

/// Loads only the endpoint overrides through `lookup`; credential and target variables are ignored.
pub fn descriptor_from_lookup<F>(lookup: F) -> Result<ProviderDescriptor, ConfigError>
where
	F: Fn(&str) -> Option<String>,
{
	Lookup(lookup).descriptor()
}

/// Returns `true` when `path` exists as a regular file.
pub fn has_previous_output(path: &Path) -> bool {
	path.is_file()
}

struct Lookup<F>(F);
impl<F> Lookup<F>
where
	F: Fn(&str) -> Option<String>,
{
	fn get(&self, name: &str) -> Option<String> {
		(self.0)(name).map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
	}

	fn parse<T, E, P>(&self, name: &'static str, parse: P) -> Result<Option<T>, ConfigError>
	where
		E: Display,
		P: FnOnce(&str) -> Result<T, E>,
	{
		self.get(name)
			.map(|value| {
				parse(&value)
					.map_err(|e| ConfigError::InvalidVariable { name, reason: e.to_string() })
			})
			.transpose()
	}

	fn descriptor(&self) -> Result<ProviderDescriptor, ConfigError> {
		let mut builder = ProviderDescriptor::builder();

		if let Some(authority) = self.parse(EnvVar::AUTHORITY, Url::parse)? {
			builder = builder.authority(authority);
		}
		if let Some(drive) = self.parse(EnvVar::DRIVE_ROOT, Url::parse)? {
			builder = builder.drive(drive);
		}

		builder.build()
	}
}

fn validate_file_name(name: &str) -> Result<(), ConfigError> {
	let reason = if name.trim().is_empty() {
		"file name cannot be empty"
	} else if name.contains(['/', '\\']) {
		"file name cannot contain path separators"
	} else if name == "." || name == ".." {
		"file name cannot be a relative directory"
	} else {
		return Ok(());
	};

	Err(ConfigError::InvalidVariable { name: EnvVar::FILE_NAME, reason: reason.into() })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn config_from(pairs: &[(&str, &str)]) -> Result<FetchConfig, ConfigError> {
		let vars = pairs
			.iter()
			.map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
			.collect::<HashMap<_, _>>();

		FetchConfig::from_lookup(|name| vars.get(name).cloned())
	}

	#[test]
	fn empty_environment_yields_defaults() {
		let config = config_from(&[]).expect("Empty environment should still load.");

		assert!(config.credentials.tenant.is_none());
		assert!(config.credentials.share_link.is_none());
		assert_eq!(config.target, TargetFile::default());
		assert_eq!(config.output_path(), PathBuf::from("data").join("boiler_data.xlsx"));
		assert_eq!(config.descriptor.endpoints.authority.as_str(), "https://login.microsoftonline.com/");
	}

	#[test]
	fn blank_values_count_as_absent() {
		let config = config_from(&[
			(EnvVar::TENANT_ID, "   "),
			(EnvVar::CLIENT_SECRET, ""),
			(EnvVar::REFRESH_TOKEN, " 0.AXoA-refresh "),
		])
		.expect("Blank values should be ignored.");

		assert!(config.credentials.tenant.is_none());
		assert!(config.credentials.client_secret.is_none());
		assert_eq!(
			config.credentials.refresh_token.as_ref().map(TokenSecret::expose),
			Some("0.AXoA-refresh")
		);
	}

	#[test]
	fn malformed_values_name_the_variable() {
		let err = config_from(&[(EnvVar::SHARE_LINK, "not a url")])
			.expect_err("Unparsable share link should be rejected.");

		assert!(matches!(err, ConfigError::InvalidVariable { name: "ONEDRIVE_LINK", .. }));

		let err = config_from(&[(EnvVar::FILE_NAME, "../escape.xlsx")])
			.expect_err("File names with separators should be rejected.");

		assert!(matches!(err, ConfigError::InvalidVariable { name: "ONEDRIVE_FILE_NAME", .. }));
	}

	#[test]
	fn overrides_flow_into_descriptor_and_target() {
		let config = config_from(&[
			(EnvVar::AUTHORITY, "https://login.example.com"),
			(EnvVar::DRIVE_ROOT, "https://drive.example.com/v1.0"),
			(EnvVar::ITEM_ID, "01ABCDEF"),
			(EnvVar::OUTPUT_DIR, "/tmp/sheets"),
		])
		.expect("Overrides should load.")
		.with_file_name("plant.xlsx")
		.expect("Override file name should be valid.");

		assert_eq!(config.descriptor.endpoints.authority.as_str(), "https://login.example.com/");
		assert_eq!(config.descriptor.endpoints.drive.as_str(), "https://drive.example.com/v1.0/");
		assert_eq!(config.target.item_id.as_deref(), Some("01ABCDEF"));
		assert_eq!(config.output_path(), PathBuf::from("/tmp/sheets/plant.xlsx"));
	}

	#[test]
	fn descriptor_ignores_fetch_only_variables() {
		let vars = HashMap::from([
			(EnvVar::SHARE_LINK, "not a url"),
			(EnvVar::FILE_NAME, "../escape.xlsx"),
			(EnvVar::DRIVE_ROOT, "https://drive.example.com/v1.0"),
		]);
		let descriptor = descriptor_from_lookup(|name| vars.get(name).map(|v| (*v).to_owned()))
			.expect("Malformed fetch variables should not block the descriptor.");

		assert_eq!(descriptor.endpoints.drive.as_str(), "https://drive.example.com/v1.0/");

		let err = descriptor_from_lookup(|name| {
			(name == EnvVar::AUTHORITY).then(|| "::not a url".to_owned())
		})
		.expect_err("A malformed authority should still be rejected.");

		assert!(matches!(err, ConfigError::InvalidVariable { name: "AZURE_AUTHORITY", .. }));
	}

	#[test]
	fn previous_output_requires_a_regular_file() {
		let dir = tempfile::tempdir().expect("Temporary directory should be created.");
		let path = dir.path().join("boiler_data.xlsx");

		assert!(!has_previous_output(&path));
		assert!(!has_previous_output(dir.path()));

		std::fs::write(&path, b"PK\x03\x04").expect("Previous output should be written.");

		assert!(has_previous_output(&path));
	}
}
