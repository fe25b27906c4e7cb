//! Provider descriptor data structures and the validating builder.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TenantId},
	error::ConfigError,
};

/// Default identity authority.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com/";
/// Default drive API root.
pub const DEFAULT_DRIVE_ROOT: &str = "https://graph.microsoft.com/v1.0/";
/// Scopes requested by delegated (refresh-token, device-code) grants.
pub const DEFAULT_DELEGATED_SCOPE: &str = "Files.Read.All Sites.Read.All offline_access";
/// Scope requested by the application-only grant.
pub const DEFAULT_APPLICATION_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Preferred client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	#[default]
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// Endpoint roots declared by a provider descriptor. Both always end with `/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderEndpoints {
	/// Identity authority; tenant-scoped OAuth endpoints hang off it.
	pub authority: Url,
	/// Drive API root (`…/v1.0/`).
	pub drive: Url,
}

/// Immutable provider descriptor consumed by flows and drive lookups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderDescriptor {
	/// Endpoint definitions exposed by the provider.
	pub endpoints: ProviderEndpoints,
	/// Scopes requested by delegated grants.
	pub delegated_scope: ScopeSet,
	/// Scopes requested by the application-only grant.
	pub application_scope: ScopeSet,
	/// Preferred client authentication mechanism.
	pub client_auth_method: ClientAuthMethod,
}
impl ProviderDescriptor {
	/// Creates a new builder seeded with the public cloud defaults.
	pub fn builder() -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::default()
	}

	/// `{authority}/{tenant}/oauth2/v2.0/token`.
	pub fn token_endpoint(&self, tenant: &TenantId) -> Result<Url, ConfigError> {
		self.tenant_endpoint(tenant, "token")
	}

	/// `{authority}/{tenant}/oauth2/v2.0/devicecode`.
	pub fn device_code_endpoint(&self, tenant: &TenantId) -> Result<Url, ConfigError> {
		self.tenant_endpoint(tenant, "devicecode")
	}

	/// Appends percent-encoded `segments` to the drive root.
	pub fn drive_url<'a, I>(&self, segments: I) -> Result<Url, ConfigError>
	where
		I: IntoIterator<Item = &'a str>,
	{
		let mut url = self.endpoints.drive.clone();

		url.path_segments_mut()
			.map_err(|_| ProviderDescriptorError::CannotBeABase { endpoint: "drive" })?
			.pop_if_empty()
			.extend(segments);

		Ok(url)
	}

	fn tenant_endpoint(&self, tenant: &TenantId, leaf: &str) -> Result<Url, ConfigError> {
		let mut url = self.endpoints.authority.clone();

		url.path_segments_mut()
			.map_err(|_| ProviderDescriptorError::CannotBeABase { endpoint: "authority" })?
			.pop_if_empty()
			.extend([tenant.as_ref(), "oauth2", "v2.0", leaf]);

		Ok(url)
	}
}

/// Errors raised while constructing or validating descriptors.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ProviderDescriptorError {
	/// Endpoints must use HTTPS unless they target a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Endpoint cannot carry path segments (e.g. `mailto:`).
	#[error("The {endpoint} endpoint cannot be used as a base URL.")]
	CannotBeABase {
		/// Which endpoint failed validation.
		endpoint: &'static str,
	},
	/// Grants need at least one scope.
	#[error("The {grant} scope set cannot be empty.")]
	EmptyScope {
		/// Which scope set was empty.
		grant: &'static str,
	},
}

/// Builder for [`ProviderDescriptor`] values.
#[derive(Debug)]
pub struct ProviderDescriptorBuilder {
	authority: Option<Url>,
	drive: Option<Url>,
	delegated_scope: Option<ScopeSet>,
	application_scope: Option<ScopeSet>,
	client_auth_method: ClientAuthMethod,
}
impl Default for ProviderDescriptorBuilder {
	fn default() -> Self {
		Self {
			authority: None,
			drive: None,
			delegated_scope: None,
			application_scope: None,
			client_auth_method: ClientAuthMethod::default(),
		}
	}
}
impl ProviderDescriptorBuilder {
	/// Overrides the identity authority.
	pub fn authority(mut self, url: Url) -> Self {
		self.authority = Some(url);

		self
	}

	/// Overrides the drive API root.
	pub fn drive(mut self, url: Url) -> Self {
		self.drive = Some(url);

		self
	}

	/// Overrides the delegated scopes.
	pub fn delegated_scope(mut self, scope: ScopeSet) -> Self {
		self.delegated_scope = Some(scope);

		self
	}

	/// Overrides the application-only scopes.
	pub fn application_scope(mut self, scope: ScopeSet) -> Self {
		self.application_scope = Some(scope);

		self
	}

	/// Overrides the preferred client authentication method.
	pub fn client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth_method = method;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ProviderDescriptor, ConfigError> {
		let authority = match self.authority {
			Some(url) => url,
			None => Url::parse(DEFAULT_AUTHORITY)?,
		};
		let drive = match self.drive {
			Some(url) => url,
			None => Url::parse(DEFAULT_DRIVE_ROOT)?,
		};
		let delegated_scope = match self.delegated_scope {
			Some(scope) => scope,
			None => ScopeSet::parse(DEFAULT_DELEGATED_SCOPE)?,
		};
		let application_scope = match self.application_scope {
			Some(scope) => scope,
			None => ScopeSet::parse(DEFAULT_APPLICATION_SCOPE)?,
		};
		let descriptor = ProviderDescriptor {
			endpoints: ProviderEndpoints {
				authority: normalize_base("authority", authority)?,
				drive: normalize_base("drive", drive)?,
			},
			delegated_scope,
			application_scope,
			client_auth_method: self.client_auth_method,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

impl ProviderDescriptor {
	fn validate(&self) -> Result<(), ProviderDescriptorError> {
		validate_endpoint("authority", &self.endpoints.authority)?;
		validate_endpoint("drive", &self.endpoints.drive)?;

		if self.delegated_scope.is_empty() {
			return Err(ProviderDescriptorError::EmptyScope { grant: "delegated" });
		}
		if self.application_scope.is_empty() {
			return Err(ProviderDescriptorError::EmptyScope { grant: "application" });
		}

		Ok(())
	}
}

fn normalize_base(endpoint: &'static str, mut url: Url) -> Result<Url, ProviderDescriptorError> {
	if url.cannot_be_a_base() {
		return Err(ProviderDescriptorError::CannotBeABase { endpoint });
	}
	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());

		url.set_path(&path);
	}

	url.set_query(None);
	url.set_fragment(None);

	Ok(url)
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ProviderDescriptorError> {
	let loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));

	if url.scheme() == "https" || (url.scheme() == "http" && loopback) {
		Ok(())
	} else {
		Err(ProviderDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	}
}
