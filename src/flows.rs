//! Token acquisition flows powered by the `oauth2` facade and the device-code poller.

pub mod device_code;

mod client_credentials;
mod refresh;

pub use device_code::*;

// self
use crate::{
	_prelude::*,
	auth::{ClientId, TenantId, TokenSecret},
	error::ConfigError,
	http::{DEFAULT_REQUEST_TIMEOUT, ReqwestHttpClient},
	provider::{DefaultProviderStrategy, ProviderDescriptor, ProviderStrategy},
};

/// Client registration used by a single grant.
#[derive(Clone, Copy, Debug)]
pub struct ClientRegistration<'a> {
	/// Directory (tenant) the registration lives in.
	pub tenant: &'a TenantId,
	/// Application (client) identifier.
	pub client_id: &'a ClientId,
	/// Confidential client secret, when the registration has one.
	pub client_secret: Option<&'a TokenSecret>,
}

/// Acquires tokens against a single provider descriptor.
///
/// The broker owns the token transport, the descriptor, and the error-classification strategy
/// so individual flows only carry grant-specific logic. Nothing it issues is cached; every call
/// performs a fresh exchange.
#[derive(Clone)]
pub struct TokenBroker {
	/// HTTP client used for every token endpoint request.
	pub http_client: ReqwestHttpClient,
	/// Provider descriptor that defines endpoints and scopes.
	pub descriptor: ProviderDescriptor,
	/// Strategy classifying token endpoint failures.
	pub strategy: Arc<dyn ProviderStrategy>,
}
impl TokenBroker {
	/// Creates a broker with its own token transport and the default strategy.
	pub fn new(descriptor: ProviderDescriptor) -> Result<Self, ConfigError> {
		Ok(Self::with_http_client(descriptor, ReqwestHttpClient::new(DEFAULT_REQUEST_TIMEOUT)?))
	}

	/// Creates a broker that reuses the caller-provided transport.
	pub fn with_http_client(descriptor: ProviderDescriptor, http_client: ReqwestHttpClient) -> Self {
		Self { http_client, descriptor, strategy: Arc::new(DefaultProviderStrategy) }
	}

	/// Replaces the error-classification strategy.
	pub fn with_strategy(mut self, strategy: Arc<dyn ProviderStrategy>) -> Self {
		self.strategy = strategy;

		self
	}
}
impl Debug for TokenBroker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenBroker").field("descriptor", &self.descriptor).finish()
	}
}
