//! Internal OAuth client facade over the `oauth2` crate.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, ClientId as OAuthClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{ClientId, ScopeSet, TenantId, TokenResult, TokenSecret},
	error::{AuthError, ConfigError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot},
	obs::Stage,
	provider::{ClientAuthMethod, GrantType, ProviderDescriptor, ProviderErrorContext, ProviderStrategy},
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Token endpoint facade bound to one tenant and client registration.
pub(crate) struct BasicFacade {
	oauth_client: ConfiguredBasicClient,
	http_client: ReqwestHttpClient,
}
impl BasicFacade {
	pub(crate) fn from_descriptor(
		descriptor: &ProviderDescriptor,
		tenant: &TenantId,
		client_id: &ClientId,
		client_secret: Option<&TokenSecret>,
		http_client: ReqwestHttpClient,
	) -> Result<Self> {
		let token_url = TokenUrl::from_url(descriptor.token_endpoint(tenant)?);
		let mut oauth_client =
			BasicClient::new(OAuthClientId::new(client_id.to_string())).set_token_uri(token_url);

		if let Some(secret) = client_secret {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.expose().to_owned()));
		}
		if matches!(descriptor.client_auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { oauth_client, http_client })
	}

	pub(crate) async fn exchange_client_credentials(
		&self,
		strategy: &dyn ProviderStrategy,
		scope: &ScopeSet,
	) -> Result<TokenResult> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let mut request = self.oauth_client.exchange_client_credentials();

		for value in scope.iter() {
			request = request.add_scope(Scope::new(value.to_owned()));
		}

		match request.request_async(&instrumented).await {
			Ok(response) => Ok(map_token_response(response)),
			Err(err) => settle_request_error(strategy, GrantType::ClientCredentials, meta.take(), err),
		}
	}

	pub(crate) async fn refresh_token(
		&self,
		strategy: &dyn ProviderStrategy,
		refresh_token: &TokenSecret,
		scope: &ScopeSet,
	) -> Result<TokenResult> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let refresh_secret = RefreshToken::new(refresh_token.expose().to_owned());
		let mut request = self.oauth_client.exchange_refresh_token(&refresh_secret);

		for value in scope.iter() {
			request = request.add_scope(Scope::new(value.to_owned()));
		}

		match request.request_async(&instrumented).await {
			Ok(response) => Ok(map_token_response(response)),
			Err(err) => settle_request_error(strategy, GrantType::RefreshToken, meta.take(), err),
		}
	}
}

fn map_token_response(response: BasicTokenResponse) -> TokenResult {
	let mut token = TokenResult::new(response.access_token().secret().to_owned());

	if let Some(refresh) = response.refresh_token() {
		token = token.with_refresh_token(refresh.secret().to_owned());
	}
	if let Some(expires_in) = response.expires_in() {
		let seconds = i64::try_from(expires_in.as_secs()).unwrap_or(i64::MAX);

		token = token.with_expires_in(Duration::seconds(seconds));
	}

	token
}

/// Token fields read when the provider omits `token_type` from an otherwise valid answer.
#[derive(Debug, Deserialize)]
struct LenientTokenResponse {
	access_token: String,
	#[serde(default)]
	refresh_token: Option<String>,
	#[serde(default)]
	expires_in: Option<i64>,
}

fn settle_request_error(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<ReqwestError>>,
) -> Result<TokenResult> {
	match recover_token(meta.as_ref(), &err) {
		Some(token) => Ok(token),
		None => Err(map_request_error(strategy, grant, meta, err)),
	}
}

fn recover_token(
	meta: Option<&ResponseMetadata>,
	err: &BasicRequestTokenError<HttpClientError<ReqwestError>>,
) -> Option<TokenResult> {
	let RequestTokenError::Parse(_, body) = err else {
		return None;
	};

	if !meta.and_then(|value| value.status).is_some_and(|code| (200..300).contains(&code)) {
		return None;
	}

	let raw = serde_json::from_slice::<LenientTokenResponse>(body).ok()?;
	let mut token = TokenResult::new(raw.access_token);

	if let Some(refresh) = raw.refresh_token {
		token = token.with_refresh_token(refresh);
	}
	if let Some(expires_in) = raw.expires_in {
		token = token.with_expires_in(Duration::seconds(expires_in));
	}

	Some(token)
}

fn map_request_error(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<ReqwestError>>,
) -> Error {
	let status = meta.and_then(|value| value.status);

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(strategy, grant, status, response),
		RequestTokenError::Request(error) => map_transport_error(error),
		RequestTokenError::Parse(source, body) => map_parse_error(strategy, grant, status, source, &body),
		RequestTokenError::Other(message) => {
			let mut ctx = ProviderErrorContext::new(grant).with_body_preview(message);

			if let Some(status) = status {
				ctx = ctx.with_http_status(status);
			}

			rejected(strategy, ctx)
		},
	}
}

fn map_server_response_error(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	status: Option<u16>,
	response: BasicErrorResponse,
) -> Error {
	let mut ctx =
		ProviderErrorContext::new(grant).with_oauth_error(response.error().as_ref().to_string());

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(description.clone());
	}
	if let Some(status) = status {
		ctx = ctx.with_http_status(status);
	}

	rejected(strategy, ctx)
}

fn map_parse_error(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	status: Option<u16>,
	source: serde_path_to_error::Error<serde_json::Error>,
	body: &[u8],
) -> Error {
	match status {
		Some(code) if !(200..300).contains(&code) => {
			let ctx = ProviderErrorContext::new(grant)
				.with_http_status(code)
				.with_body_preview(String::from_utf8_lossy(body));

			rejected(strategy, ctx)
		},
		_ if is_object_without_access_token(body) => AuthError::MissingAccessToken { grant }.into(),
		_ => TransportError::MalformedResponse { stage: Stage::TokenExchange, source }.into(),
	}
}

fn map_transport_error(err: HttpClientError<ReqwestError>) -> Error {
	match err {
		HttpClientError::Reqwest(inner) => TransportError::from_reqwest(Stage::TokenExchange, *inner).into(),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::Io(inner).into(),
		HttpClientError::Other(message) =>
			TransportError::network(Stage::TokenExchange, std::io::Error::other(message)).into(),
		_ => TransportError::network(
			Stage::TokenExchange,
			std::io::Error::other("HTTP client error occurred while calling the token endpoint"),
		)
		.into(),
	}
}

fn rejected(strategy: &dyn ProviderStrategy, ctx: ProviderErrorContext) -> Error {
	AuthError::TokenRejected {
		grant: ctx.grant_type,
		kind: strategy.classify_token_error(&ctx),
		status: ctx.http_status,
		reason: ctx.reason(),
	}
	.into()
}

fn is_object_without_access_token(body: &[u8]) -> bool {
	serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(body)
		.map(|object| !object.contains_key("access_token"))
		.unwrap_or(false)
}
