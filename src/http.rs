//! Transport primitives for token exchanges and content requests.
//!
//! Two reqwest clients back the fetcher. [`ReqwestHttpClient`] carries token exchanges for the
//! `oauth2` facade: it never follows redirects and records the status of the most recent
//! response in a [`ResponseMetadataSlot`] so failures can be classified with consistent
//! metadata. [`ContentHttpClient`] carries drive lookups and downloads: it follows redirects
//! and uses the longer timeout multi-megabyte payloads need.

// std
use std::{ops::Deref, time::Duration as StdDuration};
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
use reqwest::{
	header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
	redirect::Policy,
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
	obs::Stage,
	provider::truncate_preview,
};

/// Default timeout for token exchanges and lookups.
pub const DEFAULT_REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(10);
/// Default timeout for content downloads.
pub const DEFAULT_DOWNLOAD_TIMEOUT: StdDuration = StdDuration::from_secs(30);
/// Redirect hops followed by content requests.
pub const MAX_REDIRECTS: usize = 10;

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the token endpoint, if available.
	pub status: Option<u16>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Thin wrapper around [`ReqwestClient`] used for token endpoint calls.
///
/// Token requests should not follow redirects, matching OAuth 2.0 guidance that token endpoints
/// return results directly instead of delegating to another URI. Configure any custom
/// [`ReqwestClient`] passed to [`ReqwestHttpClient::with_client`] the same way.
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient(pub ReqwestClient);
impl ReqwestHttpClient {
	/// Builds a token client with redirects disabled and the provided timeout.
	pub fn new(timeout: StdDuration) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().redirect(Policy::none()).timeout(timeout).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Issues a form POST outside the `oauth2` facade and buffers the whole body.
	pub async fn post_form(
		&self,
		url: Url,
		form: &[(&str, &str)],
		stage: Stage,
	) -> Result<HttpPayload> {
		HttpPayload::read(self.0.post(url).form(form).send().await, stage).await
	}

	/// Builds an instrumented handle that records outcomes in `slot`.
	pub fn with_metadata(&self, slot: ResponseMetadataSlot) -> InstrumentedHandle {
		InstrumentedHandle { client: self.0.clone(), slot }
	}
}
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

/// [`AsyncHttpClient`] adapter that captures response metadata for the `oauth2` facade.
#[derive(Clone, Debug)]
pub struct InstrumentedHandle {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.slot.take();

			let response = self
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();

			self.slot.store(ResponseMetadata { status: Some(status.as_u16()) });

			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

/// Reqwest client used for drive lookups and content downloads.
#[derive(Clone, Debug)]
pub struct ContentHttpClient(pub ReqwestClient);
impl ContentHttpClient {
	/// Builds a content client following up to [`MAX_REDIRECTS`] redirects.
	pub fn new(timeout: StdDuration) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.redirect(Policy::limited(MAX_REDIRECTS))
			.timeout(timeout)
			.build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Issues a GET and buffers the whole body.
	pub async fn get(&self, url: Url, options: GetOptions<'_>, stage: Stage) -> Result<HttpPayload> {
		let mut request = self.0.get(url);

		if let Some(bearer) = options.bearer {
			request = request.header(AUTHORIZATION, bearer);
		}
		if let Some(agent) = options.user_agent {
			request = request.header(USER_AGENT, agent);
		}

		HttpPayload::read(request.send().await, stage).await
	}
}
impl Deref for ContentHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

/// Per-request options for [`ContentHttpClient::get`].
#[derive(Clone, Copy, Debug, Default)]
pub struct GetOptions<'a> {
	/// Full `Authorization` header value (`Bearer …`).
	pub bearer: Option<&'a str>,
	/// `User-Agent` override.
	pub user_agent: Option<&'a str>,
}

/// Fully buffered HTTP response.
#[derive(Clone, Debug)]
pub struct HttpPayload {
	/// Response status code.
	pub status: u16,
	/// Declared `Content-Type`, if any.
	pub content_type: Option<String>,
	/// URL the response was served from after redirects.
	pub final_url: Url,
	/// Raw body.
	pub body: Vec<u8>,
}
impl HttpPayload {
	async fn read(sent: Result<reqwest::Response, ReqwestError>, stage: Stage) -> Result<Self> {
		let response = sent.map_err(|e| TransportError::from_reqwest(stage, e))?;
		let status = response.status().as_u16();
		let final_url = response.url().clone();
		let content_type = response
			.headers()
			.get(CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.map(str::to_owned);
		let body = response
			.bytes()
			.await
			.map_err(|e| TransportError::from_reqwest(stage, e))?
			.to_vec();

		Ok(Self { status, content_type, final_url, body })
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Lossy, truncated rendering of the body for diagnostics.
	pub fn body_preview(&self) -> String {
		truncate_preview(&String::from_utf8_lossy(&self.body))
	}

	/// Deserializes the body as JSON, reporting the failing path on error.
	pub fn json<T>(&self, stage: Stage) -> Result<T>
	where
		T: DeserializeOwned,
	{
		parse_json(&self.body, stage)
	}
}

/// Deserializes `bytes` as JSON, reporting the failing path on error.
pub fn parse_json<T>(bytes: &[u8], stage: Stage) -> Result<T>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(bytes);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| TransportError::MalformedResponse { stage, source }.into())
}
