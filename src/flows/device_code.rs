//! Device Authorization grant (RFC 8628) used to mint the long-lived refresh token.
//!
//! [`TokenBroker::start_device_authorization`] requests a user code, then
//! [`TokenBroker::complete_device_authorization`] polls the token endpoint through an explicit
//! [`DevicePollState`] machine bounded by a [`DevicePoller`] attempt budget.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::{TokenResult, TokenSecret},
	error::{AuthError, TransportError},
	flows::{ClientRegistration, TokenBroker},
	http::HttpPayload,
	obs::{self, FlowKind, FlowOutcome, FlowSpan, Stage, trace_debug, trace_info, trace_warn},
	provider::{GrantType, ProviderErrorContext},
};

/// Default pause between polling attempts.
pub const DEFAULT_POLL_INTERVAL: StdDuration = StdDuration::from_secs(5);
/// Default number of polling attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
/// Extra pause added to the interval every time the provider answers `slow_down` (RFC 8628 §3.5).
pub const SLOW_DOWN_INCREMENT: StdDuration = StdDuration::from_secs(5);

/// Device authorization response returned by the `devicecode` endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct DeviceAuthorization {
	/// Opaque code exchanged during polling.
	pub device_code: String,
	/// Short code the operator types at the verification URI.
	pub user_code: String,
	/// Page where the operator signs in.
	pub verification_uri: String,
	/// Seconds until the codes expire.
	pub expires_in: u64,
	/// Minimum polling interval suggested by the provider, in seconds.
	#[serde(default)]
	pub interval: Option<u64>,
	/// Human-readable instructions.
	#[serde(default)]
	pub message: Option<String>,
}

/// Result of a single polling attempt.
#[derive(Debug)]
pub enum DevicePollState {
	/// The operator has not finished signing in yet.
	Pending {
		/// One-based attempt number that observed the pending state.
		attempt: u32,
	},
	/// The provider asked for a longer pause between polls.
	SlowDown {
		/// One-based attempt number that observed the request.
		attempt: u32,
	},
	/// The provider issued tokens.
	Succeeded(TokenResult),
	/// The device code expired.
	Expired,
	/// The provider or transport failed in a way polling cannot recover from.
	Failed(Error),
}

/// Bounded polling schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DevicePoller {
	/// Initial pause after every pending attempt; grows with each `slow_down` answer.
	pub interval: StdDuration,
	/// Maximum number of polling requests.
	pub max_attempts: u32,
}
impl DevicePoller {
	/// Creates a poller; a zero budget is raised to one attempt.
	pub fn new(interval: StdDuration, max_attempts: u32) -> Self {
		Self { interval, max_attempts: max_attempts.max(1) }
	}

	/// Drives `step` until it leaves the pending state or the budget runs out.
	pub async fn run<F, Fut>(&self, mut step: F) -> Result<TokenResult>
	where
		F: FnMut(u32) -> Fut,
		Fut: Future<Output = DevicePollState>,
	{
		let mut interval = self.interval;

		for attempt in 1..=self.max_attempts {
			match step(attempt).await {
				DevicePollState::Pending { .. } => {
					trace_debug!(attempt, max_attempts = self.max_attempts, "Waiting for sign-in.");
				},
				DevicePollState::SlowDown { .. } => {
					interval += SLOW_DOWN_INCREMENT;

					trace_debug!(
						attempt,
						interval_secs = interval.as_secs(),
						"Provider asked to slow down polling."
					);
				},
				DevicePollState::Succeeded(token) => return Ok(token),
				DevicePollState::Expired => return Err(AuthError::DeviceCodeExpired.into()),
				DevicePollState::Failed(e) => return Err(e),
			}

			if attempt < self.max_attempts {
				tokio::time::sleep(interval).await;
			}
		}

		Err(AuthError::DevicePollExhausted { attempts: self.max_attempts }.into())
	}
}
impl Default for DevicePoller {
	fn default() -> Self {
		Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_MAX_ATTEMPTS)
	}
}

#[derive(Debug, Deserialize)]
struct DeviceTokenResponse {
	#[serde(default)]
	access_token: Option<String>,
	#[serde(default)]
	refresh_token: Option<String>,
	#[serde(default)]
	expires_in: Option<i64>,
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	error_description: Option<String>,
}

impl TokenBroker {
	/// Requests a device code and user code for the delegated scopes.
	pub async fn start_device_authorization(
		&self,
		registration: ClientRegistration<'_>,
	) -> Result<DeviceAuthorization> {
		let url = self.descriptor.device_code_endpoint(registration.tenant)?;
		let scope = self.descriptor.delegated_scope.join(' ');
		let form = [("client_id", registration.client_id.as_ref()), ("scope", scope.as_str())];
		let payload = self.http_client.post_form(url, &form, Stage::DeviceAuthorization).await?;

		if !payload.is_success() {
			return Err(self.rejection(GrantType::DeviceCode, &payload));
		}

		let authorization = payload.json::<DeviceAuthorization>(Stage::DeviceAuthorization)?;

		trace_info!(
			verification_uri = %authorization.verification_uri,
			user_code = %authorization.user_code,
			expires_in = authorization.expires_in,
			"Device code issued."
		);

		Ok(authorization)
	}

	/// Polls the token endpoint until the operator signs in, the code expires, or `poller`
	/// runs out of attempts. A refresh token is required on success.
	pub async fn complete_device_authorization(
		&self,
		registration: ClientRegistration<'_>,
		authorization: &DeviceAuthorization,
		poller: DevicePoller,
	) -> Result<TokenResult> {
		const KIND: FlowKind = FlowKind::DeviceCode;

		let span = FlowSpan::new(KIND, "complete_device_authorization");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let token = poller
					.run(|attempt| self.poll_device_token(registration, &authorization.device_code, attempt))
					.await?;

				if token.refresh_token.is_none() {
					return Err(AuthError::MissingRefreshToken.into());
				}

				Ok(token)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Performs one polling request and classifies the answer.
	pub async fn poll_device_token(
		&self,
		registration: ClientRegistration<'_>,
		device_code: &str,
		attempt: u32,
	) -> DevicePollState {
		let url = match self.descriptor.token_endpoint(registration.tenant) {
			Ok(url) => url,
			Err(e) => return DevicePollState::Failed(e.into()),
		};
		let mut form = vec![
			("client_id", registration.client_id.as_ref()),
			("grant_type", GrantType::DeviceCode.as_str()),
			("device_code", device_code),
		];

		if let Some(secret) = registration.client_secret.map(TokenSecret::expose) {
			form.push(("client_secret", secret));
		}

		let payload = match self.http_client.post_form(url, &form, Stage::TokenExchange).await {
			Ok(payload) => payload,
			Err(Error::Transport(TransportError::Timeout { .. })) => {
				trace_warn!(attempt, "Device token poll timed out; retrying.");

				return DevicePollState::Pending { attempt };
			},
			Err(e) => return DevicePollState::Failed(e),
		};
		let response = match payload.json::<DeviceTokenResponse>(Stage::TokenExchange) {
			Ok(response) => response,
			Err(_) if !payload.is_success() =>
				return DevicePollState::Failed(self.rejection(GrantType::DeviceCode, &payload)),
			Err(e) => return DevicePollState::Failed(e),
		};

		if payload.is_success() {
			return match response.access_token {
				Some(access) => {
					let mut token = TokenResult::new(access);

					if let Some(refresh) = response.refresh_token {
						token = token.with_refresh_token(refresh);
					}
					if let Some(expires_in) = response.expires_in {
						token = token.with_expires_in(Duration::seconds(expires_in));
					}

					DevicePollState::Succeeded(token)
				},
				None => DevicePollState::Failed(
					AuthError::MissingAccessToken { grant: GrantType::DeviceCode }.into(),
				),
			};
		}

		match response.error.as_deref() {
			Some("authorization_pending") => DevicePollState::Pending { attempt },
			Some("slow_down") => DevicePollState::SlowDown { attempt },
			Some("expired_token") => DevicePollState::Expired,
			_ => {
				let mut ctx =
					ProviderErrorContext::new(GrantType::DeviceCode).with_http_status(payload.status);

				if let Some(error) = response.error {
					ctx = ctx.with_oauth_error(error);
				}
				if let Some(description) = response.error_description {
					ctx = ctx.with_error_description(description);
				}

				DevicePollState::Failed(self.classify(ctx))
			},
		}
	}

	fn rejection(&self, grant: GrantType, payload: &HttpPayload) -> Error {
		let mut ctx = ProviderErrorContext::new(grant)
			.with_http_status(payload.status)
			.with_body_preview(payload.body_preview());

		if let Ok(response) = payload.json::<DeviceTokenResponse>(Stage::DeviceAuthorization) {
			if let Some(error) = response.error {
				ctx = ctx.with_oauth_error(error);
			}
			if let Some(description) = response.error_description {
				ctx = ctx.with_error_description(description);
			}
		}

		self.classify(ctx)
	}

	fn classify(&self, ctx: ProviderErrorContext) -> Error {
		AuthError::TokenRejected {
			grant: ctx.grant_type,
			kind: self.strategy.classify_token_error(&ctx),
			status: ctx.http_status,
			reason: ctx.reason(),
		}
		.into()
	}
}
