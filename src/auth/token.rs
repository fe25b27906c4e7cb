//! Transient token results produced by a successful grant.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Bearer token issued by the identity provider.
///
/// Results live for a single run. The core never writes them to disk; callers that want to keep
/// a rotated refresh token read it through [`TokenResult::rotated_refresh_token`].
#[derive(Clone)]
pub struct TokenResult {
	/// Access token placed in `Authorization: Bearer` headers.
	pub access_token: TokenSecret,
	/// Refresh token returned alongside the access token, if any.
	pub refresh_token: Option<TokenSecret>,
	/// Instant the response was received.
	pub issued_at: OffsetDateTime,
	/// Provider-supplied lifetime hint.
	pub expires_in: Option<Duration>,
}
impl TokenResult {
	/// Creates a result stamped with the current clock.
	pub fn new(access_token: impl Into<String>) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: None,
			issued_at: OffsetDateTime::now_utc(),
			expires_in: None,
		}
	}

	/// Attaches a refresh token.
	pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Attaches an expiry hint; non-positive values are ignored.
	pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
		self.expires_in = expires_in.is_positive().then_some(expires_in);

		self
	}

	/// Absolute expiry derived from the hint, if one was supplied.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.expires_in.map(|expires_in| self.issued_at + expires_in)
	}

	/// Returns the refresh token when it differs from `previous`.
	pub fn rotated_refresh_token(&self, previous: &TokenSecret) -> Option<&TokenSecret> {
		self.refresh_token.as_ref().filter(|token| *token != previous)
	}

	/// Formats the `Authorization` header value.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.access_token.expose())
	}
}
impl Debug for TokenResult {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenResult")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("issued_at", &self.issued_at)
			.field("expires_in", &self.expires_in)
			.finish()
	}
}
