//! Provider strategy hooks that classify token endpoint failures.
//!
//! Implementations normalize error mapping without tying flows to any particular HTTP client.

// self
use crate::{_prelude::*, provider::GrantType};

/// Maximum number of characters kept from a response body in diagnostics.
pub const BODY_PREVIEW_LIMIT: usize = 256;

/// Strategy hook that allows providers to classify token endpoint errors.
///
/// Implementors are required to be `Send + Sync`, and the hook uses crate-owned data types so
/// downstream crates never depend on reqwest-specific structures.
pub trait ProviderStrategy: Send + Sync {
	/// Maps OAuth error fields and HTTP metadata into the fetcher taxonomy.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;
}

/// Canonical provider error categories used by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Provider rejected the grant (bad or expired refresh token, consent revoked).
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Requested scopes exceed what the registration allows.
	InsufficientScope,
	/// Any other rejection.
	Other,
}
impl ProviderErrorKind {
	/// Returns a stable label suitable for diagnostics.
	pub const fn as_str(self) -> &'static str {
		match self {
			ProviderErrorKind::InvalidGrant => "invalid_grant",
			ProviderErrorKind::InvalidClient => "invalid_client",
			ProviderErrorKind::InsufficientScope => "insufficient_scope",
			ProviderErrorKind::Other => "other",
		}
	}
}
impl Display for ProviderErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Context passed to provider strategies when classifying token errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Grant type associated with the failing request.
	pub grant_type: GrantType,
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of the response body for non-JSON payloads.
	pub body_preview: Option<String>,
}
impl ProviderErrorContext {
	/// Creates a new context scoped to the provided grant type.
	pub fn new(grant_type: GrantType) -> Self {
		Self {
			grant_type,
			http_status: None,
			oauth_error: None,
			error_description: None,
			body_preview: None,
		}
	}

	/// Adds an HTTP status code (e.g., 400, 401).
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string returned by the provider.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a body preview for providers that return non-JSON payloads.
	pub fn with_body_preview(mut self, body: impl AsRef<str>) -> Self {
		self.body_preview = Some(truncate_preview(body.as_ref()));

		self
	}

	/// Best human-readable reason: description, then error code, then body preview.
	pub fn reason(&self) -> String {
		self.error_description
			.as_deref()
			.or(self.oauth_error.as_deref())
			.or(self.body_preview.as_deref())
			.map(|value| value.trim().to_owned())
			.filter(|value| !value.is_empty())
			.unwrap_or_else(|| "no error details were returned".into())
	}
}

/// Default strategy that applies RFC-guided heuristics.
///
/// It prioritizes structured OAuth fields (`error`, `error_description`), then falls back to
/// body text hints, and finally the HTTP status code.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		ctx.oauth_error
			.as_deref()
			.and_then(match_exact_value)
			.or_else(|| classify_body(ctx.error_description.as_deref()))
			.or_else(|| classify_body(ctx.body_preview.as_deref()))
			.unwrap_or_else(|| classify_status(ctx.http_status))
	}
}

/// Truncates `body` to [`BODY_PREVIEW_LIMIT`] characters, appending `…` when cut.
pub fn truncate_preview(body: &str) -> String {
	let body = body.trim();

	if body.chars().count() <= BODY_PREVIEW_LIMIT {
		return body.to_owned();
	}

	let mut buf = body.chars().take(BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	buf
}

fn match_exact_value(value: &str) -> Option<ProviderErrorKind> {
	if value.eq_ignore_ascii_case("invalid_grant")
		|| value.eq_ignore_ascii_case("access_denied")
		|| value.eq_ignore_ascii_case("interaction_required")
	{
		Some(ProviderErrorKind::InvalidGrant)
	} else if value.eq_ignore_ascii_case("invalid_client")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(ProviderErrorKind::InvalidClient)
	} else if value.eq_ignore_ascii_case("invalid_scope")
		|| value.eq_ignore_ascii_case("insufficient_scope")
	{
		Some(ProviderErrorKind::InsufficientScope)
	} else {
		None
	}
}

fn classify_body(body: Option<&str>) -> Option<ProviderErrorKind> {
	let lowered = body?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") => Some(ProviderErrorKind::InvalidGrant),
		text if text.contains("invalid_client") => Some(ProviderErrorKind::InvalidClient),
		text if text.contains("insufficient_scope") || text.contains("invalid_scope") =>
			Some(ProviderErrorKind::InsufficientScope),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		Some(403) => ProviderErrorKind::InsufficientScope,
		_ => ProviderErrorKind::Other,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn prefers_oauth_error_fields() {
		let strategy = DefaultProviderStrategy;
		let ctx = ProviderErrorContext::new(GrantType::RefreshToken)
			.with_http_status(400)
			.with_oauth_error("invalid_client")
			.with_error_description("AADSTS7000215: Invalid client secret provided.");

		assert_eq!(strategy.classify_token_error(&ctx), ProviderErrorKind::InvalidClient);
		assert_eq!(ctx.reason(), "AADSTS7000215: Invalid client secret provided.");
	}

	#[test]
	fn falls_back_to_body_then_status() {
		let strategy = DefaultProviderStrategy;
		let body = ProviderErrorContext::new(GrantType::ClientCredentials)
			.with_http_status(500)
			.with_body_preview("{\"error\":\"invalid_scope\"}");
		let status = ProviderErrorContext::new(GrantType::ClientCredentials).with_http_status(401);
		let unknown = ProviderErrorContext::new(GrantType::DeviceCode).with_http_status(502);

		assert_eq!(strategy.classify_token_error(&body), ProviderErrorKind::InsufficientScope);
		assert_eq!(strategy.classify_token_error(&status), ProviderErrorKind::InvalidClient);
		assert_eq!(strategy.classify_token_error(&unknown), ProviderErrorKind::Other);
		assert_eq!(unknown.reason(), "no error details were returned");
	}

	#[test]
	fn previews_are_truncated() {
		let long = "x".repeat(BODY_PREVIEW_LIMIT + 10);
		let preview = truncate_preview(&long);

		assert_eq!(preview.chars().count(), BODY_PREVIEW_LIMIT + 1);
		assert!(preview.ends_with('…'));
		assert_eq!(truncate_preview("  short  "), "short");
	}
}
