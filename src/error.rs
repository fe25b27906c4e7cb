//! Fetcher-level error types shared across flows, lookups, downloads, and stores.

// self
use crate::{
	_prelude::*,
	obs::{FlowKind, Stage},
	provider::{GrantType, ProviderErrorKind},
	validate::InvalidReason,
};

/// Fetcher-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical fetcher error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem; raised before any network call.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Identity provider or drive rejected the credentials.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Target file is absent at the expected location.
	#[error(transparent)]
	NotFound(#[from] NotFoundError),
	/// Transport failure (DNS, TCP, TLS, timeouts, unexpected statuses).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Downloaded bytes failed content sniffing.
	#[error(transparent)]
	Validation(#[from] ValidationError),
	/// Output artifact could not be written.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Every eligible strategy failed.
	#[error(transparent)]
	Exhausted(#[from] ExhaustedError),
}
impl Error {
	/// Returns `true` when the error should advance the run to the next strategy instead of
	/// aborting it.
	pub fn is_strategy_soft_failure(&self) -> bool {
		matches!(
			self,
			Self::Auth(_) | Self::NotFound(_) | Self::Transport(_) | Self::Validation(_)
		)
	}

	/// Returns `true` when a previously synced file may stand in for a failed run.
	///
	/// Configuration and storage failures are never tolerated: they would repeat on every run.
	pub fn is_stale_tolerable(&self) -> bool {
		!matches!(self, Self::Config(_) | Self::Storage(_))
	}
}

/// Configuration and validation failures detected before contacting any remote service.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// No download strategy has all of its prerequisites.
	#[error("No download strategy is eligible; missing variables: {}.", describe_missing(.missing))]
	NoEligibleStrategy {
		/// Missing environment variables grouped per strategy.
		missing: Vec<MissingRequirement>,
	},
	/// Variables required by a specific command are absent.
	#[error("Missing required variables: {}.", .missing.join(", "))]
	MissingVariables {
		/// Names of the absent variables.
		missing: Vec<&'static str>,
	},
	/// A variable is present but cannot be parsed.
	#[error("Variable {name} is invalid: {reason}.")]
	InvalidVariable {
		/// Variable name.
		name: &'static str,
		/// Parser-supplied reason.
		reason: String,
	},
	/// Provider descriptor failed validation.
	#[error(transparent)]
	InvalidDescriptor(#[from] crate::provider::ProviderDescriptorError),
	/// Endpoint URL could not be derived from the descriptor.
	#[error("Endpoint URL could not be built.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}
impl From<url::ParseError> for ConfigError {
	fn from(source: url::ParseError) -> Self {
		Self::InvalidEndpoint { source }
	}
}

/// Environment variables a strategy still needs before it becomes eligible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissingRequirement {
	/// Strategy lacking prerequisites.
	pub strategy: FlowKind,
	/// Absent variable names.
	pub variables: Vec<&'static str>,
}

/// Authentication and authorization failures.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// Token endpoint rejected the grant.
	#[error("Token endpoint rejected the {grant} grant ({kind}{}): {reason}.", status_suffix(.status))]
	TokenRejected {
		/// Grant that was attempted.
		grant: GrantType,
		/// Provider strategy classification.
		kind: ProviderErrorKind,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Provider description or truncated body preview.
		reason: String,
	},
	/// Token endpoint answered 200 without an access token.
	#[error("Token endpoint response for the {grant} grant did not include an access token.")]
	MissingAccessToken {
		/// Grant that was attempted.
		grant: GrantType,
	},
	/// Device-code flow completed without issuing a refresh token.
	#[error("No refresh token was issued; ensure the offline_access scope is granted.")]
	MissingRefreshToken,
	/// Drive API refused the bearer token.
	#[error("Drive denied access during {stage} (HTTP {status}): {body_preview}.")]
	AccessDenied {
		/// Stage that was refused.
		stage: Stage,
		/// HTTP status code (401 or 403).
		status: u16,
		/// Truncated response body.
		body_preview: String,
	},
	/// User did not complete the device-code sign-in before the code expired.
	#[error("Device code expired before the sign-in completed.")]
	DeviceCodeExpired,
	/// Device-code polling spent its attempt budget.
	#[error("Device-code sign-in did not complete within {attempts} polling attempts.")]
	DevicePollExhausted {
		/// Number of polling attempts performed.
		attempts: u32,
	},
}

/// Target file is absent.
#[derive(Debug, ThisError)]
#[error("File {name} was not found on the drive{}.", status_suffix(.status))]
pub struct NotFoundError {
	/// Target file name or item identifier.
	pub name: String,
	/// HTTP status code, when the absence was reported by status rather than an empty listing.
	pub status: Option<u16>,
}

/// Transport-level failures (network, IO, unexpected statuses).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred during {stage}.")]
	Network {
		/// Stage that failed.
		stage: Stage,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Request exceeded its timeout.
	#[error("Request timed out during {stage}.")]
	Timeout {
		/// Stage that timed out.
		stage: Stage,
	},
	/// Remote service answered with a status the stage cannot use.
	#[error("Unexpected HTTP {status} during {stage}: {body_preview}.")]
	UnexpectedStatus {
		/// Stage that failed.
		stage: Stage,
		/// HTTP status code.
		status: u16,
		/// Truncated response body.
		body_preview: String,
	},
	/// Response body could not be parsed.
	#[error("Malformed JSON response during {stage}.")]
	MalformedResponse {
		/// Stage that failed.
		stage: Stage,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(stage: Stage, src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { stage, source: Box::new(src) }
	}

	/// Classifies a reqwest failure raised during `stage`.
	pub fn from_reqwest(stage: Stage, e: ReqwestError) -> Self {
		if e.is_timeout() { Self::Timeout { stage } } else { Self::network(stage, e) }
	}
}

/// Downloaded payload did not look like a spreadsheet.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error(
	"Downloaded payload rejected: {reason} (content-type {}, {size} bytes, leading bytes {leading_bytes})",
	.content_type.as_deref().unwrap_or("<none>")
)]
pub struct ValidationError {
	/// Why the payload was rejected.
	pub reason: InvalidReason,
	/// Declared content type, if any.
	pub content_type: Option<String>,
	/// Payload size in bytes.
	pub size: usize,
	/// Hex rendering of the first bytes of the payload.
	pub leading_bytes: String,
}

/// Every eligible strategy failed; the previous output was left untouched.
#[derive(Debug, ThisError)]
#[error("All download strategies failed: {}.", describe_failures(.failures))]
pub struct ExhaustedError {
	/// Failures in the order the strategies were attempted.
	pub failures: Vec<AttemptFailure>,
}

/// One failed strategy attempt.
#[derive(Debug)]
pub struct AttemptFailure {
	/// Strategy that failed.
	pub strategy: FlowKind,
	/// Reason it failed.
	pub error: Error,
}

fn status_suffix(status: &Option<u16>) -> String {
	status.map(|code| format!(", HTTP {code}")).unwrap_or_default()
}

fn describe_missing(missing: &[MissingRequirement]) -> String {
	missing
		.iter()
		.map(|req| format!("{} [{}]", req.strategy, req.variables.join(", ")))
		.collect::<Vec<_>>()
		.join("; ")
}

fn describe_failures(failures: &[AttemptFailure]) -> String {
	failures
		.iter()
		.map(|failure| format!("{}: {}", failure.strategy, render_chain(&failure.error)))
		.collect::<Vec<_>>()
		.join("; ")
}

/// Renders `err` and every cause in its source chain as `outer: inner: root`, without trailing
/// periods so the result can be embedded in another sentence.
pub fn render_chain(err: &(dyn StdError + 'static)) -> String {
	let mut rendered = err.to_string().trim_end_matches('.').to_owned();
	let mut source = err.source();

	while let Some(cause) = source {
		let text = cause.to_string();
		let text = text.trim_end_matches('.');

		if !text.is_empty() && !rendered.contains(text) {
			rendered.push_str(": ");
			rendered.push_str(text);
		}

		source = cause.source();
	}

	rendered
}
