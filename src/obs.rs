//! Optional observability helpers for fetcher strategies.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `drive_sheet_fetcher.flow` with the `flow`
//!   (strategy) and `stage` (call site) fields.
//! - Enable `metrics` to increment the `drive_sheet_fetcher_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Strategies and flows observed by the fetcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Delegated refresh-token flow.
	RefreshToken,
	/// Application-only client-credentials flow.
	ClientCredentials,
	/// Anonymous pre-authenticated share link.
	ShareLink,
	/// Interactive device-code setup flow.
	DeviceCode,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::RefreshToken => "refresh_token",
			FlowKind::ClientCredentials => "client_credentials",
			FlowKind::ShareLink => "share_link",
			FlowKind::DeviceCode => "device_code",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a strategy.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Network stage a request belongs to; carried by transport and auth errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
	/// Token endpoint exchange.
	TokenExchange,
	/// Device authorization request.
	DeviceAuthorization,
	/// Drive item lookup.
	Lookup,
	/// Content download.
	Download,
}
impl Stage {
	/// Returns a stable label suitable for span fields and messages.
	pub const fn as_str(self) -> &'static str {
		match self {
			Stage::TokenExchange => "token exchange",
			Stage::DeviceAuthorization => "device authorization",
			Stage::Lookup => "lookup",
			Stage::Download => "download",
		}
	}
}
impl Display for Stage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
