//! Layered content sniffing that decides whether downloaded bytes are a spreadsheet.
//!
//! Checks run from strongest to weakest evidence: file signatures, HTML markers, the declared
//! content type, and finally payload size. The first check that reaches a conclusion wins.

// self
use crate::{_prelude::*, error::ValidationError, http::HttpPayload};

/// ZIP local-file header; every `.xlsx` starts with it.
pub const XLSX_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
/// OLE2 compound-document header used by legacy `.xls` files.
pub const XLS_SIGNATURE: [u8; 4] = [0xD0, 0xCF, 0x11, 0xE0];
/// Number of leading bytes scanned for HTML markers.
pub const HTML_SCAN_LIMIT: usize = 1_000;
/// Payloads at least this large pass the size heuristic.
pub const MIN_UNTYPED_SIZE: usize = 10_000;
/// Number of leading bytes rendered in diagnostics.
pub const LEADING_BYTES: usize = 16;

/// How strongly the evidence supports a valid verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
	/// Only the size heuristic passed.
	Low,
	/// The declared content type names a spreadsheet.
	Medium,
	/// A file signature matched.
	High,
}

/// Spreadsheet container inferred from the evidence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpreadsheetFormat {
	/// Office Open XML workbook.
	Xlsx,
	/// Legacy binary workbook.
	Xls,
	/// Container could not be determined.
	Unknown,
}

/// Reason a payload was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidReason {
	/// The payload is an HTML page (login wall, preview page, error page).
	HtmlDetected,
	/// The payload is too small and carries no other evidence.
	TooSmall,
	/// The declared content type is textual or JSON.
	UnexpectedContentType,
}
impl Display for InvalidReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(match self {
			InvalidReason::HtmlDetected => "HTML response detected.",
			InvalidReason::TooSmall => "payload too small.",
			InvalidReason::UnexpectedContentType => "unexpected content type.",
		})
	}
}

/// Outcome of [`inspect`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
	/// The payload is plausibly a spreadsheet.
	Valid {
		/// Strength of the evidence.
		confidence: Confidence,
		/// Inferred container.
		format: SpreadsheetFormat,
	},
	/// The payload must not be persisted.
	Invalid(InvalidReason),
}
impl Verdict {
	/// Returns `true` for [`Verdict::Valid`].
	pub fn is_valid(&self) -> bool {
		matches!(self, Verdict::Valid { .. })
	}
}

/// Bytes received from a download together with their verdict.
#[derive(Clone, Debug)]
pub struct DownloadOutcome {
	/// Raw body.
	pub payload: Vec<u8>,
	/// Declared `Content-Type`, if any.
	pub content_type: Option<String>,
	/// Result of content sniffing.
	pub verdict: Verdict,
	/// URL the bytes were served from.
	pub source: Url,
}
impl DownloadOutcome {
	/// Sniffs a buffered response.
	pub fn inspect(response: HttpPayload) -> Self {
		let verdict = inspect(&response.body, response.content_type.as_deref());

		Self {
			payload: response.body,
			content_type: response.content_type,
			verdict,
			source: response.final_url,
		}
	}

	/// Returns the outcome when valid; otherwise describes the rejected payload.
	pub fn into_valid(self) -> Result<Self, ValidationError> {
		match self.verdict {
			Verdict::Valid { .. } => Ok(self),
			Verdict::Invalid(reason) => Err(ValidationError {
				reason,
				content_type: self.content_type,
				size: self.payload.len(),
				leading_bytes: leading_bytes_hex(&self.payload),
			}),
		}
	}
}

/// Classifies `payload` using the declared `content_type` as supporting evidence.
pub fn inspect(payload: &[u8], content_type: Option<&str>) -> Verdict {
	if payload.starts_with(&XLSX_SIGNATURE) {
		return Verdict::Valid { confidence: Confidence::High, format: SpreadsheetFormat::Xlsx };
	}
	if payload.starts_with(&XLS_SIGNATURE) {
		return Verdict::Valid { confidence: Confidence::High, format: SpreadsheetFormat::Xls };
	}

	let content_type = content_type.map(str::to_ascii_lowercase);
	let content_type = content_type.as_deref().unwrap_or_default();

	if content_type.contains("text/html") || contains_html_marker(payload) {
		return Verdict::Invalid(InvalidReason::HtmlDetected);
	}
	if !payload.is_empty() {
		if content_type.contains("openxmlformats") || content_type.contains("spreadsheet") {
			return Verdict::Valid { confidence: Confidence::Medium, format: SpreadsheetFormat::Xlsx };
		}
		if content_type.contains("ms-excel") {
			return Verdict::Valid { confidence: Confidence::Medium, format: SpreadsheetFormat::Xls };
		}
	}
	if content_type.starts_with("text/") || content_type.contains("json") {
		return Verdict::Invalid(InvalidReason::UnexpectedContentType);
	}
	if payload.len() >= MIN_UNTYPED_SIZE {
		return Verdict::Valid { confidence: Confidence::Low, format: SpreadsheetFormat::Unknown };
	}

	Verdict::Invalid(InvalidReason::TooSmall)
}

/// Renders up to [`LEADING_BYTES`] bytes as space-separated uppercase hex.
pub fn leading_bytes_hex(payload: &[u8]) -> String {
	payload
		.iter()
		.take(LEADING_BYTES)
		.map(|byte| format!("{byte:02X}"))
		.collect::<Vec<_>>()
		.join(" ")
}

fn contains_html_marker(payload: &[u8]) -> bool {
	let head = payload[..payload.len().min(HTML_SCAN_LIMIT)].to_ascii_lowercase();

	[b"<html".as_slice(), b"<!doctype".as_slice()]
		.iter()
		.any(|marker| head.windows(marker.len()).any(|window| window == *marker))
}
