//! Anonymous downloads through a pre-authenticated share link.

// self
use crate::{
	_prelude::*,
	drive,
	error::TransportError,
	http::{ContentHttpClient, GetOptions},
	obs::{self, FlowKind, FlowOutcome, FlowSpan, Stage, trace_debug, trace_warn},
	validate::DownloadOutcome,
};

/// Desktop browser `User-Agent`; share hosts serve interstitial pages to unknown agents.
pub const BROWSER_USER_AGENT: &str =
	"Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Rewrites `link` so the host serves raw bytes: any `download` parameter is replaced by
/// `download=1`, placed first, and every other parameter is kept in order.
pub fn coerce_download_link(link: &Url) -> Url {
	let kept = link
		.query_pairs()
		.filter(|(key, _)| key != "download")
		.map(|(key, value)| (key.into_owned(), value.into_owned()))
		.collect::<Vec<_>>();
	let mut coerced = link.clone();

	coerced.set_query(None);

	{
		let mut pairs = coerced.query_pairs_mut();

		pairs.append_pair("download", "1");

		for (key, value) in &kept {
			pairs.append_pair(key, value);
		}
	}

	coerced
}

/// Download candidates in attempt order: the coerced link, then the raw link when it differs.
pub fn candidates(link: &Url) -> Vec<Url> {
	let coerced = coerce_download_link(link);

	if coerced == *link { vec![coerced] } else { vec![coerced, link.clone()] }
}

/// Downloads spreadsheets from share links without an `Authorization` header.
#[derive(Clone, Debug)]
pub struct ShareLinkDownloader {
	http_client: ContentHttpClient,
}
impl ShareLinkDownloader {
	/// Wraps the content transport.
	pub fn new(http_client: ContentHttpClient) -> Self {
		Self { http_client }
	}

	/// Tries every candidate of `link`; the first payload that validates wins, otherwise the
	/// last failure is returned.
	pub async fn download(&self, link: &Url) -> Result<DownloadOutcome> {
		const KIND: FlowKind = FlowKind::ShareLink;

		let span = FlowSpan::new(KIND, "share_link_download");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.try_candidates(link)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn try_candidates(&self, link: &Url) -> Result<DownloadOutcome> {
		let options = GetOptions { bearer: None, user_agent: Some(BROWSER_USER_AGENT) };
		let mut last_error = None;

		for candidate in candidates(link) {
			trace_debug!(host = candidate.host_str().unwrap_or_default(), "Trying share-link candidate.");

			let attempt = async {
				let payload = self.http_client.get(candidate, options, Stage::Download).await?;

				drive::ensure_success(&payload, Stage::Download, "share link")?;

				Ok::<_, Error>(DownloadOutcome::inspect(payload).into_valid()?)
			};

			match attempt.await {
				Ok(outcome) => return Ok(outcome),
				Err(e) => {
					trace_warn!(
						error = %crate::error::render_chain(&e),
						"Share-link candidate failed."
					);

					last_error = Some(e);
				},
			}
		}

		// `candidates` always yields at least one URL.
		Err(last_error.unwrap_or_else(|| {
			TransportError::network(
				Stage::Download,
				std::io::Error::other("share link produced no download candidates"),
			)
			.into()
		}))
	}
}
