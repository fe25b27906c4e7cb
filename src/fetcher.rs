//! Strategy selection and the sequential fetch run.
//!
//! [`StrategyPlan::select`] turns a [`CredentialSet`] into the ordered list of strategies whose
//! prerequisites are present. [`Fetcher::run`] walks that list once: acquire a token, locate
//! the file, download it, sniff the bytes, and persist the first valid payload. Soft failures
//! advance to the next strategy; storage failures abort the run.

// std
use std::path::PathBuf;
// self
use crate::{
	_prelude::*,
	auth::{ClientId, TenantId, TokenResult, TokenSecret},
	config::{CredentialSet, DEFAULT_OUTPUT_DIR, EnvVar, FetchConfig, TargetFile},
	drive::{DriveClient, LookupMode},
	error::{AttemptFailure, ConfigError, ExhaustedError, MissingRequirement},
	flows::{ClientRegistration, TokenBroker},
	http::{ContentHttpClient, DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, ReqwestHttpClient},
	obs::{FlowKind, FlowSpan, trace_info, trace_warn},
	provider::{DefaultProviderStrategy, ProviderDescriptor, ProviderStrategy},
	share::ShareLinkDownloader,
	store::{ArtifactStore, FileArtifactStore},
	validate::{DownloadOutcome, Verdict},
};

/// One eligible way of obtaining the spreadsheet, borrowing the credentials it needs.
#[derive(Clone, Copy, Debug)]
pub enum Strategy<'a> {
	/// Delegated refresh-token grant followed by a path lookup.
	RefreshToken {
		/// Client registration; the secret is attached when configured.
		registration: ClientRegistration<'a>,
		/// Long-lived delegated refresh token.
		refresh_token: &'a TokenSecret,
	},
	/// Application-only client-credentials grant followed by a children filter lookup.
	ClientCredentials {
		/// Directory (tenant) identifier.
		tenant: &'a TenantId,
		/// Application (client) identifier.
		client_id: &'a ClientId,
		/// Confidential client secret.
		client_secret: &'a TokenSecret,
	},
	/// Anonymous download through a share link.
	ShareLink {
		/// Pre-authenticated link.
		link: &'a Url,
	},
}
impl Strategy<'_> {
	/// Observability label of the strategy.
	pub fn kind(&self) -> FlowKind {
		match self {
			Strategy::RefreshToken { .. } => FlowKind::RefreshToken,
			Strategy::ClientCredentials { .. } => FlowKind::ClientCredentials,
			Strategy::ShareLink { .. } => FlowKind::ShareLink,
		}
	}
}

/// Ordered, non-empty list of eligible strategies.
#[derive(Clone, Debug)]
pub struct StrategyPlan<'a> {
	strategies: Vec<Strategy<'a>>,
}
impl<'a> StrategyPlan<'a> {
	/// Selects every strategy whose prerequisites are present, in priority order: refresh token,
	/// client credentials, share link. Fails without touching the network when none is.
	pub fn select(credentials: &'a CredentialSet) -> Result<Self, ConfigError> {
		let CredentialSet { tenant, client_id, client_secret, refresh_token, share_link } =
			credentials;
		let mut strategies = Vec::new();
		let mut missing = Vec::new();

		match (tenant, client_id, refresh_token) {
			(Some(tenant), Some(client_id), Some(refresh_token)) =>
				strategies.push(Strategy::RefreshToken {
					registration: ClientRegistration {
						tenant,
						client_id,
						client_secret: client_secret.as_ref(),
					},
					refresh_token,
				}),
			_ => missing.push(MissingRequirement {
				strategy: FlowKind::RefreshToken,
				variables: absent(&[
					(EnvVar::TENANT_ID, tenant.is_some()),
					(EnvVar::CLIENT_ID, client_id.is_some()),
					(EnvVar::REFRESH_TOKEN, refresh_token.is_some()),
				]),
			}),
		}
		match (tenant, client_id, client_secret) {
			(Some(tenant), Some(client_id), Some(client_secret)) =>
				strategies.push(Strategy::ClientCredentials { tenant, client_id, client_secret }),
			_ => missing.push(MissingRequirement {
				strategy: FlowKind::ClientCredentials,
				variables: absent(&[
					(EnvVar::TENANT_ID, tenant.is_some()),
					(EnvVar::CLIENT_ID, client_id.is_some()),
					(EnvVar::CLIENT_SECRET, client_secret.is_some()),
				]),
			}),
		}
		match share_link {
			Some(link) => strategies.push(Strategy::ShareLink { link }),
			None => missing.push(MissingRequirement {
				strategy: FlowKind::ShareLink,
				variables: vec![EnvVar::SHARE_LINK],
			}),
		}

		if strategies.is_empty() {
			return Err(ConfigError::NoEligibleStrategy { missing });
		}

		Ok(Self { strategies })
	}

	/// Strategies in attempt order.
	pub fn strategies(&self) -> &[Strategy<'a>] {
		&self.strategies
	}

	/// Labels of the strategies in attempt order.
	pub fn kinds(&self) -> Vec<FlowKind> {
		self.strategies.iter().map(Strategy::kind).collect()
	}
}

/// Summary of a successful run.
#[derive(Debug)]
pub struct FetchReport {
	/// Strategy that produced the artifact.
	pub strategy: FlowKind,
	/// Final artifact location.
	pub path: PathBuf,
	/// Artifact size in bytes.
	pub bytes: usize,
	/// Verdict of the persisted payload.
	pub verdict: Verdict,
	/// Soft failures of the strategies tried before the winning one.
	pub failures: Vec<AttemptFailure>,
}

/// Runs the strategy chain and persists the first valid spreadsheet.
pub struct Fetcher {
	broker: TokenBroker,
	drive: DriveClient,
	share: ShareLinkDownloader,
	store: Arc<dyn ArtifactStore>,
	target: TargetFile,
}
impl Fetcher {
	/// Starts a builder for `target` on the provider described by `descriptor`.
	pub fn builder(descriptor: ProviderDescriptor, target: TargetFile) -> FetcherBuilder {
		FetcherBuilder {
			descriptor,
			target,
			http_client: None,
			content_client: None,
			store: None,
			strategy: None,
		}
	}

	/// Builds a fetcher writing to [`FetchConfig::output_path`] with production transports.
	pub fn from_config(config: &FetchConfig) -> Result<Self, ConfigError> {
		Self::builder(config.descriptor.clone(), config.target.clone())
			.store(Arc::new(FileArtifactStore::new(config.output_path())))
			.build()
	}

	/// Artifact location.
	pub fn output_path(&self) -> &std::path::Path {
		self.store.target()
	}

	/// Walks every eligible strategy once, stopping at the first persisted artifact.
	pub async fn run(&self, credentials: &CredentialSet) -> Result<FetchReport> {
		let plan = StrategyPlan::select(credentials)?;
		let mut failures = Vec::new();

		trace_info!(
			strategies = ?plan.kinds(),
			target = %self.target.name,
			"Starting spreadsheet fetch."
		);

		for strategy in plan.strategies() {
			let kind = strategy.kind();
			let span = FlowSpan::new(kind, "fetch");

			match span.instrument(self.attempt(strategy)).await {
				Ok(outcome) => {
					let path = self.store.persist(&outcome.payload)?;

					trace_info!(
						strategy = %kind,
						path = %path.display(),
						bytes = outcome.payload.len(),
						source = %outcome.source,
						"Spreadsheet persisted."
					);

					return Ok(FetchReport {
						strategy: kind,
						path,
						bytes: outcome.payload.len(),
						verdict: outcome.verdict,
						failures,
					});
				},
				Err(e) if e.is_strategy_soft_failure() => {
					trace_warn!(
						strategy = %kind,
						error = %crate::error::render_chain(&e),
						"Strategy failed; trying the next one."
					);

					failures.push(AttemptFailure { strategy: kind, error: e });
				},
				Err(e) => return Err(e),
			}
		}

		Err(ExhaustedError { failures }.into())
	}

	async fn attempt(&self, strategy: &Strategy<'_>) -> Result<DownloadOutcome> {
		match *strategy {
			Strategy::RefreshToken { registration, refresh_token } => {
				let token = self.broker.refresh_access_token(registration, refresh_token).await?;

				self.download_from_drive(&token, LookupMode::Path).await
			},
			Strategy::ClientCredentials { tenant, client_id, client_secret } => {
				let token = self.broker.client_credentials(tenant, client_id, client_secret).await?;

				self.download_from_drive(&token, LookupMode::ChildrenFilter).await
			},
			Strategy::ShareLink { link } => self.share.download(link).await,
		}
	}

	async fn download_from_drive(
		&self,
		token: &TokenResult,
		mode: LookupMode,
	) -> Result<DownloadOutcome> {
		let item_id = match &self.target.item_id {
			Some(id) => id.clone(),
			None => self.drive.lookup(token, &self.target.name, mode).await?.id,
		};
		let payload = self.drive.download(token, &item_id).await?;

		Ok(DownloadOutcome::inspect(payload).into_valid()?)
	}
}
impl Debug for Fetcher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Fetcher")
			.field("broker", &self.broker)
			.field("target", &self.target)
			.field("output", &self.store.target())
			.finish()
	}
}

/// Builder for [`Fetcher`] values.
pub struct FetcherBuilder {
	descriptor: ProviderDescriptor,
	target: TargetFile,
	http_client: Option<ReqwestHttpClient>,
	content_client: Option<ContentHttpClient>,
	store: Option<Arc<dyn ArtifactStore>>,
	strategy: Option<Arc<dyn ProviderStrategy>>,
}
impl FetcherBuilder {
	/// Overrides the token transport.
	pub fn http_client(mut self, client: ReqwestHttpClient) -> Self {
		self.http_client = Some(client);

		self
	}

	/// Overrides the lookup and download transport.
	pub fn content_client(mut self, client: ContentHttpClient) -> Self {
		self.content_client = Some(client);

		self
	}

	/// Overrides the artifact store.
	pub fn store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
		self.store = Some(store);

		self
	}

	/// Overrides the token error classification strategy.
	pub fn strategy(mut self, strategy: Arc<dyn ProviderStrategy>) -> Self {
		self.strategy = Some(strategy);

		self
	}

	/// Builds the fetcher, provisioning default transports and a file store under
	/// [`DEFAULT_OUTPUT_DIR`] for anything not overridden.
	pub fn build(self) -> Result<Fetcher, ConfigError> {
		let http_client = match self.http_client {
			Some(client) => client,
			None => ReqwestHttpClient::new(DEFAULT_REQUEST_TIMEOUT)?,
		};
		let content_client = match self.content_client {
			Some(client) => client,
			None => ContentHttpClient::new(DEFAULT_DOWNLOAD_TIMEOUT)?,
		};
		let store = self.store.unwrap_or_else(|| {
			Arc::new(FileArtifactStore::new(PathBuf::from(DEFAULT_OUTPUT_DIR).join(&self.target.name)))
		});
		let strategy = self.strategy.unwrap_or_else(|| Arc::new(DefaultProviderStrategy));

		Ok(Fetcher {
			broker: TokenBroker::with_http_client(self.descriptor.clone(), http_client)
				.with_strategy(strategy),
			drive: DriveClient::new(content_client.clone(), self.descriptor),
			share: ShareLinkDownloader::new(content_client),
			store,
			target: self.target,
		})
	}
}

fn absent(requirements: &[(&'static str, bool)]) -> Vec<&'static str> {
	requirements.iter().filter(|(_, present)| !present).map(|(name, _)| *name).collect()
}

#[cfg(test)]
mod tests {
	// crates.io
	use httpmock::prelude::*;
	// self
	use super::*;
	use crate::{
		_preludet::{build_test_fetcher, oauth_credentials, xlsx_payload},
		error::NotFoundError,
	};

	#[tokio::test]
	async fn share_link_only_never_requests_tokens() {
		let server = MockServer::start_async().await;
		let payload = xlsx_payload(20_000);
		let token = server
			.mock_async(|when, then| {
				when.method(POST);
				then.status(500);
			})
			.await;
		let share = server
			.mock_async(|when, then| {
				when.method(GET).path("/s/abc").query_param("download", "1");
				then.status(200).header("content-type", "application/octet-stream").body(&payload);
			})
			.await;
		let (fetcher, store) = build_test_fetcher(&server.base_url(), TargetFile::default());
		let credentials = CredentialSet {
			share_link: Some(Url::parse(&server.url("/s/abc")).expect("Share link should parse.")),
			..Default::default()
		};
		let report = fetcher.run(&credentials).await.expect("Share link should succeed.");

		token.assert_calls_async(0).await;
		share.assert_calls_async(1).await;

		assert_eq!(report.strategy, FlowKind::ShareLink);
		assert_eq!(report.path, PathBuf::from("data").join("boiler_data.xlsx"));
		assert_eq!(store.latest(), Some(payload));
	}

	#[tokio::test]
	async fn children_filter_matches_names_case_insensitively() {
		let server = MockServer::start_async().await;
		let payload = xlsx_payload(20_000);
		let _token = server
			.mock_async(|when, then| {
				when.method(POST).path("/auth/tenant-test/oauth2/v2.0/token");
				then.status(200).header("content-type", "application/json").body(
					"{\"access_token\":\"app\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
				);
			})
			.await;
		let _children = server
			.mock_async(|when, then| {
				when.method(GET).path("/drive/me/drive/root/children");
				then.status(200).header("content-type", "application/json").body(
					"{\"value\":[{\"id\":\"other\",\"name\":\"notes.txt\"},\
					 {\"id\":\"item-7\",\"name\":\"Boiler_Data.XLSX\"}]}",
				);
			})
			.await;
		let download = server
			.mock_async(|when, then| {
				when.method(GET).path("/drive/me/drive/items/item-7/content");
				then.status(200).header("content-type", "application/octet-stream").body(&payload);
			})
			.await;
		let (fetcher, store) = build_test_fetcher(&server.base_url(), TargetFile::default());

		fetcher
			.run(&oauth_credentials(None, Some("secret")))
			.await
			.expect("Client credentials should find the file.");

		download.assert_calls_async(1).await;
		assert_eq!(store.write_count(), 1);
	}

	#[tokio::test]
	async fn empty_children_result_is_not_found() {
		let server = MockServer::start_async().await;
		let _token = server
			.mock_async(|when, then| {
				when.method(POST).path("/auth/tenant-test/oauth2/v2.0/token");
				then.status(200).header("content-type", "application/json").body(
					"{\"access_token\":\"app\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
				);
			})
			.await;
		let _children = server
			.mock_async(|when, then| {
				when.method(GET).path("/drive/me/drive/root/children");
				then.status(200).header("content-type", "application/json").body("{\"value\":[]}");
			})
			.await;
		let (fetcher, _) = build_test_fetcher(&server.base_url(), TargetFile::default());
		let err = fetcher
			.run(&oauth_credentials(None, Some("secret")))
			.await
			.expect_err("A missing file should exhaust the only strategy.");

		match err {
			Error::Exhausted(ExhaustedError { failures }) => assert!(matches!(
				&failures[0].error,
				Error::NotFound(NotFoundError { status: None, .. })
			)),
			other => panic!("Unexpected error variant: {other:?}."),
		}
	}

	#[test]
	fn empty_credentials_list_every_missing_variable() {
		let err = StrategyPlan::select(&CredentialSet::default())
			.expect_err("Empty credentials should not be eligible.");

		match err {
			ConfigError::NoEligibleStrategy { missing } => {
				assert_eq!(missing.len(), 3);
				assert_eq!(
					missing[0].variables,
					vec!["AZURE_TENANT_ID", "AZURE_CLIENT_ID", "AZURE_REFRESH_TOKEN"]
				);
				assert_eq!(missing[1].strategy, FlowKind::ClientCredentials);
				assert_eq!(missing[2].variables, vec!["ONEDRIVE_LINK"]);
			},
			other => panic!("Unexpected error variant: {other:?}."),
		}
	}

	#[test]
	fn strategies_follow_priority_order() {
		let mut credentials = oauth_credentials(Some("refresh"), Some("secret"));

		credentials.share_link =
			Some(Url::parse("https://1drv.ms/x/s!abc?e=1").expect("Share link should parse."));

		let plan = StrategyPlan::select(&credentials).expect("Full credentials should be eligible.");

		assert_eq!(
			plan.kinds(),
			vec![FlowKind::RefreshToken, FlowKind::ClientCredentials, FlowKind::ShareLink]
		);

		match plan.strategies()[0] {
			Strategy::RefreshToken { registration, .. } =>
				assert!(registration.client_secret.is_some()),
			other => panic!("Unexpected first strategy: {other:?}."),
		}
	}

	#[test]
	fn refresh_token_without_secret_is_still_eligible() {
		let credentials = oauth_credentials(Some("refresh"), None);
		let plan = StrategyPlan::select(&credentials).expect("Refresh token should be eligible.");

		assert_eq!(plan.kinds(), vec![FlowKind::RefreshToken]);
	}

	#[test]
	fn secret_alone_enables_client_credentials() {
		let credentials = oauth_credentials(None, Some("secret"));
		let plan = StrategyPlan::select(&credentials).expect("Client secret should be eligible.");

		assert_eq!(plan.kinds(), vec![FlowKind::ClientCredentials]);
	}
}
