#![cfg(feature = "test")]

// std
use std::fs;
// crates.io
use httpmock::prelude::*;
// self
use drive_sheet_fetcher::{
	_preludet::*,
	config::{CredentialSet, TargetFile},
	error::{AuthError, ConfigError},
	fetcher::Fetcher,
	obs::FlowKind,
	share::BROWSER_USER_AGENT,
	store::{ArtifactStore, FileArtifactStore, MemoryArtifactStore},
};

const FILE_NAME: &str = "boiler_data.xlsx";
const TOKEN_PATH: &str = "/auth/tenant-test/oauth2/v2.0/token";
const LOOKUP_PATH: &str = "/drive/me/drive/root:/boiler_data.xlsx";
const CHILDREN_PATH: &str = "/drive/me/drive/root/children";
const SHARE_PATH: &str = "/share/x/s!AbCd";
const PAYLOAD_LEN: usize = 20_000;

fn fetcher_with_store(
	server: &MockServer,
	target: TargetFile,
	store: Arc<dyn ArtifactStore>,
) -> Fetcher {
	Fetcher::builder(test_descriptor(&server.base_url()), target)
		.http_client(test_reqwest_http_client())
		.content_client(test_content_http_client())
		.store(store)
		.build()
		.expect("Fetcher should build against the mock server.")
}

fn credentials(
	refresh_token: Option<&str>,
	client_secret: Option<&str>,
	share_link: Option<String>,
) -> CredentialSet {
	CredentialSet {
		share_link: share_link
			.map(|link| Url::parse(&link).expect("Share link fixture should parse.")),
		..oauth_credentials(refresh_token, client_secret)
	}
}

fn share_link(server: &MockServer) -> String {
	server.url(format!("{SHARE_PATH}?e=XyZ"))
}

#[tokio::test]
async fn no_eligible_strategy_fails_without_network() {
	let server = MockServer::start_async().await;
	let catch_all = server
		.mock_async(|_, then| {
			then.status(500);
		})
		.await;
	let (fetcher, store) = build_test_fetcher(&server.base_url(), TargetFile::new(FILE_NAME));
	let err = fetcher
		.run(&CredentialSet::default())
		.await
		.expect_err("An empty credential set should not select any strategy.");

	match err {
		Error::Config(ConfigError::NoEligibleStrategy { missing }) => {
			assert_eq!(missing.len(), 3);
			assert_eq!(missing[0].strategy, FlowKind::RefreshToken);
			assert_eq!(missing[2].variables, vec!["ONEDRIVE_LINK"]);
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	catch_all.assert_calls_async(0).await;
	assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn refresh_token_bearer_reaches_lookup_and_download() {
	let server = MockServer::start_async().await;
	let payload = xlsx_payload(PAYLOAD_LEN);
	let token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.form_urlencoded_tuple("grant_type", "refresh_token")
				.form_urlencoded_tuple("refresh_token", "refresh-1");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"access-1\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let lookup = server
		.mock_async(|when, then| {
			when.method(GET).path(LOOKUP_PATH).header("authorization", "Bearer access-1");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"id\":\"item-1\",\"name\":\"boiler_data.xlsx\",\"size\":20000}");
		})
		.await;
	let download = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/drive/me/drive/items/item-1/content")
				.header("authorization", "Bearer access-1");
			then.status(200).header("content-type", "application/octet-stream").body(&payload);
		})
		.await;
	let (fetcher, store) = build_test_fetcher(&server.base_url(), TargetFile::new(FILE_NAME));
	let report = fetcher
		.run(&credentials(Some("refresh-1"), None, None))
		.await
		.expect("Refresh-token strategy should succeed.");

	token.assert_calls_async(1).await;
	lookup.assert_calls_async(1).await;
	download.assert_calls_async(1).await;

	assert_eq!(report.strategy, FlowKind::RefreshToken);
	assert_eq!(report.bytes, payload.len());
	assert!(report.failures.is_empty());
	assert!(report.verdict.is_valid());
	assert_eq!(store.latest(), Some(payload));
}

#[tokio::test]
async fn token_response_without_token_type_is_accepted() {
	let server = MockServer::start_async().await;
	let payload = xlsx_payload(PAYLOAD_LEN);
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH).form_urlencoded_tuple("grant_type", "refresh_token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"T\",\"expires_in\":3600}");
		})
		.await;
	let lookup = server
		.mock_async(|when, then| {
			when.method(GET).path(LOOKUP_PATH).header("authorization", "Bearer T");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"id\":\"item-t\",\"name\":\"boiler_data.xlsx\"}");
		})
		.await;
	let _download = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/drive/me/drive/items/item-t/content")
				.header("authorization", "Bearer T");
			then.status(200).header("content-type", "application/octet-stream").body(&payload);
		})
		.await;
	let (fetcher, store) = build_test_fetcher(&server.base_url(), TargetFile::new(FILE_NAME));
	let report = fetcher
		.run(&credentials(Some("refresh-t"), None, None))
		.await
		.expect("A bare access token should be enough to proceed.");

	token.assert_calls_async(1).await;
	lookup.assert_calls_async(1).await;

	assert_eq!(report.strategy, FlowKind::RefreshToken);
	assert!(report.failures.is_empty());
	assert_eq!(store.latest(), Some(payload));
}

#[tokio::test]
async fn known_item_id_skips_lookup() {
	let server = MockServer::start_async().await;
	let payload = xlsx_payload(PAYLOAD_LEN);
	let _token = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"access-2\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let lookup = server
		.mock_async(|when, then| {
			when.method(GET).path(LOOKUP_PATH);
			then.status(500);
		})
		.await;
	let download = server
		.mock_async(|when, then| {
			when.method(GET).path("/drive/me/drive/items/item-9/content");
			then.status(200).header("content-type", "application/octet-stream").body(&payload);
		})
		.await;
	let (fetcher, store) =
		build_test_fetcher(&server.base_url(), TargetFile::new(FILE_NAME).with_item_id("item-9"));

	fetcher
		.run(&credentials(Some("refresh-2"), None, None))
		.await
		.expect("Download by item identifier should succeed.");

	lookup.assert_calls_async(0).await;
	download.assert_calls_async(1).await;
	assert_eq!(store.write_count(), 1);
}

#[tokio::test]
async fn download_failure_keeps_previous_file() {
	let server = MockServer::start_async().await;
	let dir = tempfile::tempdir().expect("Temporary directory should be created.");
	let path = dir.path().join(FILE_NAME);

	fs::write(&path, b"previous").expect("Previous output should be written.");

	let _token = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"access-3\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let _lookup = server
		.mock_async(|when, then| {
			when.method(GET).path(LOOKUP_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"id\":\"item-3\",\"name\":\"boiler_data.xlsx\"}");
		})
		.await;
	let download = server
		.mock_async(|when, then| {
			when.method(GET).path("/drive/me/drive/items/item-3/content");
			then.status(500).body("upstream failure");
		})
		.await;
	let fetcher = fetcher_with_store(
		&server,
		TargetFile::new(FILE_NAME),
		Arc::new(FileArtifactStore::new(&path)),
	);
	let err = fetcher
		.run(&credentials(Some("refresh-3"), None, None))
		.await
		.expect_err("A failing download should exhaust the only strategy.");

	match err {
		Error::Exhausted(exhausted) => {
			assert_eq!(exhausted.failures.len(), 1);
			assert_eq!(exhausted.failures[0].strategy, FlowKind::RefreshToken);
			assert!(matches!(exhausted.failures[0].error, Error::Transport(_)));
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	download.assert_calls_async(1).await;
	assert_eq!(fs::read(&path).expect("Previous output should remain."), b"previous");
	assert!(!dir.path().join("boiler_data.xlsx.tmp").exists());
}

#[tokio::test]
async fn forbidden_lookup_falls_back_to_share_link() {
	let server = MockServer::start_async().await;
	let payload = xlsx_payload(PAYLOAD_LEN);
	let token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.form_urlencoded_tuple("grant_type", "client_credentials")
				.form_urlencoded_tuple("client_secret", "secret-1");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"app-token\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let children = server
		.mock_async(|when, then| {
			when.method(GET)
				.path(CHILDREN_PATH)
				.query_param("$filter", "name eq 'boiler_data.xlsx'")
				.header("authorization", "Bearer app-token");
			then.status(403).body("{\"error\":{\"code\":\"accessDenied\"}}");
		})
		.await;
	let share = server
		.mock_async(|when, then| {
			when.method(GET)
				.path(SHARE_PATH)
				.query_param("download", "1")
				.query_param("e", "XyZ")
				.header("user-agent", BROWSER_USER_AGENT);
			then.status(200).header("content-type", "application/octet-stream").body(&payload);
		})
		.await;
	let (fetcher, store) = build_test_fetcher(&server.base_url(), TargetFile::new(FILE_NAME));
	let report = fetcher
		.run(&credentials(None, Some("secret-1"), Some(share_link(&server))))
		.await
		.expect("Share link should succeed after the application lookup is refused.");

	token.assert_calls_async(1).await;
	children.assert_calls_async(1).await;
	share.assert_calls_async(1).await;

	assert_eq!(report.strategy, FlowKind::ShareLink);
	assert_eq!(report.failures.len(), 1);
	assert_eq!(report.failures[0].strategy, FlowKind::ClientCredentials);
	assert!(matches!(
		report.failures[0].error,
		Error::Auth(AuthError::AccessDenied { status: 403, .. })
	));
	assert_eq!(store.latest(), Some(payload));
}

#[tokio::test]
async fn rejected_refresh_token_falls_through_in_priority_order() {
	let server = MockServer::start_async().await;
	let payload = xlsx_payload(PAYLOAD_LEN);
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH).form_urlencoded_tuple("grant_type", "refresh_token");
			then.status(400).header("content-type", "application/json").body(
				"{\"error\":\"invalid_grant\",\"error_description\":\"AADSTS70000: token revoked\"}",
			);
		})
		.await;
	let client_credentials = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.form_urlencoded_tuple("grant_type", "client_credentials");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_client\"}");
		})
		.await;
	let share = server
		.mock_async(|when, then| {
			when.method(GET).path(SHARE_PATH).query_param("download", "1");
			then.status(200).header("content-type", "application/octet-stream").body(&payload);
		})
		.await;
	let (fetcher, _store) = build_test_fetcher(&server.base_url(), TargetFile::new(FILE_NAME));
	let report = fetcher
		.run(&credentials(Some("revoked"), Some("wrong"), Some(share_link(&server))))
		.await
		.expect("Share link should succeed after both token grants are rejected.");

	refresh.assert_calls_async(1).await;
	client_credentials.assert_calls_async(1).await;
	share.assert_calls_async(1).await;

	assert_eq!(report.strategy, FlowKind::ShareLink);
	assert_eq!(
		report.failures.iter().map(|failure| failure.strategy).collect::<Vec<_>>(),
		vec![FlowKind::RefreshToken, FlowKind::ClientCredentials]
	);
	assert!(
		report
			.failures
			.iter()
			.all(|failure| matches!(failure.error, Error::Auth(AuthError::TokenRejected { .. })))
	);
}

#[tokio::test]
async fn html_share_page_is_rejected_for_every_candidate() {
	let server = MockServer::start_async().await;
	let share = server
		.mock_async(|when, then| {
			when.method(GET).path(SHARE_PATH);
			then.status(200)
				.header("content-type", "text/html; charset=utf-8")
				.body("<!DOCTYPE html><html><body>Sign in to continue</body></html>");
		})
		.await;
	let (fetcher, store) = build_test_fetcher(&server.base_url(), TargetFile::new(FILE_NAME));
	let credentials = CredentialSet {
		share_link: Some(Url::parse(&share_link(&server)).expect("Share link should parse.")),
		..CredentialSet::default()
	};
	let err = fetcher
		.run(&credentials)
		.await
		.expect_err("An HTML interstitial should never be persisted.");

	match err {
		Error::Exhausted(exhausted) => {
			assert_eq!(exhausted.failures.len(), 1);
			assert!(matches!(exhausted.failures[0].error, Error::Validation(_)));
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	// Coerced link first, then the raw link.
	share.assert_calls_async(2).await;
	assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn storage_failure_aborts_remaining_strategies() {
	let server = MockServer::start_async().await;
	let payload = xlsx_payload(PAYLOAD_LEN);
	let _token = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"access-4\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let _lookup = server
		.mock_async(|when, then| {
			when.method(GET).path(LOOKUP_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"id\":\"item-4\",\"name\":\"boiler_data.xlsx\"}");
		})
		.await;
	let _download = server
		.mock_async(|when, then| {
			when.method(GET).path("/drive/me/drive/items/item-4/content");
			then.status(200).header("content-type", "application/octet-stream").body(&payload);
		})
		.await;
	let share = server
		.mock_async(|when, then| {
			when.method(GET).path(SHARE_PATH);
			then.status(200).header("content-type", "application/octet-stream").body(&payload);
		})
		.await;
	let store = Arc::new(MemoryArtifactStore::failing("data/boiler_data.xlsx", "disk full"));
	let fetcher = fetcher_with_store(&server, TargetFile::new(FILE_NAME), store.clone());
	let err = fetcher
		.run(&credentials(Some("refresh-4"), None, Some(share_link(&server))))
		.await
		.expect_err("A storage failure should abort the run.");

	assert!(matches!(err, Error::Storage(_)));
	share.assert_calls_async(0).await;
	assert_eq!(store.write_count(), 0);
}
