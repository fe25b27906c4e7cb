//! Fetch one spreadsheet from a remote drive through a prioritized chain of OAuth 2.0 and
//! share-link strategies, sniff the payload, and atomically replace the local copy.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod drive;
pub mod error;
pub mod fetcher;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod share;
pub mod store;
pub mod validate;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::path::PathBuf;
	// self
	use crate::{
		auth::{ClientId, TenantId, TokenSecret},
		config::{CredentialSet, TargetFile},
		fetcher::Fetcher,
		http::{ContentHttpClient, ReqwestHttpClient},
		provider::ProviderDescriptor,
		store::MemoryArtifactStore,
	};

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Builds the content client counterpart of [`test_reqwest_http_client`].
	pub fn test_content_http_client() -> ContentHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest content client for tests.");

		ContentHttpClient::with_client(client)
	}

	/// Builds a descriptor whose authority and drive endpoints both point at `base`.
	pub fn test_descriptor(base: &str) -> ProviderDescriptor {
		let root = Url::parse(base).expect("Mock base URL should parse successfully.");

		ProviderDescriptor::builder()
			.authority(root.join("/auth/").expect("Mock authority URL should join."))
			.drive(root.join("/drive/").expect("Mock drive URL should join."))
			.build()
			.expect("Mock provider descriptor should build successfully.")
	}

	/// Constructs a [`Fetcher`] backed by an in-memory artifact store and the insecure test
	/// transports.
	pub fn build_test_fetcher(base: &str, target: TargetFile) -> (Fetcher, Arc<MemoryArtifactStore>) {
		let store = Arc::new(MemoryArtifactStore::new(PathBuf::from("data").join(&target.name)));
		let fetcher = Fetcher::builder(test_descriptor(base), target)
			.http_client(test_reqwest_http_client())
			.content_client(test_content_http_client())
			.store(store.clone())
			.build()
			.expect("Test fetcher should build successfully.");

		(fetcher, store)
	}

	/// Credential set carrying every OAuth field but no share link.
	pub fn oauth_credentials(refresh_token: Option<&str>, client_secret: Option<&str>) -> CredentialSet {
		CredentialSet {
			tenant: Some(TenantId::new("tenant-test").expect("Tenant fixture should be valid.")),
			client_id: Some(ClientId::new("client-test").expect("Client fixture should be valid.")),
			client_secret: client_secret.map(TokenSecret::new),
			refresh_token: refresh_token.map(TokenSecret::new),
			share_link: None,
		}
	}

	/// Builds a payload that starts with the ZIP local-file-header signature.
	pub fn xlsx_payload(len: usize) -> Vec<u8> {
		let mut payload = vec![0_u8; len.max(4)];

		payload[..4].copy_from_slice(&[0x50, 0x4B, 0x03, 0x04]);

		payload
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::Mutex;
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(feature = "cli")] use {clap as _, color_eyre as _, dotenvy as _, tracing_subscriber as _};
#[cfg(test)] use {httpmock as _, tempfile as _};
