//! Remote drive lookups and authenticated content downloads.

// self
use crate::{
	_prelude::*,
	auth::TokenResult,
	error::{AuthError, NotFoundError, TransportError},
	http::{ContentHttpClient, GetOptions, HttpPayload},
	obs::{Stage, trace_debug},
	provider::ProviderDescriptor,
};

/// Drive item located by a lookup.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RemoteFileHandle {
	/// Drive item identifier.
	pub id: String,
	/// Item name.
	pub name: String,
	/// Size in bytes, when reported.
	#[serde(default)]
	pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ItemCollection {
	#[serde(default)]
	value: Vec<RemoteFileHandle>,
}

/// Lookup mode matching the permission model of the token in hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupMode {
	/// `GET me/drive/root:/{name}`; used with delegated tokens.
	Path,
	/// `GET me/drive/root/children?$filter=name eq '{name}'`; used with application tokens.
	ChildrenFilter,
}

/// Drive API client bound to the descriptor's drive root.
#[derive(Clone, Debug)]
pub struct DriveClient {
	http_client: ContentHttpClient,
	descriptor: ProviderDescriptor,
}
impl DriveClient {
	/// Creates a client for `descriptor`'s drive root.
	pub fn new(http_client: ContentHttpClient, descriptor: ProviderDescriptor) -> Self {
		Self { http_client, descriptor }
	}

	/// Locates `name` using the requested `mode`.
	pub async fn lookup(
		&self,
		token: &TokenResult,
		name: &str,
		mode: LookupMode,
	) -> Result<RemoteFileHandle> {
		match mode {
			LookupMode::Path => self.lookup_by_path(token, name).await,
			LookupMode::ChildrenFilter => self.lookup_by_filter(token, name).await,
		}
	}

	/// Resolves `name` relative to the drive root.
	pub async fn lookup_by_path(&self, token: &TokenResult, name: &str) -> Result<RemoteFileHandle> {
		let url = self.descriptor.drive_url(["me", "drive", "root:", name])?;
		let payload = self.get(token, url, Stage::Lookup).await?;

		ensure_success(&payload, Stage::Lookup, name)?;

		payload.json(Stage::Lookup)
	}

	/// Lists root children filtered by name and returns the first match.
	pub async fn lookup_by_filter(&self, token: &TokenResult, name: &str) -> Result<RemoteFileHandle> {
		let mut url = self.descriptor.drive_url(["me", "drive", "root", "children"])?;

		url.query_pairs_mut().append_pair("$filter", &name_filter(name));

		let payload = self.get(token, url, Stage::Lookup).await?;

		ensure_success(&payload, Stage::Lookup, name)?;

		let collection = payload.json::<ItemCollection>(Stage::Lookup)?;

		trace_debug!(matches = collection.value.len(), "Children filter answered.");

		collection
			.value
			.into_iter()
			.find(|item| item.name.eq_ignore_ascii_case(name))
			.ok_or_else(|| NotFoundError { name: name.to_owned(), status: None }.into())
	}

	/// Counts the items in the drive root; used to verify freshly minted credentials.
	pub async fn list_root_children(&self, token: &TokenResult) -> Result<usize> {
		let url = self.descriptor.drive_url(["me", "drive", "root", "children"])?;
		let payload = self.get(token, url, Stage::Lookup).await?;

		ensure_success(&payload, Stage::Lookup, "root")?;

		Ok(payload.json::<ItemCollection>(Stage::Lookup)?.value.len())
	}

	/// Downloads the content of `item_id`, following redirects to the storage host.
	pub async fn download(&self, token: &TokenResult, item_id: &str) -> Result<HttpPayload> {
		let url = self.descriptor.drive_url(["me", "drive", "items", item_id, "content"])?;
		let payload = self.get(token, url, Stage::Download).await?;

		ensure_success(&payload, Stage::Download, item_id)?;

		Ok(payload)
	}

	async fn get(&self, token: &TokenResult, url: Url, stage: Stage) -> Result<HttpPayload> {
		let bearer = token.bearer();

		self.http_client.get(url, GetOptions { bearer: Some(&bearer), user_agent: None }, stage).await
	}
}

/// Maps a non-2xx drive response onto the error taxonomy.
pub fn ensure_success(payload: &HttpPayload, stage: Stage, name: &str) -> Result<()> {
	match payload.status {
		200..=299 => Ok(()),
		401 | 403 => Err(AuthError::AccessDenied {
			stage,
			status: payload.status,
			body_preview: payload.body_preview(),
		}
		.into()),
		404 => Err(NotFoundError { name: name.to_owned(), status: Some(404) }.into()),
		status => Err(TransportError::UnexpectedStatus {
			stage,
			status,
			body_preview: payload.body_preview(),
		}
		.into()),
	}
}

fn name_filter(name: &str) -> String {
	format!("name eq '{}'", name.replace('\'', "''"))
}
