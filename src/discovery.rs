//! Tenant-scoped discovery metadata and signing keys, cached with independent TTLs.
//!
//! [`DiscoveryManager`] owns two [`ExpiringAsyncCache`] entries: the discovery document
//! (`"config"`) and the signing key set (`"keys"`). The key set loader resolves its URI through
//! the document entry, so a key refresh never refetches a fresh document.

pub mod document;

pub use document::*;

// crates.io
use oauth2::{
	AsyncHttpClient, HttpRequest,
	http::{Method, header::ACCEPT},
};
use serde_json::Value;
use tracing::debug;
// self
use crate::{
	_prelude::*,
	cache::ExpiringAsyncCache,
	config::AuthConfig,
	error::{DiscoveryError, TransportError},
	http::{ResponseMetadataSlot, TokenHttpClient},
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, Logger},
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

const CONFIG_KEY: &str = "config";
const KEYS_KEY: &str = "keys";
const DOCUMENT_LABEL: &str = "discovery document";
const KEY_SET_LABEL: &str = "key set";

/// Discovery manager specialized for the crate's default reqwest transport stack.
#[cfg(feature = "reqwest")]
pub type ReqwestDiscoveryManager =
	DiscoveryManager<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Resolves provider metadata and signing keys for the configured tenant.
pub struct DiscoveryManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	config: Arc<AuthConfig>,
	discovery_uri: Url,
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
	documents: Arc<ExpiringAsyncCache<Arc<DiscoveryDocument>>>,
	keys: Arc<ExpiringAsyncCache<Arc<SigningKeySet>>>,
	logger: Logger,
}
impl<C, M> DiscoveryManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a manager that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		config: Arc<AuthConfig>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let uri = config.discovery_uri();
		let discovery_uri =
			Url::parse(&uri).map_err(|source| DiscoveryError::InvalidUri { uri, source })?;
		let manager = Self {
			config,
			discovery_uri,
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			documents: Default::default(),
			keys: Default::default(),
			logger: Logger::default(),
		};

		manager.install_loaders();

		Ok(manager)
	}

	/// Routes this manager's events to `logger`.
	pub fn with_logger(mut self, logger: Logger) -> Self {
		self.logger = logger;

		self
	}

	/// Configuration the manager was built with.
	pub fn config(&self) -> &Arc<AuthConfig> {
		&self.config
	}

	/// Discovery document URI with the tenant substituted.
	pub fn discovery_uri(&self) -> &Url {
		&self.discovery_uri
	}

	/// Returns the discovery document, fetching it when the cached copy is missing or stale.
	pub async fn get_configuration(&self) -> Result<Arc<DiscoveryDocument>> {
		let fut = obs::observe(FlowKind::Discovery, "get_configuration", async {
			let document = self.documents.get(CONFIG_KEY).await?;

			document.ok_or_else(|| {
				Error::from(DiscoveryError::Uninitialized { document: DOCUMENT_LABEL })
			})
		});

		self.logger.attach(fut).await
	}

	/// Returns the signing key set, fetching it when the cached copy is missing or stale.
	pub async fn get_signing_keys(&self) -> Result<Arc<SigningKeySet>> {
		let fut = obs::observe(FlowKind::SigningKeys, "get_signing_keys", async {
			let keys = self.keys.get(KEYS_KEY).await?;

			keys.ok_or_else(|| {
				Error::from(DiscoveryError::Uninitialized { document: KEY_SET_LABEL })
			})
		});

		self.logger.attach(fut).await
	}

	/// Admin-consent endpoint for the configured tenant.
	pub fn admin_consent_uri(&self) -> Result<Url> {
		let uri = self.config.admin_consent_uri();

		Url::parse(&uri).map_err(|source| DiscoveryError::InvalidUri { uri, source }.into())
	}

	/// Drops both cached entries so the next read goes back to the provider.
	pub fn clear(&self) {
		debug!("Clearing cached discovery document and key set.");

		self.install_loaders();
	}

	pub(crate) fn http_client(&self) -> &Arc<C> {
		&self.http_client
	}

	pub(crate) fn transport_mapper(&self) -> &Arc<M> {
		&self.transport_mapper
	}

	fn install_loaders(&self) {
		let http_client = self.http_client.clone();
		let mapper = self.transport_mapper.clone();
		let uri = self.discovery_uri.clone();

		self.documents.set(
			CONFIG_KEY,
			move || {
				let http_client = http_client.clone();
				let mapper = mapper.clone();
				let uri = uri.clone();

				async move {
					let body = fetch_json(&*http_client, &*mapper, DOCUMENT_LABEL, &uri).await?;
					let document = parse_json::<DiscoveryDocument>(DOCUMENT_LABEL, &body)?;

					Ok::<_, Error>(Arc::new(document))
				}
			},
			Some(self.config.config_ttl()),
		);

		let http_client = self.http_client.clone();
		let mapper = self.transport_mapper.clone();
		let documents = self.documents.clone();

		self.keys.set(
			KEYS_KEY,
			move || {
				let http_client = http_client.clone();
				let mapper = mapper.clone();
				let documents = documents.clone();

				async move {
					let document = documents
						.get(CONFIG_KEY)
						.await?
						.ok_or(DiscoveryError::Uninitialized { document: DOCUMENT_LABEL })?;
					let jwks_uri =
						document.jwks_uri.as_ref().ok_or(DiscoveryError::MissingJwksUri)?;
					let body = fetch_json(&*http_client, &*mapper, KEY_SET_LABEL, jwks_uri).await?;
					let value = parse_json::<Value>(KEY_SET_LABEL, &body)?;
					let keys = SigningKeySet::from_jwks(&value)?;

					debug!(count = keys.len(), "Loaded signing keys.");

					Ok::<_, Error>(Arc::new(keys))
				}
			},
			Some(self.config.keys_ttl()),
		);
	}
}
#[cfg(feature = "reqwest")]
impl DiscoveryManager<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a manager with its own reqwest transport bounded by the configured timeout.
	pub fn new(config: Arc<AuthConfig>) -> Result<Self> {
		let http_client = ReqwestHttpClient::with_timeout(config.http_timeout().unsigned_abs())?;

		Self::with_http_client(config, http_client, ReqwestTransportErrorMapper)
	}
}
impl<C, M> Debug for DiscoveryManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DiscoveryManager")
			.field("discovery_uri", &self.discovery_uri.as_str())
			.field("documents", &self.documents)
			.field("keys", &self.keys)
			.field("logger", &self.logger)
			.finish()
	}
}

async fn fetch_json<C, M>(
	http_client: &C,
	mapper: &M,
	document: &'static str,
	uri: &Url,
) -> Result<Vec<u8>, DiscoveryError>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let fetch_error = |source: TransportError| DiscoveryError::Fetch {
		document,
		uri: uri.to_string(),
		source,
	};
	let request: HttpRequest = oauth2::http::Request::builder()
		.method(Method::GET)
		.uri(uri.as_str())
		.header(ACCEPT, "application/json")
		.body(Vec::new())
		.map_err(|e| fetch_error(TransportError::Http(e)))?;
	let slot = ResponseMetadataSlot::default();
	let handle = http_client.with_metadata(slot.clone());

	debug!(document, uri = uri.as_str(), "Fetching provider metadata.");

	let response = handle
		.call(request)
		.await
		.map_err(|e| fetch_error(mapper.map_transport_error(document, slot.take().as_ref(), e)))?;
	let status = response.status();

	if !status.is_success() {
		return Err(DiscoveryError::Status {
			document,
			uri: uri.to_string(),
			status: status.as_u16(),
		});
	}

	Ok(response.into_body())
}

fn parse_json<T>(document: &'static str, body: &[u8]) -> Result<T, DiscoveryError>
where
	T: for<'de> Deserialize<'de>,
{
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| DiscoveryError::Parse { document, source })
}
