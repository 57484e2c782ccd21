//! Code and refresh exchanges, ID token validation, and per-user token retrieval.
//!
//! [`TokenManager`] resolves the token endpoint and signing keys through its
//! [`DiscoveryManager`] and persists results through an injected [`TokenStore`].
//! [`TokenManager::get_access_token`] refreshes a stored set once its access token has
//! expired; refreshes for one user are serialized so concurrent callers share the result.

pub mod validate;

pub use validate::certificate_to_pem;

// crates.io
use tracing::{debug, info};
// self
use crate::{
	_prelude::*,
	auth::{Principal, TokenSecret, TokenSet, UserId},
	config::AuthConfig,
	discovery::DiscoveryManager,
	error::ValidationError,
	http::TokenHttpClient,
	oauth::{TokenFacade, TransportErrorMapper},
	obs::{self, FlowKind, Logger},
	store::TokenStore,
	tokens::validate::UnverifiedIdToken,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

/// Token manager specialized for the crate's default reqwest transport stack.
#[cfg(feature = "reqwest")]
pub type ReqwestTokenManager = TokenManager<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Exchanges grants for token sets and turns verified ID tokens into principals.
pub struct TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	config: Arc<AuthConfig>,
	discovery: Arc<DiscoveryManager<C, M>>,
	store: Arc<dyn TokenStore>,
	logger: Logger,
	refresh_guards: Arc<Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>>,
}
impl<C, M> TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a manager sharing the discovery manager's configuration and transport.
	pub fn new(discovery: Arc<DiscoveryManager<C, M>>, store: Arc<dyn TokenStore>) -> Self {
		Self {
			config: discovery.config().clone(),
			discovery,
			store,
			logger: Logger::default(),
			refresh_guards: Default::default(),
		}
	}

	/// Routes this manager's events to `logger`.
	pub fn with_logger(mut self, logger: Logger) -> Self {
		self.logger = logger;

		self
	}

	/// Discovery manager backing endpoint and key lookups.
	pub fn discovery(&self) -> &Arc<DiscoveryManager<C, M>> {
		&self.discovery
	}

	/// Store receiving validated token sets.
	pub fn store(&self) -> &Arc<dyn TokenStore> {
		&self.store
	}

	/// Redeems an authorization code at the discovered token endpoint.
	pub async fn exchange_authorization_code(&self, code: &str) -> Result<TokenSet> {
		let fut = obs::observe(FlowKind::AuthorizationCode, "exchange_authorization_code", async {
			let facade = self.facade().await?;
			let tokens = facade
				.exchange_authorization_code(
					code,
					self.config.scopes(),
					self.config.login_redirect_uri(),
				)
				.await?;

			debug!(expires_in = tokens.expires_in, "Authorization code redeemed.");

			Ok::<_, Error>(tokens)
		});

		self.logger.attach(fut).await
	}

	/// Redeems a refresh token; the old refresh token is kept if the provider does not rotate it.
	pub async fn refresh_access_token(&self, refresh_token: &TokenSecret) -> Result<TokenSet> {
		let fut = obs::observe(FlowKind::Refresh, "refresh_access_token", async {
			let facade = self.facade().await?;
			let tokens = facade.refresh_token(refresh_token).await?;

			debug!(expires_in = tokens.expires_in, "Refresh token redeemed.");

			Ok::<_, Error>(tokens)
		});

		self.logger.attach(fut).await
	}

	/// Verifies the set's ID token against the tenant-scoped issuer and published keys.
	///
	/// Checks run in order: presence, `typ`, algorithm allow-list, `kid`/`tid` presence,
	/// signing key lookup, then signature with audience, issuer, and lifetime.
	pub async fn validate_id_token(&self, tokens: &TokenSet) -> Result<Principal> {
		let fut = obs::observe(FlowKind::IdTokenValidation, "validate_id_token", async {
			let token =
				tokens.id_token.as_ref().ok_or(ValidationError::IdTokenMissing)?.expose();
			let unverified =
				UnverifiedIdToken::inspect(token, self.config.allowed_algorithms())?;
			let document = self.discovery.get_configuration().await?;
			let expected_issuer = document.expected_issuer(&unverified.tenant_id);
			let keys = self.discovery.get_signing_keys().await?;
			let key = keys.find(&unverified.key_id).ok_or_else(|| {
				ValidationError::SigningKeyNotFound { kid: unverified.key_id.clone() }
			})?;
			let principal = unverified.verify(
				token,
				key,
				self.config.app_id(),
				&expected_issuer,
				self.config.leeway_secs(),
			)?;

			debug!(subject = %principal.subject_id, "ID token verified.");

			Ok::<_, Error>(principal)
		});

		self.logger.attach(fut).await
	}

	/// Exchanges `code`, validates the resulting ID token, and persists the set.
	pub async fn add_tokens_from_code(&self, code: &str) -> Result<Principal> {
		let tokens = self.exchange_authorization_code(code).await?;
		let principal = self.validate_id_token(&tokens).await?;

		self.store.set(&principal, tokens).await?;
		self.logger
			.attach(async { info!(principal = %principal, "Stored tokens for user.") })
			.await;

		Ok(principal)
	}

	/// Returns a usable access token for `user_id`, refreshing an expired one when possible.
	///
	/// Resolves to `Ok(None)` without any network call when nothing is stored, and to
	/// `Ok(None)` when the stored access token has expired and no refresh token is available.
	/// A set without a known expiry counts as unexpired.
	pub async fn get_access_token(&self, user_id: &UserId) -> Result<Option<TokenSecret>> {
		let Some(current) = self.store.get(user_id).await? else {
			return Ok(None);
		};

		if let Some(access_token) = current.live_access_token_at(OffsetDateTime::now_utc()) {
			return Ok(Some(access_token.clone()));
		}
		if current.refresh_token.is_none() {
			return Ok(None);
		}

		let guard = self.refresh_guard(user_id);
		let _singleflight = guard.lock().await;
		// Another caller may have refreshed while this one waited.
		let Some(current) = self.store.get(user_id).await? else {
			return Ok(None);
		};

		if let Some(access_token) = current.live_access_token_at(OffsetDateTime::now_utc()) {
			return Ok(Some(access_token.clone()));
		}

		let Some(refresh_token) = current.refresh_token else {
			return Ok(None);
		};
		let tokens = self.refresh_access_token(&refresh_token).await?;
		let principal = self.validate_id_token(&tokens).await?;
		let access_token = tokens.access_token.clone();

		self.store.set(&principal, tokens).await?;

		Ok(access_token)
	}

	async fn facade(&self) -> Result<TokenFacade<C, M>> {
		let document = self.discovery.get_configuration().await?;
		let facade = TokenFacade::new(
			self.config.app_id(),
			self.config.app_secret(),
			&document.token_endpoint,
			self.discovery.http_client().clone(),
			self.discovery.transport_mapper().clone(),
		)?;

		Ok(facade)
	}

	fn refresh_guard(&self, user_id: &UserId) -> Arc<AsyncMutex<()>> {
		let mut guards = self.refresh_guards.lock();

		guards.entry(user_id.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}
#[cfg(feature = "reqwest")]
impl TokenManager<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates the discovery manager and token manager pair over a fresh reqwest transport.
	pub fn with_config(config: Arc<AuthConfig>, store: Arc<dyn TokenStore>) -> Result<Self> {
		let discovery = crate::discovery::ReqwestDiscoveryManager::new(config)?;

		Ok(Self::new(Arc::new(discovery), store))
	}
}
impl<C, M> Debug for TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("app_id", &self.config.app_id())
			.field("discovery", &self.discovery)
			.field("logger", &self.logger)
			.finish()
	}
}
