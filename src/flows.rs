//! Browser-facing admin-consent and sign-in flows.
//!
//! [`AuthFlowController`] turns the four flow endpoints into framework-agnostic
//! [`AuthResponse`] values. Hosts mount [`AuthFlowController::routes`] on their router, wrap each
//! browser request in an [`AuthRequest`], and write the response back.
//!
//! Every redirect plants a signed `authstate` cookie; returns are rejected with `400` unless the
//! cookie's signature verifies and its state equals the returned `state` parameter.

pub mod events;
pub mod request;
pub mod response;
pub mod state;

pub use events::*;
pub use request::*;
pub use response::*;
pub use state::{AuthState, STATE_COOKIE_NAME};

// crates.io
use tracing::{debug, error, info, warn};
// self
use crate::{
	_prelude::*,
	config::AuthConfig,
	discovery::DiscoveryManager,
	flows::state::StateCookieSigner,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, Logger},
	tokens::TokenManager,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

/// Flow controller specialized for the crate's default reqwest transport stack.
#[cfg(feature = "reqwest")]
pub type ReqwestAuthFlowController =
	AuthFlowController<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Flow endpoints a host router mounts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
	/// Starts admin consent.
	AdminConsent,
	/// Receives the admin-consent response.
	AdminToken,
	/// Starts user sign-in.
	Login,
	/// Receives the authorization code.
	Token,
}
impl Endpoint {
	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Endpoint::AdminConsent => "admin_consent",
			Endpoint::AdminToken => "admin_token",
			Endpoint::Login => "login",
			Endpoint::Token => "token",
		}
	}

	const fn is_return(self) -> bool {
		matches!(self, Endpoint::AdminToken | Endpoint::Token)
	}
}
impl Display for Endpoint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Drives admin consent and user sign-in on top of discovery and token management.
pub struct AuthFlowController<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	config: Arc<AuthConfig>,
	discovery: Arc<DiscoveryManager<C, M>>,
	tokens: Arc<TokenManager<C, M>>,
	events: Arc<dyn AuthEvents>,
	signer: StateCookieSigner,
	logger: Logger,
}
impl<C, M> AuthFlowController<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a controller over `tokens` and its discovery manager.
	///
	/// The state cookie is marked `Secure` when the configured root URI uses HTTPS.
	pub fn new(tokens: Arc<TokenManager<C, M>>) -> Result<Self> {
		let discovery = tokens.discovery().clone();
		let config = discovery.config().clone();
		let signer =
			StateCookieSigner::new(config.cookie_secret(), config.root_uri().scheme() == "https")?;

		Ok(Self {
			config,
			discovery,
			tokens,
			events: Arc::new(NoopEvents),
			signer,
			logger: Logger::default(),
		})
	}

	/// Sends flow completions to `events`.
	pub fn with_events(mut self, events: Arc<dyn AuthEvents>) -> Self {
		self.events = events;

		self
	}

	/// Routes this controller's events to `logger`.
	pub fn with_logger(mut self, logger: Logger) -> Self {
		self.logger = logger;

		self
	}

	/// Token manager persisting signed-in users.
	pub fn tokens(&self) -> &Arc<TokenManager<C, M>> {
		&self.tokens
	}

	/// Paths to mount, paired with the endpoint each one serves.
	pub fn routes(&self) -> [(&str, Endpoint); 4] {
		let paths = self.config.paths();

		[
			(paths.admin_consent.as_str(), Endpoint::AdminConsent),
			(paths.admin_token.as_str(), Endpoint::AdminToken),
			(paths.login.as_str(), Endpoint::Login),
			(paths.token.as_str(), Endpoint::Token),
		]
	}

	/// Runs `endpoint` and renders failures as error responses.
	///
	/// Failed returns also expire the state cookie. Client-side failures are logged at `warn`,
	/// server-side ones at `error`, both with their full source chain.
	pub async fn handle(&self, endpoint: Endpoint, request: &AuthRequest) -> AuthResponse {
		let result = match endpoint {
			Endpoint::AdminConsent => self.admin_consent_redirect().await,
			Endpoint::AdminToken => self.admin_consent_return(request).await,
			Endpoint::Login => self.login_redirect().await,
			Endpoint::Token => self.token_return(request).await,
		};

		match result {
			Ok(response) => response,
			Err(e) => {
				let status = e.status_code();
				let chain = source_chain(&e);

				self.logger
					.attach(async {
						if status >= 500 {
							error!(%endpoint, status, error = %chain, "Flow endpoint failed.");
						} else {
							warn!(%endpoint, status, error = %chain, "Flow request rejected.");
						}
					})
					.await;

				AuthResponse::from_error(&e, endpoint.is_return().then(|| self.signer.clear()))
			},
		}
	}

	/// Redirects an administrator to the tenant's consent page.
	pub async fn admin_consent_redirect(&self) -> Result<AuthResponse> {
		let fut = obs::observe(FlowKind::AdminConsent, "admin_consent_redirect", async {
			let state = AuthState::generate();
			let location = append_query(self.discovery.admin_consent_uri()?, &[
				("client_id", self.config.app_id()),
				("redirect_uri", self.config.admin_consent_redirect_uri().as_str()),
				("state", state.as_str()),
			]);

			debug!(location = location.as_str(), "Redirecting to admin consent.");

			let set_cookie = self.signer.issue(&state);

			Ok::<_, Error>(AuthResponse::Redirect { location, set_cookie })
		});

		self.logger.attach(fut).await
	}

	/// Completes admin consent and notifies [`AuthEvents::on_admin_consent`].
	pub async fn admin_consent_return(&self, request: &AuthRequest) -> Result<AuthResponse> {
		let fut = obs::observe(FlowKind::AdminConsent, "admin_consent_return", async {
			self.check_state(request)?;
			check_provider_error(request)?;

			let tenant = request.param("tenant");

			info!(tenant, "Administrator consent granted.");
			self.events.on_admin_consent(tenant);

			Ok::<_, Error>(AuthResponse::ClosePopup { set_cookie: self.signer.clear() })
		});

		self.logger.attach(fut).await
	}

	/// Redirects a user to the discovered authorization endpoint.
	pub async fn login_redirect(&self) -> Result<AuthResponse> {
		let fut = obs::observe(FlowKind::Login, "login_redirect", async {
			let document = self.discovery.get_configuration().await?;
			let state = AuthState::generate();
			let scope = self.config.scopes().join(" ");
			let location = append_query(document.authorization_endpoint.clone(), &[
				("response_type", "code"),
				("client_id", self.config.app_id()),
				("redirect_uri", self.config.login_redirect_uri().as_str()),
				("state", state.as_str()),
				("scope", &scope),
			]);

			debug!(location = location.as_str(), "Redirecting to sign-in.");

			let set_cookie = self.signer.issue(&state);

			Ok::<_, Error>(AuthResponse::Redirect { location, set_cookie })
		});

		self.logger.attach(fut).await
	}

	/// Redeems the returned code, stores the user's tokens, and notifies
	/// [`AuthEvents::on_login`].
	pub async fn token_return(&self, request: &AuthRequest) -> Result<AuthResponse> {
		let fut = obs::observe(FlowKind::Login, "token_return", async {
			self.check_state(request)?;
			check_provider_error(request)?;

			let code =
				request.param("code").filter(|code| !code.is_empty()).ok_or(Error::MissingCode)?;
			let principal = self.tokens.add_tokens_from_code(code).await?;

			info!(principal = %principal, "User signed in.");
			self.events.on_login(&principal);

			Ok::<_, Error>(AuthResponse::ClosePopup { set_cookie: self.signer.clear() })
		});

		self.logger.attach(fut).await
	}

	/// `Set-Cookie` value expiring the state cookie, for the host's sign-out handler.
	pub fn clear_state_cookie(&self) -> String {
		self.signer.clear()
	}

	fn check_state(&self, request: &AuthRequest) -> Result<()> {
		match (request.cookie(STATE_COOKIE_NAME), request.param("state")) {
			(Some(cookie), Some(state)) if self.signer.verify(cookie, state) => Ok(()),
			_ => Err(Error::CsrfMismatch),
		}
	}
}
#[cfg(feature = "reqwest")]
impl AuthFlowController<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Builds the discovery manager, token manager, and controller over one reqwest transport.
	pub fn with_config(
		config: Arc<AuthConfig>,
		store: Arc<dyn crate::store::TokenStore>,
	) -> Result<Self> {
		Self::new(Arc::new(TokenManager::with_config(config, store)?))
	}
}
impl<C, M> Debug for AuthFlowController<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthFlowController")
			.field("paths", self.config.paths())
			.field("tokens", &self.tokens)
			.field("signer", &self.signer)
			.field("logger", &self.logger)
			.finish()
	}
}

fn check_provider_error(request: &AuthRequest) -> Result<()> {
	match request.param("error") {
		Some(error) => Err(Error::Provider {
			error: error.to_owned(),
			description: request.param("error_description").map(str::to_owned),
		}),
		None => Ok(()),
	}
}

/// Appends `params` to `uri`, encoding spaces as `%20` rather than `+`.
fn append_query(mut uri: Url, params: &[(&str, &str)]) -> Url {
	let encoded = url::form_urlencoded::Serializer::new(String::new())
		.extend_pairs(params)
		.finish()
		.replace('+', "%20");
	let query = match uri.query() {
		Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
		_ => encoded,
	};

	uri.set_query(Some(&query));

	uri
}

fn source_chain(error: &(dyn StdError + 'static)) -> String {
	let mut chain = error.to_string();
	let mut source = error.source();

	while let Some(cause) = source {
		chain.push_str(": ");
		chain.push_str(&cause.to_string());
		source = cause.source();
	}

	chain
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn scopes_are_encoded_with_percent_twenty() {
		let base =
			Url::parse("https://idp.test/authorize").expect("Base URI fixture should parse.");
		let uri = append_query(base, &[
			("scope", "openid profile offline_access"),
			("redirect_uri", "https://bot.example.com/token"),
			("state", "a+b"),
		]);

		assert_eq!(
			uri.query(),
			Some(
				"scope=openid%20profile%20offline_access\
				&redirect_uri=https%3A%2F%2Fbot.example.com%2Ftoken&state=a%2Bb"
			)
		);
	}

	#[test]
	fn existing_query_parameters_are_kept() {
		let base = Url::parse("https://idp.test/authorize?p=sign_in")
			.expect("Base URI fixture should parse.");
		let uri = append_query(base, &[("client_id", "app")]);

		assert_eq!(uri.query(), Some("p=sign_in&client_id=app"));
	}

	#[test]
	fn provider_errors_carry_their_description() {
		let request = AuthRequest::new("error=access_denied&error_description=Denied", None);

		assert!(matches!(
			check_provider_error(&request),
			Err(Error::Provider { ref error, description: Some(ref description) })
				if error == "access_denied" && description == "Denied"
		));
		assert!(check_provider_error(&AuthRequest::new("code=c", None)).is_ok());
	}

	#[test]
	fn source_chains_include_every_cause() {
		let error = Error::from(crate::error::DiscoveryError::Fetch {
			document: "discovery document",
			uri: "https://idp.test/.well-known/openid-configuration".into(),
			source: crate::error::TransportError::Timeout { endpoint: "discovery document" },
		});
		let chain = source_chain(&error);

		assert!(chain.contains("idp.test"));
		assert!(chain.matches(": ").count() >= 1);
	}
}
