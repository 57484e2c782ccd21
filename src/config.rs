//! Validated configuration shared by discovery, token, and flow components.
//!
//! [`AuthConfig`] is immutable once built. Build it with [`AuthConfig::builder`] or from a
//! serde-friendly [`AuthSettings`] document (for example one read from a JSON file); both go
//! through the same validation and fail fast with [`ConfigError`].

pub mod builder;

pub use builder::*;

// crates.io
use jsonwebtoken::Algorithm;
// self
use crate::{
	_prelude::*,
	auth::{TenantId, TokenSecret},
	error::ConfigError,
};

/// Placeholder substituted with the tenant in URI templates.
pub const TENANT_PLACEHOLDER: &str = "{tenant}";
/// Tenant used when none is configured.
pub const DEFAULT_TENANT: &str = "common";
/// Default OpenID Connect discovery document template.
pub const DEFAULT_DISCOVERY_URI_TEMPLATE: &str =
	"https://login.microsoftonline.com/{tenant}/v2.0/.well-known/openid-configuration";
/// Default admin-consent endpoint template.
pub const DEFAULT_ADMIN_CONSENT_URI_TEMPLATE: &str =
	"https://login.microsoftonline.com/{tenant}/adminconsent";
/// Default TTL for both cached discovery entries, in milliseconds (24 hours).
pub const DEFAULT_CACHE_TTL_MS: u64 = 86_400_000;
/// Default bound on every outbound HTTP call, in milliseconds.
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;
/// Default clock skew tolerated when checking ID token lifetimes, in seconds.
pub const DEFAULT_LEEWAY_SECS: u64 = 60;

/// Paths the host router mounts the flow endpoints on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointPaths {
	/// Starts the admin-consent flow.
	pub admin_consent: String,
	/// Receives the admin-consent response.
	pub admin_token: String,
	/// Starts the user sign-in flow.
	pub login: String,
	/// Receives the authorization code.
	pub token: String,
	/// Reserved for the host's sign-out handler.
	pub logout: String,
}
impl Default for EndpointPaths {
	fn default() -> Self {
		Self {
			admin_consent: "/adminconsent".into(),
			admin_token: "/admintoken".into(),
			login: "/login".into(),
			token: "/token".into(),
			logout: "/logout".into(),
		}
	}
}

/// Validated configuration for every component in the crate.
#[derive(Clone, Debug)]
pub struct AuthConfig {
	pub(crate) app_id: String,
	pub(crate) app_secret: TokenSecret,
	pub(crate) root_uri: Url,
	pub(crate) scopes: Vec<String>,
	pub(crate) tenant: TenantId,
	pub(crate) discovery_uri_template: String,
	pub(crate) admin_consent_uri_template: String,
	pub(crate) paths: EndpointPaths,
	pub(crate) config_ttl: Duration,
	pub(crate) keys_ttl: Duration,
	pub(crate) http_timeout: Duration,
	pub(crate) allowed_algorithms: Vec<Algorithm>,
	pub(crate) leeway_secs: u64,
	pub(crate) cookie_secret: TokenSecret,
	pub(crate) login_redirect_uri: Url,
	pub(crate) admin_consent_redirect_uri: Url,
}
impl AuthConfig {
	/// Starts a builder from the three settings that have no default.
	pub fn builder(
		app_id: impl Into<String>,
		app_secret: impl Into<String>,
		root_uri: impl Into<String>,
	) -> AuthConfigBuilder {
		AuthConfigBuilder::new(app_id, app_secret, root_uri)
	}

	/// Parses and validates a JSON settings document.
	pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
		AuthSettings::from_json_str(json)?.try_into()
	}

	/// Application (client) identifier; also the expected ID token audience.
	pub fn app_id(&self) -> &str {
		&self.app_id
	}

	/// Application (client) secret.
	pub fn app_secret(&self) -> &TokenSecret {
		&self.app_secret
	}

	/// Public root URI of the service.
	pub fn root_uri(&self) -> &Url {
		&self.root_uri
	}

	/// Requested scopes, in configured order.
	pub fn scopes(&self) -> &[String] {
		&self.scopes
	}

	/// Tenant substituted into URI templates.
	pub fn tenant(&self) -> &TenantId {
		&self.tenant
	}

	/// Endpoint paths.
	pub fn paths(&self) -> &EndpointPaths {
		&self.paths
	}

	/// TTL of the cached discovery document.
	pub fn config_ttl(&self) -> Duration {
		self.config_ttl
	}

	/// TTL of the cached signing key set.
	pub fn keys_ttl(&self) -> Duration {
		self.keys_ttl
	}

	/// Bound applied to every outbound HTTP call.
	pub fn http_timeout(&self) -> Duration {
		self.http_timeout
	}

	/// ID token signature algorithms accepted by validation.
	pub fn allowed_algorithms(&self) -> &[Algorithm] {
		&self.allowed_algorithms
	}

	/// Clock skew tolerated when checking token lifetimes, in seconds.
	pub fn leeway_secs(&self) -> u64 {
		self.leeway_secs
	}

	/// Key used to sign the state cookie.
	pub fn cookie_secret(&self) -> &TokenSecret {
		&self.cookie_secret
	}

	/// Redirect URI registered for the sign-in flow (root URI + token path).
	pub fn login_redirect_uri(&self) -> &Url {
		&self.login_redirect_uri
	}

	/// Redirect URI registered for the admin-consent flow (root URI + admin-token path).
	pub fn admin_consent_redirect_uri(&self) -> &Url {
		&self.admin_consent_redirect_uri
	}

	/// Discovery document URI for the configured tenant.
	pub fn discovery_uri(&self) -> String {
		substitute_tenant(&self.discovery_uri_template, &self.tenant)
	}

	/// Admin-consent URI for the configured tenant.
	pub fn admin_consent_uri(&self) -> String {
		substitute_tenant(&self.admin_consent_uri_template, &self.tenant)
	}
}
impl TryFrom<AuthSettings> for AuthConfig {
	type Error = ConfigError;

	fn try_from(settings: AuthSettings) -> Result<Self, Self::Error> {
		AuthConfigBuilder::from(settings).build()
	}
}

/// Serde-friendly, unvalidated configuration document.
///
/// Every field except `app_id`, `app_secret`, and `root_uri` has a default, so a minimal
/// document only names those three.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
	/// Application (client) identifier.
	pub app_id: String,
	/// Application (client) secret.
	pub app_secret: String,
	/// Public root URI of the service.
	pub root_uri: String,
	/// Requested scopes, in order.
	pub scopes: Vec<String>,
	/// Tenant substituted into URI templates.
	pub tenant: String,
	/// Discovery document URI template containing `{tenant}`.
	pub discovery_uri_template: String,
	/// Admin-consent URI template containing `{tenant}`.
	pub admin_consent_uri_template: String,
	/// Endpoint paths.
	pub paths: EndpointPaths,
	/// Discovery document TTL in milliseconds.
	pub config_ttl_ms: u64,
	/// Signing key set TTL in milliseconds.
	pub keys_ttl_ms: u64,
	/// Outbound HTTP timeout in milliseconds.
	pub http_timeout_ms: u64,
	/// Accepted ID token signature algorithms.
	pub allowed_algorithms: Vec<Algorithm>,
	/// Clock skew tolerated when checking token lifetimes, in seconds.
	pub leeway_secs: u64,
	/// State cookie signing key; falls back to the application secret.
	pub cookie_secret: Option<String>,
}
impl AuthSettings {
	/// Parses a JSON settings document, reporting the path of any offending field.
	pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
		let mut deserializer = serde_json::Deserializer::from_str(json);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| ConfigError::Settings { source })
	}
}
impl Default for AuthSettings {
	fn default() -> Self {
		Self {
			app_id: String::new(),
			app_secret: String::new(),
			root_uri: String::new(),
			scopes: ["openid", "profile", "offline_access"].map(String::from).to_vec(),
			tenant: DEFAULT_TENANT.into(),
			discovery_uri_template: DEFAULT_DISCOVERY_URI_TEMPLATE.into(),
			admin_consent_uri_template: DEFAULT_ADMIN_CONSENT_URI_TEMPLATE.into(),
			paths: EndpointPaths::default(),
			config_ttl_ms: DEFAULT_CACHE_TTL_MS,
			keys_ttl_ms: DEFAULT_CACHE_TTL_MS,
			http_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
			allowed_algorithms: vec![Algorithm::RS256],
			leeway_secs: DEFAULT_LEEWAY_SECS,
			cookie_secret: None,
		}
	}
}

pub(crate) fn substitute_tenant(template: &str, tenant: &str) -> String {
	template.replace(TENANT_PLACEHOLDER, tenant)
}
