//! Fluent builder that validates [`AuthConfig`] instances.

// crates.io
use jsonwebtoken::Algorithm;
// self
use crate::{
	_prelude::*,
	auth::{TenantId, TokenSecret},
	config::{AuthConfig, AuthSettings, EndpointPaths, TENANT_PLACEHOLDER, substitute_tenant},
	error::ConfigError,
};

/// Builder for [`AuthConfig`].
///
/// Every setter is infallible; [`build`](Self::build) runs all checks at once.
#[derive(Clone, Debug)]
pub struct AuthConfigBuilder {
	settings: AuthSettings,
}
impl AuthConfigBuilder {
	/// Creates a builder with defaults for everything but the required fields.
	pub fn new(
		app_id: impl Into<String>,
		app_secret: impl Into<String>,
		root_uri: impl Into<String>,
	) -> Self {
		Self {
			settings: AuthSettings {
				app_id: app_id.into(),
				app_secret: app_secret.into(),
				root_uri: root_uri.into(),
				..Default::default()
			},
		}
	}

	/// Replaces the requested scopes.
	pub fn scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.settings.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}

	/// Sets the tenant substituted into URI templates.
	pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
		self.settings.tenant = tenant.into();

		self
	}

	/// Overrides the discovery document URI template.
	pub fn discovery_uri_template(mut self, template: impl Into<String>) -> Self {
		self.settings.discovery_uri_template = template.into();

		self
	}

	/// Overrides the admin-consent URI template.
	pub fn admin_consent_uri_template(mut self, template: impl Into<String>) -> Self {
		self.settings.admin_consent_uri_template = template.into();

		self
	}

	/// Overrides the endpoint paths.
	pub fn paths(mut self, paths: EndpointPaths) -> Self {
		self.settings.paths = paths;

		self
	}

	/// Sets the discovery document TTL.
	pub fn config_ttl(mut self, ttl: std::time::Duration) -> Self {
		self.settings.config_ttl_ms = saturating_millis(ttl);

		self
	}

	/// Sets the signing key set TTL.
	pub fn keys_ttl(mut self, ttl: std::time::Duration) -> Self {
		self.settings.keys_ttl_ms = saturating_millis(ttl);

		self
	}

	/// Sets the bound applied to every outbound HTTP call.
	pub fn http_timeout(mut self, timeout: std::time::Duration) -> Self {
		self.settings.http_timeout_ms = saturating_millis(timeout);

		self
	}

	/// Replaces the accepted ID token signature algorithms.
	pub fn allowed_algorithms(mut self, algorithms: impl IntoIterator<Item = Algorithm>) -> Self {
		self.settings.allowed_algorithms = algorithms.into_iter().collect();

		self
	}

	/// Sets the clock skew tolerated when checking token lifetimes.
	pub fn leeway_secs(mut self, leeway: u64) -> Self {
		self.settings.leeway_secs = leeway;

		self
	}

	/// Uses a dedicated key for signing the state cookie.
	pub fn cookie_secret(mut self, secret: impl Into<String>) -> Self {
		self.settings.cookie_secret = Some(secret.into());

		self
	}

	/// Validates the settings and produces an [`AuthConfig`].
	pub fn build(self) -> Result<AuthConfig, ConfigError> {
		let AuthSettings {
			app_id,
			app_secret,
			root_uri,
			scopes,
			tenant,
			discovery_uri_template,
			admin_consent_uri_template,
			paths,
			config_ttl_ms,
			keys_ttl_ms,
			http_timeout_ms,
			allowed_algorithms,
			leeway_secs,
			cookie_secret,
		} = self.settings;
		let app_id = app_id.trim().to_owned();

		if app_id.is_empty() {
			return Err(ConfigError::MissingApplicationId);
		}
		if app_secret.is_empty() {
			return Err(ConfigError::MissingApplicationSecret);
		}

		let root = root_uri.trim().trim_end_matches('/').to_owned();
		let root_uri = parse_uri("root", &root)?;

		if let Some(scope) =
			scopes.iter().find(|scope| scope.is_empty() || scope.chars().any(char::is_whitespace))
		{
			return Err(ConfigError::InvalidScope { scope: scope.to_owned() });
		}

		let tenant = TenantId::new(tenant.trim())?;

		validate_template("discovery", &discovery_uri_template, &tenant)?;
		validate_template("admin-consent", &admin_consent_uri_template, &tenant)?;

		for (field, path) in [
			("admin-consent", &paths.admin_consent),
			("admin-token", &paths.admin_token),
			("login", &paths.login),
			("token", &paths.token),
			("logout", &paths.logout),
		] {
			if !path.starts_with('/') {
				return Err(ConfigError::InvalidPath { field, value: path.to_owned() });
			}
		}

		let config_ttl = positive_millis("config TTL", config_ttl_ms)?;
		let keys_ttl = positive_millis("keys TTL", keys_ttl_ms)?;
		let http_timeout = positive_millis("HTTP timeout", http_timeout_ms)?;

		if allowed_algorithms.is_empty() {
			return Err(ConfigError::EmptyAlgorithmAllowList);
		}

		let login_redirect_uri = parse_uri("login redirect", &format!("{root}{}", paths.token))?;
		let admin_consent_redirect_uri =
			parse_uri("admin-consent redirect", &format!("{root}{}", paths.admin_token))?;
		let cookie_secret = match cookie_secret {
			Some(secret) if secret.is_empty() => return Err(ConfigError::CookieSecret),
			Some(secret) => TokenSecret::new(secret),
			None => TokenSecret::new(app_secret.clone()),
		};

		Ok(AuthConfig {
			app_id,
			app_secret: TokenSecret::new(app_secret),
			root_uri,
			scopes,
			tenant,
			discovery_uri_template,
			admin_consent_uri_template,
			paths,
			config_ttl,
			keys_ttl,
			http_timeout,
			allowed_algorithms,
			leeway_secs,
			cookie_secret,
			login_redirect_uri,
			admin_consent_redirect_uri,
		})
	}
}
impl From<AuthSettings> for AuthConfigBuilder {
	fn from(settings: AuthSettings) -> Self {
		Self { settings }
	}
}

fn parse_uri(field: &'static str, value: &str) -> Result<Url, ConfigError> {
	Url::parse(value).map_err(|source| ConfigError::InvalidUri {
		field,
		value: value.to_owned(),
		source,
	})
}

fn validate_template(
	field: &'static str,
	template: &str,
	tenant: &TenantId,
) -> Result<(), ConfigError> {
	if !template.contains(TENANT_PLACEHOLDER) {
		return Err(ConfigError::MissingPlaceholder { field, placeholder: TENANT_PLACEHOLDER });
	}

	parse_uri(field, &substitute_tenant(template, tenant)).map(|_| ())
}

fn positive_millis(field: &'static str, millis: u64) -> Result<Duration, ConfigError> {
	if millis == 0 {
		return Err(ConfigError::NonPositiveDuration { field });
	}

	i64::try_from(millis)
		.map(Duration::milliseconds)
		.map_err(|_| ConfigError::NonPositiveDuration { field })
}

fn saturating_millis(duration: std::time::Duration) -> u64 {
	u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
