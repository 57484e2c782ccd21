//! Token sets returned by the token endpoint and their expiry bookkeeping.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Tokens issued by a single code or refresh exchange.
///
/// `expires_at` is stamped once when the set is built (issue instant plus `expires_in`)
/// and never recomputed afterwards, so a persisted set keeps its original deadline.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
	/// Access token presented to resource APIs.
	pub access_token: Option<TokenSecret>,
	/// Refresh token used to mint new access tokens.
	pub refresh_token: Option<TokenSecret>,
	/// OpenID Connect ID token describing the signed-in user.
	pub id_token: Option<TokenSecret>,
	/// Lifetime in seconds reported by the provider.
	pub expires_in: Option<i64>,
	/// Absolute expiry derived from `expires_in` at construction time.
	pub expires_at: Option<OffsetDateTime>,
}
impl TokenSet {
	/// Returns a builder for assembling token sets.
	pub fn builder() -> TokenSetBuilder {
		TokenSetBuilder::default()
	}

	/// Returns `true` when an expiry is known and has been reached at `instant`.
	///
	/// A set without `expires_at` never reports itself as expired.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.expires_at, Some(expires_at) if expires_at <= instant)
	}

	/// Returns the access token when one is present and unexpired at `instant`.
	pub fn live_access_token_at(&self, instant: OffsetDateTime) -> Option<&TokenSecret> {
		self.access_token.as_ref().filter(|_| !self.is_expired_at(instant))
	}
}
impl Debug for TokenSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenSet")
			.field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
			.field("expires_in", &self.expires_in)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`TokenSet`].
#[derive(Clone, Debug, Default)]
pub struct TokenSetBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	id_token: Option<TokenSecret>,
	expires_in: Option<i64>,
	issued_at: Option<OffsetDateTime>,
}
impl TokenSetBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the ID token value.
	pub fn id_token(mut self, token: impl Into<String>) -> Self {
		self.id_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the provider-reported lifetime in seconds.
	pub fn expires_in(mut self, seconds: i64) -> Self {
		self.expires_in = Some(seconds);

		self
	}

	/// Overrides the issue instant (defaults to the current clock at build time).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Consumes the builder, stamping `expires_at` from `expires_in`.
	///
	/// A lifetime that lands outside the representable date range leaves `expires_at` unset.
	pub fn build(self) -> TokenSet {
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at =
			self.expires_in.and_then(|seconds| issued_at.checked_add(Duration::seconds(seconds)));

		TokenSet {
			access_token: self.access_token,
			refresh_token: self.refresh_token,
			id_token: self.id_token,
			expires_in: self.expires_in,
			expires_at,
		}
	}
}
