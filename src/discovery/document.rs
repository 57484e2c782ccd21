//! Discovery metadata and signing key set models.

// crates.io
use serde_json::Value;
use tracing::debug;
// self
use crate::{_prelude::*, error::DiscoveryError};

/// Placeholder multi-tenant issuers carry in place of the tenant id.
pub const ISSUER_TENANT_PLACEHOLDER: &str = "{tenantid}";

/// Identity-provider metadata resolved from the discovery endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
	/// Endpoint the browser is sent to for sign-in.
	pub authorization_endpoint: Url,
	/// Endpoint accepting code and refresh grants.
	pub token_endpoint: Url,
	/// Issuer, possibly templated with `{tenantid}`.
	pub issuer: String,
	/// Signing key set location.
	#[serde(default)]
	pub jwks_uri: Option<Url>,
	/// RP-initiated sign-out endpoint, when advertised.
	#[serde(default)]
	pub end_session_endpoint: Option<Url>,
}
impl DiscoveryDocument {
	/// Issuer an ID token from tenant `tid` must carry.
	pub fn expected_issuer(&self, tid: &str) -> String {
		self.issuer.replace(ISSUER_TENANT_PLACEHOLDER, tid)
	}
}

/// Signing certificate published in the provider's key set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKey {
	/// Key identifier (`kid`).
	pub key_id: String,
	/// Key type (`kty`), empty when absent.
	pub key_type: String,
	/// Intended use (`use`), when declared.
	pub public_key_use: Option<String>,
	/// Issuer the key is bound to, when declared.
	pub issuer: Option<String>,
	/// First certificate of the `x5c` chain, base64 DER.
	pub certificate: String,
}

/// Signing keys from one key set fetch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKeySet {
	keys: Vec<SigningKey>,
}
impl SigningKeySet {
	/// Parses a JWKS body, skipping entries without a `kid` or certificate.
	pub fn from_jwks(body: &Value) -> Result<Self, DiscoveryError> {
		let entries =
			body.get("keys").and_then(Value::as_array).ok_or(DiscoveryError::InvalidKeySetFormat)?;
		let keys = entries
			.iter()
			.enumerate()
			.filter_map(|(index, entry)| {
				let key = RawSigningKey::deserialize(entry)
					.ok()
					.and_then(RawSigningKey::into_signing_key);

				if key.is_none() {
					debug!(index, "Skipping key set entry without a kid or certificate.");
				}

				key
			})
			.collect();

		Ok(Self { keys })
	}

	/// Returns the first key whose id equals `kid`.
	pub fn find(&self, kid: &str) -> Option<&SigningKey> {
		self.keys.iter().find(|key| key.key_id == kid)
	}

	/// Iterates over the keys in publication order.
	pub fn iter(&self) -> impl Iterator<Item = &SigningKey> {
		self.keys.iter()
	}

	/// Number of usable keys.
	pub fn len(&self) -> usize {
		self.keys.len()
	}

	/// Returns `true` when no usable key was published.
	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}
}
impl FromIterator<SigningKey> for SigningKeySet {
	fn from_iter<I: IntoIterator<Item = SigningKey>>(iter: I) -> Self {
		Self { keys: iter.into_iter().collect() }
	}
}

#[derive(Deserialize)]
struct RawSigningKey {
	kid: Option<String>,
	#[serde(default)]
	kty: String,
	#[serde(rename = "use")]
	key_use: Option<String>,
	issuer: Option<String>,
	#[serde(default)]
	x5c: Vec<String>,
}
impl RawSigningKey {
	fn into_signing_key(self) -> Option<SigningKey> {
		let key_id = self.kid.filter(|kid| !kid.is_empty())?;
		let certificate = self.x5c.into_iter().next().filter(|cert| !cert.is_empty())?;

		Some(SigningKey {
			key_id,
			key_type: self.kty,
			public_key_use: self.key_use,
			issuer: self.issuer,
			certificate,
		})
	}
}
