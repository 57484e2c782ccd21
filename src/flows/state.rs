//! CSRF state generation and the signed state cookie.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
// self
use crate::{_prelude::*, auth::TokenSecret, error::ConfigError};

/// Cookie carrying the signed state between redirect and return.
pub const STATE_COOKIE_NAME: &str = "authstate";

const STATE_BYTES: usize = 48;

type HmacSha256 = Hmac<Sha256>;

/// Unguessable value tying an authorization redirect to its return.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthState(String);
impl AuthState {
	/// Draws 48 bytes from the thread-local CSPRNG and encodes them as base64url.
	pub fn generate() -> Self {
		let mut bytes = [0_u8; STATE_BYTES];

		rand::rng().fill(&mut bytes);

		Self(URL_SAFE_NO_PAD.encode(bytes))
	}

	/// Encoded state as sent in the `state` parameter.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Debug for AuthState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("AuthState(..)")
	}
}

/// Signs state values into cookies and checks returned cookies against them.
#[derive(Clone)]
pub(crate) struct StateCookieSigner {
	keyed: HmacSha256,
	secure: bool,
}
impl StateCookieSigner {
	pub(crate) fn new(secret: &TokenSecret, secure: bool) -> Result<Self, ConfigError> {
		let keyed = <HmacSha256 as Mac>::new_from_slice(secret.expose().as_bytes())
			.map_err(|_| ConfigError::CookieSecret)?;

		Ok(Self { keyed, secure })
	}

	/// `Set-Cookie` value storing `state` with its signature.
	pub(crate) fn issue(&self, state: &AuthState) -> String {
		let signature = URL_SAFE_NO_PAD.encode(self.mac(state.as_str()).finalize().into_bytes());

		self.cookie(&format!("{}.{signature}", state.as_str()), None)
	}

	/// `Set-Cookie` value expiring the state cookie.
	pub(crate) fn clear(&self) -> String {
		self.cookie("", Some(0))
	}

	/// Returns `true` when `cookie_value` carries a valid signature over `returned_state`.
	pub(crate) fn verify(&self, cookie_value: &str, returned_state: &str) -> bool {
		let Some((state, signature)) = cookie_value.split_once('.') else {
			return false;
		};
		let Ok(signature) = URL_SAFE_NO_PAD.decode(signature) else {
			return false;
		};

		if self.mac(state).verify_slice(&signature).is_err() {
			return false;
		}

		state.as_bytes() == returned_state.as_bytes()
	}

	fn mac(&self, state: &str) -> HmacSha256 {
		let mut mac = self.keyed.clone();

		mac.update(state.as_bytes());

		mac
	}

	fn cookie(&self, value: &str, max_age: Option<u32>) -> String {
		let mut cookie = format!("{STATE_COOKIE_NAME}={value}; Path=/");

		if let Some(max_age) = max_age {
			cookie.push_str(&format!("; Max-Age={max_age}"));
		}

		cookie.push_str("; HttpOnly; SameSite=Lax");

		if self.secure {
			cookie.push_str("; Secure");
		}

		cookie
	}
}
impl Debug for StateCookieSigner {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StateCookieSigner").field("secure", &self.secure).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn signer(secure: bool) -> StateCookieSigner {
		StateCookieSigner::new(&TokenSecret::new("cookie-secret"), secure)
			.expect("Any secret should be a usable HMAC key.")
	}

	fn cookie_value(set_cookie: &str) -> &str {
		set_cookie
			.split(';')
			.next()
			.and_then(|pair| pair.strip_prefix("authstate="))
			.expect("Set-Cookie should start with the state cookie.")
	}

	#[test]
	fn states_are_long_and_unique() {
		let first = AuthState::generate();
		let second = AuthState::generate();

		assert_eq!(first.as_str().len(), 64);
		assert!(
			first.as_str().bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
		);
		assert_ne!(first, second);
		assert_eq!(format!("{first:?}"), "AuthState(..)");
	}

	#[test]
	fn issued_cookie_verifies_only_against_its_state() {
		let signer = signer(false);
		let state = AuthState::generate();
		let set_cookie = signer.issue(&state);
		let value = cookie_value(&set_cookie);

		assert!(set_cookie.ends_with("; Path=/; HttpOnly; SameSite=Lax"));
		assert!(signer.verify(value, state.as_str()));
		assert!(!signer.verify(value, AuthState::generate().as_str()));
		assert!(!signer.verify(state.as_str(), state.as_str()));
	}

	#[test]
	fn tampered_or_foreign_cookies_are_rejected() {
		let state = AuthState::generate();
		let value = cookie_value(&signer(false).issue(&state)).to_owned();
		let (_, signature) = value.split_once('.').expect("Cookie value should be signed.");
		let forged = format!("{}.{signature}", AuthState::generate().as_str());
		let other = StateCookieSigner::new(&TokenSecret::new("other-secret"), false)
			.expect("Any secret should be a usable HMAC key.");

		assert!(!signer(false).verify(&forged, forged.split('.').next().unwrap_or_default()));
		assert!(!other.verify(&value, state.as_str()));
		assert!(!signer(false).verify(&format!("{}.not base64!", state.as_str()), state.as_str()));
	}

	#[test]
	fn secure_flag_follows_the_scheme_and_clear_expires() {
		let signer = signer(true);

		assert!(signer.issue(&AuthState::generate()).ends_with("; Secure"));
		assert_eq!(
			signer.clear(),
			"authstate=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax; Secure"
		);
	}
}
