//! Responses the host writes back to the browser.

// self
use crate::_prelude::*;

const CLOSE_POPUP_HTML: &str = "<!DOCTYPE html><html><head><title>Signed in</title></head>\
<body><script>window.close();</script></body></html>";
const HTML: &str = "text/html; charset=utf-8";
const PLAIN_TEXT: &str = "text/plain; charset=utf-8";

/// Outcome of a flow endpoint, independent of any web framework.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthResponse {
	/// `302` to the identity provider, planting the state cookie.
	Redirect {
		/// Authorization or consent URI.
		location: Url,
		/// `Set-Cookie` header value.
		set_cookie: String,
	},
	/// `200` page that closes the sign-in popup, expiring the state cookie.
	ClosePopup {
		/// `Set-Cookie` header value.
		set_cookie: String,
	},
	/// Error status with a plain-text body.
	Error {
		/// HTTP status code.
		status: u16,
		/// Human-readable body.
		message: String,
		/// `Set-Cookie` header value, when the state cookie should be expired.
		set_cookie: Option<String>,
	},
}
impl AuthResponse {
	/// HTTP status code.
	pub fn status(&self) -> u16 {
		match self {
			Self::Redirect { .. } => 302,
			Self::ClosePopup { .. } => 200,
			Self::Error { status, .. } => *status,
		}
	}

	/// Header name/value pairs to send.
	pub fn headers(&self) -> Vec<(&'static str, String)> {
		match self {
			Self::Redirect { location, set_cookie } => vec![
				("Location", location.to_string()),
				("Set-Cookie", set_cookie.clone()),
				("Cache-Control", "no-store".into()),
			],
			Self::ClosePopup { set_cookie } => vec![
				("Content-Type", HTML.into()),
				("Set-Cookie", set_cookie.clone()),
				("Cache-Control", "no-store".into()),
			],
			Self::Error { set_cookie, .. } => {
				let mut headers = vec![("Content-Type", PLAIN_TEXT.into())];

				if let Some(set_cookie) = set_cookie {
					headers.push(("Set-Cookie", set_cookie.clone()));
				}

				headers
			},
		}
	}

	/// Response body; empty for redirects.
	pub fn body(&self) -> String {
		match self {
			Self::Redirect { .. } => String::new(),
			Self::ClosePopup { .. } => CLOSE_POPUP_HTML.into(),
			Self::Error { message, .. } => message.clone(),
		}
	}

	/// `Location` target of a redirect.
	pub fn location(&self) -> Option<&Url> {
		match self {
			Self::Redirect { location, .. } => Some(location),
			_ => None,
		}
	}

	pub(crate) fn from_error(error: &Error, set_cookie: Option<String>) -> Self {
		let message = match error.root() {
			Error::Provider { error, description: Some(description) } =>
				format!("{error}: {description}"),
			Error::Provider { error, description: None } => error.clone(),
			other if other.status_code() < 500 => other.to_string(),
			_ => "Sign-in could not be completed.".into(),
		};

		Self::Error { status: error.status_code(), message, set_cookie }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn redirects_carry_location_and_cookie() {
		let location = Url::parse("https://idp.test/authorize?state=s")
			.expect("Location fixture should parse.");
		let response =
			AuthResponse::Redirect { location: location.clone(), set_cookie: "authstate=x".into() };

		assert_eq!(response.status(), 302);
		assert_eq!(response.location(), Some(&location));
		assert!(response.headers().contains(&("Set-Cookie", "authstate=x".into())));
		assert!(response.body().is_empty());
	}

	#[test]
	fn provider_errors_expose_their_description_but_server_errors_do_not() {
		let provider = AuthResponse::from_error(
			&Error::Provider {
				error: "access_denied".into(),
				description: Some("User declined".into()),
			},
			None,
		);
		let server = AuthResponse::from_error(
			&Error::Discovery(crate::error::DiscoveryError::MissingJwksUri),
			Some("authstate=; Max-Age=0".into()),
		);

		assert_eq!(provider.status(), 400);
		assert_eq!(provider.body(), "access_denied: User declined");
		assert_eq!(server.status(), 500);
		assert_eq!(server.body(), "Sign-in could not be completed.");
		assert!(server.headers().contains(&("Set-Cookie", "authstate=; Max-Age=0".into())));
	}

	#[test]
	fn popup_page_closes_the_window() {
		let response = AuthResponse::ClosePopup { set_cookie: "authstate=".into() };

		assert_eq!(response.status(), 200);
		assert!(response.body().contains("window.close()"));
		assert_eq!(response.headers()[0], ("Content-Type", "text/html; charset=utf-8".into()));
	}
}
