//! Crate-level error types shared across discovery, token exchange, validation, and flows.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Identity-provider metadata or signing keys could not be resolved.
	#[error(transparent)]
	Discovery(#[from] DiscoveryError),
	/// Token endpoint call failed.
	#[error(transparent)]
	TokenExchange(#[from] TokenExchangeError),
	/// ID token failed validation.
	#[error(transparent)]
	Validation(#[from] ValidationError),

	/// Returned `state` does not match the state cookie.
	#[error("Authorization state does not match the state cookie.")]
	CsrfMismatch,
	/// Identity provider redirected back with an `error` parameter.
	#[error("Identity provider returned an error: {error}.")]
	Provider {
		/// Provider-supplied `error` value.
		error: String,
		/// Provider-supplied `error_description`, if any.
		description: Option<String>,
	},
	/// Token return request carried no authorization code.
	#[error("Authorization response is missing the code parameter.")]
	MissingCode,

	/// Failure of a cache load that other callers were queued behind.
	#[error(transparent)]
	Shared(Arc<Error>),
}
impl Error {
	/// HTTP status a browser-facing handler should answer with for this error.
	///
	/// Protocol and validation failures map to `400`; transport, discovery, exchange,
	/// storage, and configuration failures map to `500`.
	pub fn status_code(&self) -> u16 {
		match self {
			Self::CsrfMismatch
			| Self::Provider { .. }
			| Self::MissingCode
			| Self::Validation(_) => 400,
			Self::Storage(_) | Self::Config(_) | Self::Discovery(_) | Self::TokenExchange(_) =>
				500,
			Self::Shared(inner) => inner.status_code(),
		}
	}

	/// Returns the underlying error, looking through [`Error::Shared`].
	pub fn root(&self) -> &Error {
		match self {
			Self::Shared(inner) => inner.root(),
			other => other,
		}
	}
}

/// Configuration and validation failures raised while constructing components.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Application (client) identifier is empty.
	#[error("Application id cannot be empty.")]
	MissingApplicationId,
	/// Application (client) secret is empty.
	#[error("Application secret cannot be empty.")]
	MissingApplicationSecret,
	/// A configured URI cannot be parsed.
	#[error("The {field} URI is invalid: {value}.")]
	InvalidUri {
		/// Configuration field that failed to parse.
		field: &'static str,
		/// Offending value.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A URI template lacks its placeholder.
	#[error("The {field} template must contain the `{placeholder}` placeholder.")]
	MissingPlaceholder {
		/// Configuration field holding the template.
		field: &'static str,
		/// Placeholder that must appear.
		placeholder: &'static str,
	},
	/// An endpoint path is not absolute.
	#[error("The {field} path must start with `/`: {value}.")]
	InvalidPath {
		/// Path field that failed validation.
		field: &'static str,
		/// Offending value.
		value: String,
	},
	/// A scope entry is empty or contains whitespace.
	#[error("Scope entries cannot be empty or contain whitespace: {scope:?}.")]
	InvalidScope {
		/// Offending scope.
		scope: String,
	},
	/// A tenant identifier failed validation.
	#[error(transparent)]
	InvalidTenant(#[from] crate::auth::IdentifierError),
	/// A cache TTL or timeout is zero or negative.
	#[error("The {field} duration must be positive.")]
	NonPositiveDuration {
		/// Duration field that failed validation.
		field: &'static str,
	},
	/// No signature algorithm is allowed.
	#[error("At least one ID token signature algorithm must be allowed.")]
	EmptyAlgorithmAllowList,
	/// Settings document could not be parsed.
	#[error("Settings document is malformed.")]
	Settings {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Cookie signing key was rejected.
	#[error("Cookie secret cannot be used as an HMAC key.")]
	CookieSecret,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, timeout, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {endpoint}.")]
	Network {
		/// Endpoint label (discovery, jwks, token).
		endpoint: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The request exceeded the configured timeout.
	#[error("Request to {endpoint} timed out.")]
	Timeout {
		/// Endpoint label (discovery, jwks, token).
		endpoint: &'static str,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during an HTTP call.")]
	Io(#[from] std::io::Error),
	/// HTTP request or response could not be represented.
	#[error("HTTP message could not be built.")]
	Http(#[from] oauth2::http::Error),
	/// Any other transport failure.
	#[error("HTTP client error occurred while calling {endpoint}: {message}.")]
	Other {
		/// Endpoint label (discovery, jwks, token).
		endpoint: &'static str,
		/// Transport-supplied description.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(endpoint: &'static str, src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { endpoint, source: Box::new(src) }
	}
}

/// Failures while resolving discovery metadata or signing keys.
#[derive(Debug, ThisError)]
pub enum DiscoveryError {
	/// The document could not be fetched.
	#[error("Failed to fetch the {document} from {uri}.")]
	Fetch {
		/// Document label (`discovery document`, `key set`).
		document: &'static str,
		/// Requested URI.
		uri: String,
		/// Transport failure.
		#[source]
		source: TransportError,
	},
	/// The server answered with a non-success status.
	#[error("The {document} endpoint {uri} answered with HTTP {status}.")]
	Status {
		/// Document label (`discovery document`, `key set`).
		document: &'static str,
		/// Requested URI.
		uri: String,
		/// HTTP status code.
		status: u16,
	},
	/// The body is not JSON or lacks required fields.
	#[error("The {document} is malformed.")]
	Parse {
		/// Document label (`discovery document`, `key set`).
		document: &'static str,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The substituted discovery URI is not a valid URL.
	#[error("The discovery URI {uri} is invalid.")]
	InvalidUri {
		/// Substituted URI.
		uri: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The discovery document carries no `jwks_uri`.
	#[error("Discovery document does not advertise a jwks_uri.")]
	MissingJwksUri,
	/// The key set response does not contain a `keys` array.
	#[error("Key set response does not contain a keys array.")]
	InvalidKeySetFormat,
	/// No loader is installed for the document.
	#[error("No loader is installed for the {document}.")]
	Uninitialized {
		/// Document label (`discovery document`, `key set`).
		document: &'static str,
	},
}

/// Token endpoint failures for code and refresh grants.
#[derive(Debug, ThisError)]
pub enum TokenExchangeError {
	/// Network, timeout, or IO failure.
	#[error("Token endpoint could not be reached.")]
	Transport(#[from] TransportError),
	/// Provider rejected the grant with an OAuth error response.
	#[error("Token endpoint rejected the {grant} grant: {error}.")]
	Rejected {
		/// Grant label.
		grant: &'static str,
		/// OAuth `error` code.
		error: String,
		/// OAuth `error_description`, if any.
		description: Option<String>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Provider answered with malformed JSON.
	#[error("Token endpoint returned malformed JSON.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Provider answered with something that is neither a token nor an OAuth error.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	Unexpected {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// The discovery token endpoint cannot be used by the OAuth client.
	#[error("Token endpoint URL is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The `expires_in` value does not fit the supported range.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
}

/// ID token validation failures.
#[derive(Debug, ThisError)]
pub enum ValidationError {
	/// The token set carries no ID token.
	#[error("Token response does not contain an ID token.")]
	IdTokenMissing,
	/// The header `typ` is not `JWT`.
	#[error("ID token is not a JWT (typ {typ:?}).")]
	NotAJwt {
		/// Declared `typ`, if any.
		typ: Option<String>,
	},
	/// Header or payload could not be decoded, or a required field is absent.
	#[error("ID token is malformed: {reason}.")]
	MalformedToken {
		/// Human-readable reason.
		reason: String,
	},
	/// Header algorithm is not on the configured allow-list.
	#[error("ID token algorithm {algorithm:?} is not allowed.")]
	DisallowedAlgorithm {
		/// Declared algorithm.
		algorithm: jsonwebtoken::Algorithm,
	},
	/// No signing key matches the header `kid`.
	#[error("No signing key matches kid {kid}.")]
	SigningKeyNotFound {
		/// Key identifier from the token header.
		kid: String,
	},
	/// The signing certificate could not be turned into a verification key.
	#[error("Signing certificate for kid {kid} is unusable: {reason}.")]
	UnusableCertificate {
		/// Key identifier of the certificate.
		kid: String,
		/// Human-readable reason.
		reason: String,
	},
	/// Signature, audience, issuer, algorithm, or expiry verification failed.
	#[error("ID token verification failed.")]
	SignatureInvalid(#[source] jsonwebtoken::errors::Error),
}
