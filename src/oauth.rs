//! OAuth client facade over the `oauth2` crate plus transport error mapping.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AccessToken, AuthType, AuthorizationCode, Client, ClientId, ClientSecret, EndpointNotSet,
	EndpointSet, HttpClientError, RedirectUrl, RefreshToken, RequestTokenError, Scope,
	StandardRevocableToken, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::{TokenSecret, TokenSet},
	error::{TokenExchangeError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};

/// Token endpoint response including the ID token.
///
/// Field-compatible with the standard OAuth 2.0 response, except that `token_type` is optional
/// and reads as `bearer` when the provider leaves it out.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct OidcTokenResponse {
	access_token: AccessToken,
	#[serde(
		default = "bearer",
		deserialize_with = "oauth2::helpers::deserialize_untagged_enum_case_insensitive"
	)]
	token_type: BasicTokenType,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	expires_in: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	refresh_token: Option<RefreshToken>,
	#[serde(
		rename = "scope",
		default,
		deserialize_with = "oauth2::helpers::deserialize_space_delimited_vec",
		serialize_with = "oauth2::helpers::serialize_space_delimited_vec",
		skip_serializing_if = "Option::is_none"
	)]
	scopes: Option<Vec<Scope>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	id_token: Option<String>,
}
impl OidcTokenResponse {
	/// Signed ID token, when the `openid` scope was granted.
	pub fn id_token(&self) -> Option<&str> {
		self.id_token.as_deref()
	}
}
impl TokenResponse for OidcTokenResponse {
	type TokenType = BasicTokenType;

	fn access_token(&self) -> &AccessToken {
		&self.access_token
	}

	fn token_type(&self) -> &BasicTokenType {
		&self.token_type
	}

	fn expires_in(&self) -> Option<std::time::Duration> {
		self.expires_in.map(std::time::Duration::from_secs)
	}

	fn refresh_token(&self) -> Option<&RefreshToken> {
		self.refresh_token.as_ref()
	}

	fn scopes(&self) -> Option<&Vec<Scope>> {
		self.scopes.as_ref()
	}
}

fn bearer() -> BasicTokenType {
	BasicTokenType::Bearer
}

type OidcClient<HasTokenUrl = EndpointSet> = Client<
	BasicErrorResponse,
	OidcTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	HasTokenUrl,
>;

/// Maps HTTP transport failures into [`TransportError`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] raised while calling `endpoint`.
	fn map_transport_error(
		&self,
		endpoint: &'static str,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> TransportError;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		endpoint: &'static str,
		_metadata: Option<&ResponseMetadata>,
		error: HttpClientError<ReqwestError>,
	) -> TransportError {
		match error {
			HttpClientError::Reqwest(inner) if inner.is_timeout() =>
				TransportError::Timeout { endpoint },
			HttpClientError::Reqwest(inner) => TransportError::network(endpoint, *inner),
			other => map_common_transport_error(endpoint, other),
		}
	}
}

/// Maps the transport-independent [`HttpClientError`] variants.
pub fn map_common_transport_error<E>(
	endpoint: &'static str,
	error: HttpClientError<E>,
) -> TransportError
where
	E: 'static + Send + Sync + StdError,
{
	match error {
		HttpClientError::Reqwest(inner) => TransportError::network(endpoint, *inner),
		HttpClientError::Http(inner) => TransportError::Http(inner),
		HttpClientError::Io(inner) => TransportError::Io(inner),
		HttpClientError::Other(message) => TransportError::Other { endpoint, message },
		_ => TransportError::Other { endpoint, message: "unknown transport failure".into() },
	}
}

/// Grant-level facade that runs code and refresh exchanges against one token endpoint.
pub(crate) struct TokenFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: OidcClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> TokenFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Client credentials travel in the form body (`client_secret_post`).
	pub(crate) fn new(
		app_id: &str,
		app_secret: &TokenSecret,
		token_endpoint: &Url,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Result<Self, TokenExchangeError> {
		let token_url = TokenUrl::new(token_endpoint.to_string())
			.map_err(|source| TokenExchangeError::InvalidEndpoint { source })?;
		let oauth_client = <OidcClient<EndpointNotSet>>::new(ClientId::new(app_id.to_owned()))
			.set_client_secret(ClientSecret::new(app_secret.expose().to_owned()))
			.set_auth_type(AuthType::RequestBody)
			.set_token_uri(token_url);

		Ok(Self { oauth_client, http_client, error_mapper })
	}

	pub(crate) async fn exchange_authorization_code(
		&self,
		code: &str,
		scopes: &[String],
		redirect_uri: &Url,
	) -> Result<TokenSet, TokenExchangeError> {
		const GRANT: &str = "authorization_code";

		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let mut request = self
			.oauth_client
			.exchange_code(AuthorizationCode::new(code.to_owned()))
			.set_redirect_uri(Cow::Owned(RedirectUrl::from_url(redirect_uri.clone())));

		if !scopes.is_empty() {
			request = request.add_extra_param("scope", scopes.join(" "));
		}

		let response = request
			.request_async(&instrumented)
			.await
			.map_err(|err| self.map_request_error(GRANT, meta.take(), err))?;

		token_set_from_response(response, None)
	}

	pub(crate) async fn refresh_token(
		&self,
		refresh_token: &TokenSecret,
	) -> Result<TokenSet, TokenExchangeError> {
		const GRANT: &str = "refresh_token";

		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let refresh_secret = RefreshToken::new(refresh_token.expose().to_owned());
		let response = self
			.oauth_client
			.exchange_refresh_token(&refresh_secret)
			.request_async(&instrumented)
			.await
			.map_err(|err| self.map_request_error(GRANT, meta.take(), err))?;

		token_set_from_response(response, Some(refresh_token))
	}

	fn map_request_error(
		&self,
		grant: &'static str,
		meta: Option<ResponseMetadata>,
		err: BasicRequestTokenError<HttpClientError<C::TransportError>>,
	) -> TokenExchangeError {
		let meta = meta.as_ref();
		let status = meta.and_then(|value| value.status);

		match err {
			RequestTokenError::ServerResponse(response) => TokenExchangeError::Rejected {
				grant,
				error: response.error().as_ref().to_owned(),
				description: response.error_description().cloned(),
				status,
			},
			RequestTokenError::Request(error) => TokenExchangeError::Transport(
				self.error_mapper.map_transport_error("token", meta, error),
			),
			RequestTokenError::Parse(source, _body) => TokenExchangeError::Parse { source, status },
			RequestTokenError::Other(message) =>
				TokenExchangeError::Unexpected { message, status },
		}
	}
}

/// Builds a [`TokenSet`], keeping `previous_refresh` when the response omits a new one.
fn token_set_from_response(
	response: OidcTokenResponse,
	previous_refresh: Option<&TokenSecret>,
) -> Result<TokenSet, TokenExchangeError> {
	let mut builder = TokenSet::builder().access_token(response.access_token().secret());

	match (response.refresh_token(), previous_refresh) {
		(Some(refresh), _) => builder = builder.refresh_token(refresh.secret()),
		(None, Some(previous)) => builder = builder.refresh_token(previous.expose()),
		(None, None) => {},
	}

	if let Some(id_token) = response.id_token() {
		builder = builder.id_token(id_token);
	}
	if let Some(expires_in) = response.expires_in() {
		let seconds = i64::try_from(expires_in.as_secs())
			.map_err(|_| TokenExchangeError::ExpiresInOutOfRange)?;

		builder = builder.expires_in(seconds);
	}

	let tokens = builder.build();

	// The builder drops deadlines past the representable date range.
	if tokens.expires_in.is_some() && tokens.expires_at.is_none() {
		return Err(TokenExchangeError::ExpiresInOutOfRange);
	}

	Ok(tokens)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn parse(json: &str) -> OidcTokenResponse {
		serde_json::from_str(json).expect("Token response fixture should parse.")
	}

	#[test]
	fn response_fields_map_onto_the_token_set() {
		let set = token_set_from_response(
			parse(
				r#"{
					"access_token": "A",
					"token_type": "Bearer",
					"refresh_token": "R",
					"id_token": "I",
					"expires_in": 3600
				}"#,
			),
			None,
		)
		.expect("Token set should build.");

		assert_eq!(set.access_token.as_ref().map(TokenSecret::expose), Some("A"));
		assert_eq!(set.refresh_token.as_ref().map(TokenSecret::expose), Some("R"));
		assert_eq!(set.id_token.as_ref().map(TokenSecret::expose), Some("I"));
		assert_eq!(set.expires_in, Some(3600));
		assert!(set.expires_at.is_some());
	}

	#[test]
	fn missing_token_type_reads_as_bearer() {
		let response = parse(
			r#"{"access_token":"A","refresh_token":"R","id_token":"I","expires_in":3600}"#,
		);

		assert_eq!(response.token_type(), &BasicTokenType::Bearer);
		assert_eq!(response.id_token(), Some("I"));
		assert_eq!(
			parse(r#"{"access_token":"A","token_type":"Bearer"}"#).token_type(),
			&BasicTokenType::Bearer
		);
	}

	#[test]
	fn lifetimes_past_the_calendar_are_rejected() {
		let err = token_set_from_response(
			parse(r#"{"access_token":"A","expires_in":1000000000000}"#),
			None,
		)
		.expect_err("An unrepresentable deadline should fail.");

		assert!(matches!(err, TokenExchangeError::ExpiresInOutOfRange));
	}

	#[test]
	fn refresh_without_rotation_keeps_the_previous_refresh_token() {
		let previous = TokenSecret::new("R-old");
		let set = token_set_from_response(
			parse(r#"{"access_token":"A2","token_type":"Bearer"}"#),
			Some(&previous),
		)
		.expect("Token set should build.");

		assert_eq!(set.refresh_token.as_ref().map(TokenSecret::expose), Some("R-old"));
		assert_eq!(set.expires_at, None);
		assert!(set.id_token.is_none());
	}

	#[test]
	fn generic_transport_failures_keep_their_message() {
		let err = map_common_transport_error::<std::io::Error>(
			"token",
			HttpClientError::Other("connection reset".into()),
		);

		assert!(matches!(
			err,
			TransportError::Other { endpoint: "token", ref message }
				if message == "connection reset"
		));
	}
}
