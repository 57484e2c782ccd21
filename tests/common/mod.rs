#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use httpmock::{Mock, prelude::*};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};
use time::OffsetDateTime;
// self
use oidc_bot_auth::{
	config::AuthConfig,
	store::{MemoryStore, TokenStore},
	tokens::ReqwestTokenManager,
};

pub const APP_ID: &str = "app-it";
pub const APP_SECRET: &str = "app-secret-it";
pub const ROOT_URI: &str = "https://bot.example.com";
pub const KEY_ID: &str = "key-it";
pub const TOKEN_TENANT: &str = "tenant-t";
pub const USER_ID: &str = "user-u";
pub const DISCOVERY_PATH: &str = "/common/v2.0/.well-known/openid-configuration";
pub const AUTHORIZE_PATH: &str = "/common/oauth2/v2.0/authorize";
pub const TOKEN_PATH: &str = "/common/oauth2/v2.0/token";
pub const KEYS_PATH: &str = "/common/discovery/v2.0/keys";

pub const IDP_KEY: &str = include_str!("../fixtures/idp_key.pem");
pub const IDP_CERT: &str = include_str!("../fixtures/idp_cert.b64");
pub const ROGUE_KEY: &str = include_str!("../fixtures/rogue_key.pem");
pub const ROGUE_CERT: &str = include_str!("../fixtures/rogue_cert.b64");

pub fn config(server: &MockServer) -> Arc<AuthConfig> {
	let config = AuthConfig::builder(APP_ID, APP_SECRET, ROOT_URI)
		.discovery_uri_template(server.url("/{tenant}/v2.0/.well-known/openid-configuration"))
		.admin_consent_uri_template(server.url("/{tenant}/adminconsent"))
		.http_timeout(std::time::Duration::from_secs(5))
		.build()
		.expect("Test configuration should build.");

	Arc::new(config)
}

pub fn token_manager(server: &MockServer) -> (Arc<ReqwestTokenManager>, Arc<MemoryStore>) {
	let store = Arc::new(MemoryStore::default());
	let manager =
		ReqwestTokenManager::with_config(config(server), store.clone() as Arc<dyn TokenStore>)
			.expect("Token manager should build over the mock provider.");

	(Arc::new(manager), store)
}

pub fn discovery_document(server: &MockServer) -> Value {
	json!({
		"issuer": format!("{}/{{tenantid}}/v2.0", server.base_url()),
		"authorization_endpoint": server.url(AUTHORIZE_PATH),
		"token_endpoint": server.url(TOKEN_PATH),
		"jwks_uri": server.url(KEYS_PATH),
		"end_session_endpoint": server.url("/common/oauth2/v2.0/logout"),
	})
}

pub fn key_set(entries: &[(&str, &str)]) -> Value {
	let keys = entries
		.iter()
		.map(|(kid, certificate)| {
			json!({
				"kty": "RSA",
				"use": "sig",
				"kid": kid,
				"x5c": [certificate.trim()],
			})
		})
		.collect::<Vec<_>>();

	json!({ "keys": keys })
}

pub async fn mock_discovery(server: &MockServer) -> Mock<'_> {
	let document = discovery_document(server);

	server
		.mock_async(|when, then| {
			when.method(GET).path(DISCOVERY_PATH);
			then.status(200).header("content-type", "application/json").json_body(document);
		})
		.await
}

pub async fn mock_keys(server: &MockServer) -> Mock<'_> {
	let keys = key_set(&[("unrelated", ROGUE_CERT), (KEY_ID, IDP_CERT)]);

	server
		.mock_async(|when, then| {
			when.method(GET).path(KEYS_PATH);
			then.status(200).header("content-type", "application/json").json_body(keys);
		})
		.await
}

pub async fn mock_token<'a>(
	server: &'a MockServer,
	grant_type: &str,
	response: Value,
) -> Mock<'a> {
	let grant_type = grant_type.to_owned();

	server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.header("content-type", "application/x-www-form-urlencoded")
				.form_urlencoded_tuple("grant_type", grant_type)
				.form_urlencoded_tuple("client_id", APP_ID);
			then.status(200).header("content-type", "application/json").json_body(response);
		})
		.await
}

pub fn token_response(access: &str, refresh: Option<&str>, id_token: &str) -> Value {
	let mut response = json!({
		"access_token": access,
		"expires_in": 3600,
		"id_token": id_token,
	});

	if let Some(refresh) = refresh {
		response["refresh_token"] = json!(refresh);
	}

	response
}

/// Claims of a well-formed ID token for [`USER_ID`] issued by the mock provider.
pub fn id_claims(server: &MockServer) -> Value {
	let now = OffsetDateTime::now_utc().unix_timestamp();

	json!({
		"aud": APP_ID,
		"iss": format!("{}/{TOKEN_TENANT}/v2.0", server.base_url()),
		"iat": now,
		"nbf": now,
		"exp": now + 3600,
		"oid": USER_ID,
		"tid": TOKEN_TENANT,
		"name": "Ursula User",
	})
}

pub fn sign(claims: &Value, key_pem: &str, kid: &str) -> String {
	let mut header = Header::new(Algorithm::RS256);

	header.kid = Some(kid.to_owned());

	let key =
		EncodingKey::from_rsa_pem(key_pem.as_bytes()).expect("RSA fixture key should load.");

	jsonwebtoken::encode(&header, claims, &key).expect("ID token should sign.")
}

pub fn id_token(server: &MockServer) -> String {
	sign(&id_claims(server), IDP_KEY, KEY_ID)
}
