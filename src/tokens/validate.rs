//! ID token inspection and verification helpers.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use x509_parser::{pem, public_key::PublicKey};
// self
use crate::{
	_prelude::*,
	auth::{Principal, TenantId, UserId},
	discovery::SigningKey,
	error::ValidationError,
};

const PEM_HEADER: &str = "-----BEGIN CERTIFICATE-----";
const PEM_FOOTER: &str = "-----END CERTIFICATE-----";
const PEM_LINE_WIDTH: usize = 64;

/// Wraps a base64 DER certificate in canonical PEM framing.
///
/// Whitespace in the input is dropped, the body is wrapped at 64 characters, and the output
/// always ends with `-----END CERTIFICATE-----\n`.
pub fn certificate_to_pem(certificate: &str) -> String {
	let body = certificate.chars().filter(|c| !c.is_whitespace()).collect::<Vec<_>>();
	let mut pem = String::with_capacity(body.len() + body.len() / PEM_LINE_WIDTH + 64);

	pem.push_str(PEM_HEADER);
	pem.push('\n');

	for line in body.chunks(PEM_LINE_WIDTH) {
		pem.extend(line);
		pem.push('\n');
	}

	pem.push_str(PEM_FOOTER);
	pem.push('\n');

	pem
}

/// Header and routing claims read from an ID token before its signature is checked.
#[derive(Clone, Debug)]
pub(crate) struct UnverifiedIdToken {
	pub(crate) algorithm: Algorithm,
	pub(crate) key_id: String,
	pub(crate) tenant_id: String,
}
impl UnverifiedIdToken {
	/// Reads `typ`, `alg`, and `kid` from the header and `tid` from the payload.
	pub(crate) fn inspect(token: &str, allowed: &[Algorithm]) -> Result<Self, ValidationError> {
		let header = jsonwebtoken::decode_header(token)
			.map_err(|e| malformed(format!("header cannot be decoded ({e})")))?;

		ensure_jwt(&header)?;

		if !allowed.contains(&header.alg) {
			return Err(ValidationError::DisallowedAlgorithm { algorithm: header.alg });
		}

		let key_id = header.kid.ok_or_else(|| malformed("header has no kid".into()))?;
		let payload =
			token.split('.').nth(1).ok_or_else(|| malformed("payload is missing".into()))?;
		let payload = URL_SAFE_NO_PAD
			.decode(payload.trim_end_matches('='))
			.map_err(|e| malformed(format!("payload is not base64url ({e})")))?;
		let routing = serde_json::from_slice::<RoutingClaims>(&payload)
			.map_err(|e| malformed(format!("payload is not JSON ({e})")))?;
		let tenant_id = routing.tid.ok_or_else(|| malformed("payload has no tid".into()))?;

		Ok(Self { algorithm: header.alg, key_id, tenant_id })
	}

	/// Verifies signature, audience, issuer, and lifetime, then extracts the principal.
	pub(crate) fn verify(
		&self,
		token: &str,
		key: &SigningKey,
		audience: &str,
		expected_issuer: &str,
		leeway_secs: u64,
	) -> Result<Principal, ValidationError> {
		let decoding_key = decoding_key(&key.key_id, &certificate_to_pem(&key.certificate))?;
		let mut validation = Validation::new(self.algorithm);

		validation.set_audience(&[audience]);
		validation.set_issuer(&[expected_issuer]);
		validation.set_required_spec_claims(&["exp", "aud", "iss"]);
		validation.leeway = leeway_secs;

		let claims = jsonwebtoken::decode::<IdentityClaims>(token, &decoding_key, &validation)
			.map_err(ValidationError::SignatureInvalid)?
			.claims;
		let oid = claims.oid.ok_or_else(|| malformed("payload has no oid".into()))?;
		let subject_id = UserId::new(oid).map_err(|e| malformed(e.to_string()))?;
		let tenant_id = claims
			.tid
			.map(TenantId::new)
			.transpose()
			.map_err(|e| malformed(e.to_string()))?;

		Ok(Principal::new(subject_id, claims.name, tenant_id))
	}
}

#[derive(Deserialize)]
struct RoutingClaims {
	tid: Option<String>,
}

#[derive(Deserialize)]
struct IdentityClaims {
	oid: Option<String>,
	name: Option<String>,
	tid: Option<String>,
}

fn ensure_jwt(header: &Header) -> Result<(), ValidationError> {
	match header.typ.as_deref() {
		Some("JWT") => Ok(()),
		typ => Err(ValidationError::NotAJwt { typ: typ.map(str::to_owned) }),
	}
}

fn decoding_key(kid: &str, certificate_pem: &str) -> Result<DecodingKey, ValidationError> {
	let unusable =
		|reason: String| ValidationError::UnusableCertificate { kid: kid.to_owned(), reason };
	let (_, block) =
		pem::parse_x509_pem(certificate_pem.as_bytes()).map_err(|e| unusable(e.to_string()))?;
	let certificate = block.parse_x509().map_err(|e| unusable(e.to_string()))?;
	let spki = certificate.public_key();
	let der = &spki.subject_public_key.data;

	match spki.parsed().map_err(|e| unusable(e.to_string()))? {
		PublicKey::RSA(_) => Ok(DecodingKey::from_rsa_der(der)),
		PublicKey::EC(_) => Ok(DecodingKey::from_ec_der(der)),
		_ => Err(unusable("unsupported public key type".into())),
	}
}

fn malformed(reason: String) -> ValidationError {
	ValidationError::MalformedToken { reason }
}
