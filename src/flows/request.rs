//! Framework-agnostic view of an incoming return request.

// self
use crate::_prelude::*;

const MANGLED_PREFIX: &str = "amp;";

/// Query parameters and cookies of a browser request hitting a flow endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthRequest {
	params: Vec<(String, String)>,
	cookies: Vec<(String, String)>,
}
impl AuthRequest {
	/// Parses a raw query string (without `?`) and the request's `Cookie` header.
	///
	/// Parameter names double-escaped as `amp;name` are read as `name`.
	pub fn new(raw_query: &str, cookie_header: Option<&str>) -> Self {
		let params = url::form_urlencoded::parse(raw_query.trim_start_matches('?').as_bytes())
			.map(|(name, value)| (repair_name(&name).to_owned(), value.into_owned()))
			.collect();
		let cookies = cookie_header.map(parse_cookies).unwrap_or_default();

		Self { params, cookies }
	}

	/// Builds a request from a full callback URI.
	pub fn from_uri(uri: &Url, cookie_header: Option<&str>) -> Self {
		Self::new(uri.query().unwrap_or_default(), cookie_header)
	}

	/// First value of query parameter `name`.
	pub fn param(&self, name: &str) -> Option<&str> {
		self.params.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
	}

	/// Value of cookie `name`.
	pub fn cookie(&self, name: &str) -> Option<&str> {
		self.cookies.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
	}
}

fn repair_name(mut name: &str) -> &str {
	while let Some(stripped) = name.strip_prefix(MANGLED_PREFIX) {
		name = stripped;
	}

	name
}

fn parse_cookies(header: &str) -> Vec<(String, String)> {
	header
		.split(';')
		.filter_map(|pair| pair.split_once('='))
		.map(|(name, value)| (name.trim().to_owned(), value.trim().trim_matches('"').to_owned()))
		.filter(|(name, _)| !name.is_empty())
		.collect()
}
