//! Observability helpers: an injectable logger, flow spans, and outcome metrics.
//!
//! # Feature Flags
//!
//! - Spans named `oidc_bot_auth.flow` carry the `flow` and `stage` fields and always go through
//!   `tracing`.
//! - Enable `metrics` to increment the `oidc_bot_auth_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod logger;
mod metrics;
mod tracing;

pub use self::logger::*;
pub use self::metrics::*;
pub use self::tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Discovery document resolution.
	Discovery,
	/// Signing key set resolution.
	SigningKeys,
	/// Authorization code exchange.
	AuthorizationCode,
	/// Refresh token exchange.
	Refresh,
	/// ID token validation.
	IdTokenValidation,
	/// Admin-consent redirect and return.
	AdminConsent,
	/// User sign-in redirect and token return.
	Login,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Discovery => "discovery",
			FlowKind::SigningKeys => "signing_keys",
			FlowKind::AuthorizationCode => "authorization_code",
			FlowKind::Refresh => "refresh",
			FlowKind::IdTokenValidation => "id_token_validation",
			FlowKind::AdminConsent => "admin_consent",
			FlowKind::Login => "login",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Runs `fut` inside a [`FlowSpan`], recording attempt and outcome metrics around it.
pub(crate) async fn observe<T, Fut>(kind: FlowKind, stage: &'static str, fut: Fut) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	let span = FlowSpan::new(kind, stage);

	record_flow_outcome(kind, FlowOutcome::Attempt);

	let result = span.instrument(fut).await;

	match &result {
		Ok(_) => record_flow_outcome(kind, FlowOutcome::Success),
		Err(_) => record_flow_outcome(kind, FlowOutcome::Failure),
	}

	result
}
