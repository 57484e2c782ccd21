//! Callbacks fired when a flow completes.

// self
use crate::auth::Principal;

/// Receives flow completions; both hooks default to doing nothing.
pub trait AuthEvents
where
	Self: Send + Sync,
{
	/// A user signed in and their tokens were stored.
	fn on_login(&self, principal: &Principal) {
		let _ = principal;
	}

	/// An administrator granted consent, for `tenant` when the provider reported it.
	fn on_admin_consent(&self, tenant: Option<&str>) {
		let _ = tenant;
	}
}

/// Event sink that ignores every completion.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEvents;
impl AuthEvents for NoopEvents {}
