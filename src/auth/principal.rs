//! Signed-in user identity derived from a verified ID token.

// self
use crate::{
	_prelude::*,
	auth::{TenantId, UserId},
};

/// User identity extracted from a verified ID token.
///
/// Only [`TokenManager::validate_id_token`](crate::tokens::TokenManager::validate_id_token)
/// constructs principals; nothing else in the crate trusts identity claims.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
	/// Object identifier (`oid`) of the user.
	pub subject_id: UserId,
	/// Display name (`name`), when the token carries one.
	pub display_name: Option<String>,
	/// Home tenant (`tid`) of the user.
	pub tenant_id: Option<TenantId>,
}
impl Principal {
	pub(crate) fn new(
		subject_id: UserId,
		display_name: Option<String>,
		tenant_id: Option<TenantId>,
	) -> Self {
		Self { subject_id, display_name, tenant_id }
	}
}
impl Display for Principal {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match &self.display_name {
			Some(name) => write!(f, "{name} ({})", self.subject_id),
			None => Display::fmt(&self.subject_id, f),
		}
	}
}
