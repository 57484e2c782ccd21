//! Storage contracts and built-in store implementations for per-user token sets.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{Principal, TokenSet, UserId},
};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence contract for token sets keyed by user identity.
///
/// `set` must be last-writer-wins for a given user: concurrent refreshes for the same user
/// may both persist, and whichever lands last is kept.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Persists or replaces the token set for the principal's user id.
	fn set<'a>(&'a self, principal: &'a Principal, tokens: TokenSet) -> StoreFuture<'a, ()>;

	/// Fetches the token set stored for the user, if any.
	fn get<'a>(&'a self, user_id: &'a UserId) -> StoreFuture<'a, Option<TokenSet>>;
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Stored record pairing the principal with its latest token set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
	/// Principal the tokens were issued to.
	pub principal: Principal,
	/// Latest token set.
	pub tokens: TokenSet,
}
