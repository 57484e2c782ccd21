//! Thread-safe in-memory [`TokenStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{Principal, TokenSet, UserId},
	store::{StoreFuture, StoredTokens, TokenStore},
};

type StoreMap = Arc<RwLock<HashMap<UserId, StoredTokens>>>;

/// Thread-safe storage backend that keeps token sets in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Returns the principal stored alongside the user's tokens, if any.
	pub fn principal(&self, user_id: &UserId) -> Option<Principal> {
		self.0.read().get(user_id).map(|stored| stored.principal.clone())
	}

	/// Number of users with stored tokens.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no tokens are stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl TokenStore for MemoryStore {
	fn set<'a>(&'a self, principal: &'a Principal, tokens: TokenSet) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let stored = StoredTokens { principal: principal.to_owned(), tokens };

		Box::pin(async move {
			map.write().insert(stored.principal.subject_id.clone(), stored);

			Ok(())
		})
	}

	fn get<'a>(&'a self, user_id: &'a UserId) -> StoreFuture<'a, Option<TokenSet>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(user_id).map(|stored| stored.tokens.clone())) })
	}
}
