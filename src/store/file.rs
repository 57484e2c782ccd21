//! Simple file-backed [`TokenStore`] for single-instance bots.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{Principal, TokenSet, UserId},
	store::{StoreError, StoreFuture, StoredTokens, TokenStore},
};

/// Persists token sets to a JSON file after each write.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<HashMap<UserId, StoredTokens>>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		ensure_parent_exists(&path)?;

		let snapshot = load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the JSON snapshot.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn persist_locked(&self, contents: &HashMap<UserId, StoredTokens>) -> Result<(), StoreError> {
		ensure_parent_exists(&self.path)?;

		let snapshot: Vec<_> = contents.values().collect();
		let serialized =
			serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl TokenStore for FileStore {
	fn set<'a>(&'a self, principal: &'a Principal, tokens: TokenSet) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let stored = StoredTokens { principal: principal.to_owned(), tokens };
			let mut guard = self.inner.write();
			let mut next = guard.clone();

			next.insert(stored.principal.subject_id.clone(), stored);
			// Memory only changes once the snapshot is on disk.
			self.persist_locked(&next)?;
			*guard = next;

			Ok(())
		})
	}

	fn get<'a>(&'a self, user_id: &'a UserId) -> StoreFuture<'a, Option<TokenSet>> {
		Box::pin(async move {
			Ok(self.inner.read().get(user_id).map(|stored| stored.tokens.clone()))
		})
	}
}

fn load_snapshot(path: &Path) -> Result<HashMap<UserId, StoredTokens>, StoreError> {
	if !path.exists() {
		return Ok(HashMap::new());
	}

	let bytes = fs::read(path).map_err(|e| StoreError::Backend {
		message: format!("Failed to read {}: {e}", path.display()),
	})?;

	if bytes.is_empty() {
		return Ok(HashMap::new());
	}

	let entries: Vec<StoredTokens> =
		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})?;

	Ok(entries.into_iter().map(|stored| (stored.principal.subject_id.clone(), stored)).collect())
}

fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
			message: format!("Failed to create store directory {}: {e}", parent.display()),
		})?;
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// self
	use super::*;
	use crate::auth::TenantId;

	fn temp_path(label: &str) -> PathBuf {
		let unique = format!(
			"oidc_bot_auth_file_store_{label}_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	fn principal(oid: &str) -> Principal {
		Principal::new(
			UserId::new(oid).expect("Failed to build user fixture."),
			Some("Ada Lovelace".into()),
			Some(TenantId::new("tenant-demo").expect("Failed to build tenant fixture.")),
		)
	}

	#[tokio::test]
	async fn set_survives_reopen() {
		let path = temp_path("reopen");
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let principal = principal("oid-reopen");
		let tokens = TokenSet::builder()
			.access_token("access")
			.refresh_token("refresh")
			.expires_in(60)
			.build();

		store.set(&principal, tokens.clone()).await.expect("Failed to save token set.");
		drop(store);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let fetched = reopened
			.get(&principal.subject_id)
			.await
			.expect("Failed to fetch token set from file store.")
			.expect("File store lost the token set after reopen.");

		assert_eq!(fetched, tokens);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[tokio::test]
	async fn later_writes_replace_earlier_ones() {
		let path = temp_path("overwrite");
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let principal = principal("oid-overwrite");

		store
			.set(&principal, TokenSet::builder().access_token("first").build())
			.await
			.expect("Failed to save first token set.");
		store
			.set(&principal, TokenSet::builder().access_token("second").build())
			.await
			.expect("Failed to save second token set.");

		let fetched = store
			.get(&principal.subject_id)
			.await
			.expect("Failed to fetch token set.")
			.expect("Token set should be present.");

		assert_eq!(fetched.access_token.as_ref().map(|secret| secret.expose()), Some("second"));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[tokio::test]
	async fn failed_writes_leave_memory_untouched() {
		let path = temp_path("failed_write");
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let principal = principal("oid-failed-write");

		// A directory at the snapshot path makes the final rename fail.
		fs::create_dir(&path).expect("Failed to block the snapshot path.");
		store
			.set(&principal, TokenSet::builder().access_token("lost").build())
			.await
			.expect_err("Writing over a directory should fail.");

		assert!(
			store.get(&principal.subject_id).await.expect("Failed to fetch token set.").is_none()
		);

		let mut tmp_path = path.clone();

		tmp_path.set_extension("tmp");
		fs::remove_dir(&path).unwrap_or_else(|e| {
			panic!("Failed to remove blocking directory {}: {e}", path.display())
		});
		fs::remove_file(&tmp_path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary snapshot {}: {e}", tmp_path.display())
		});
	}
}
