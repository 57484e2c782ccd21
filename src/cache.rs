//! Expiring async cache with per-entry loaders and single-flight reloads.
//!
//! Each entry owns a loader and a time-to-live. [`ExpiringAsyncCache::get`] serves the stored
//! value while it is fresh and otherwise runs the loader. Reloads are guarded by a per-entry
//! async gate: concurrent callers that miss on the same key queue behind the first one, so a
//! burst of misses produces one upstream load whose outcome every waiter receives.
//!
//! A failed load leaves the previous value in place. Callers that were queued behind it get
//! the same failure as [`Error::Shared`] instead of loading again; the next `get` after that
//! starts a new load.

// crates.io
use tracing::debug;
// self
use crate::_prelude::*;

/// Boxed future produced by a [`CacheLoader`].
pub type CacheFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// Produces a fresh value for a cache entry.
///
/// Implemented for any `Fn() -> impl Future<Output = Result<T>>` closure, which is how
/// callers usually supply loaders.
pub trait CacheLoader<T>
where
	Self: Send + Sync,
{
	/// Starts a new load.
	fn load(&self) -> CacheFuture<T>;
}
impl<T, F, Fut> CacheLoader<T> for F
where
	F: Send + Sync + Fn() -> Fut,
	Fut: 'static + Send + Future<Output = Result<T>>,
{
	fn load(&self) -> CacheFuture<T> {
		Box::pin(self())
	}
}

/// Keyed store of lazily loaded values that expire after a per-entry TTL.
pub struct ExpiringAsyncCache<T> {
	entries: RwLock<HashMap<String, Arc<CacheEntry<T>>>>,
}
impl<T> ExpiringAsyncCache<T>
where
	T: 'static + Clone + Send + Sync,
{
	/// Creates an empty cache.
	pub fn new() -> Self {
		Self { entries: RwLock::new(HashMap::new()) }
	}

	/// Installs or replaces the entry for `key`, dropping any value it held.
	///
	/// `ttl = None` keeps a loaded value forever, as does a TTL whose deadline would fall
	/// outside the representable date range.
	pub fn set<L>(&self, key: impl Into<String>, loader: L, ttl: Option<Duration>)
	where
		L: 'static + CacheLoader<T>,
	{
		let entry = CacheEntry {
			state: Mutex::new(EntryState::default()),
			loader: Arc::new(loader),
			ttl,
			gate: AsyncMutex::new(()),
		};

		self.entries.write().insert(key.into(), Arc::new(entry));
	}

	/// Returns the fresh value for `key`, loading it when missing or expired.
	///
	/// Resolves to `Ok(None)` when no entry was installed for `key`.
	pub async fn get(&self, key: &str) -> Result<Option<T>> {
		let Some(entry) = self.entry(key) else {
			return Ok(None);
		};
		let observed = {
			let mut state = entry.state.lock();

			if let Some(value) = state.fresh_at(OffsetDateTime::now_utc()) {
				return Ok(Some(value));
			}

			state.queued += 1;

			state.loads
		};
		let _gate = entry.gate.lock().await;
		let now = OffsetDateTime::now_utc();

		{
			let mut state = entry.state.lock();

			state.queued = state.queued.saturating_sub(1);

			// Another caller may have finished a load while this one waited for the gate.
			if let Some(value) = state.fresh_at(now) {
				debug!(key, "Cache entry was refreshed by a concurrent load.");

				return Ok(Some(value));
			}
			// Or finished one that failed, which this caller shares instead of retrying.
			if let Some(failure) = state.failure.clone().filter(|_| state.loads != observed) {
				debug!(key, "Cache entry load failed for a concurrent caller.");

				return Err(Error::Shared(failure));
			}
		}

		let expires_at = entry.ttl.and_then(|ttl| now.checked_add(ttl));

		debug!(key, "Loading cache entry.");

		let outcome = entry.loader.load().await;
		let mut state = entry.state.lock();

		state.loads = state.loads.wrapping_add(1);

		match outcome {
			Ok(value) => {
				state.store(value.clone(), expires_at);

				Ok(Some(value))
			},
			Err(e) if state.queued == 0 => {
				state.failure = None;

				Err(e)
			},
			Err(e) => {
				let failure = Arc::new(e);

				state.failure = Some(failure.clone());

				Err(Error::Shared(failure))
			},
		}
	}

	/// Returns `true` if an entry is installed for `key`.
	pub fn contains(&self, key: &str) -> bool {
		self.entries.read().contains_key(key)
	}

	/// Returns `true` if `key` currently holds a fresh value.
	pub fn is_fresh(&self, key: &str) -> bool {
		self.entry(key)
			.is_some_and(|entry| entry.state.lock().fresh_at(OffsetDateTime::now_utc()).is_some())
	}

	/// Removes the entry for `key`, loader included.
	pub fn clear(&self, key: &str) {
		self.entries.write().remove(key);
	}

	/// Removes every entry.
	pub fn clear_all(&self) {
		self.entries.write().clear();
	}

	fn entry(&self, key: &str) -> Option<Arc<CacheEntry<T>>> {
		self.entries.read().get(key).cloned()
	}
}
impl<T> Default for ExpiringAsyncCache<T>
where
	T: 'static + Clone + Send + Sync,
{
	fn default() -> Self {
		Self::new()
	}
}
impl<T> Debug for ExpiringAsyncCache<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let entries = self.entries.read();
		let mut keys: Vec<_> = entries.keys().collect();

		keys.sort();

		f.debug_struct("ExpiringAsyncCache").field("keys", &keys).finish()
	}
}

struct CacheEntry<T> {
	state: Mutex<EntryState<T>>,
	loader: Arc<dyn CacheLoader<T>>,
	ttl: Option<Duration>,
	gate: AsyncMutex<()>,
}

struct EntryState<T> {
	value: Option<T>,
	expires_at: Option<OffsetDateTime>,
	/// Completed loads, successful or not.
	loads: u64,
	/// Callers waiting for the gate.
	queued: usize,
	/// Outcome of the last load when it failed while others were queued behind it.
	failure: Option<Arc<Error>>,
}
impl<T> EntryState<T>
where
	T: Clone,
{
	fn fresh_at(&self, instant: OffsetDateTime) -> Option<T> {
		match (&self.value, self.expires_at) {
			(Some(value), None) => Some(value.clone()),
			(Some(value), Some(expires_at)) if expires_at > instant => Some(value.clone()),
			_ => None,
		}
	}

	fn store(&mut self, value: T, expires_at: Option<OffsetDateTime>) {
		self.value = Some(value);
		self.expires_at = expires_at;
		self.failure = None;
	}
}
impl<T> Default for EntryState<T> {
	fn default() -> Self {
		Self { value: None, expires_at: None, loads: 0, queued: 0, failure: None }
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::error::DiscoveryError;

	fn counting_loader(
		calls: Arc<AtomicUsize>,
	) -> impl Fn() -> CacheFuture<usize> + Send + Sync + 'static {
		move || -> CacheFuture<usize> {
			let calls = calls.clone();

			Box::pin(async move { Ok::<_, Error>(calls.fetch_add(1, Ordering::SeqCst) + 1) })
		}
	}

	#[tokio::test]
	async fn unknown_key_resolves_to_none() {
		let cache = <ExpiringAsyncCache<usize>>::new();

		assert!(cache.get("config").await.expect("Missing keys must not fail.").is_none());
	}

	#[tokio::test]
	async fn fresh_value_is_served_without_reloading() {
		let calls = Arc::new(AtomicUsize::new(0));
		let cache = <ExpiringAsyncCache<usize>>::new();

		cache.set("config", counting_loader(calls.clone()), Some(Duration::minutes(5)));

		assert_eq!(cache.get("config").await.expect("First load should succeed."), Some(1));
		assert_eq!(cache.get("config").await.expect("Cached read should succeed."), Some(1));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert!(cache.is_fresh("config"));
	}

	#[tokio::test]
	async fn expired_value_triggers_a_new_load() {
		let calls = Arc::new(AtomicUsize::new(0));
		let cache = <ExpiringAsyncCache<usize>>::new();

		cache.set("keys", counting_loader(calls.clone()), Some(Duration::milliseconds(40)));

		assert_eq!(cache.get("keys").await.expect("First load should succeed."), Some(1));

		tokio::time::sleep(std::time::Duration::from_millis(80)).await;

		assert!(!cache.is_fresh("keys"));
		assert_eq!(cache.get("keys").await.expect("Reload should succeed."), Some(2));
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn entries_without_ttl_never_expire() {
		let calls = Arc::new(AtomicUsize::new(0));
		let cache = <ExpiringAsyncCache<usize>>::new();

		cache.set("static", counting_loader(calls.clone()), None);
		cache.get("static").await.expect("First load should succeed.");
		cache.get("static").await.expect("Cached read should succeed.");

		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn failed_reload_keeps_previous_value() {
		let calls = Arc::new(AtomicUsize::new(0));
		let loader_calls = calls.clone();
		let cache = <ExpiringAsyncCache<String>>::new();

		cache.set(
			"config",
			move || {
				let attempt = loader_calls.fetch_add(1, Ordering::SeqCst);

				async move {
					if attempt == 0 {
						Ok("v1".to_string())
					} else {
						Err(Error::from(DiscoveryError::MissingJwksUri))
					}
				}
			},
			Some(Duration::milliseconds(20)),
		);

		assert_eq!(
			cache.get("config").await.expect("First load should succeed."),
			Some("v1".into())
		);

		tokio::time::sleep(std::time::Duration::from_millis(40)).await;

		let err = cache.get("config").await.expect_err("Failing loader should surface its error.");

		assert!(matches!(err, Error::Discovery(DiscoveryError::MissingJwksUri)));

		let entry = cache.entry("config").expect("Entry should still be installed.");

		assert_eq!(entry.state.lock().value.as_deref(), Some("v1"));

		// The failure is not retried on its own; the next call runs the loader again.
		assert!(cache.get("config").await.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn concurrent_misses_share_one_load() {
		let calls = Arc::new(AtomicUsize::new(0));
		let loader_calls = calls.clone();
		let cache = Arc::new(<ExpiringAsyncCache<usize>>::new());

		cache.set(
			"keys",
			move || {
				let calls = loader_calls.clone();

				async move {
					tokio::time::sleep(std::time::Duration::from_millis(30)).await;

					Ok::<_, Error>(calls.fetch_add(1, Ordering::SeqCst) + 1)
				}
			},
			Some(Duration::minutes(5)),
		);

		let waiters = (0..8)
			.map(|_| {
				let cache = cache.clone();

				tokio::spawn(async move { cache.get("keys").await })
			})
			.collect::<Vec<_>>();

		for waiter in waiters {
			let value = waiter
				.await
				.expect("Waiter task should not panic.")
				.expect("Shared load should succeed.");

			assert_eq!(value, Some(1));
		}

		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn concurrent_misses_share_one_failed_load() {
		let calls = Arc::new(AtomicUsize::new(0));
		let loader_calls = calls.clone();
		let cache = Arc::new(<ExpiringAsyncCache<usize>>::new());

		cache.set(
			"keys",
			move || {
				let calls = loader_calls.clone();

				async move {
					calls.fetch_add(1, Ordering::SeqCst);
					tokio::time::sleep(std::time::Duration::from_millis(100)).await;

					Err::<usize, _>(Error::from(DiscoveryError::MissingJwksUri))
				}
			},
			Some(Duration::minutes(5)),
		);

		let started = std::time::Instant::now();
		let waiters = (0..8)
			.map(|_| {
				let cache = cache.clone();

				tokio::spawn(async move { cache.get("keys").await })
			})
			.collect::<Vec<_>>();

		for waiter in waiters {
			let err = waiter
				.await
				.expect("Waiter task should not panic.")
				.expect_err("Every waiter should see the failed load.");

			assert!(matches!(err.root(), Error::Discovery(DiscoveryError::MissingJwksUri)));
			assert_eq!(err.status_code(), 500);
		}

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert!(started.elapsed() < std::time::Duration::from_millis(500));

		// Callers arriving after the failure start a new load.
		assert!(cache.get("keys").await.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn ttls_past_the_calendar_never_expire() {
		let calls = Arc::new(AtomicUsize::new(0));
		let cache = <ExpiringAsyncCache<usize>>::new();

		cache.set("config", counting_loader(calls.clone()), Some(Duration::MAX));

		assert_eq!(cache.get("config").await.expect("First load should succeed."), Some(1));
		assert_eq!(cache.get("config").await.expect("Cached read should succeed."), Some(1));
		assert!(cache.is_fresh("config"));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn set_and_clear_replace_entries() {
		let calls = Arc::new(AtomicUsize::new(0));
		let cache = <ExpiringAsyncCache<usize>>::new();

		cache.set("config", counting_loader(calls.clone()), Some(Duration::minutes(5)));
		cache.get("config").await.expect("First load should succeed.");
		cache.set("config", counting_loader(calls.clone()), Some(Duration::minutes(5)));

		assert!(!cache.is_fresh("config"), "Replacing an entry must drop its value.");
		assert_eq!(cache.get("config").await.expect("Reload should succeed."), Some(2));

		cache.clear("config");

		assert!(!cache.contains("config"));
		assert!(cache.get("config").await.expect("Cleared keys must not fail.").is_none());

		cache.set("a", counting_loader(calls.clone()), None);
		cache.set("b", counting_loader(calls), None);
		cache.clear_all();

		assert_eq!(format!("{cache:?}"), "ExpiringAsyncCache { keys: [] }");
	}
}
