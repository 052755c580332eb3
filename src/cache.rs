//! Shared token cache with tiered lookup and per-key serialized writes.

// std
use std::cmp::Reverse;
// crates.io
use async_lock::MutexGuardArc;
// self
use crate::{
	_prelude::*,
	auth::{
		Authority, ClientId, FamilyId, ResourceId, TokenCacheItem, TokenCacheKey, TokenSecret,
		UserIdentifier,
	},
	clock::ExpiryPolicy,
	store::{CachePersistence, StoreError},
};

/// Parameters of a cache lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheQuery {
	/// Authority the item must have been issued by.
	pub authority: Authority,
	/// Resource the caller wants a token for.
	pub resource: ResourceId,
	/// Requesting client.
	pub client_id: ClientId,
	/// Identity constraint; `None` accepts any user.
	pub user: Option<UserIdentifier>,
	/// When set, family items issued to other clients of this family are acceptable.
	pub family_id: Option<FamilyId>,
}
impl CacheQuery {
	/// Creates a query without identity or family constraints.
	pub fn new(authority: Authority, resource: ResourceId, client_id: ClientId) -> Self {
		Self { authority, resource, client_id, user: None, family_id: None }
	}

	/// Restricts matches to the provided identity.
	pub fn with_user(mut self, user: Option<UserIdentifier>) -> Self {
		self.user = user;

		self
	}

	/// Permits cross-client family refresh token reuse within `family_id`.
	pub fn with_family(mut self, family_id: Option<FamilyId>) -> Self {
		self.family_id = family_id;

		self
	}

	fn matches_user(&self, item: &TokenCacheItem) -> bool {
		self.user.as_ref().is_none_or(|user| user.matches(item.user_information.as_ref()))
	}
}

/// In-memory token cache, optionally mirrored to a [`CachePersistence`] collaborator.
///
/// Reads are concurrent; writes to the same key are serialized and hit persistence before
/// the in-memory map, so a failed write leaves the cache unchanged. Refreshes of one slot are
/// serialized separately (see [`TokenCache::lock_refresh`]).
#[derive(Default)]
pub struct TokenCache {
	entries: RwLock<HashMap<TokenCacheKey, TokenCacheItem>>,
	persistence: Option<Arc<dyn CachePersistence>>,
	write_locks: KeyedLocks,
	refresh_locks: KeyedLocks,
}
impl TokenCache {
	/// Creates an empty, memory-only cache.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a cache backed by `persistence`, preloading its items.
	pub async fn open(persistence: Arc<dyn CachePersistence>) -> Result<Self, StoreError> {
		let items = persistence.load().await?;
		let entries = items.into_iter().map(|item| (item.key(), item)).collect();

		Ok(Self {
			entries: RwLock::new(entries),
			persistence: Some(persistence),
			write_locks: KeyedLocks::default(),
			refresh_locks: KeyedLocks::default(),
		})
	}

	/// Returns candidates for `query`, most specific first.
	///
	/// Order: items for the exact resource, then the requesting client's family items, then
	/// (only when `query.family_id` is set) family items of other clients in that family.
	/// Authority always has to match and app-only items are never returned. Never fails; no match yields an empty vector.
	pub fn lookup(&self, query: &CacheQuery) -> Vec<TokenCacheItem> {
		let entries = self.entries.read();
		let mut exact = Vec::new();
		let mut own_family = Vec::new();
		let mut shared_family = Vec::new();

		for item in entries.values() {
			if item.app_only || item.authority != query.authority || !query.matches_user(item)
			{
				continue;
			}

			let own_client = item.client_id == query.client_id;

			match &item.resource {
				Some(resource) if own_client && *resource == query.resource =>
					exact.push(item.clone()),
				None if own_client && item.refresh_token.is_some() => own_family.push(item.clone()),
				None if item.refresh_token.is_some()
					&& query.family_id.is_some()
					&& item.family_id == query.family_id =>
					shared_family.push(item.clone()),
				_ => {},
			}
		}

		drop(entries);

		for tier in [&mut exact, &mut own_family, &mut shared_family] {
			tier.sort_by_key(|item| (Reverse(item.expires_on), item.key().to_string()));
		}

		exact.into_iter().chain(own_family).chain(shared_family).collect()
	}

	/// Returns the item stored under `key`.
	pub fn get(&self, key: &TokenCacheKey) -> Option<TokenCacheItem> {
		self.entries.read().get(key).cloned()
	}

	/// Snapshot of every cached item.
	pub fn items(&self) -> Vec<TokenCacheItem> {
		self.entries.read().values().cloned().collect()
	}

	/// Number of cached items (family slots included).
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns `true` when the cache holds nothing.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}

	/// Returns `true` when `now + skew >= item.expires_on`.
	pub fn is_expired(item: &TokenCacheItem, now: OffsetDateTime, skew: Duration) -> bool {
		ExpiryPolicy::new(skew).is_expired(item.expires_on, now)
	}

	/// Replaces the item under `item.key()`.
	///
	/// Items whose refresh token spans resources are also indexed under the resource-less
	/// family slot so lookups for other resources can redeem it.
	pub async fn insert_or_replace(&self, item: TokenCacheItem) -> Result<(), StoreError> {
		let family = item.to_family_item();

		self.write(item).await?;

		if let Some(family) = family {
			self.write(family).await?;
		}

		Ok(())
	}

	/// Removes the item under `key`.
	pub async fn remove(&self, key: &TokenCacheKey) -> Result<(), StoreError> {
		let _lock = self.write_locks.lock(key).await;

		self.remove_locked(key).await
	}

	/// Removes the item under `key` only while it still holds `rejected` as refresh token.
	///
	/// Returns `true` when the item was removed.
	pub(crate) async fn evict_refresh_token(
		&self,
		key: &TokenCacheKey,
		rejected: &TokenSecret,
	) -> Result<bool, StoreError> {
		let _lock = self.write_locks.lock(key).await;

		if self.get(key).is_none_or(|item| item.refresh_token.as_ref() != Some(rejected)) {
			return Ok(false);
		}

		self.remove_locked(key).await?;

		Ok(true)
	}

	/// Removes every item.
	///
	/// Waits for writes already in flight so none of them lands after the clear.
	pub async fn remove_all(&self) -> Result<(), StoreError> {
		let mut keys = self.entries.read().keys().cloned().collect::<HashSet<_>>();

		keys.extend(self.write_locks.keys());

		let mut keys = keys.into_iter().collect::<Vec<_>>();

		keys.sort_by_cached_key(ToString::to_string);

		let mut held = Vec::with_capacity(keys.len());

		for key in &keys {
			held.push(self.write_locks.lock(key).await);
		}

		if let Some(persistence) = &self.persistence {
			persistence.clear().await?;
		}

		self.entries.write().clear();

		flow_event!(debug, removed = keys.len(), "Cleared the token cache.");

		Ok(())
	}

	/// Serializes refreshes of the slot under `key` across every context sharing this cache.
	pub(crate) async fn lock_refresh(&self, key: &TokenCacheKey) -> KeyedGuard<'_> {
		self.refresh_locks.lock(key).await
	}

	async fn remove_locked(&self, key: &TokenCacheKey) -> Result<(), StoreError> {
		if let Some(persistence) = &self.persistence {
			persistence.remove(key).await?;
		}

		self.entries.write().remove(key);

		flow_event!(debug, key = %key, "Removed token cache item.");

		Ok(())
	}

	async fn write(&self, item: TokenCacheItem) -> Result<(), StoreError> {
		let key = item.key();
		let _lock = self.write_locks.lock(&key).await;

		if let Some(persistence) = &self.persistence {
			persistence.save(item.clone()).await?;
		}

		flow_event!(
			debug,
			key = %key,
			refresh_fingerprint = ?item.refresh_token.as_ref().map(|t| t.fingerprint()),
			"Stored token cache item."
		);

		self.entries.write().insert(key, item);

		Ok(())
	}
}
impl Debug for TokenCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCache")
			.field("len", &self.len())
			.field("persistent", &self.persistence.is_some())
			.finish()
	}
}

/// Per-key async locks; an entry lives only while someone holds or waits for it.
#[derive(Default)]
pub(crate) struct KeyedLocks(Mutex<HashMap<TokenCacheKey, Arc<AsyncMutex<()>>>>);
impl KeyedLocks {
	async fn lock(&self, key: &TokenCacheKey) -> KeyedGuard<'_> {
		let lock = self
			.0
			.lock()
			.entry(key.clone())
			.or_insert_with(|| Arc::new(AsyncMutex::new(())))
			.clone();
		let guard = lock.lock_arc().await;

		KeyedGuard { locks: self, key: key.clone(), guard: Some(guard) }
	}

	fn keys(&self) -> Vec<TokenCacheKey> {
		self.0.lock().keys().cloned().collect()
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		self.0.lock().len()
	}

	fn prune(&self, key: &TokenCacheKey) {
		let mut locks = self.0.lock();

		if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
			locks.remove(key);
		}
	}
}

/// Held lock on one key of a [`KeyedLocks`] table.
pub(crate) struct KeyedGuard<'a> {
	locks: &'a KeyedLocks,
	key: TokenCacheKey,
	guard: Option<MutexGuardArc<()>>,
}
impl Drop for KeyedGuard<'_> {
	fn drop(&mut self) {
		self.guard.take();
		self.locks.prune(&self.key);
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{auth::UserInformation, store::MemoryStore};

	fn authority() -> Authority {
		Authority::new("https://login.example.com/tenant").expect("Authority should be valid.")
	}

	fn resource(value: &str) -> ResourceId {
		ResourceId::new(value).expect("Resource should be valid.")
	}

	fn client(value: &str) -> ClientId {
		ClientId::new(value).expect("Client should be valid.")
	}

	fn user(unique: &str, upn: &str) -> UserInformation {
		UserInformation {
			unique_id: Some(unique.into()),
			displayable_id: Some(upn.into()),
			..Default::default()
		}
	}

	fn access_item(
		resource_uri: &str,
		client_id: &str,
		who: Option<UserInformation>,
	) -> TokenCacheItem {
		TokenCacheItem::builder(authority(), Some(resource(resource_uri)), client(client_id))
			.access_token("at")
			.refresh_token("rt")
			.expires_on(macros::datetime!(2030-01-01 00:00 UTC))
			.user_information(who)
			.build()
			.expect("Access item fixture should build.")
	}

	fn family_item(
		client_id: &str,
		family: Option<&str>,
		who: Option<UserInformation>,
	) -> TokenCacheItem {
		TokenCacheItem::builder(authority(), None, client(client_id))
			.refresh_token(format!("mrrt-{client_id}"))
			.user_information(who)
			.family_id(family.map(|f| FamilyId::new(f).expect("Family should be valid.")))
			.build()
			.expect("Family item fixture should build.")
	}

	#[tokio::test]
	async fn insert_then_lookup_returns_identical_token() {
		let cache = TokenCache::new();
		let item = access_item("https://graph.example.com", "client-1", None);

		cache.insert_or_replace(item.clone()).await.expect("Insert should succeed.");

		let found = cache.lookup(&CacheQuery::new(
			authority(),
			resource("https://graph.example.com"),
			client("client-1"),
		));

		assert_eq!(found.len(), 1);
		assert_eq!(found[0].access_token, item.access_token);
		assert_eq!(found[0].expires_on, item.expires_on);
	}

	#[tokio::test]
	async fn family_token_serves_other_resources() {
		let cache = TokenCache::new();
		let alice = user("obj-a", "alice@contoso.com");

		cache
			.insert_or_replace(family_item("client-1", None, Some(alice)))
			.await
			.expect("Insert should succeed.");

		let query =
			CacheQuery::new(authority(), resource("https://r1.example.com"), client("client-1"))
				.with_user(Some(UserIdentifier::unique_id("obj-a")));
		let found = cache.lookup(&query);

		assert_eq!(found.len(), 1);
		assert!(found[0].is_multi_resource_refresh_token());

		let other_user = query.with_user(Some(UserIdentifier::unique_id("obj-b")));

		assert!(cache.lookup(&other_user).is_empty());
	}

	#[tokio::test]
	async fn spanning_refresh_token_is_indexed_under_family_slot() {
		let cache = TokenCache::new();
		let item = TokenCacheItem {
			spans_resources: true,
			..access_item("https://graph.example.com", "client-1", None)
		};

		cache.insert_or_replace(item.clone()).await.expect("Insert should succeed.");

		assert_eq!(cache.len(), 2);
		assert!(cache.get(&item.key().family_slot()).is_some());

		let found = cache.lookup(&CacheQuery::new(
			authority(),
			resource("https://mail.example.com"),
			client("client-1"),
		));

		assert_eq!(found.len(), 1);
		assert!(found[0].resource.is_none());
	}

	#[tokio::test]
	async fn exact_items_rank_before_family_and_foreign_family_needs_permission() {
		let cache = TokenCache::new();

		for item in [
			family_item("client-2", Some("1"), None),
			family_item("client-1", Some("1"), None),
			access_item("https://graph.example.com", "client-1", None),
			access_item("https://graph.example.com", "client-3", None),
		] {
			cache.insert_or_replace(item).await.expect("Insert should succeed.");
		}

		let query =
			CacheQuery::new(authority(), resource("https://graph.example.com"), client("client-1"));
		let found = cache.lookup(&query);

		assert_eq!(found.len(), 2);
		assert!(found[0].resource.is_some());
		assert_eq!(found[1].client_id.as_ref(), "client-1");

		let permitted = cache.lookup(
			&query.with_family(Some(FamilyId::new("1").expect("Family should be valid."))),
		);

		assert_eq!(permitted.len(), 3);
		assert_eq!(permitted[2].client_id.as_ref(), "client-2");
	}

	#[tokio::test]
	async fn authority_must_match() {
		let cache = TokenCache::new();

		cache
			.insert_or_replace(access_item("https://graph.example.com", "client-1", None))
			.await
			.expect("Insert should succeed.");

		let other = Authority::new("https://login.example.com/other")
			.expect("Other authority should be valid.");

		let query =
			CacheQuery::new(other, resource("https://graph.example.com"), client("client-1"));

		assert!(cache.lookup(&query).is_empty());
	}

	#[tokio::test]
	async fn failed_persistence_leaves_cache_unchanged() {
		let store = MemoryStore::default();
		let cache = TokenCache::open(Arc::new(store.clone())).await.expect("Open should succeed.");

		store.fail_writes(true);

		let err = cache
			.insert_or_replace(access_item("https://graph.example.com", "client-1", None))
			.await
			.expect_err("Insert should report the storage failure.");

		assert!(matches!(err, StoreError::Backend { .. }));
		assert!(cache.is_empty());
	}

	#[tokio::test]
	async fn remove_and_remove_all_reach_persistence() {
		let store = MemoryStore::default();
		let cache = TokenCache::open(Arc::new(store.clone())).await.expect("Open should succeed.");
		let item = access_item("https://graph.example.com", "client-1", None);

		cache.insert_or_replace(item.clone()).await.expect("Insert should succeed.");
		cache
			.insert_or_replace(access_item("https://mail.example.com", "client-1", None))
			.await
			.expect("Insert should succeed.");

		assert_eq!(store.token_count(), 2);

		cache.remove(&item.key()).await.expect("Remove should succeed.");

		assert_eq!(store.token_count(), 1);

		cache.remove_all().await.expect("Remove all should succeed.");

		assert_eq!(store.token_count(), 0);
		assert!(cache.is_empty());

		let reopened = TokenCache::open(Arc::new(store)).await.expect("Reopen should succeed.");

		assert!(reopened.is_empty());
	}

	#[tokio::test]
	async fn app_only_items_are_invisible_to_lookups() {
		let cache = TokenCache::new();
		let app = TokenCacheItem {
			app_only: true,
			..access_item("https://graph.example.com", "client-1", None)
		};

		cache.insert_or_replace(app.clone()).await.expect("Insert should succeed.");

		let query =
			CacheQuery::new(authority(), resource("https://graph.example.com"), client("client-1"));

		assert!(cache.lookup(&query).is_empty());
		assert_eq!(cache.get(&app.key()), Some(app.clone()));
		assert!(cache.get(&TokenCacheKey { app_only: false, ..app.key() }).is_none());
	}

	#[tokio::test]
	async fn eviction_spares_a_rotated_refresh_token() {
		let cache = TokenCache::new();
		let item = access_item("https://graph.example.com", "client-1", None);

		cache.insert_or_replace(item.clone()).await.expect("Insert should succeed.");

		let stale = TokenSecret::new("rt-rotated-away");

		assert!(!cache.evict_refresh_token(&item.key(), &stale).await.expect("Evict should run."));
		assert_eq!(cache.len(), 1);

		let current = item.refresh_token.clone().expect("Fixture should carry a refresh token.");

		assert!(cache.evict_refresh_token(&item.key(), &current).await.expect("Evict should run."));
		assert!(cache.is_empty());
	}

	#[tokio::test]
	async fn lock_tables_do_not_outlive_their_users() {
		let cache = TokenCache::new();
		let item = access_item("https://graph.example.com", "client-1", None);

		cache.insert_or_replace(item.clone()).await.expect("Insert should succeed.");
		drop(cache.lock_refresh(&item.key()).await);
		cache.remove(&item.key()).await.expect("Remove should succeed.");
		cache.remove_all().await.expect("Remove all should succeed.");

		assert_eq!(cache.write_locks.len(), 0);
		assert_eq!(cache.refresh_locks.len(), 0);
	}

	#[tokio::test]
	async fn remove_all_waits_for_writes_in_flight() {
		let cache = TokenCache::new();
		let item = access_item("https://graph.example.com", "client-1", None);

		cache.insert_or_replace(item.clone()).await.expect("Insert should succeed.");

		let writing = cache.write_locks.lock(&item.key()).await;
		let clearing = cache.remove_all();

		tokio::pin!(clearing);

		assert!(
			tokio::time::timeout(std::time::Duration::from_millis(20), &mut clearing)
				.await
				.is_err(),
			"Clearing should wait for the held write lock."
		);

		drop(writing);
		clearing.await.expect("Remove all should succeed.");

		assert!(cache.is_empty());
	}

	#[test]
	fn expiry_uses_skew() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let item = TokenCacheItem {
			expires_on: Some(now + Duration::minutes(10)),
			..access_item("https://graph.example.com", "client-1", None)
		};

		assert!(!TokenCache::is_expired(&item, now, Duration::minutes(5)));
		assert!(TokenCache::is_expired(&item, now, Duration::minutes(10)));
	}
}
