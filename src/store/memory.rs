//! Thread-safe in-memory persistence for tests and ephemeral contexts.

// std
use std::sync::atomic::{AtomicBool, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{TokenCacheItem, TokenCacheKey},
	broker::PendingBrokerRequest,
	store::{CachePersistence, PendingRequestStore, StoreError, StoreFuture},
};

#[derive(Debug, Default)]
struct Inner {
	tokens: RwLock<HashMap<TokenCacheKey, TokenCacheItem>>,
	pending: Mutex<HashMap<String, PendingBrokerRequest>>,
	fail_writes: AtomicBool,
}

/// In-process storage implementing both persistence contracts.
///
/// Clones share state, so a clone kept by a test observes every write.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<Inner>);
impl MemoryStore {
	/// Makes every subsequent write fail with [`StoreError::Backend`] while `fail` is set.
	pub fn fail_writes(&self, fail: bool) {
		self.0.fail_writes.store(fail, Ordering::SeqCst);
	}

	/// Number of persisted token items.
	pub fn token_count(&self) -> usize {
		self.0.tokens.read().len()
	}

	fn check_writable(&self) -> Result<(), StoreError> {
		if self.0.fail_writes.load(Ordering::SeqCst) {
			Err(StoreError::Backend { message: "writes are disabled".into() })
		} else {
			Ok(())
		}
	}
}
impl CachePersistence for MemoryStore {
	fn load(&self) -> StoreFuture<'_, Vec<TokenCacheItem>> {
		Box::pin(async move { Ok(self.0.tokens.read().values().cloned().collect()) })
	}

	fn save(&self, item: TokenCacheItem) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.check_writable()?;
			self.0.tokens.write().insert(item.key(), item);

			Ok(())
		})
	}

	fn remove<'a>(&'a self, key: &'a TokenCacheKey) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.check_writable()?;
			self.0.tokens.write().remove(key);

			Ok(())
		})
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.check_writable()?;
			self.0.tokens.write().clear();

			Ok(())
		})
	}
}
impl PendingRequestStore for MemoryStore {
	fn put(&self, request: PendingBrokerRequest) -> Result<(), StoreError> {
		self.check_writable()?;
		self.0.pending.lock().insert(request.state.clone(), request);

		Ok(())
	}

	fn take(&self, state: &str) -> Result<Option<PendingBrokerRequest>, StoreError> {
		Ok(self.0.pending.lock().remove(state))
	}

	fn list(&self) -> Result<Vec<PendingBrokerRequest>, StoreError> {
		Ok(self.0.pending.lock().values().cloned().collect())
	}
}
