//! Persistence collaborators for cached tokens and pending broker requests.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{TokenCacheItem, TokenCacheKey},
	broker::PendingBrokerRequest,
};

/// Boxed future returned by asynchronous persistence operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Secure-storage contract backing the token cache.
///
/// Implementations must apply each call atomically for the affected key; the cache
/// serializes writes per key before calling in.
pub trait CachePersistence
where
	Self: Send + Sync,
{
	/// Loads every persisted item.
	fn load(&self) -> StoreFuture<'_, Vec<TokenCacheItem>>;

	/// Persists or replaces the item stored under `item.key()`.
	fn save(&self, item: TokenCacheItem) -> StoreFuture<'_, ()>;

	/// Removes the item stored under `key`, if any.
	fn remove<'a>(&'a self, key: &'a TokenCacheKey) -> StoreFuture<'a, ()>;

	/// Removes every persisted item.
	fn clear(&self) -> StoreFuture<'_, ()>;
}

/// Durable table of broker requests awaiting a response.
///
/// Calls are synchronous because the broker response handler runs on the platform's URL
/// callback, outside of any executor.
pub trait PendingRequestStore
where
	Self: Send + Sync,
{
	/// Records a pending request under its `state`.
	fn put(&self, request: PendingBrokerRequest) -> Result<(), StoreError>;

	/// Removes and returns the request registered under `state`.
	fn take(&self, state: &str) -> Result<Option<PendingBrokerRequest>, StoreError>;

	/// Returns every pending request.
	fn list(&self) -> Result<Vec<PendingBrokerRequest>, StoreError>;
}

/// Error type produced by persistence implementations.
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
