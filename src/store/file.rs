//! JSON file persistence for desktop and CLI contexts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{TokenCacheItem, TokenCacheKey},
	broker::PendingBrokerRequest,
	store::{CachePersistence, PendingRequestStore, StoreError, StoreFuture},
};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Snapshot {
	tokens: Vec<TokenCacheItem>,
	pending: Vec<PendingBrokerRequest>,
}

#[derive(Debug, Default)]
struct State {
	tokens: HashMap<TokenCacheKey, TokenCacheItem>,
	pending: HashMap<String, PendingBrokerRequest>,
}
impl State {
	fn snapshot(&self) -> Snapshot {
		Snapshot {
			tokens: self.tokens.values().cloned().collect(),
			pending: self.pending.values().cloned().collect(),
		}
	}
}

/// Persists tokens and pending broker requests to one JSON file after each mutation.
///
/// Writes go to a sibling `.tmp` file that is synced and renamed over the snapshot, so a
/// crash never leaves a half-written file behind.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<Mutex<State>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;
		let state = State {
			tokens: snapshot.tokens.into_iter().map(|item| (item.key(), item)).collect(),
			pending: snapshot
				.pending
				.into_iter()
				.map(|request| (request.state.clone(), request))
				.collect(),
		};

		Ok(Self { path, inner: Arc::new(Mutex::new(state)) })
	}

	/// Location of the snapshot file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		if !path.exists() {
			return Ok(Snapshot::default());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(Snapshot::default());
		}

		let mut de = serde_json::Deserializer::from_slice(&bytes);

		serde_path_to_error::deserialize(&mut de).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {} at {}: {}", path.display(), e.path(), e.inner()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, state: &State) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(&state.snapshot()).map_err(|e| StoreError::Serialization {
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

	/// Applies `mutate` and persists; the in-memory state is rolled back if the write fails.
	fn mutate<T>(&self, mutate: impl FnOnce(&mut State) -> T) -> Result<T, StoreError> {
		let mut guard = self.inner.lock();
		let previous = State { tokens: guard.tokens.clone(), pending: guard.pending.clone() };
		let output = mutate(&mut guard);

		if let Err(e) = self.persist_locked(&guard) {
			*guard = previous;

			return Err(e);
		}

		Ok(output)
	}
}
impl CachePersistence for FileStore {
	fn load(&self) -> StoreFuture<'_, Vec<TokenCacheItem>> {
		Box::pin(async move { Ok(self.inner.lock().tokens.values().cloned().collect()) })
	}

	fn save(&self, item: TokenCacheItem) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.mutate(|state| {
				state.tokens.insert(item.key(), item);
			})
		})
	}

	fn remove<'a>(&'a self, key: &'a TokenCacheKey) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.mutate(|state| {
				state.tokens.remove(key);
			})
		})
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.mutate(|state| state.tokens.clear()) })
	}
}
impl PendingRequestStore for FileStore {
	fn put(&self, request: PendingBrokerRequest) -> Result<(), StoreError> {
		self.mutate(|state| {
			state.pending.insert(request.state.clone(), request);
		})
	}

	fn take(&self, state: &str) -> Result<Option<PendingBrokerRequest>, StoreError> {
		if !self.inner.lock().pending.contains_key(state) {
			return Ok(None);
		}

		self.mutate(|s| s.pending.remove(state))
	}

	fn list(&self) -> Result<Vec<PendingBrokerRequest>, StoreError> {
		Ok(self.inner.lock().pending.values().cloned().collect())
	}
}
