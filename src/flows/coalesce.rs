//! Per-key coalescing of concurrent resolutions.

// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	auth::{Authority, ClientId, ResourceId, UserIdentifier},
	correlation::CorrelationId,
	result::AuthenticationResult,
};

/// Entry point a resolution was started from; different entry points never share results.
///
/// Refreshes of one cache slot are still serialized across entry points by the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum EntryMode {
	Interactive,
	Silent,
	Assertion,
	Client,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct CoalesceKey {
	pub(crate) authority: Authority,
	pub(crate) resource: ResourceId,
	pub(crate) client_id: ClientId,
	pub(crate) user: Option<UserIdentifier>,
	pub(crate) mode: EntryMode,
}

type Waiters = Vec<oneshot::Sender<AuthenticationResult>>;

/// Tracks in-flight resolutions and the callers waiting on them.
#[derive(Debug, Default)]
pub(crate) struct Coalescer {
	inflight: Mutex<HashMap<CoalesceKey, Waiters>>,
}
impl Coalescer {
	/// Makes the caller the leader for `key`, or enrolls it as a waiter.
	pub(crate) fn join(&self, key: CoalesceKey, correlation_id: CorrelationId) -> Role<'_> {
		let mut inflight = self.inflight.lock();

		if let Some(waiters) = inflight.get_mut(&key) {
			let (sender, receiver) = oneshot::channel();

			waiters.push(sender);

			return Role::Follower(receiver);
		}

		inflight.insert(key.clone(), Vec::new());

		Role::Leader(Leader { coalescer: self, key: Some(key), correlation_id })
	}

	fn finish(&self, key: &CoalesceKey, result: &AuthenticationResult) {
		let waiters = self.inflight.lock().remove(key).unwrap_or_default();

		for waiter in waiters {
			// A waiter whose caller went away is simply skipped.
			let _ = waiter.send(result.clone());
		}
	}

	#[cfg(test)]
	fn inflight(&self) -> usize {
		self.inflight.lock().len()
	}
}

pub(crate) enum Role<'a> {
	Leader(Leader<'a>),
	Follower(oneshot::Receiver<AuthenticationResult>),
}

/// Runs the resolution for its key; waiters are released when it completes or is dropped.
pub(crate) struct Leader<'a> {
	coalescer: &'a Coalescer,
	key: Option<CoalesceKey>,
	correlation_id: CorrelationId,
}
impl Leader<'_> {
	pub(crate) fn complete(mut self, result: &AuthenticationResult) {
		if let Some(key) = self.key.take() {
			self.coalescer.finish(&key, result);
		}
	}
}
impl Drop for Leader<'_> {
	fn drop(&mut self) {
		if let Some(key) = self.key.take() {
			let cancelled = AuthenticationResult::from_error(&Error::Cancelled, self.correlation_id);

			self.coalescer.finish(&key, &cancelled);
		}
	}
}
