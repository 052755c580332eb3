// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for resolver decisions.
#[derive(Debug, Default)]
pub struct ResolverMetrics {
	cache_hits: AtomicU64,
	refresh_attempts: AtomicU64,
	refresh_failures: AtomicU64,
	interactive_prompts: AtomicU64,
	broker_handoffs: AtomicU64,
	coalesced_waiters: AtomicU64,
}
impl ResolverMetrics {
	/// Resolutions served from an unexpired cached access token.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	/// Refresh token redemptions attempted.
	pub fn refresh_attempts(&self) -> u64 {
		self.refresh_attempts.load(Ordering::Relaxed)
	}

	/// Refresh token redemptions that failed.
	pub fn refresh_failures(&self) -> u64 {
		self.refresh_failures.load(Ordering::Relaxed)
	}

	/// Interactive provider invocations.
	pub fn interactive_prompts(&self) -> u64 {
		self.interactive_prompts.load(Ordering::Relaxed)
	}

	/// Broker application switches.
	pub fn broker_handoffs(&self) -> u64 {
		self.broker_handoffs.load(Ordering::Relaxed)
	}

	/// Calls that joined an in-flight resolution instead of starting their own.
	pub fn coalesced_waiters(&self) -> u64 {
		self.coalesced_waiters.load(Ordering::Relaxed)
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_attempt(&self) {
		self.refresh_attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_failure(&self) {
		self.refresh_failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_interactive_prompt(&self) {
		self.interactive_prompts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_broker_handoff(&self) {
		self.broker_handoffs.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_coalesced_waiter(&self) {
		self.coalesced_waiters.fetch_add(1, Ordering::Relaxed);
	}
}
