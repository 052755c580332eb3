//! Time source abstraction and the skew-tolerant expiry policy.

// self
use crate::_prelude::*;

/// Source of the current instant.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Returns the current UTC instant.
	fn now(&self) -> OffsetDateTime;
}

/// Wall clock backed by [`OffsetDateTime::now_utc`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Manually driven clock for deterministic tests.
#[derive(Clone, Debug)]
pub struct ManualClock(Arc<Mutex<OffsetDateTime>>);
impl ManualClock {
	/// Creates a clock frozen at `instant`.
	pub fn new(instant: OffsetDateTime) -> Self {
		Self(Arc::new(Mutex::new(instant)))
	}

	/// Moves the clock to `instant`.
	pub fn set(&self, instant: OffsetDateTime) {
		*self.0.lock() = instant;
	}

	/// Advances the clock by `delta`.
	pub fn advance(&self, delta: Duration) {
		*self.0.lock() += delta;
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.lock()
	}
}

/// Expiry comparison with a fixed clock-skew tolerance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryPolicy {
	/// Tolerance subtracted from every expiry.
	pub skew: Duration,
}
impl ExpiryPolicy {
	/// Recommended tolerance against server clock drift.
	pub const DEFAULT_SKEW: Duration = Duration::minutes(5);

	/// Creates a policy with the provided skew; negative values are clamped to zero.
	pub fn new(skew: Duration) -> Self {
		Self { skew: skew.max(Duration::ZERO) }
	}

	/// Returns `true` when `now + skew >= expires_on`. A missing expiry counts as expired.
	///
	/// A skew that pushes `now` past the representable range expires everything.
	pub fn is_expired(&self, expires_on: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
		match expires_on {
			Some(expires_on) =>
				now.checked_add(self.skew).is_none_or(|threshold| threshold >= expires_on),
			None => true,
		}
	}
}
impl Default for ExpiryPolicy {
	fn default() -> Self {
		Self::new(Self::DEFAULT_SKEW)
	}
}
