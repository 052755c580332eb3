//! Per-request correlation identifiers.

// crates.io
use uuid::Uuid;
// self
use crate::_prelude::*;

/// Opaque identifier attached to every resolution, outbound request, and result.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);
impl CorrelationId {
	/// Query/header name used to carry the identifier.
	pub const PARAM: &'static str = "client-request-id";

	/// Generates a random identifier.
	pub fn new_v4() -> Self {
		Self(Uuid::new_v4())
	}

	/// Wraps an existing UUID.
	pub const fn from_uuid(uuid: Uuid) -> Self {
		Self(uuid)
	}

	/// Returns the wrapped UUID.
	pub const fn as_uuid(&self) -> &Uuid {
		&self.0
	}
}
impl Default for CorrelationId {
	fn default() -> Self {
		Self::new_v4()
	}
}
impl FromStr for CorrelationId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s).map(Self)
	}
}
impl Debug for CorrelationId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "CorrelationId({})", self.0)
	}
}
impl Display for CorrelationId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		Display::fmt(&self.0.hyphenated(), f)
	}
}
