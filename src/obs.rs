//! Optional observability helpers for token resolutions.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `oauth2_context.flow` with the `flow`,
//!   `stage` (call site), and `correlation_id` fields.
//! - Enable `metrics` to increment the `oauth2_context_flow_total` counter for every
//!   attempt/success/failure/cancellation, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Resolution paths observed by the context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Cache lookup on any entry point.
	Silent,
	/// Refresh token redemption.
	Refresh,
	/// Interactive authorization plus code exchange.
	Interactive,
	/// SAML assertion exchange.
	Assertion,
	/// Broker hand-off and code exchange.
	Broker,
	/// Client credentials grant.
	ClientCredentials,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Silent => "silent",
			FlowKind::Refresh => "refresh",
			FlowKind::Interactive => "interactive",
			FlowKind::Assertion => "assertion",
			FlowKind::Broker => "broker",
			FlowKind::ClientCredentials => "client_credentials",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure reported to the caller.
	Failure,
	/// User or caller aborted the flow.
	Cancelled,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
			FlowOutcome::Cancelled => "cancelled",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
