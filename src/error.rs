//! Context-level error types shared across the resolver, cache, endpoint, and broker bridge.

// self
use crate::{_prelude::*, result::ErrorKind};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error raised inside the crate.
///
/// Public acquisition entry points never surface this type directly; they fold it into an
/// [`AuthenticationError`](crate::result::AuthenticationError) carried by the result.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Persistence collaborator failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Identity provider rejected the request.
	#[error(transparent)]
	Server(#[from] ServerError),

	/// A silent entry point needed user interaction to continue.
	#[error("User interaction is required: {reason}.")]
	UserInputNeeded {
		/// Why the silent path could not complete.
		reason: String,
	},
	/// The user or caller aborted an interactive or broker flow.
	#[error("The authorization flow was cancelled.")]
	Cancelled,
	/// The broker did not answer within the configured window.
	#[error("The broker did not respond within {timeout}.")]
	BrokerTimeout {
		/// Window that elapsed.
		timeout: Duration,
	},
	/// A broker response could not be matched to a pending request.
	#[error("Broker response does not match any pending request.")]
	BrokerResponseMismatch,
	/// The identity returned by the provider differs from the requested one.
	#[error("Returned user `{actual}` does not match the requested user `{expected}`.")]
	UserMismatch {
		/// Identifier the caller asked for.
		expected: String,
		/// Identifier the provider returned.
		actual: String,
	},
	/// Cached tokens exist for several users and no user identifier was supplied.
	#[error("Multiple users are cached; a user identifier is required.")]
	MultipleUsers,
}
impl Error {
	/// Projects the error onto the public [`ErrorKind`] taxonomy.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Storage(_) => ErrorKind::CacheStorageError,
			Self::Config(_) => ErrorKind::InvalidConfiguration,
			Self::Transient(_) | Self::Transport(_) => ErrorKind::NetworkError,
			Self::Server(_) => ErrorKind::ServerError,
			Self::UserInputNeeded { .. } => ErrorKind::UserInputNeeded,
			Self::Cancelled => ErrorKind::Cancelled,
			Self::BrokerTimeout { .. } => ErrorKind::BrokerTimeout,
			Self::BrokerResponseMismatch => ErrorKind::BrokerResponseMismatch,
			Self::UserMismatch { .. } => ErrorKind::UserMismatch,
			Self::MultipleUsers => ErrorKind::MultipleUsers,
		}
	}

	/// Returns `true` when the failure means the refresh token itself is unusable.
	pub fn is_invalid_grant(&self) -> bool {
		matches!(self, Self::Server(server) if server.kind == ServerErrorKind::InvalidGrant)
	}

	pub(crate) fn user_input_needed(reason: impl Into<String>) -> Self {
		Self::UserInputNeeded { reason: reason.into() }
	}
}

/// Configuration and validation failures raised at construction or before a flow starts.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Authority URL is malformed or violates the authority rules.
	#[error("Authority `{authority}` is invalid: {reason}.")]
	InvalidAuthority {
		/// Offending authority string.
		authority: String,
		/// Human-readable rule that was violated.
		reason: &'static str,
	},
	/// A URL in the configuration cannot be parsed.
	#[error("The {field} URL is invalid.")]
	InvalidUrl {
		/// Which configuration field failed.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// An identifier failed validation.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// The chosen flow needs a redirect URI but none was supplied.
	#[error("The {flow} flow requires a redirect URI.")]
	MissingRedirectUri {
		/// Flow label.
		flow: &'static str,
	},
	/// The context was built without a collaborator that a flow needs.
	#[error("No {collaborator} is configured for this context.")]
	MissingCollaborator {
		/// Collaborator label.
		collaborator: &'static str,
	},
	/// Broker configuration is inconsistent.
	#[error("Broker configuration is invalid: {reason}.")]
	InvalidBroker {
		/// Human-readable rule that was violated.
		reason: &'static str,
	},
	/// Token item builder validation failed.
	#[error("Unable to build token cache item.")]
	TokenBuild(#[from] crate::auth::TokenCacheItemBuilderError),
	/// Token endpoint returned a non-positive or oversized duration.
	#[error("The expires_in value {value} is out of range.")]
	ExpiresInOutOfRange {
		/// Raw value returned by the endpoint.
		value: i64,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Endpoint returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Endpoint responded with JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Sub-reason attached to an identity provider rejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerErrorKind {
	/// The grant (code, refresh token, assertion) is invalid or expired.
	InvalidGrant,
	/// Client authentication failed or the client is not authorized.
	InvalidClient,
	/// Requested resource or scope is not permitted.
	InvalidScope,
	/// The provider demands user interaction (consent, login, MFA).
	InteractionRequired,
	/// The provider reported a temporary condition.
	Transient,
	/// Any other OAuth error code.
	Other,
}

/// Identity provider rejection with the OAuth error fields it returned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
	/// Classified sub-reason.
	pub kind: ServerErrorKind,
	/// Raw OAuth `error` code.
	pub code: String,
	/// Raw OAuth `error_description`, if any.
	pub description: Option<String>,
	/// HTTP status code, when the rejection came over HTTP.
	pub status: Option<u16>,
}
impl ServerError {
	/// Creates a server error with the provided classification and code.
	pub fn new(kind: ServerErrorKind, code: impl Into<String>) -> Self {
		Self { kind, code: code.into(), description: None, status: None }
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());

		self
	}

	/// Adds the HTTP status code.
	pub fn with_status(mut self, status: u16) -> Self {
		self.status = Some(status);

		self
	}

	/// Shorthand for an `invalid_grant` rejection.
	pub fn invalid_grant(description: impl Into<String>) -> Self {
		Self::new(ServerErrorKind::InvalidGrant, "invalid_grant").with_description(description)
	}
}
impl Display for ServerError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Identity provider rejected the request ({})", self.code)?;

		if let Some(description) = &self.description {
			write!(f, ": {description}")?;
		}

		Ok(())
	}
}
impl StdError for ServerError {}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn kinds_follow_public_taxonomy() {
		assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
		assert_eq!(Error::user_input_needed("no token").kind(), ErrorKind::UserInputNeeded);
		assert_eq!(
			Error::from(ServerError::invalid_grant("expired")).kind(),
			ErrorKind::ServerError
		);
		assert_eq!(
			Error::from(ConfigError::MissingRedirectUri { flow: "interactive" }).kind(),
			ErrorKind::InvalidConfiguration
		);
		assert_eq!(
			Error::from(TransportError::Io(std::io::Error::other("reset"))).kind(),
			ErrorKind::NetworkError
		);
	}

	#[test]
	fn invalid_grant_detection_only_matches_grant_rejections() {
		assert!(Error::from(ServerError::invalid_grant("stale")).is_invalid_grant());
		assert!(
			!Error::from(ServerError::new(ServerErrorKind::InvalidClient, "invalid_client"))
				.is_invalid_grant()
		);
		assert!(!Error::Cancelled.is_invalid_grant());
	}

	#[test]
	fn server_error_message_includes_description() {
		let err = ServerError::invalid_grant("AADSTS70008: code expired").with_status(400);

		assert_eq!(
			err.to_string(),
			"Identity provider rejected the request (invalid_grant): AADSTS70008: code expired"
		);
		assert_eq!(err.status, Some(400));
	}
}
