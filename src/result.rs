//! Resolution outcomes returned by every acquisition entry point.

// self
use crate::{
	_prelude::*,
	auth::{Authority, ResourceId, TokenCacheItem, TokenSecret, UserInformation},
	correlation::CorrelationId,
	error::ServerError,
};

/// Terminal status of a resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthenticationStatus {
	/// A token was returned.
	Succeeded,
	/// The resolution failed.
	Failed,
	/// The user or caller aborted the interactive or broker flow.
	Cancelled,
}

/// Public error taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
	/// A silent path needed user interaction.
	UserInputNeeded,
	/// The user or caller aborted an interactive or broker flow.
	Cancelled,
	/// The identity provider rejected the request.
	ServerError,
	/// The exchange failed in transport.
	NetworkError,
	/// The broker did not respond in time.
	BrokerTimeout,
	/// A broker response did not match its request.
	BrokerResponseMismatch,
	/// The persistence collaborator failed.
	CacheStorageError,
	/// The context or request is misconfigured.
	InvalidConfiguration,
	/// The returned identity differs from the requested one.
	UserMismatch,
	/// Several cached users match and none was specified.
	MultipleUsers,
}

/// Cloneable failure description carried by [`AuthenticationResult`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticationError {
	/// Error category.
	pub kind: ErrorKind,
	/// Human-readable message.
	pub message: String,
	/// Identity provider rejection, when the failure came from the token endpoint.
	pub server_error: Option<ServerError>,
	/// Correlation id of the failed resolution.
	pub correlation_id: CorrelationId,
}
impl AuthenticationError {
	/// Folds an internal error into its public description.
	pub fn from_error(error: &Error, correlation_id: CorrelationId) -> Self {
		let server_error = match error {
			Error::Server(server) => Some(server.clone()),
			_ => None,
		};

		Self { kind: error.kind(), message: error.to_string(), server_error, correlation_id }
	}
}
impl Display for AuthenticationError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{:?}: {} (correlation id {})", self.kind, self.message, self.correlation_id)
	}
}
impl StdError for AuthenticationError {}

/// Token fields of a successful resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct AcquiredToken {
	/// Access token secret.
	pub access_token: TokenSecret,
	/// Access token type.
	pub access_token_type: Option<String>,
	/// Expiry instant.
	pub expires_on: OffsetDateTime,
	/// Refresh token, if one is cached.
	pub refresh_token: Option<TokenSecret>,
	/// Identity the token belongs to.
	pub user_information: Option<UserInformation>,
	/// Issuing authority.
	pub authority: Authority,
	/// Resource the token targets.
	pub resource: Option<ResourceId>,
	/// The refresh token may be redeemed for other resources.
	pub multi_resource_refresh_token: bool,
}
impl AcquiredToken {
	/// Projects a cache item; `None` unless it carries an access token and expiry.
	pub fn from_item(item: &TokenCacheItem) -> Option<Self> {
		Some(Self {
			access_token: item.access_token.clone()?,
			access_token_type: item.access_token_type.clone(),
			expires_on: item.expires_on?,
			refresh_token: item.refresh_token.clone(),
			user_information: item.user_information.clone(),
			authority: item.authority.clone(),
			resource: item.resource.clone(),
			multi_resource_refresh_token: item.spans_resources && item.refresh_token.is_some(),
		})
	}
}

#[derive(Clone, Debug, PartialEq)]
enum Outcome {
	Succeeded(Box<AcquiredToken>),
	Failed(AuthenticationError),
	Cancelled(AuthenticationError),
}

/// Exactly one outcome per resolution: token fields or an error, never both.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthenticationResult {
	correlation_id: CorrelationId,
	outcome: Outcome,
}
impl AuthenticationResult {
	/// Successful result.
	pub fn succeeded(token: AcquiredToken, correlation_id: CorrelationId) -> Self {
		Self { correlation_id, outcome: Outcome::Succeeded(Box::new(token)) }
	}

	/// Failed or cancelled result, depending on the error kind.
	pub fn from_error(error: &Error, correlation_id: CorrelationId) -> Self {
		let public = AuthenticationError::from_error(error, correlation_id);
		let outcome = match public.kind {
			ErrorKind::Cancelled => Outcome::Cancelled(public),
			_ => Outcome::Failed(public),
		};

		Self { correlation_id, outcome }
	}

	pub(crate) fn from_result(result: Result<AcquiredToken>, correlation_id: CorrelationId) -> Self {
		match result {
			Ok(token) => Self::succeeded(token, correlation_id),
			Err(e) => Self::from_error(&e, correlation_id),
		}
	}

	/// Rebinds the result to another resolution's correlation id.
	pub(crate) fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
		self.correlation_id = correlation_id;

		if let Outcome::Failed(error) | Outcome::Cancelled(error) = &mut self.outcome {
			error.correlation_id = correlation_id;
		}

		self
	}

	/// Terminal status.
	pub fn status(&self) -> AuthenticationStatus {
		match self.outcome {
			Outcome::Succeeded(_) => AuthenticationStatus::Succeeded,
			Outcome::Failed(_) => AuthenticationStatus::Failed,
			Outcome::Cancelled(_) => AuthenticationStatus::Cancelled,
		}
	}

	/// Correlation id of the resolution.
	pub fn correlation_id(&self) -> CorrelationId {
		self.correlation_id
	}

	/// Token fields, when the resolution succeeded.
	pub fn token(&self) -> Option<&AcquiredToken> {
		match &self.outcome {
			Outcome::Succeeded(token) => Some(token),
			_ => None,
		}
	}

	/// Error, when the resolution failed or was cancelled.
	pub fn error(&self) -> Option<&AuthenticationError> {
		match &self.outcome {
			Outcome::Succeeded(_) => None,
			Outcome::Failed(error) | Outcome::Cancelled(error) => Some(error),
		}
	}

	/// Shorthand for the error kind.
	pub fn error_kind(&self) -> Option<ErrorKind> {
		self.error().map(|e| e.kind)
	}

	/// Converts into a standard `Result`.
	pub fn into_token(self) -> std::result::Result<AcquiredToken, AuthenticationError> {
		match self.outcome {
			Outcome::Succeeded(token) => Ok(*token),
			Outcome::Failed(error) | Outcome::Cancelled(error) => Err(error),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::ClientId;

	#[test]
	fn cancellation_is_not_a_failure() {
		let id = CorrelationId::new_v4();
		let result = AuthenticationResult::from_error(&Error::Cancelled, id);

		assert_eq!(result.status(), AuthenticationStatus::Cancelled);
		assert_eq!(result.error_kind(), Some(ErrorKind::Cancelled));
		assert!(result.token().is_none());
		assert_eq!(result.correlation_id(), id);
	}

	#[test]
	fn server_rejections_keep_their_details() {
		let id = CorrelationId::new_v4();
		let result =
			AuthenticationResult::from_error(&ServerError::invalid_grant("stale").into(), id);
		let error = result.error().expect("Failed result should carry an error.");

		assert_eq!(result.status(), AuthenticationStatus::Failed);
		assert_eq!(error.kind, ErrorKind::ServerError);
		assert_eq!(error.server_error.as_ref().map(|e| e.code.as_str()), Some("invalid_grant"));
		assert_eq!(error.correlation_id, id);
	}

	#[test]
	fn only_items_with_access_tokens_project_into_results() {
		let authority =
			Authority::new("https://login.example.com/tenant").expect("Authority should be valid.");
		let client = ClientId::new("client-1").expect("Client should be valid.");
		let family = TokenCacheItem::builder(authority.clone(), None, client.clone())
			.refresh_token("rt")
			.build()
			.expect("Family item should build.");

		assert!(AcquiredToken::from_item(&family).is_none());

		let item = TokenCacheItem::builder(
			authority,
			Some(ResourceId::new("https://graph.example.com").expect("Resource should be valid.")),
			client,
		)
		.access_token("at")
		.refresh_token("rt")
		.expires_in(Duration::hours(1))
		.spans_resources(true)
		.build()
		.expect("Item should build.");
		let token = AcquiredToken::from_item(&item).expect("Item with access token should project.");

		assert!(token.multi_resource_refresh_token);
		assert_eq!(token.access_token.expose(), "at");
	}
}
