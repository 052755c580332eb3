//! Request types and helpers shared by every flow (payload mapping, identity checks).

// self
use crate::{
	_prelude::*,
	auth::{
		ClientId, FamilyId, ResourceId, TokenCacheItem, TokenCacheItemBuilderError, TokenSecret,
		UserIdentifier, UserInformation,
	},
	config::{CredentialsType, PromptBehavior},
	correlation::CorrelationId,
	endpoint::{AssertionType, TokenRequest},
	error::{ConfigError, TransientError},
	flows::AuthenticationContext,
	result::AcquiredToken,
};

/// Parameters of [`AuthenticationContext::acquire_token`] and
/// [`AuthenticationContext::acquire_token_silent`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcquireTokenRequest {
	/// Resource the token is for.
	pub resource: ResourceId,
	/// Requesting client.
	pub client_id: ClientId,
	/// Redirect URI; required once the resolution needs interaction.
	pub redirect_uri: Option<Url>,
	/// Prompt policy.
	pub prompt: PromptBehavior,
	/// Identity to pin the resolution to.
	pub user: Option<UserIdentifier>,
	/// Query parameters appended to the authorize URL.
	pub extra_query_parameters: Vec<(String, String)>,
	/// Overrides [`ContextOptions::default_credentials_type`](crate::config::ContextOptions).
	pub credentials_type: Option<CredentialsType>,
	/// Caller-chosen correlation id; a fresh one is generated otherwise.
	pub correlation_id: Option<CorrelationId>,
}
impl AcquireTokenRequest {
	/// Creates a request with [`PromptBehavior::Auto`] and no identity constraint.
	pub fn new(resource: ResourceId, client_id: ClientId) -> Self {
		Self {
			resource,
			client_id,
			redirect_uri: None,
			prompt: PromptBehavior::default(),
			user: None,
			extra_query_parameters: Vec::new(),
			credentials_type: None,
			correlation_id: None,
		}
	}

	/// Sets the redirect URI.
	pub fn with_redirect_uri(mut self, redirect_uri: Url) -> Self {
		self.redirect_uri = Some(redirect_uri);

		self
	}

	/// Sets the prompt policy.
	pub fn with_prompt(mut self, prompt: PromptBehavior) -> Self {
		self.prompt = prompt;

		self
	}

	/// Pins the resolution to `user`.
	pub fn with_user(mut self, user: UserIdentifier) -> Self {
		self.user = Some(user);

		self
	}

	/// Appends an authorize URL query parameter.
	pub fn with_extra_query_parameter(
		mut self,
		key: impl Into<String>,
		value: impl Into<String>,
	) -> Self {
		self.extra_query_parameters.push((key.into(), value.into()));

		self
	}

	/// Overrides the credentials type.
	pub fn with_credentials_type(mut self, credentials_type: CredentialsType) -> Self {
		self.credentials_type = Some(credentials_type);

		self
	}

	/// Uses a caller-chosen correlation id.
	pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
		self.correlation_id = Some(correlation_id);

		self
	}
}

/// Parameters of [`AuthenticationContext::acquire_token_for_assertion`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssertionRequest {
	/// Raw SAML assertion document.
	pub assertion: TokenSecret,
	/// Assertion flavour.
	pub assertion_type: AssertionType,
	/// Resource the token is for.
	pub resource: ResourceId,
	/// Requesting client.
	pub client_id: ClientId,
	/// Identity to pin the cache lookup to.
	pub user: Option<UserIdentifier>,
	/// Caller-chosen correlation id.
	pub correlation_id: Option<CorrelationId>,
}
impl AssertionRequest {
	/// Creates an assertion request without identity constraint.
	pub fn new(
		assertion: impl Into<String>,
		assertion_type: AssertionType,
		resource: ResourceId,
		client_id: ClientId,
	) -> Self {
		Self {
			assertion: TokenSecret::new(assertion),
			assertion_type,
			resource,
			client_id,
			user: None,
			correlation_id: None,
		}
	}

	/// Pins the cache lookup to `user`.
	pub fn with_user(mut self, user: UserIdentifier) -> Self {
		self.user = Some(user);

		self
	}

	/// Uses a caller-chosen correlation id.
	pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
		self.correlation_id = Some(correlation_id);

		self
	}
}

impl AuthenticationContext {
	/// Lifetime assumed when the endpoint omits `expires_in`.
	const DEFAULT_EXPIRES_IN: Duration = Duration::hours(1);

	/// Exchanges `request` and maps the payload onto a cache item.
	///
	/// `previous_refresh` is carried over when the endpoint does not rotate the refresh token;
	/// `fallback_user` labels the item when no id token is returned.
	pub(crate) async fn redeem(
		&self,
		request: TokenRequest,
		previous_refresh: Option<&TokenSecret>,
		fallback_user: Option<UserInformation>,
	) -> Result<TokenCacheItem> {
		let resource = request.resource.clone();
		let client_id = request.client_id.clone();
		let payload = self.endpoint.exchange(request).await?;
		let Some(access_token) = payload.access_token else {
			return Err(TransientError::TokenEndpoint {
				message: "the response carried no access_token".into(),
				status: None,
				retry_after: None,
			}
			.into());
		};
		let lifetime = match payload.expires_in {
			Some(secs) if secs > 0 => Duration::seconds(secs),
			Some(value) => return Err(ConfigError::ExpiresInOutOfRange { value }.into()),
			None => Self::DEFAULT_EXPIRES_IN,
		};
		let out_of_range = |err: TokenCacheItemBuilderError| -> Error {
			match err {
				TokenCacheItemBuilderError::ExpiryOutOfRange =>
					ConfigError::ExpiresInOutOfRange { value: lifetime.whole_seconds() }.into(),
				err => map_token_builder_error(err),
			}
		};
		let user = payload
			.id_token
			.as_deref()
			.and_then(UserInformation::from_id_token)
			.or(fallback_user);
		let family_id = payload.family_id.as_deref().and_then(|id| FamilyId::new(id).ok());
		let spans_resources = payload.resource.is_some() || family_id.is_some();
		let mut builder = TokenCacheItem::builder(self.authority.clone(), resource, client_id)
			.access_token(access_token)
			.issued_at(self.clock.now())
			.expires_in(lifetime)
			.user_information(user)
			.family_id(family_id)
			.spans_resources(spans_resources);

		if let Some(token_type) = payload.token_type {
			builder = builder.access_token_type(token_type);
		}
		if let Some(refresh) =
			payload.refresh_token.or_else(|| previous_refresh.map(|t| t.expose().to_owned()))
		{
			builder = builder.refresh_token(refresh);
		}

		builder.build().map_err(out_of_range)
	}

	/// Caches `item` and projects it into the caller-facing token.
	pub(crate) async fn store_and_project(&self, item: TokenCacheItem) -> Result<AcquiredToken> {
		let token = project(&item)?;

		self.cache.insert_or_replace(item).await?;

		Ok(token)
	}
}

/// Projects an item that is known to carry an access token.
pub(crate) fn project(item: &TokenCacheItem) -> Result<AcquiredToken> {
	AcquiredToken::from_item(item)
		.ok_or_else(|| map_token_builder_error(TokenCacheItemBuilderError::MissingExpiry))
}

/// Fails with [`Error::UserMismatch`] when a strict identifier does not match `item`.
pub(crate) fn ensure_user(expected: Option<&UserIdentifier>, item: &TokenCacheItem) -> Result<()> {
	let Some(expected) = expected else {
		return Ok(());
	};

	if !expected.is_strict() || expected.matches(item.user_information.as_ref()) {
		return Ok(());
	}

	let actual = item
		.user_information
		.as_ref()
		.and_then(|info| info.displayable_id.clone().or_else(|| info.unique_id.clone()))
		.unwrap_or_else(|| "<unknown>".into());

	Err(Error::UserMismatch { expected: expected.value.clone(), actual })
}

/// Normalizes token builder errors into crate errors.
pub(crate) fn map_token_builder_error(err: TokenCacheItemBuilderError) -> Error {
	ConfigError::from(err).into()
}
