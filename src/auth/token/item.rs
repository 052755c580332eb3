//! Immutable token cache items and their builder.

// self
use crate::{
	_prelude::*,
	auth::{
		Authority, ClientId, FamilyId, ResourceId, UserInformation,
		token::{key::TokenCacheKey, secret::TokenSecret},
	},
};

/// Errors produced by [`TokenCacheItemBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenCacheItemBuilderError {
	/// Neither an access token nor a refresh token was provided.
	#[error("An access token or a refresh token is required.")]
	MissingToken,
	/// An access token was provided without an expiry.
	#[error("Access tokens require expires_on or expires_in.")]
	MissingExpiry,
	/// Family (resource-less) items may only carry a refresh token.
	#[error("Resource-less items cannot carry an access token.")]
	AccessTokenWithoutResource,
	/// The relative expiry does not fit the representable time range.
	#[error("The expiry lies outside the representable time range.")]
	ExpiryOutOfRange,
}

/// Cached tokens for one authority/resource/client/user slot.
///
/// Items are replaced wholesale on refresh; nothing mutates a cached item in place.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCacheItem {
	/// Authority that issued the tokens.
	pub authority: Authority,
	/// Resource the access token targets; `None` for a family refresh token item.
	pub resource: Option<ResourceId>,
	/// Client the tokens were issued to.
	pub client_id: ClientId,
	/// Access token secret; callers must avoid logging it.
	pub access_token: Option<TokenSecret>,
	/// Access token type (usually `Bearer`).
	pub access_token_type: Option<String>,
	/// Refresh token secret, if one was issued.
	pub refresh_token: Option<TokenSecret>,
	/// Access token expiry instant.
	pub expires_on: Option<OffsetDateTime>,
	/// Identity the tokens belong to.
	pub user_information: Option<UserInformation>,
	/// Client family that may share the refresh token.
	pub family_id: Option<FamilyId>,
	/// Authority flagged the refresh token as valid for other resources.
	#[serde(default)]
	pub spans_resources: bool,
	/// Issued through the client credentials grant; no user is involved.
	#[serde(default)]
	pub app_only: bool,
}
impl TokenCacheItem {
	/// Returns a builder for the provided authority/resource/client tuple.
	pub fn builder(
		authority: Authority,
		resource: Option<ResourceId>,
		client_id: ClientId,
	) -> TokenCacheItemBuilder {
		TokenCacheItemBuilder::new(authority, resource, client_id)
	}

	/// Cache slot this item occupies.
	pub fn key(&self) -> TokenCacheKey {
		TokenCacheKey {
			app_only: self.app_only,
			..TokenCacheKey::new(
				self.authority.clone(),
				self.resource.clone(),
				self.client_id.clone(),
				self.user_key(),
			)
		}
	}

	/// User partition component of the key.
	pub fn user_key(&self) -> Option<String> {
		self.user_information.as_ref().and_then(UserInformation::cache_key)
	}

	/// Returns `true` for a resource-less item holding a refresh token.
	pub fn is_multi_resource_refresh_token(&self) -> bool {
		self.resource.is_none() && self.refresh_token.is_some()
	}

	/// Returns `true` if the item carries an access token.
	pub fn has_access_token(&self) -> bool {
		self.access_token.is_some()
	}

	/// Derives the family item indexed under the resource-less key, if this item qualifies.
	pub fn to_family_item(&self) -> Option<Self> {
		if !self.spans_resources || self.resource.is_none() {
			return None;
		}

		let refresh_token = self.refresh_token.clone()?;

		Some(Self {
			authority: self.authority.clone(),
			resource: None,
			client_id: self.client_id.clone(),
			access_token: None,
			access_token_type: None,
			refresh_token: Some(refresh_token),
			expires_on: None,
			user_information: self.user_information.clone(),
			family_id: self.family_id.clone(),
			spans_resources: true,
			app_only: self.app_only,
		})
	}
}
impl Debug for TokenCacheItem {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCacheItem")
			.field("authority", &self.authority)
			.field("resource", &self.resource)
			.field("client_id", &self.client_id)
			.field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
			.field("access_token_type", &self.access_token_type)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_on", &self.expires_on)
			.field("user", &self.user_key())
			.field("family_id", &self.family_id)
			.field("spans_resources", &self.spans_resources)
			.field("app_only", &self.app_only)
			.finish()
	}
}

/// Builder for [`TokenCacheItem`].
#[derive(Clone, Debug)]
pub struct TokenCacheItemBuilder {
	authority: Authority,
	resource: Option<ResourceId>,
	client_id: ClientId,
	access_token: Option<TokenSecret>,
	access_token_type: Option<String>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_on: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	user_information: Option<UserInformation>,
	family_id: Option<FamilyId>,
	spans_resources: bool,
	app_only: bool,
}
impl TokenCacheItemBuilder {
	fn new(authority: Authority, resource: Option<ResourceId>, client_id: ClientId) -> Self {
		Self {
			authority,
			resource,
			client_id,
			access_token: None,
			access_token_type: None,
			refresh_token: None,
			issued_at: None,
			expires_on: None,
			expires_in: None,
			user_information: None,
			family_id: None,
			spans_resources: false,
			app_only: false,
		}
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the access token type.
	pub fn access_token_type(mut self, token_type: impl Into<String>) -> Self {
		self.access_token_type = Some(token_type.into());

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the instant relative expiries are measured from (defaults to now).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_on(mut self, instant: OffsetDateTime) -> Self {
		self.expires_on = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Attaches identity information.
	pub fn user_information(mut self, info: Option<UserInformation>) -> Self {
		self.user_information = info;

		self
	}

	/// Attaches the client family identifier.
	pub fn family_id(mut self, family_id: Option<FamilyId>) -> Self {
		self.family_id = family_id;

		self
	}

	/// Marks the refresh token as usable for other resources.
	pub fn spans_resources(mut self, spans: bool) -> Self {
		self.spans_resources = spans;

		self
	}

	/// Places the item in the client credentials partition.
	pub fn app_only(mut self, app_only: bool) -> Self {
		self.app_only = app_only;

		self
	}

	/// Consumes the builder and produces a [`TokenCacheItem`].
	pub fn build(self) -> Result<TokenCacheItem, TokenCacheItemBuilderError> {
		if self.access_token.is_none() && self.refresh_token.is_none() {
			return Err(TokenCacheItemBuilderError::MissingToken);
		}
		if self.access_token.is_some() && self.resource.is_none() {
			return Err(TokenCacheItemBuilderError::AccessTokenWithoutResource);
		}

		let expires_on = match (self.expires_on, self.expires_in) {
			(Some(instant), _) => Some(instant),
			(None, Some(delta)) => Some(
				self.issued_at
					.unwrap_or_else(OffsetDateTime::now_utc)
					.checked_add(delta)
					.ok_or(TokenCacheItemBuilderError::ExpiryOutOfRange)?,
			),
			(None, None) if self.access_token.is_some() =>
				return Err(TokenCacheItemBuilderError::MissingExpiry),
			(None, None) => None,
		};

		Ok(TokenCacheItem {
			authority: self.authority,
			resource: self.resource,
			client_id: self.client_id,
			access_token: self.access_token,
			access_token_type: self.access_token_type,
			refresh_token: self.refresh_token,
			expires_on,
			user_information: self.user_information,
			family_id: self.family_id,
			spans_resources: self.spans_resources,
			app_only: self.app_only,
		})
	}
}
