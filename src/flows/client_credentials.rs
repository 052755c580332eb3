//! Client credentials grant for app-only tokens.
//!
//! App-only tokens live in their own partition of the requesting client's keys, apart from
//! user-delegated tokens that arrived without an identity. An unexpired
//! cached token is reused; otherwise the secret is redeemed. There is no refresh step and
//! no interactive fallback.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, ResourceId, TokenCacheItem, TokenCacheKey, TokenSecret},
	correlation::CorrelationId,
	endpoint::{Grant, TokenRequest},
	flows::{AuthenticationContext, common},
	result::AcquiredToken,
};

impl AuthenticationContext {
	pub(super) async fn resolve_client_credentials(
		&self,
		resource: ResourceId,
		client_id: ClientId,
		client_secret: String,
		correlation_id: CorrelationId,
	) -> Result<AcquiredToken> {
		let key =
			TokenCacheKey::app_only(self.authority.clone(), resource.clone(), client_id.clone());
		let now = self.clock.now();

		if let Some(current) = self
			.cache
			.get(&key)
			.filter(|item| !self.options.expiry_policy().is_expired(item.expires_on, now))
		{
			self.metrics.record_cache_hit();

			return common::project(&current);
		}

		let request = TokenRequest {
			authority: self.authority.clone(),
			client_id,
			resource: Some(resource),
			grant: Grant::ClientCredentials { client_secret: TokenSecret::new(client_secret) },
			correlation_id,
		};
		let item = TokenCacheItem { app_only: true, ..self.redeem(request, None, None).await? };

		self.store_and_project(item).await
	}
}
