//! Assertion exchange (SAML bearer grant) with cache-first lookup.

// self
use crate::{
	_prelude::*,
	cache::CacheQuery,
	correlation::CorrelationId,
	endpoint::{Grant, TokenRequest},
	flows::{AssertionRequest, AuthenticationContext, silent},
	result::AcquiredToken,
};

impl AuthenticationContext {
	pub(super) async fn resolve_assertion(
		&self,
		request: &AssertionRequest,
		correlation_id: CorrelationId,
	) -> Result<AcquiredToken> {
		let query =
			CacheQuery::new(self.authority.clone(), request.resource.clone(), request.client_id.clone())
				.with_user(request.user.clone())
				.with_family(self.options.family_id.clone());

		match self.resolve_from_cache(&query, correlation_id).await {
			Ok(token) => return Ok(token),
			Err(e) if silent::falls_through(&e) => {},
			Err(e) => return Err(e),
		}

		let token_request = TokenRequest {
			authority: self.authority.clone(),
			client_id: request.client_id.clone(),
			resource: Some(request.resource.clone()),
			grant: Grant::Assertion {
				assertion: request.assertion.clone(),
				assertion_type: request.assertion_type,
			},
			correlation_id,
		};

		flow_event!(
			debug,
			correlation_id = %correlation_id,
			assertion_type = ?request.assertion_type,
			"Exchanging assertion."
		);

		let item = self.redeem(token_request, None, None).await?;

		self.store_and_project(item).await
	}
}
