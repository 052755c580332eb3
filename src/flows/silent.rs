//! Cache-first resolution: unexpired access tokens, then one refresh attempt.

// self
use crate::{
	_prelude::*,
	auth::TokenCacheItem,
	cache::CacheQuery,
	correlation::CorrelationId,
	endpoint::{Grant, TokenRequest},
	error::ServerErrorKind,
	flows::{AcquireTokenRequest, AuthenticationContext, common},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	result::AcquiredToken,
};

impl AuthenticationContext {
	pub(crate) fn cache_query(&self, request: &AcquireTokenRequest) -> CacheQuery {
		CacheQuery::new(self.authority.clone(), request.resource.clone(), request.client_id.clone())
			.with_user(request.user.clone())
			.with_family(self.options.family_id.clone())
	}

	/// Silent entry point: cache and refresh only, never the UI.
	pub(super) async fn resolve_silent_only(
		&self,
		request: &AcquireTokenRequest,
		correlation_id: CorrelationId,
	) -> Result<AcquiredToken> {
		let query = self.cache_query(request);

		match self.resolve_from_cache(&query, correlation_id).await {
			Err(Error::Server(server)) if rejects_refresh_token(server.kind) => Err(
				Error::user_input_needed(format!("the cached refresh token was rejected ({server})")),
			),
			other => other,
		}
	}

	/// Serves an unexpired cached access token, otherwise redeems the best refresh token once.
	///
	/// Fails with [`Error::UserInputNeeded`] when nothing usable is cached and with
	/// [`Error::MultipleUsers`] when no user was named and candidates span several users.
	/// Refreshes of one cache slot never overlap: a caller that waited for another refresh
	/// of the same slot re-reads the cache and serves its result instead.
	pub(crate) async fn resolve_from_cache(
		&self,
		query: &CacheQuery,
		correlation_id: CorrelationId,
	) -> Result<AcquiredToken> {
		let candidate = match self.cached_or_candidate(query, correlation_id)? {
			Cached::Token(token) => return Ok(token),
			Cached::Refreshable(candidate) => candidate,
		};
		let _refreshing = self.cache.lock_refresh(&candidate.key()).await;
		let candidate = match self.cached_or_candidate(query, correlation_id)? {
			Cached::Token(token) => return Ok(token),
			Cached::Refreshable(candidate) => candidate,
		};

		self.refresh(query, candidate, correlation_id).await
	}

	fn cached_or_candidate(
		&self,
		query: &CacheQuery,
		correlation_id: CorrelationId,
	) -> Result<Cached> {
		let candidates = self.cache.lookup(query);

		if query.user.is_none() {
			let users = candidates.iter().map(TokenCacheItem::user_key).collect::<HashSet<_>>();

			if users.len() > 1 {
				return Err(Error::MultipleUsers);
			}
		}

		let now = self.clock.now();
		let policy = self.options.expiry_policy();

		if let Some(item) = candidates
			.iter()
			.find(|item| item.has_access_token() && !policy.is_expired(item.expires_on, now))
		{
			self.metrics.record_cache_hit();

			flow_event!(
				debug,
				correlation_id = %correlation_id,
				key = %item.key(),
				"Serving cached access token."
			);

			return common::project(item).map(Cached::Token);
		}

		candidates
			.into_iter()
			.find(|item| item.refresh_token.is_some())
			.map(Cached::Refreshable)
			.ok_or_else(|| Error::user_input_needed("no usable token is cached"))
	}

	async fn refresh(
		&self,
		query: &CacheQuery,
		candidate: TokenCacheItem,
		correlation_id: CorrelationId,
	) -> Result<AcquiredToken> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh", correlation_id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_refresh_attempt();

		let result = span.instrument(self.redeem_refresh(query, &candidate, correlation_id)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(e) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				self.metrics.record_refresh_failure();

				let rejected = candidate.refresh_token.as_ref().filter(|_| e.is_invalid_grant());

				if let Some(rejected) = rejected {
					match self.cache.evict_refresh_token(&candidate.key(), rejected).await {
						Ok(_evicted) => {
							flow_event!(
								info,
								correlation_id = %correlation_id,
								key = %candidate.key(),
								evicted = _evicted,
								"Refresh token was rejected."
							);
						},
						Err(_e) => {
							flow_event!(
								warn,
								error = %_e,
								"Failed to evict rejected refresh token."
							);
						},
					}
				}
			},
		}

		result
	}

	async fn redeem_refresh(
		&self,
		query: &CacheQuery,
		candidate: &TokenCacheItem,
		correlation_id: CorrelationId,
	) -> Result<AcquiredToken> {
		let Some(refresh_token) = candidate.refresh_token.clone() else {
			return Err(Error::user_input_needed("no refresh token is cached"));
		};
		let request = TokenRequest {
			authority: self.authority.clone(),
			client_id: query.client_id.clone(),
			resource: Some(query.resource.clone()),
			grant: Grant::RefreshToken { refresh_token: refresh_token.clone() },
			correlation_id,
		};
		let item = self
			.redeem(request, Some(&refresh_token), candidate.user_information.clone())
			.await?;

		self.store_and_project(item).await
	}
}

enum Cached {
	Token(AcquiredToken),
	Refreshable(TokenCacheItem),
}

fn rejects_refresh_token(kind: ServerErrorKind) -> bool {
	matches!(kind, ServerErrorKind::InvalidGrant | ServerErrorKind::InteractionRequired)
}

/// Cache-stage failures after which an interactive-capable call falls through to the UI.
///
/// Storage and configuration failures are not among them.
pub(crate) fn falls_through(error: &Error) -> bool {
	matches!(
		error,
		Error::UserInputNeeded { .. }
			| Error::MultipleUsers
			| Error::Server(_)
			| Error::Transient(_)
			| Error::Transport(_)
	)
}
