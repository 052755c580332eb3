//! Acquisition resolver: the [`AuthenticationContext`] facade and its flows.
//!
//! Every entry point resolves to exactly one [`AuthenticationResult`]. Concurrent calls for
//! the same authority, resource, client, user, and entry point are coalesced so only one
//! network or UI round trip runs; every waiter receives the leader's result.

pub mod common;

mod assertion;
mod brokered;
mod client_credentials;
mod coalesce;
mod interactive;
mod metrics;
mod silent;

pub use common::*;
pub use metrics::ResolverMetrics;

pub use crate::config::{CredentialsType, PromptBehavior};

// self
use crate::{
	_prelude::*,
	auth::{Authority, ClientId, ResourceId, UserIdentifier},
	broker::{BrokerBridge, BrokerDelivery, BrokerResponseDisposition, DiscardReason},
	cache::TokenCache,
	clock::{Clock, SystemClock},
	config::ContextOptions,
	correlation::CorrelationId,
	endpoint::TokenEndpoint,
	error::ConfigError,
	interactive::InteractiveProvider,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	result::{AcquiredToken, AuthenticationResult},
	store::StoreError,
};
use coalesce::{CoalesceKey, Coalescer, EntryMode, Role};

/// Token acquisition context bound to one authority.
pub struct AuthenticationContext {
	authority: Authority,
	options: ContextOptions,
	cache: Arc<TokenCache>,
	endpoint: Arc<dyn TokenEndpoint>,
	interactive: Option<Arc<dyn InteractiveProvider>>,
	broker: Option<Arc<BrokerBridge>>,
	clock: Arc<dyn Clock>,
	metrics: Arc<ResolverMetrics>,
	coalescer: Coalescer,
}
impl AuthenticationContext {
	/// Starts building a context for `authority`.
	pub fn builder(authority: impl Into<String>) -> AuthenticationContextBuilder {
		AuthenticationContextBuilder::new(authority)
	}

	/// Authority every resolution targets.
	pub fn authority(&self) -> &Authority {
		&self.authority
	}

	/// Context-wide options.
	pub fn options(&self) -> &ContextOptions {
		&self.options
	}

	/// Shared token cache.
	pub fn cache(&self) -> &Arc<TokenCache> {
		&self.cache
	}

	/// Resolver counters.
	pub fn metrics(&self) -> &Arc<ResolverMetrics> {
		&self.metrics
	}

	/// Resolves a token, falling back to interactive or broker authorization.
	///
	/// With [`PromptBehavior::Auto`] the cache and a single refresh attempt come first; every
	/// other policy goes straight to interaction.
	pub async fn acquire_token(&self, request: AcquireTokenRequest) -> AuthenticationResult {
		let correlation_id = request.correlation_id.unwrap_or_default();
		let key = self.coalesce_key(
			&request.resource,
			&request.client_id,
			request.user.clone(),
			EntryMode::Interactive,
		);

		self.coalesced(
			key,
			correlation_id,
			FlowKind::Interactive,
			"acquire_token",
			self.resolve_interactive(&request, correlation_id),
		)
		.await
	}

	/// Resolves a token from the cache or a single refresh attempt only.
	///
	/// Never invokes the interactive provider or the broker; fails with
	/// [`ErrorKind::UserInputNeeded`](crate::result::ErrorKind::UserInputNeeded) instead.
	/// `prompt`, `redirect_uri`, and `extra_query_parameters` of the request are ignored.
	pub async fn acquire_token_silent(&self, request: AcquireTokenRequest) -> AuthenticationResult {
		let correlation_id = request.correlation_id.unwrap_or_default();
		let key = self.coalesce_key(
			&request.resource,
			&request.client_id,
			request.user.clone(),
			EntryMode::Silent,
		);

		self.coalesced(
			key,
			correlation_id,
			FlowKind::Silent,
			"acquire_token_silent",
			self.resolve_silent_only(&request, correlation_id),
		)
		.await
	}

	/// Resolves a token by exchanging a SAML assertion, after trying the cache.
	pub async fn acquire_token_for_assertion(
		&self,
		request: AssertionRequest,
	) -> AuthenticationResult {
		let correlation_id = request.correlation_id.unwrap_or_default();
		let key = self.coalesce_key(
			&request.resource,
			&request.client_id,
			request.user.clone(),
			EntryMode::Assertion,
		);

		self.coalesced(
			key,
			correlation_id,
			FlowKind::Assertion,
			"acquire_token_for_assertion",
			self.resolve_assertion(&request, correlation_id),
		)
		.await
	}

	/// Resolves an app-only token with the client credentials grant.
	pub async fn acquire_token_for_client(
		&self,
		resource: ResourceId,
		client_id: ClientId,
		client_secret: impl Into<String>,
	) -> AuthenticationResult {
		let correlation_id = CorrelationId::new_v4();
		let secret = client_secret.into();
		let key = self.coalesce_key(&resource, &client_id, None, EntryMode::Client);

		self.coalesced(
			key,
			correlation_id,
			FlowKind::ClientCredentials,
			"acquire_token_for_client",
			self.resolve_client_credentials(resource, client_id, secret, correlation_id),
		)
		.await
	}

	/// Returns `true` when `response_url` was opened by the configured broker.
	pub fn is_response_from_broker(&self, source_application: &str, response_url: &Url) -> bool {
		self.broker
			.as_ref()
			.is_some_and(|broker| broker.is_response_from_broker(source_application, response_url))
	}

	/// Routes a broker response to the resolution waiting for it.
	pub fn handle_broker_response(&self, response_url: &Url) -> BrokerResponseDisposition {
		match &self.broker {
			Some(broker) => broker.handle_broker_response(response_url),
			None => BrokerResponseDisposition::Discarded(DiscardReason::UnknownState),
		}
	}

	/// Completes a broker response that no live resolution was waiting for.
	pub async fn resume_broker_response(&self, delivery: BrokerDelivery) -> AuthenticationResult {
		let correlation_id = delivery.request.correlation_id;

		self.observe(
			FlowKind::Broker,
			"resume_broker_response",
			correlation_id,
			self.complete_broker(delivery),
		)
		.await
	}

	/// Removes every cached token (sign-out).
	pub async fn clear_cache(&self) -> Result<(), StoreError> {
		self.cache.remove_all().await
	}

	fn coalesce_key(
		&self,
		resource: &ResourceId,
		client_id: &ClientId,
		user: Option<UserIdentifier>,
		mode: EntryMode,
	) -> CoalesceKey {
		CoalesceKey {
			authority: self.authority.clone(),
			resource: resource.clone(),
			client_id: client_id.clone(),
			user,
			mode,
		}
	}

	async fn coalesced<F>(
		&self,
		key: CoalesceKey,
		correlation_id: CorrelationId,
		kind: FlowKind,
		stage: &'static str,
		resolution: F,
	) -> AuthenticationResult
	where
		F: Future<Output = Result<AcquiredToken>>,
	{
		match self.coalescer.join(key, correlation_id) {
			Role::Follower(receiver) => {
				self.metrics.record_coalesced_waiter();

				flow_event!(
					debug,
					correlation_id = %correlation_id,
					"Joined an in-flight resolution for the same key."
				);

				receiver.await.unwrap_or_else(|_| {
					AuthenticationResult::from_error(&Error::Cancelled, correlation_id)
				})
			},
			Role::Leader(leader) => {
				let result = self.observe(kind, stage, correlation_id, resolution).await;

				leader.complete(&result);

				result
			},
		}
	}

	async fn observe<F>(
		&self,
		kind: FlowKind,
		stage: &'static str,
		correlation_id: CorrelationId,
		resolution: F,
	) -> AuthenticationResult
	where
		F: Future<Output = Result<AcquiredToken>>,
	{
		let span = FlowSpan::new(kind, stage, correlation_id);

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		let result = span.instrument(resolution).await;
		let outcome = match &result {
			Ok(_) => FlowOutcome::Success,
			Err(Error::Cancelled) => FlowOutcome::Cancelled,
			Err(_) => FlowOutcome::Failure,
		};

		obs::record_flow_outcome(kind, outcome);

		if let Err(_e) = &result {
			flow_event!(
				info,
				correlation_id = %correlation_id,
				error = %_e,
				"Token resolution did not succeed."
			);
		}

		AuthenticationResult::from_result(result, correlation_id)
	}
}
impl Debug for AuthenticationContext {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthenticationContext")
			.field("authority", &self.authority)
			.field("options", &self.options)
			.field("cache", &self.cache)
			.field("interactive", &self.interactive.is_some())
			.field("broker", &self.broker)
			.finish()
	}
}

/// Builder for [`AuthenticationContext`]; validation happens synchronously in [`build`].
///
/// [`build`]: AuthenticationContextBuilder::build
pub struct AuthenticationContextBuilder {
	authority: String,
	options: ContextOptions,
	cache: Option<Arc<TokenCache>>,
	endpoint: Option<Arc<dyn TokenEndpoint>>,
	interactive: Option<Arc<dyn InteractiveProvider>>,
	broker: Option<Arc<BrokerBridge>>,
	clock: Option<Arc<dyn Clock>>,
}
impl AuthenticationContextBuilder {
	fn new(authority: impl Into<String>) -> Self {
		Self {
			authority: authority.into(),
			options: ContextOptions::default(),
			cache: None,
			endpoint: None,
			interactive: None,
			broker: None,
			clock: None,
		}
	}

	/// Replaces the context options.
	pub fn options(mut self, options: ContextOptions) -> Self {
		self.options = options;

		self
	}

	/// Shares an existing cache (e.g. one opened over persistent storage).
	pub fn cache(mut self, cache: Arc<TokenCache>) -> Self {
		self.cache = Some(cache);

		self
	}

	/// Sets the token endpoint client.
	pub fn token_endpoint(mut self, endpoint: Arc<dyn TokenEndpoint>) -> Self {
		self.endpoint = Some(endpoint);

		self
	}

	/// Sets the interactive authorization provider.
	pub fn interactive_provider(mut self, provider: Arc<dyn InteractiveProvider>) -> Self {
		self.interactive = Some(provider);

		self
	}

	/// Enables broker delegation for [`CredentialsType::Auto`] requests.
	pub fn broker(mut self, broker: Arc<BrokerBridge>) -> Self {
		self.broker = Some(broker);

		self
	}

	/// Overrides the clock.
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);

		self
	}

	/// Validates the configuration and builds the context.
	///
	/// Without an explicit token endpoint the bundled reqwest client is used when the
	/// `reqwest` feature is enabled.
	pub fn build(self) -> Result<AuthenticationContext> {
		let authority = Authority::new(&self.authority)?;
		let endpoint = match self.endpoint {
			Some(endpoint) => endpoint,
			None => Self::default_endpoint()?,
		};

		if let Some(broker) = &self.broker {
			broker.config().validate()?;
		}

		Ok(AuthenticationContext {
			authority,
			options: self.options,
			cache: self.cache.unwrap_or_default(),
			endpoint,
			interactive: self.interactive,
			broker: self.broker,
			clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
			metrics: Arc::default(),
			coalescer: Coalescer::default(),
		})
	}

	#[cfg(feature = "reqwest")]
	fn default_endpoint() -> Result<Arc<dyn TokenEndpoint>, ConfigError> {
		Ok(Arc::new(crate::endpoint::ReqwestTokenEndpoint::new()?))
	}

	#[cfg(not(feature = "reqwest"))]
	fn default_endpoint() -> Result<Arc<dyn TokenEndpoint>, ConfigError> {
		Err(ConfigError::MissingCollaborator { collaborator: "token endpoint" })
	}
}
impl Debug for AuthenticationContextBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthenticationContextBuilder")
			.field("authority", &self.authority)
			.field("options", &self.options)
			.field("endpoint", &self.endpoint.is_some())
			.field("interactive", &self.interactive.is_some())
			.field("broker", &self.broker.is_some())
			.finish()
	}
}
