//! Bridge to an out-of-process broker application.
//!
//! A broker hand-off registers a [`PendingBrokerRequest`] in a durable
//! [`PendingRequestStore`], asks the [`BrokerInvoker`] to switch to the broker, and parks
//! the resolution on a single-shot channel keyed by `state`. The platform later re-enters
//! through [`BrokerBridge::handle_broker_response`] with the URL the broker opened. A response
//! completes at most one pending request; unknown, duplicate, or forged responses are
//! discarded without affecting any resolution.

// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	auth::{Authority, ClientId, ResourceId, TokenSecret, UserIdentifier},
	clock::{Clock, SystemClock},
	config::BrokerConfig,
	correlation::CorrelationId,
	error::ConfigError,
	interactive::AuthorizeError,
	store::{PendingRequestStore, StoreError},
};

/// Capability that performs the application switch to the broker.
pub trait BrokerInvoker
where
	Self: Send + Sync,
{
	/// Opens the broker with `invocation.url`. Returns once the switch has been initiated.
	fn invoke(&self, invocation: &BrokerInvocation) -> Result<(), BrokerInvokeError>;
}

/// Failure to start the application switch.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("The broker application could not be invoked: {reason}.")]
pub struct BrokerInvokeError {
	/// Platform-reported reason.
	pub reason: String,
}

/// Outbound application-switch request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerInvocation {
	/// Authority the broker should authenticate against.
	pub authority: Authority,
	/// Requested resource.
	pub resource: ResourceId,
	/// Requesting client.
	pub client_id: ClientId,
	/// Redirect URI the broker answers on.
	pub redirect_uri: Url,
	/// Correlation id of the resolution.
	pub correlation_id: CorrelationId,
	/// Opaque state the broker must echo.
	pub state: String,
	/// Identity the caller asked for.
	pub user: Option<UserIdentifier>,
	/// Fully-formed broker invocation URL.
	pub url: Url,
}

/// Broker request awaiting a response; persisted for the suspension window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBrokerRequest {
	/// Correlation id of the suspended resolution.
	pub correlation_id: CorrelationId,
	/// Authority the request targets.
	pub authority: Authority,
	/// Requested resource.
	pub resource: ResourceId,
	/// Requesting client.
	pub client_id: ClientId,
	/// Redirect URI the code is issued for.
	pub redirect_uri: Url,
	/// Identity the caller asked for.
	pub user: Option<UserIdentifier>,
	/// Opaque state keying the request.
	pub state: String,
	/// PKCE verifier needed to redeem the returned code.
	pub code_verifier: TokenSecret,
	/// Registration instant.
	pub created_at: OffsetDateTime,
}

/// Parsed broker response.
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerResponse {
	/// Echoed state.
	pub state: String,
	/// Echoed correlation id, if the broker sent one.
	pub correlation_id: Option<CorrelationId>,
	/// Authorization code or the broker's error.
	pub result: Result<TokenSecret, AuthorizeError>,
}
impl BrokerResponse {
	/// Parses a broker response URL. Returns `None` when it carries no `state`.
	pub fn parse(url: &Url) -> Option<Self> {
		let mut state = None;
		let mut correlation_id = None;
		let mut code = None;
		let mut error = None;
		let mut description = None;

		for (key, value) in url.query_pairs() {
			match key.as_ref() {
				"state" => state = Some(value.into_owned()),
				"correlation_id" | CorrelationId::PARAM => correlation_id = value.parse().ok(),
				"code" => code = Some(TokenSecret::new(value.into_owned())),
				"error" => error = Some(value.into_owned()),
				"error_description" => description = Some(value.into_owned()),
				_ => {},
			}
		}

		let state = state.filter(|s| !s.is_empty())?;
		let result = match (error, code) {
			(Some(code), _) if code == "user_cancelled" || code == "access_denied" =>
				Err(AuthorizeError::Cancelled),
			(Some(code), _) => Err(AuthorizeError::Provider { code, description }),
			(None, Some(code)) => Ok(code),
			(None, None) => Err(AuthorizeError::Provider {
				code: "invalid_broker_response".into(),
				description: Some(
					"The broker response carried neither a code nor an error.".into(),
				),
			}),
		};

		Some(Self { state, correlation_id, result })
	}
}
impl Debug for BrokerResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BrokerResponse")
			.field("state", &self.state)
			.field("correlation_id", &self.correlation_id)
			.field("result", &self.result.as_ref().map(|_| "<code>"))
			.finish()
	}
}

/// A broker response matched with its pending request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerDelivery {
	/// The request the response answers.
	pub request: PendingBrokerRequest,
	/// The response itself.
	pub response: BrokerResponse,
}

/// What [`BrokerBridge::handle_broker_response`] did with a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrokerResponseDisposition {
	/// A suspended resolution in this process received the response.
	Delivered,
	/// The request matched but no resolution in this process is waiting (e.g. after a
	/// restart); complete it with `AuthenticationContext::resume_broker_response`.
	Orphaned(Box<BrokerDelivery>),
	/// Nothing matched; no resolution was affected.
	Discarded(DiscardReason),
}

/// Why a broker response was dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscardReason {
	/// The URL carried no `state`.
	Malformed,
	/// No pending request has this `state` (stale, duplicate, or forged).
	UnknownState,
	/// The `state` matched but the correlation id did not.
	CorrelationMismatch,
	/// The pending request table could not be read.
	Storage(StoreError),
}

pub(crate) struct BrokerTicket {
	state: String,
	receiver: oneshot::Receiver<BrokerDelivery>,
}

/// Matches and dispatches broker responses against pending requests.
pub struct BrokerBridge {
	config: BrokerConfig,
	invoker: Arc<dyn BrokerInvoker>,
	pending: Arc<dyn PendingRequestStore>,
	waiters: Mutex<HashMap<String, oneshot::Sender<BrokerDelivery>>>,
	clock: Arc<dyn Clock>,
}
impl BrokerBridge {
	/// Creates a bridge after validating `config`.
	pub fn new(
		config: BrokerConfig,
		invoker: Arc<dyn BrokerInvoker>,
		pending: Arc<dyn PendingRequestStore>,
	) -> Result<Self, ConfigError> {
		config.validate()?;

		Ok(Self {
			config,
			invoker,
			pending,
			waiters: Mutex::default(),
			clock: Arc::new(SystemClock),
		})
	}

	/// Overrides the clock used for `created_at` stamps and expiry.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Broker configuration.
	pub fn config(&self) -> &BrokerConfig {
		&self.config
	}

	/// Returns `true` only for responses opened by the configured broker on this
	/// application's registered redirect scheme and host.
	pub fn is_response_from_broker(&self, source_application: &str, response_url: &Url) -> bool {
		let redirect = &self.config.redirect_uri;

		source_application == self.config.application_id
			&& response_url.scheme().eq_ignore_ascii_case(redirect.scheme())
			&& match (response_url.host_str(), redirect.host_str()) {
				(Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
				_ => false,
			}
	}

	/// Completes the pending request the response answers, at most once.
	///
	/// Never panics and never fails; anything that does not match is discarded.
	pub fn handle_broker_response(&self, response_url: &Url) -> BrokerResponseDisposition {
		let Some(response) = BrokerResponse::parse(response_url) else {
			flow_event!(debug, "Discarding broker response without state.");

			return BrokerResponseDisposition::Discarded(DiscardReason::Malformed);
		};
		let request = match self.pending.take(&response.state) {
			Ok(Some(request)) => request,
			Ok(None) => {
				flow_event!(debug, "Discarding broker response with unknown state.");

				return BrokerResponseDisposition::Discarded(DiscardReason::UnknownState);
			},
			Err(e) => return BrokerResponseDisposition::Discarded(DiscardReason::Storage(e)),
		};

		if response.correlation_id.is_some_and(|id| id != request.correlation_id) {
			flow_event!(
				warn,
				correlation_id = %request.correlation_id,
				"Discarding broker response with mismatched correlation id."
			);

			// Keep the request so the genuine response can still complete it.
			return match self.pending.put(request) {
				Ok(()) => BrokerResponseDisposition::Discarded(DiscardReason::CorrelationMismatch),
				Err(e) => BrokerResponseDisposition::Discarded(DiscardReason::Storage(e)),
			};
		}

		let delivery = BrokerDelivery { request, response };
		let waiter = self.waiters.lock().remove(&delivery.response.state);

		match waiter {
			Some(sender) => match sender.send(delivery) {
				Ok(()) => BrokerResponseDisposition::Delivered,
				Err(delivery) => BrokerResponseDisposition::Orphaned(Box::new(delivery)),
			},
			None => BrokerResponseDisposition::Orphaned(Box::new(delivery)),
		}
	}

	/// Drops pending requests older than the configured timeout. Returns how many were removed.
	pub fn purge_expired(&self) -> Result<usize, StoreError> {
		let cutoff = self.clock.now() - self.config.timeout;
		let mut purged = 0;

		for request in self.pending.list()? {
			if request.created_at <= cutoff && self.pending.take(&request.state)?.is_some() {
				self.waiters.lock().remove(&request.state);

				purged += 1;
			}
		}

		Ok(purged)
	}

	/// Pending requests currently registered.
	pub fn pending_requests(&self) -> Result<Vec<PendingBrokerRequest>, StoreError> {
		self.pending.list()
	}

	/// Builds the invocation URL carrying the request parameters.
	pub(crate) fn invocation_url(&self, request: &PendingBrokerRequest, challenge: &str) -> Url {
		let mut url = self.config.invocation_url.clone();
		let mut pairs = url.query_pairs_mut();

		pairs.append_pair("authority", request.authority.as_str());
		pairs.append_pair("resource", &request.resource);
		pairs.append_pair("client_id", &request.client_id);
		pairs.append_pair("redirect_uri", request.redirect_uri.as_str());
		pairs.append_pair("correlation_id", &request.correlation_id.to_string());
		pairs.append_pair("state", &request.state);
		pairs.append_pair("code_challenge", challenge);
		pairs.append_pair("code_challenge_method", crate::interactive::pkce::METHOD);

		if let Some(user) = &request.user {
			pairs.append_pair("user_id", &user.value);
		}

		drop(pairs);

		url
	}

	/// Registers `request` durably, then switches to the broker.
	pub(crate) fn begin(
		&self,
		request: PendingBrokerRequest,
		invocation: BrokerInvocation,
	) -> Result<BrokerTicket> {
		let state = request.state.clone();
		let (sender, receiver) = oneshot::channel();

		self.pending.put(request)?;
		self.waiters.lock().insert(state.clone(), sender);

		if let Err(e) = self.invoker.invoke(&invocation) {
			flow_event!(warn, error = %e, "Broker invocation failed.");

			self.abandon(&state);

			return Err(ConfigError::InvalidBroker {
				reason: "the broker application could not be invoked",
			}
			.into());
		}

		Ok(BrokerTicket { state, receiver })
	}

	/// Suspends until the matching response arrives or the timeout elapses.
	pub(crate) async fn wait(&self, ticket: BrokerTicket) -> Result<BrokerDelivery> {
		let BrokerTicket { state, mut receiver } = ticket;
		let timeout = self.config.timeout;
		let window = std::time::Duration::try_from(timeout).unwrap_or_default();
		let guard = AbandonOnDrop { bridge: self, state: Some(state) };

		match tokio::time::timeout(window, &mut receiver).await {
			Ok(Ok(delivery)) => {
				guard.disarm();

				Ok(delivery)
			},
			// Sender dropped by `purge_expired`.
			Ok(Err(_)) => {
				guard.disarm();

				Err(Error::BrokerTimeout { timeout })
			},
			Err(_) => {
				let state = guard.disarm().unwrap_or_default();

				self.waiters.lock().remove(&state);

				// First of response and timeout wins.
				match self.pending.take(&state)? {
					Some(_) => Err(Error::BrokerTimeout { timeout }),
					None => receiver.try_recv().map_err(|_| Error::BrokerTimeout { timeout }),
				}
			},
		}
	}

	fn abandon(&self, state: &str) {
		self.waiters.lock().remove(state);

		if let Err(_e) = self.pending.take(state) {
			flow_event!(warn, error = %_e, "Failed to drop abandoned broker request.");
		}
	}
}
impl Debug for BrokerBridge {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BrokerBridge")
			.field("config", &self.config)
			.field("waiters", &self.waiters.lock().len())
			.finish()
	}
}

// Removes the waiter and pending entry if the resolution future is dropped mid-wait.
struct AbandonOnDrop<'a> {
	bridge: &'a BrokerBridge,
	state: Option<String>,
}
impl AbandonOnDrop<'_> {
	fn disarm(mut self) -> Option<String> {
		self.state.take()
	}
}
impl Drop for AbandonOnDrop<'_> {
	fn drop(&mut self) {
		if let Some(state) = self.state.take() {
			self.bridge.abandon(&state);
		}
	}
}
