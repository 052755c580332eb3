//! Shared doubles for integration tests: a scripted token endpoint, a counting interactive
//! provider, and a recording broker invoker.

#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use parking_lot::Mutex;
use url::Url;
// self
use oauth2_context::{
	auth::{Authority, ClientId, ResourceId},
	broker::{BrokerInvocation, BrokerInvokeError, BrokerInvoker},
	endpoint::{EndpointFuture, TokenEndpoint, TokenPayload, TokenRequest},
	error::{ServerError, TransportError},
	interactive::{
		AuthorizationRequest, AuthorizationResponse, AuthorizeError, AuthorizeFuture,
		InteractiveProvider,
	},
};

pub const AUTHORITY: &str = "https://login.example.com/tenant";
pub const GRAPH: &str = "https://graph.example.com";
pub const MAIL: &str = "https://mail.example.com";
pub const CLIENT: &str = "client-1";

pub fn authority() -> Authority {
	Authority::new(AUTHORITY).expect("Test authority should be valid.")
}

pub fn resource(value: &str) -> ResourceId {
	ResourceId::new(value).expect("Test resource should be valid.")
}

pub fn client(value: &str) -> ClientId {
	ClientId::new(value).expect("Test client should be valid.")
}

pub fn redirect_uri() -> Url {
	Url::parse("x-app://callback").expect("Test redirect URI should parse.")
}

/// Unsigned id token for `upn` with object id `oid`.
pub fn id_token(upn: &str, oid: &str) -> String {
	let claims = format!(r#"{{"upn":"{upn}","oid":"{oid}","tid":"tenant"}}"#);

	format!("eyJhbGciOiJub25lIn0.{}.sig", URL_SAFE_NO_PAD.encode(claims))
}

/// Payload with an access token, refresh token, and one hour lifetime.
pub fn payload(access_token: &str, refresh_token: Option<&str>) -> TokenPayload {
	TokenPayload {
		access_token: Some(access_token.into()),
		token_type: Some("Bearer".into()),
		expires_in: Some(3_600),
		refresh_token: refresh_token.map(str::to_owned),
		..Default::default()
	}
}

/// One scripted token endpoint reply.
#[derive(Clone, Debug)]
pub enum Reply {
	Payload(TokenPayload),
	Rejected(ServerError),
	Offline,
}

/// Token endpoint that answers from a script and records every request.
#[derive(Debug, Default)]
pub struct ScriptedEndpoint {
	replies: Mutex<VecDeque<Reply>>,
	requests: Mutex<Vec<TokenRequest>>,
	delay: StdDuration,
}
impl ScriptedEndpoint {
	pub fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
		Self::slow(replies, StdDuration::ZERO)
	}

	/// Endpoint that stalls for `delay` before every reply.
	pub fn slow(replies: impl IntoIterator<Item = Reply>, delay: StdDuration) -> Arc<Self> {
		Arc::new(Self {
			replies: Mutex::new(replies.into_iter().collect()),
			requests: Mutex::default(),
			delay,
		})
	}

	pub fn push(&self, reply: Reply) {
		self.replies.lock().push_back(reply);
	}

	pub fn requests(&self) -> Vec<TokenRequest> {
		self.requests.lock().clone()
	}

	pub fn calls(&self) -> usize {
		self.requests.lock().len()
	}
}
impl TokenEndpoint for ScriptedEndpoint {
	fn exchange(&self, request: TokenRequest) -> EndpointFuture<'_, TokenPayload> {
		self.requests.lock().push(request);

		let reply = self.replies.lock().pop_front();
		let delay = self.delay;

		Box::pin(async move {
			if !delay.is_zero() {
				tokio::time::sleep(delay).await;
			}

			match reply {
				Some(Reply::Payload(payload)) => Ok(payload),
				Some(Reply::Rejected(error)) => Err(error.into()),
				Some(Reply::Offline) | None => Err(TransportError::network(std::io::Error::new(
					std::io::ErrorKind::ConnectionRefused,
					"offline",
				))
				.into()),
			}
		})
	}
}

/// How the provider answers.
#[derive(Clone, Debug)]
pub enum Behavior {
	Approve(String),
	Cancel,
	WrongState,
}

/// Interactive provider that counts invocations and optionally stalls before answering.
#[derive(Debug)]
pub struct CountingProvider {
	behavior: Behavior,
	delay: StdDuration,
	calls: AtomicUsize,
	last: Mutex<Option<AuthorizationRequest>>,
}
impl CountingProvider {
	pub fn approving(code: &str) -> Arc<Self> {
		Self::with(Behavior::Approve(code.into()), StdDuration::ZERO)
	}

	pub fn with(behavior: Behavior, delay: StdDuration) -> Arc<Self> {
		Arc::new(Self { behavior, delay, calls: AtomicUsize::new(0), last: Mutex::new(None) })
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn last_request(&self) -> Option<AuthorizationRequest> {
		self.last.lock().clone()
	}
}
impl InteractiveProvider for CountingProvider {
	fn authorize(&self, request: AuthorizationRequest) -> AuthorizeFuture<'_> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		*self.last.lock() = Some(request.clone());

		Box::pin(async move {
			if !self.delay.is_zero() {
				tokio::time::sleep(self.delay).await;
			}

			match &self.behavior {
				Behavior::Approve(code) => {
					let mut redirect = request.redirect_uri.clone();

					redirect
						.query_pairs_mut()
						.append_pair("code", code)
						.append_pair("state", &request.state);

					AuthorizationResponse::from_redirect(&redirect)
				},
				Behavior::Cancel => Err(AuthorizeError::Cancelled),
				Behavior::WrongState =>
					Ok(AuthorizationResponse { code: "code".into(), state: "forged".into() }),
			}
		})
	}
}

/// Broker invoker that records invocations instead of switching applications.
#[derive(Debug, Default)]
pub struct RecordingInvoker {
	invocations: Mutex<Vec<BrokerInvocation>>,
	fail: bool,
}
impl RecordingInvoker {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn failing() -> Arc<Self> {
		Arc::new(Self { fail: true, ..Default::default() })
	}

	pub fn invocations(&self) -> Vec<BrokerInvocation> {
		self.invocations.lock().clone()
	}

	/// Polls until the `n`-th invocation is recorded.
	pub async fn nth(&self, n: usize) -> BrokerInvocation {
		loop {
			if let Some(invocation) = self.invocations.lock().get(n) {
				return invocation.clone();
			}

			tokio::time::sleep(StdDuration::from_millis(5)).await;
		}
	}
}
impl BrokerInvoker for RecordingInvoker {
	fn invoke(&self, invocation: &BrokerInvocation) -> Result<(), BrokerInvokeError> {
		if self.fail {
			return Err(BrokerInvokeError { reason: "not installed".into() });
		}

		self.invocations.lock().push(invocation.clone());

		Ok(())
	}
}

/// Broker response URL answering `invocation`.
pub fn broker_response(invocation: &BrokerInvocation, code: &str) -> Url {
	let mut url = invocation.redirect_uri.clone();

	url.query_pairs_mut()
		.append_pair("state", &invocation.state)
		.append_pair("correlation_id", &invocation.correlation_id.to_string())
		.append_pair("code", code);

	url
}
