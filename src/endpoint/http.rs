//! Bundled HTTPS token endpoint client built on reqwest.

// crates.io
use reqwest::{
	header::{ACCEPT, HeaderMap, RETRY_AFTER},
	redirect::Policy,
};
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	correlation::CorrelationId,
	endpoint::{EndpointFailure, EndpointFuture, TokenEndpoint, TokenPayload, TokenRequest},
	error::{ConfigError, TransientError, TransportError},
};

#[derive(Deserialize)]
struct ErrorBody {
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	error_description: Option<String>,
}

/// Token endpoint that posts form-encoded grants to `{authority}/oauth2/token`.
///
/// Redirects are never followed; token endpoints answer directly.
#[derive(Clone, Debug)]
pub struct ReqwestTokenEndpoint {
	client: ReqwestClient,
}
impl ReqwestTokenEndpoint {
	const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

	/// Builds a client with redirects disabled and a 30 second request timeout.
	pub fn new() -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.redirect(Policy::none())
			.timeout(Self::REQUEST_TIMEOUT)
			.build()?;

		Ok(Self { client })
	}

	/// Wraps an existing client; configure it to not follow redirects.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { client }
	}

	async fn send(&self, request: TokenRequest) -> Result<TokenPayload> {
		let url = request.authority.token_endpoint().clone();
		let response = self
			.client
			.post(url)
			.header(ACCEPT, "application/json")
			.header(CorrelationId::PARAM, request.correlation_id.to_string())
			.header("return-client-request-id", "true")
			.form(&request.form_params())
			.send()
			.await
			.map_err(TransportError::from)?;
		let status = response.status();
		let retry_after = parse_retry_after(response.headers());
		let body = response.bytes().await.map_err(TransportError::from)?;

		flow_event!(
			debug,
			status = status.as_u16(),
			grant_type = request.grant.grant_type(),
			correlation_id = %request.correlation_id,
			"Token endpoint responded."
		);

		if !status.is_success() {
			return Err(failure(status.as_u16(), &body, retry_after).into_error());
		}

		let mut de = serde_json::Deserializer::from_slice(&body);
		let payload: TokenPayload = serde_path_to_error::deserialize(&mut de).map_err(|source| {
			TransientError::TokenResponseParse { source, status: Some(status.as_u16()) }
		})?;

		// Some authorities report errors with a 200 status.
		if payload.access_token.is_none() {
			let failure = failure(status.as_u16(), &body, retry_after);

			if failure.oauth_error.is_some() {
				return Err(failure.into_error());
			}
		}

		Ok(payload)
	}
}
impl TokenEndpoint for ReqwestTokenEndpoint {
	fn exchange(&self, request: TokenRequest) -> EndpointFuture<'_, TokenPayload> {
		Box::pin(self.send(request))
	}
}

fn failure(status: u16, body: &[u8], retry_after: Option<Duration>) -> EndpointFailure {
	let base = EndpointFailure { status: Some(status), retry_after, ..Default::default() };

	match serde_json::from_slice::<ErrorBody>(body) {
		Ok(ErrorBody { error, error_description }) =>
			EndpointFailure { oauth_error: error, error_description, ..base },
		Err(_) => base.with_body_preview(&String::from_utf8_lossy(body)),
	}
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<i64>() {
		return Some(Duration::seconds(secs));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
