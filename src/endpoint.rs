//! Token endpoint contract consumed by the resolver.
//!
//! The resolver never speaks HTTP itself. It hands a [`TokenRequest`] to a [`TokenEndpoint`]
//! and receives a [`TokenPayload`] or an [`Error`]. Rejections by the identity provider must
//! be reported as [`Error::Server`] so the resolver can tell `invalid_grant` apart from
//! transport failures; [`classify`] offers the shared heuristics for that.

pub mod classify;
#[cfg(feature = "reqwest")] pub mod http;

pub use classify::*;
#[cfg(feature = "reqwest")] pub use http::ReqwestTokenEndpoint;

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Deserializer;
// self
use crate::{
	_prelude::*,
	auth::{Authority, ClientId, ResourceId, TokenSecret},
	correlation::CorrelationId,
};

/// Boxed future returned by [`TokenEndpoint::exchange`].
pub type EndpointFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Network exchange of a grant for tokens.
///
/// Implementations own their timeout and retry policy; the resolver performs at most one
/// refresh attempt per resolution and retries nothing else.
pub trait TokenEndpoint
where
	Self: Send + Sync,
{
	/// Redeems `request.grant` at `request.authority`'s token endpoint.
	fn exchange(&self, request: TokenRequest) -> EndpointFuture<'_, TokenPayload>;
}

/// SAML assertion flavours accepted by the assertion grant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssertionType {
	/// SAML 1.1 bearer assertion.
	Saml11Bearer,
	/// SAML 2.0 bearer assertion.
	Saml2Bearer,
}
impl AssertionType {
	/// Grant type URN sent to the token endpoint.
	pub const fn grant_type(self) -> &'static str {
		match self {
			Self::Saml11Bearer => "urn:ietf:params:oauth:grant-type:saml1_1-bearer",
			Self::Saml2Bearer => "urn:ietf:params:oauth:grant-type:saml2-bearer",
		}
	}
}

/// Grant redeemed at the token endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Grant {
	/// Authorization code returned by the interactive provider or the broker.
	AuthorizationCode {
		/// Authorization code.
		code: TokenSecret,
		/// Redirect URI the code was issued for.
		redirect_uri: Url,
		/// PKCE verifier matching the challenge sent with the authorization request.
		code_verifier: Option<TokenSecret>,
	},
	/// Refresh token redemption.
	RefreshToken {
		/// Refresh token.
		refresh_token: TokenSecret,
	},
	/// Third-party assertion exchange.
	Assertion {
		/// Raw assertion document; it is base64-encoded on the wire.
		assertion: TokenSecret,
		/// Assertion flavour.
		assertion_type: AssertionType,
	},
	/// Confidential client credentials.
	ClientCredentials {
		/// Client secret.
		client_secret: TokenSecret,
	},
}
impl Grant {
	/// `grant_type` form value.
	pub const fn grant_type(&self) -> &'static str {
		match self {
			Self::AuthorizationCode { .. } => "authorization_code",
			Self::RefreshToken { .. } => "refresh_token",
			Self::Assertion { assertion_type, .. } => assertion_type.grant_type(),
			Self::ClientCredentials { .. } => "client_credentials",
		}
	}
}

/// A single token endpoint call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRequest {
	/// Authority whose token endpoint is called.
	pub authority: Authority,
	/// Requesting client.
	pub client_id: ClientId,
	/// Target resource; `None` lets the authority pick (refresh of a family token).
	pub resource: Option<ResourceId>,
	/// Grant being redeemed.
	pub grant: Grant,
	/// Correlation id propagated as `client-request-id`.
	pub correlation_id: CorrelationId,
}
impl TokenRequest {
	/// Form-encoded body parameters for this request.
	pub fn form_params(&self) -> Vec<(&'static str, String)> {
		let mut params = vec![
			("grant_type", self.grant.grant_type().to_owned()),
			("client_id", self.client_id.to_string()),
		];

		if let Some(resource) = &self.resource {
			params.push(("resource", resource.to_string()));
		}

		match &self.grant {
			Grant::AuthorizationCode { code, redirect_uri, code_verifier } => {
				params.push(("code", code.expose().to_owned()));
				params.push(("redirect_uri", redirect_uri.to_string()));

				if let Some(verifier) = code_verifier {
					params.push(("code_verifier", verifier.expose().to_owned()));
				}
			},
			Grant::RefreshToken { refresh_token } =>
				params.push(("refresh_token", refresh_token.expose().to_owned())),
			Grant::Assertion { assertion, .. } => {
				params.push(("assertion", STANDARD.encode(assertion.expose())));
				params.push(("scope", "openid".to_owned()));
			},
			Grant::ClientCredentials { client_secret } =>
				params.push(("client_secret", client_secret.expose().to_owned())),
		}

		params
	}
}

/// Successful token endpoint response.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
	/// Issued access token.
	#[serde(default)]
	pub access_token: Option<String>,
	/// Access token type.
	#[serde(default)]
	pub token_type: Option<String>,
	/// Lifetime of the access token in seconds.
	#[serde(default, deserialize_with = "lenient_seconds")]
	pub expires_in: Option<i64>,
	/// Issued (or rotated) refresh token.
	#[serde(default)]
	pub refresh_token: Option<String>,
	/// OpenID id token describing the signed-in user.
	#[serde(default)]
	pub id_token: Option<String>,
	/// Client family the refresh token may be shared with.
	#[serde(default, rename = "foci")]
	pub family_id: Option<String>,
	/// Resource echoed by the authority; its presence marks a multi-resource refresh token.
	#[serde(default)]
	pub resource: Option<String>,
}
impl Debug for TokenPayload {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenPayload")
			.field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
			.field("token_type", &self.token_type)
			.field("expires_in", &self.expires_in)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
			.field("family_id", &self.family_id)
			.field("resource", &self.resource)
			.finish()
	}
}

// Some authorities send `expires_in` as a JSON string.
fn lenient_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Seconds {
		Number(i64),
		Text(String),
	}

	match Option::<Seconds>::deserialize(deserializer)? {
		None => Ok(None),
		Some(Seconds::Number(value)) => Ok(Some(value)),
		Some(Seconds::Text(raw)) =>
			raw.trim().parse().map(Some).map_err(serde::de::Error::custom),
	}
}
