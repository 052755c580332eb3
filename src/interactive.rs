//! Interactive authorization provider contract.
//!
//! The resolver never renders UI. It prepares an [`AuthorizationRequest`] (authorize URL
//! with PKCE challenge, state, prompt, and login hint already applied) and hands it to an
//! [`InteractiveProvider`], which drives whatever web view or browser the platform offers.

pub(crate) mod pkce;

// self
use crate::{
	_prelude::*,
	auth::{Authority, ClientId, ResourceId, UserIdentifier},
	config::{CredentialsType, PromptBehavior},
	correlation::CorrelationId,
};

/// Boxed future returned by [`InteractiveProvider::authorize`].
pub type AuthorizeFuture<'a> =
	Pin<Box<dyn Future<Output = Result<AuthorizationResponse, AuthorizeError>> + 'a + Send>>;

/// User-facing authorization capability.
pub trait InteractiveProvider
where
	Self: Send + Sync,
{
	/// Runs the authorization UI and returns the code delivered to the redirect URI.
	fn authorize(&self, request: AuthorizationRequest) -> AuthorizeFuture<'_>;
}

/// Everything the provider needs to show the authorization UI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationRequest {
	/// Authority the user signs in to.
	pub authority: Authority,
	/// Resource being requested.
	pub resource: ResourceId,
	/// Requesting client.
	pub client_id: ClientId,
	/// Redirect URI the provider must intercept.
	pub redirect_uri: Url,
	/// Identity the caller asked for.
	pub user: Option<UserIdentifier>,
	/// Caller-supplied query parameters appended to the authorize URL.
	pub extra_query_parameters: Vec<(String, String)>,
	/// Effective credentials type.
	pub credentials_type: CredentialsType,
	/// Prompt policy of the resolution.
	pub prompt: PromptBehavior,
	/// Lets the provider dismiss itself once the session cookie is refreshed.
	pub force_refresh_session: bool,
	/// Correlation id of the resolution.
	pub correlation_id: CorrelationId,
	/// Opaque state echoed back by the authorization server.
	pub state: String,
	/// Fully-formed authorize URL.
	pub authorize_url: Url,
}

/// Authorization server response intercepted at the redirect URI.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
	/// Authorization code.
	pub code: String,
	/// Echoed state.
	pub state: String,
}
impl AuthorizationResponse {
	/// Extracts `code` and `state` from a redirect URL, or the OAuth error it carries.
	pub fn from_redirect(url: &Url) -> Result<Self, AuthorizeError> {
		let mut code = None;
		let mut state = None;
		let mut error = None;
		let mut description = None;

		for (key, value) in url.query_pairs() {
			match key.as_ref() {
				"code" => code = Some(value.into_owned()),
				"state" => state = Some(value.into_owned()),
				"error" => error = Some(value.into_owned()),
				"error_description" => description = Some(value.into_owned()),
				_ => {},
			}
		}

		match (error, code) {
			(Some(code), _) if code == "access_denied" && description.is_none() =>
				Err(AuthorizeError::Cancelled),
			(Some(code), _) => Err(AuthorizeError::Provider { code, description }),
			(None, Some(code)) => Ok(Self { code, state: state.unwrap_or_default() }),
			(None, None) => Err(AuthorizeError::Provider {
				code: "invalid_response".into(),
				description: Some("The redirect carried neither a code nor an error.".into()),
			}),
		}
	}
}
impl Debug for AuthorizationResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationResponse")
			.field("code", &"<redacted>")
			.field("state", &self.state)
			.finish()
	}
}

/// Terminal outcomes of the authorization UI other than a code.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AuthorizeError {
	/// The user dismissed the UI or the caller aborted it.
	#[error("The user cancelled authorization.")]
	Cancelled,
	/// The authorization server or the provider reported an error.
	#[error("Authorization failed ({code}).")]
	Provider {
		/// OAuth error code.
		code: String,
		/// OAuth error description.
		description: Option<String>,
	},
}

/// Builds the authorize URL for an interactive or broker request.
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_authorize_url(
	authority: &Authority,
	client_id: &ClientId,
	resource: &ResourceId,
	redirect_uri: &Url,
	state: &str,
	challenge: &str,
	prompt: PromptBehavior,
	user: Option<&UserIdentifier>,
	correlation_id: CorrelationId,
	extra: &[(String, String)],
) -> Url {
	let mut url = authority.authorize_endpoint().clone();
	let mut pairs = url.query_pairs_mut();

	pairs.append_pair("response_type", "code");
	pairs.append_pair("client_id", client_id);
	pairs.append_pair("redirect_uri", redirect_uri.as_str());
	pairs.append_pair("resource", resource);
	pairs.append_pair("state", state);
	pairs.append_pair("code_challenge", challenge);
	pairs.append_pair("code_challenge_method", pkce::METHOD);
	pairs.append_pair(CorrelationId::PARAM, &correlation_id.to_string());

	if let Some(prompt) = prompt.prompt_param() {
		pairs.append_pair("prompt", prompt);
	}
	if let Some(hint) = user.and_then(UserIdentifier::login_hint) {
		pairs.append_pair("login_hint", hint);
	}

	for (key, value) in extra {
		pairs.append_pair(key, value);
	}

	drop(pairs);

	url
}
