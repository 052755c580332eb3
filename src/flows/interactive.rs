//! Interactive resolution: prompt policy, provider hand-off, and code redemption.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config::{CredentialsType, PromptBehavior},
	correlation::CorrelationId,
	endpoint::{Grant, TokenRequest},
	error::{ConfigError, ServerError, ServerErrorKind},
	flows::{AcquireTokenRequest, AuthenticationContext, common, silent},
	interactive::{
		AuthorizationRequest, AuthorizeError,
		pkce::{self, PkcePair},
	},
	result::AcquiredToken,
};

impl AuthenticationContext {
	/// `acquire_token` orchestration.
	///
	/// | prompt                      | cache & refresh | interaction          |
	/// |-----------------------------|-----------------|----------------------|
	/// | `Auto`                      | first           | when they fail       |
	/// | `Always`, `ForcePrompt`     | skipped         | always               |
	/// | `RefreshSession`            | skipped         | always, with refresh |
	pub(super) async fn resolve_interactive(
		&self,
		request: &AcquireTokenRequest,
		correlation_id: CorrelationId,
	) -> Result<AcquiredToken> {
		if !request.prompt.bypasses_cache() {
			let query = self.cache_query(request);

			match self.resolve_from_cache(&query, correlation_id).await {
				Ok(token) => return Ok(token),
				Err(e) if silent::falls_through(&e) => {
					flow_event!(
						debug,
						correlation_id = %correlation_id,
						reason = %e,
						"Cache could not satisfy the request; falling back to interaction."
					);
				},
				Err(e) => return Err(e),
			}
		}

		let Some(redirect_uri) = request.redirect_uri.clone() else {
			return Err(ConfigError::MissingRedirectUri { flow: "interactive" }.into());
		};
		let credentials_type =
			request.credentials_type.unwrap_or(self.options.default_credentials_type);

		if credentials_type == CredentialsType::Auto && self.broker.is_some() {
			return self.resolve_brokered(request, redirect_uri, correlation_id).await;
		}

		self.authorize_interactively(request, redirect_uri, credentials_type, correlation_id).await
	}

	async fn authorize_interactively(
		&self,
		request: &AcquireTokenRequest,
		redirect_uri: Url,
		credentials_type: CredentialsType,
		correlation_id: CorrelationId,
	) -> Result<AcquiredToken> {
		let Some(provider) = &self.interactive else {
			return Err(
				ConfigError::MissingCollaborator { collaborator: "interactive provider" }.into()
			);
		};
		let pair = PkcePair::generate();
		let state = pkce::generate_state();
		let authorize_url = crate::interactive::build_authorize_url(
			&self.authority,
			&request.client_id,
			&request.resource,
			&redirect_uri,
			&state,
			&pair.challenge,
			request.prompt,
			request.user.as_ref(),
			correlation_id,
			&request.extra_query_parameters,
		);
		let authorization = AuthorizationRequest {
			authority: self.authority.clone(),
			resource: request.resource.clone(),
			client_id: request.client_id.clone(),
			redirect_uri: redirect_uri.clone(),
			user: request.user.clone(),
			extra_query_parameters: request.extra_query_parameters.clone(),
			credentials_type,
			prompt: request.prompt,
			force_refresh_session: request.prompt == PromptBehavior::RefreshSession,
			correlation_id,
			state: state.clone(),
			authorize_url,
		};

		self.metrics.record_interactive_prompt();

		flow_event!(
			info,
			correlation_id = %correlation_id,
			prompt = ?request.prompt,
			"Handing off to the interactive provider."
		);

		let response = provider.authorize(authorization).await?;

		if response.state != state {
			return Err(ServerError::new(ServerErrorKind::Other, "state_mismatch")
				.with_description("The authorization response state does not match the request.")
				.into());
		}

		let token_request = TokenRequest {
			authority: self.authority.clone(),
			client_id: request.client_id.clone(),
			resource: Some(request.resource.clone()),
			grant: Grant::AuthorizationCode {
				code: TokenSecret::new(response.code),
				redirect_uri,
				code_verifier: Some(pair.verifier),
			},
			correlation_id,
		};
		let item = self.redeem(token_request, None, None).await?;
		let token = self.store_and_project(item.clone()).await?;

		common::ensure_user(request.user.as_ref(), &item)?;

		Ok(token)
	}
}

impl From<AuthorizeError> for Error {
	fn from(e: AuthorizeError) -> Self {
		match e {
			AuthorizeError::Cancelled => Self::Cancelled,
			AuthorizeError::Provider { code, description } => {
				let kind = crate::endpoint::classify(None, Some(&code), description.as_deref(), None);
				let mut error = ServerError::new(kind, code);

				error.description = description;

				error.into()
			},
		}
	}
}
