//! Broker delegation: suspend on a pending request, then redeem the code the broker returns.

// self
use crate::{
	_prelude::*,
	broker::{BrokerDelivery, BrokerInvocation, PendingBrokerRequest},
	correlation::CorrelationId,
	endpoint::{Grant, TokenRequest},
	error::ConfigError,
	flows::{AcquireTokenRequest, AuthenticationContext, common},
	interactive::pkce::{self, PkcePair},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	result::AcquiredToken,
};

impl AuthenticationContext {
	pub(super) async fn resolve_brokered(
		&self,
		request: &AcquireTokenRequest,
		redirect_uri: Url,
		correlation_id: CorrelationId,
	) -> Result<AcquiredToken> {
		const KIND: FlowKind = FlowKind::Broker;

		let span = FlowSpan::new(KIND, "broker_handoff", correlation_id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result =
			span.instrument(self.hand_off_to_broker(request, redirect_uri, correlation_id)).await;
		let outcome = match &result {
			Ok(_) => FlowOutcome::Success,
			Err(Error::Cancelled) => FlowOutcome::Cancelled,
			Err(_) => FlowOutcome::Failure,
		};

		obs::record_flow_outcome(KIND, outcome);

		result
	}

	async fn hand_off_to_broker(
		&self,
		request: &AcquireTokenRequest,
		redirect_uri: Url,
		correlation_id: CorrelationId,
	) -> Result<AcquiredToken> {
		let Some(bridge) = &self.broker else {
			return Err(ConfigError::MissingCollaborator { collaborator: "broker" }.into());
		};
		let pair = PkcePair::generate();
		let pending = PendingBrokerRequest {
			correlation_id,
			authority: self.authority.clone(),
			resource: request.resource.clone(),
			client_id: request.client_id.clone(),
			redirect_uri: redirect_uri.clone(),
			user: request.user.clone(),
			state: pkce::generate_state(),
			code_verifier: pair.verifier,
			created_at: self.clock.now(),
		};
		let invocation = BrokerInvocation {
			authority: pending.authority.clone(),
			resource: pending.resource.clone(),
			client_id: pending.client_id.clone(),
			redirect_uri,
			correlation_id,
			state: pending.state.clone(),
			user: pending.user.clone(),
			url: bridge.invocation_url(&pending, &pair.challenge),
		};

		self.metrics.record_broker_handoff();

		flow_event!(info, correlation_id = %correlation_id, "Handing off to the broker.");

		let ticket = bridge.begin(pending, invocation)?;
		let delivery = bridge.wait(ticket).await?;

		self.complete_broker(delivery).await
	}

	/// Redeems the code carried by a matched broker response.
	pub(super) async fn complete_broker(&self, delivery: BrokerDelivery) -> Result<AcquiredToken> {
		let BrokerDelivery { request, response } = delivery;

		if response.state != request.state
			|| response.correlation_id.is_some_and(|id| id != request.correlation_id)
			|| request.authority != self.authority
		{
			return Err(Error::BrokerResponseMismatch);
		}

		let code = response.result?;
		let token_request = TokenRequest {
			authority: request.authority.clone(),
			client_id: request.client_id.clone(),
			resource: Some(request.resource.clone()),
			grant: Grant::AuthorizationCode {
				code,
				redirect_uri: request.redirect_uri.clone(),
				code_verifier: Some(request.code_verifier.clone()),
			},
			correlation_id: request.correlation_id,
		};
		let item = self.redeem(token_request, None, None).await?;
		let token = self.store_and_project(item.clone()).await?;

		common::ensure_user(request.user.as_ref(), &item)?;

		Ok(token)
	}
}
