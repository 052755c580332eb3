#![cfg(feature = "reqwest")]

mod common;

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use reqwest::Client;
// self
use common::*;
use oauth2_context::{
	auth::{Authority, TokenSecret},
	correlation::CorrelationId,
	endpoint::{Grant, ReqwestTokenEndpoint, TokenEndpoint, TokenRequest},
	error::{Error, ServerErrorKind, TransientError},
	flows::{AcquireTokenRequest, AuthenticationContext},
	result::{AuthenticationStatus, ErrorKind},
};

const TOKEN_PATH: &str = "/tenant/oauth2/token";

fn server_authority(server: &MockServer) -> Authority {
	let url = server.url("/tenant").replacen("http://", "https://", 1);

	Authority::new(url).expect("Mock authority should be valid.")
}

fn insecure_endpoint() -> ReqwestTokenEndpoint {
	let client = Client::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.redirect(reqwest::redirect::Policy::none())
		.build()
		.expect("Failed to build insecure Reqwest client for tests.");

	ReqwestTokenEndpoint::with_client(client)
}

fn refresh_request(authority: Authority) -> TokenRequest {
	TokenRequest {
		authority,
		client_id: client(CLIENT),
		resource: Some(resource(GRAPH)),
		grant: Grant::RefreshToken { refresh_token: TokenSecret::new("rt-1") },
		correlation_id: CorrelationId::new_v4(),
	}
}

#[tokio::test]
async fn authorization_code_is_redeemed_over_https() {
	let server = MockServer::start_async().await;
	let authority = server_authority(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.header("content-type", "application/x-www-form-urlencoded")
				.header("return-client-request-id", "true");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"at-http\",\"refresh_token\":\"rt-http\",\"token_type\":\"Bearer\",\"expires_in\":\"3600\",\"foci\":\"1\",\"resource\":\"https://graph.example.com\"}",
			);
		})
		.await;
	let provider = CountingProvider::approving("code-http");
	let context = AuthenticationContext::builder(authority.as_str())
		.token_endpoint(Arc::new(insecure_endpoint()))
		.interactive_provider(provider.clone())
		.build()
		.expect("Context should build against the mock authority.");
	let result = context
		.acquire_token(
			AcquireTokenRequest::new(resource(GRAPH), client(CLIENT))
				.with_redirect_uri(redirect_uri()),
		)
		.await;

	mock.assert_async().await;

	let token = result.into_token().expect("Code redemption should succeed.");

	assert_eq!(token.access_token.expose(), "at-http");
	assert_eq!(token.refresh_token.as_ref().map(|t| t.expose()), Some("rt-http"));
	assert!(token.multi_resource_refresh_token);
	assert_eq!(provider.calls(), 1);
	assert!(context.cache().items().iter().any(|item| item.family_id.is_some()));
}

#[tokio::test]
async fn invalid_grant_is_classified_as_a_server_rejection() {
	let server = MockServer::start_async().await;
	let authority = server_authority(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\",\"error_description\":\"AADSTS70008: expired\"}");
		})
		.await;
	let err = insecure_endpoint()
		.exchange(refresh_request(authority))
		.await
		.expect_err("Rejected refresh token should fail.");

	mock.assert_async().await;

	assert!(err.is_invalid_grant());

	let Error::Server(server_error) = err else {
		panic!("Rejection should be a server error.");
	};

	assert_eq!(server_error.status, Some(400));
	assert_eq!(server_error.description.as_deref(), Some("AADSTS70008: expired"));
}

#[tokio::test]
async fn errors_reported_with_success_status_are_still_errors() {
	let server = MockServer::start_async().await;
	let authority = server_authority(&server);
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"error\":\"interaction_required\"}");
		})
		.await;
	let err = insecure_endpoint()
		.exchange(refresh_request(authority))
		.await
		.expect_err("An error body should fail even with a 200 status.");

	assert!(matches!(
		err,
		Error::Server(ref server) if server.kind == ServerErrorKind::InteractionRequired
	));
}

#[tokio::test]
async fn throttling_is_transient_and_keeps_the_retry_hint() {
	let server = MockServer::start_async().await;
	let authority = server_authority(&server);
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(503).header("retry-after", "7").body("busy");
		})
		.await;
	let err = insecure_endpoint()
		.exchange(refresh_request(authority))
		.await
		.expect_err("Unavailable endpoint should fail.");

	assert_eq!(err.kind(), ErrorKind::NetworkError);
	assert!(matches!(
		err,
		Error::Transient(TransientError::TokenEndpoint { status: Some(503), retry_after: Some(d), .. })
			if d == time::Duration::seconds(7)
	));
}

#[tokio::test]
async fn silent_refresh_against_a_rejecting_authority_needs_input() {
	let server = MockServer::start_async().await;
	let authority = server_authority(&server);
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\"}");
		})
		.await;
	let context = AuthenticationContext::builder(authority.as_str())
		.token_endpoint(Arc::new(insecure_endpoint()))
		.build()
		.expect("Context should build against the mock authority.");
	let stale = oauth2_context::auth::TokenCacheItem::builder(
		authority.clone(),
		Some(resource(GRAPH)),
		client(CLIENT),
	)
	.access_token("at-old")
	.refresh_token("rt-old")
	.expires_in(time::Duration::minutes(-1))
	.build()
	.expect("Stale item should build.");

	context.cache().insert_or_replace(stale).await.expect("Seeding the cache should succeed.");

	let result = context
		.acquire_token_silent(AcquireTokenRequest::new(resource(GRAPH), client(CLIENT)))
		.await;

	assert_eq!(result.status(), AuthenticationStatus::Failed);
	assert_eq!(result.error_kind(), Some(ErrorKind::UserInputNeeded));
	assert!(context.cache().is_empty());
}
