mod common;

// std
use std::{sync::Arc, time::Duration as StdDuration};
// crates.io
use time::Duration;
// self
use common::*;
use oauth2_context::{
	auth::{TokenCacheItem, UserIdentifier},
	error::ServerError,
	flows::{AcquireTokenRequest, AuthenticationContext, PromptBehavior},
	result::AuthenticationStatus,
};

fn context(
	endpoint: &Arc<ScriptedEndpoint>,
	provider: &Arc<CountingProvider>,
) -> AuthenticationContext {
	AuthenticationContext::builder(AUTHORITY)
		.token_endpoint(endpoint.clone())
		.interactive_provider(provider.clone())
		.build()
		.expect("Context should build with a scripted endpoint.")
}

fn request() -> AcquireTokenRequest {
	AcquireTokenRequest::new(resource(GRAPH), client(CLIENT)).with_redirect_uri(redirect_uri())
}

#[tokio::test]
async fn concurrent_calls_for_one_key_share_a_single_prompt() {
	let endpoint = ScriptedEndpoint::new([Reply::Payload(payload("at-1", Some("rt-1")))]);
	let provider =
		CountingProvider::with(Behavior::Approve("code".into()), StdDuration::from_millis(50));
	let context = context(&endpoint, &provider);
	let (first, second) =
		tokio::join!(context.acquire_token(request()), context.acquire_token(request()));

	assert_eq!(first.status(), AuthenticationStatus::Succeeded);
	assert_eq!(first, second);
	assert_eq!(provider.calls(), 1);
	assert_eq!(endpoint.calls(), 1);
	assert_eq!(context.metrics().coalesced_waiters(), 1);
}

#[tokio::test]
async fn different_users_are_resolved_independently() {
	let endpoint = ScriptedEndpoint::new([
		Reply::Payload(payload("at-alice", None)),
		Reply::Payload(payload("at-bob", None)),
	]);
	let provider =
		CountingProvider::with(Behavior::Approve("code".into()), StdDuration::from_millis(20));
	let context = context(&endpoint, &provider);
	let alice = request()
		.with_prompt(PromptBehavior::Always)
		.with_user(UserIdentifier::optional_displayable("alice@contoso.com"));
	let bob = request()
		.with_prompt(PromptBehavior::Always)
		.with_user(UserIdentifier::optional_displayable("bob@contoso.com"));
	let (a, b) = tokio::join!(context.acquire_token(alice), context.acquire_token(bob));

	assert_eq!(a.status(), AuthenticationStatus::Succeeded);
	assert_eq!(b.status(), AuthenticationStatus::Succeeded);
	assert_eq!(provider.calls(), 2);
	assert_eq!(context.metrics().coalesced_waiters(), 0);
}

#[tokio::test]
async fn silent_and_interactive_calls_do_not_share_results() {
	let endpoint = ScriptedEndpoint::new([Reply::Payload(payload("at-1", None))]);
	let provider =
		CountingProvider::with(Behavior::Approve("code".into()), StdDuration::from_millis(20));
	let context = context(&endpoint, &provider);
	let (interactive, silent) =
		tokio::join!(context.acquire_token(request()), context.acquire_token_silent(request()));

	assert_eq!(interactive.status(), AuthenticationStatus::Succeeded);
	assert_eq!(silent.status(), AuthenticationStatus::Failed);
	assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn silent_and_interactive_callers_share_one_refresh() {
	let endpoint = ScriptedEndpoint::slow(
		[
			Reply::Payload(payload("at-new", Some("rt-new"))),
			Reply::Rejected(ServerError::invalid_grant("refresh token already redeemed")),
		],
		StdDuration::from_millis(50),
	);
	let provider = CountingProvider::approving("code");
	let context = context(&endpoint, &provider);
	let stale = TokenCacheItem::builder(authority(), Some(resource(GRAPH)), client(CLIENT))
		.access_token("at-old")
		.refresh_token("rt-old")
		.expires_in(Duration::minutes(-1))
		.build()
		.expect("Stale item should build.");

	context.cache().insert_or_replace(stale).await.expect("Seeding the cache should succeed.");

	let (interactive, silent) =
		tokio::join!(context.acquire_token(request()), context.acquire_token_silent(request()));

	for result in [&interactive, &silent] {
		assert_eq!(
			result.token().map(|t| t.access_token.expose().to_owned()),
			Some("at-new".into())
		);
	}
	assert_eq!(endpoint.calls(), 1);
	assert_eq!(provider.calls(), 0);
	assert_eq!(context.metrics().refresh_attempts(), 1);
	assert_eq!(context.cache().len(), 1);
}

#[tokio::test]
async fn abandoning_the_leader_cancels_its_waiters() {
	let endpoint = ScriptedEndpoint::new([]);
	let provider =
		CountingProvider::with(Behavior::Approve("code".into()), StdDuration::from_secs(30));
	let context = context(&endpoint, &provider);
	let (leader, follower) = tokio::join!(
		tokio::time::timeout(StdDuration::from_millis(20), context.acquire_token(request())),
		context.acquire_token(request()),
	);

	assert!(leader.is_err(), "Leader should have been abandoned by the timeout.");
	assert_eq!(follower.status(), AuthenticationStatus::Cancelled);
	assert_eq!(provider.calls(), 1);
}
