// std
use std::sync::atomic::{AtomicUsize, Ordering};
// crates.io
use serde_json::json;
use time::macros;
// self
use oauth2_silent::{
	_preludet::*,
	auth::{AccessToken, AuthenticationScheme, ClaimsRequest},
	cache::{CacheRecord, CredentialStore},
	flows::{FixedClock, SilentFlowClient, SilentFlowOutcome, SilentFlowRequest},
	store::{MemoryStorage, StorageBackend, StoreError},
	telemetry::CacheOutcome,
};

const GRAPH_TARGET: &str = "openid profile graphscope";

fn now() -> OffsetDateTime {
	macros::datetime!(2025-11-10 12:00 UTC)
}

fn graph_request() -> SilentFlowRequest {
	SilentFlowRequest::new(["openid", "profile", "graphscope"]).with_account(test_account())
}

fn valid_token(secret: &str) -> AccessToken {
	let cached_at = now() - Duration::minutes(10);

	test_access_token(GRAPH_TARGET, secret, cached_at, now() + Duration::hours(1))
}

fn seed_graph_cache(store: &CredentialStore, access_token: AccessToken) {
	seed_cache(
		store,
		Some(access_token),
		Some(test_id_token(json!({
			"oid": "oid-1",
			"tid": "tenant-1",
			"preferred_username": "user@example.com",
			"auth_time": (now() - Duration::minutes(30)).unix_timestamp(),
		}))),
		Some(test_refresh_token("rt-1")),
	);
}

fn unused_refresh() -> Arc<MockRefreshClient> {
	Arc::new(MockRefreshClient::succeeding(CacheRecord::default()))
}

async fn expect_refresh(client: &SilentFlowClient, request: &SilentFlowRequest) -> CacheOutcome {
	match client.acquire_cached_token(request).await.expect("Silent lookup should succeed.") {
		SilentFlowOutcome::RefreshRequired { outcome } => outcome,
		SilentFlowOutcome::CacheHit { result, .. } =>
			panic!("Expected a refresh, got a cache hit with {:?}.", result.cache_outcome),
	}
}

#[tokio::test]
async fn cached_superset_token_is_returned_with_target_order() {
	let refresh = unused_refresh();
	let (client, store, counters) = build_test_client(refresh.clone(), now());

	seed_graph_cache(&store, valid_token("at-graph"));

	let outcome = client
		.acquire_cached_token(&graph_request())
		.await
		.expect("Silent lookup should succeed.");
	let SilentFlowOutcome::CacheHit { result, background } = outcome else {
		panic!("Valid cached token should be a cache hit.");
	};

	assert!(background.is_none());
	assert_eq!(result.access_token.expose(), "at-graph");
	assert_eq!(result.scopes, vec!["openid", "profile", "graphscope"]);
	assert!(result.from_cache);
	assert_eq!(result.cache_outcome, CacheOutcome::NotApplicable);
	assert_eq!(result.tenant_id, "tenant-1");
	assert_eq!(result.unique_id, "oid-1");
	assert_eq!(result.account, test_account());
	assert!(result.id_token.is_some());
	assert_eq!(counters.hits(), 1);
	assert_eq!(counters.misses(), 0);
	assert_eq!(refresh.calls(), 0);
}

#[tokio::test]
async fn scopes_outside_the_target_require_a_refresh() {
	let (client, store, counters) = build_test_client(unused_refresh(), now());

	seed_graph_cache(&store, valid_token("at-graph"));

	let request = SilentFlowRequest::new(["graphscope", "mail.send"]).with_account(test_account());

	assert_eq!(expect_refresh(&client, &request).await, CacheOutcome::NoCachedAccessToken);
	assert_eq!(counters.misses(), 1);
}

#[tokio::test]
async fn scope_case_and_order_do_not_matter() {
	let (client, store, _) = build_test_client(unused_refresh(), now());

	seed_graph_cache(&store, valid_token("at-graph"));

	let request = SilentFlowRequest::new(["GraphScope", "PROFILE"]).with_account(test_account());
	let result = client
		.acquire_cached_token(&request)
		.await
		.expect("Silent lookup should succeed.")
		.into_result()
		.expect("Case-insensitive match should hit.");

	assert_eq!(result.access_token.expose(), "at-graph");
}

#[tokio::test]
async fn expiry_and_renewal_offset_require_a_refresh() {
	let (client, store, _) = build_test_client(unused_refresh(), now());

	seed_graph_cache(
		&store,
		test_access_token(
			GRAPH_TARGET,
			"at-near-expiry",
			now() - Duration::minutes(55),
			now() + Duration::minutes(4),
		),
	);

	assert_eq!(
		expect_refresh(&client, &graph_request()).await,
		CacheOutcome::CachedAccessTokenExpired
	);

	let (relaxed, relaxed_store, _) = build_test_client_with_config(
		test_config().with_token_renewal_offset(Duration::ZERO),
		unused_refresh(),
		now(),
	);

	seed_graph_cache(
		&relaxed_store,
		test_access_token(
			GRAPH_TARGET,
			"at-near-expiry",
			now() - Duration::minutes(55),
			now() + Duration::minutes(4),
		),
	);

	assert!(matches!(
		relaxed.acquire_cached_token(&graph_request()).await,
		Ok(SilentFlowOutcome::CacheHit { .. })
	));

	let (expired, expired_store, _) = build_test_client_with_config(
		test_config().with_token_renewal_offset(Duration::ZERO),
		unused_refresh(),
		now(),
	);

	seed_graph_cache(
		&expired_store,
		test_access_token(GRAPH_TARGET, "at-expired", now() - Duration::hours(1), now()),
	);

	assert_eq!(
		expect_refresh(&expired, &graph_request()).await,
		CacheOutcome::CachedAccessTokenExpired
	);
}

#[tokio::test]
async fn tokens_written_in_the_future_are_not_trusted() {
	let (client, store, _) = build_test_client(unused_refresh(), now());

	seed_graph_cache(
		&store,
		test_access_token(
			GRAPH_TARGET,
			"at-future",
			now() + Duration::minutes(1),
			now() + Duration::hours(2),
		),
	);

	assert_eq!(
		expect_refresh(&client, &graph_request()).await,
		CacheOutcome::CachedAccessTokenExpired
	);
}

#[tokio::test]
async fn force_refresh_bypasses_a_valid_token() {
	let (client, store, counters) = build_test_client(unused_refresh(), now());

	seed_graph_cache(&store, valid_token("at-graph"));

	let outcome = client
		.acquire_cached_token(&graph_request().force_refresh())
		.await
		.expect("Silent lookup should succeed.");

	assert_eq!(outcome.cache_outcome(), CacheOutcome::ForceRefreshOrClaims);
	assert!(matches!(
		outcome.into_result(),
		Err(Error::TokenRefreshRequired { outcome: CacheOutcome::ForceRefreshOrClaims })
	));
	assert_eq!(counters.misses(), 1);
}

#[tokio::test]
async fn claims_require_a_refresh_unless_claims_caching_is_enabled() {
	let claims = r#"{"access_token":{"nbf":{"essential":true,"value":"1700000000"}}}"#;
	let hash = ClaimsRequest::parse(claims)
		.expect("Claims should parse.")
		.expect("Claims should not be empty.")
		.hash();
	let bound = AccessToken { requested_claims_hash: Some(hash), ..valid_token("at-bound") };
	let (disabled, disabled_store, _) = build_test_client(unused_refresh(), now());

	seed_graph_cache(&disabled_store, bound.clone());

	assert_eq!(
		expect_refresh(&disabled, &graph_request().with_claims(claims)).await,
		CacheOutcome::ForceRefreshOrClaims
	);

	let (enabled, enabled_store, _) = build_test_client_with_config(
		test_config().with_claims_based_caching(true),
		unused_refresh(),
		now(),
	);

	seed_graph_cache(&enabled_store, bound);

	let result = enabled
		.acquire_cached_token(&graph_request().with_claims(claims))
		.await
		.expect("Silent lookup should succeed.")
		.into_result()
		.expect("Matching claims hash should hit.");

	assert_eq!(result.access_token.expose(), "at-bound");
	assert_eq!(
		expect_refresh(
			&enabled,
			&graph_request().with_claims(r#"{"id_token":{"acr":{"essential":true}}}"#)
		)
		.await,
		CacheOutcome::NoCachedAccessToken
	);

	let empty_claims = enabled
		.acquire_cached_token(&graph_request().with_claims("{}"))
		.await
		.expect("Silent lookup should succeed.");

	assert_eq!(empty_claims.cache_outcome(), CacheOutcome::NotApplicable);
}

#[tokio::test]
async fn max_age_is_enforced_on_cached_tokens() {
	let (client, store, _) = build_test_client(unused_refresh(), now());

	seed_graph_cache(&store, valid_token("at-graph"));

	assert!(matches!(
		client.acquire_cached_token(&graph_request().with_max_age(Duration::ZERO)).await,
		Err(Error::MaxAgeTranspired { .. })
	));
	assert!(matches!(
		client.acquire_cached_token(&graph_request().with_max_age(Duration::minutes(30))).await,
		Err(Error::MaxAgeTranspired { .. })
	));
	assert!(matches!(
		client.acquire_cached_token(&graph_request().with_max_age(Duration::hours(1))).await,
		Ok(SilentFlowOutcome::CacheHit { .. })
	));

	let (no_auth_time, no_auth_time_store, _) = build_test_client(unused_refresh(), now());

	seed_cache(
		&no_auth_time_store,
		Some(valid_token("at-graph")),
		Some(test_id_token(json!({ "oid": "oid-1" }))),
		None,
	);

	assert!(matches!(
		no_auth_time.acquire_cached_token(&graph_request().with_max_age(Duration::hours(1))).await,
		Err(Error::AuthTimeNotFound)
	));
}

#[tokio::test]
async fn authentication_scheme_must_match() {
	let (client, store, _) = build_test_client(unused_refresh(), now());

	seed_graph_cache(&store, valid_token("at-bearer"));

	let request = graph_request().with_authentication_scheme(AuthenticationScheme::Pop);

	assert_eq!(expect_refresh(&client, &request).await, CacheOutcome::NoCachedAccessToken);
}

#[tokio::test]
async fn missing_cached_account_requires_a_refresh() {
	let (client, _, _) = build_test_client(unused_refresh(), now());

	assert_eq!(
		expect_refresh(&client, &graph_request()).await,
		CacheOutcome::NoCachedAccessToken
	);
}

#[derive(Debug, Default)]
struct CountingStorage {
	inner: MemoryStorage,
	operations: AtomicUsize,
}
impl StorageBackend for CountingStorage {
	fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		self.operations.fetch_add(1, Ordering::SeqCst);
		self.inner.get(key)
	}

	fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
		self.operations.fetch_add(1, Ordering::SeqCst);
		self.inner.set(key, value)
	}

	fn keys(&self) -> Result<Vec<String>, StoreError> {
		self.operations.fetch_add(1, Ordering::SeqCst);
		self.inner.keys()
	}

	fn set_batch(&self, entries: Vec<(String, String)>) -> Result<(), StoreError> {
		self.operations.fetch_add(1, Ordering::SeqCst);
		self.inner.set_batch(entries)
	}
}

#[tokio::test]
async fn requests_without_account_or_scopes_never_touch_the_store() {
	let backend = Arc::new(CountingStorage::default());
	let refresh = unused_refresh();
	let client = SilentFlowClient::new(
		test_config(),
		Arc::new(CredentialStore::new(backend.clone())),
		refresh.clone(),
	);
	let anonymous = SilentFlowRequest::new(["graphscope"]);

	assert!(matches!(
		client.acquire_cached_token(&anonymous).await,
		Err(Error::NoAccountInSilentRequest)
	));
	assert!(matches!(client.acquire_token(&anonymous).await, Err(Error::NoAccountInSilentRequest)));
	assert!(matches!(
		client.acquire_token(&SilentFlowRequest::new(Vec::<String>::new())).await,
		Err(Error::NoAccountInSilentRequest)
	));

	let scopeless = SilentFlowRequest::new(Vec::<String>::new()).with_account(test_account());

	assert!(matches!(client.acquire_cached_token(&scopeless).await, Err(Error::EmptyInputScopes)));
	assert!(matches!(client.acquire_token(&scopeless).await, Err(Error::EmptyInputScopes)));
	assert_eq!(backend.operations.load(Ordering::SeqCst), 0);
	assert_eq!(refresh.calls(), 0);
}

#[tokio::test]
async fn corrupt_access_tokens_are_skipped() -> color_eyre::Result<()> {
	let backend = Arc::new(MemoryStorage::default());
	let store = Arc::new(CredentialStore::new(backend.clone()));
	let client = SilentFlowClient::new(test_config(), store.clone(), unused_refresh())
		.with_clock(Arc::new(FixedClock::new(now())));

	seed_graph_cache(&store, valid_token("at-graph"));
	backend.set(
		&test_access_token("mail.send", "x", now(), now() + Duration::hours(1)).cache_key(),
		"{not json".into(),
	)?;

	let result = client.acquire_cached_token(&graph_request()).await?.into_result()?;

	assert_eq!(result.access_token.expose(), "at-graph");

	Ok(())
}

#[tokio::test]
async fn out_of_range_expiry_requires_refresh() {
	let refresh = unused_refresh();
	let (client, store, _) = build_test_client(refresh.clone(), now());
	let floor = OffsetDateTime::from_unix_timestamp(-377_705_116_800)
		.expect("Minimum timestamp fixture should be valid.");

	seed_graph_cache(&store, test_access_token(GRAPH_TARGET, "at-floor", floor, floor));

	assert_eq!(
		expect_refresh(&client, &graph_request()).await,
		CacheOutcome::CachedAccessTokenExpired
	);
	assert_eq!(refresh.calls(), 0);
}
