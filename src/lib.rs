//! Silent OAuth 2.0 / OIDC token acquisition: a credential cache matching engine plus the decision
//! state machine that chooses between a cached token, a foreground refresh, and a background
//! renewal.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod error;
pub mod flows;
pub mod obs;
pub mod store;
pub mod telemetry;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use crate::{
		auth::{
			AccessToken, Account, ClientId, HomeAccountId, IdToken, Realm, RefreshToken,
		},
		cache::{CacheRecord, CredentialStore},
		flows::{
			ClientConfig, FixedClock, RefreshClient, RefreshFuture, RefreshRequest,
			SilentFlowClient,
		},
		store::MemoryStorage,
		telemetry::CacheCounters,
	};

	/// Client identifier shared by the fixtures.
	pub const TEST_CLIENT_ID: &str = "client-silent";
	/// Authority shared by the fixtures.
	pub const TEST_AUTHORITY: &str = "https://login.example.com/tenant-1";
	/// Home account identifier shared by the fixtures.
	pub const TEST_HOME_ACCOUNT_ID: &str = "uid-1.tenant-1";

	/// Builds an unsigned JWT whose payload is the provided JSON value.
	pub fn test_jwt(payload: serde_json::Value) -> String {
		// crates.io
		use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
		let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());

		format!("{header}.{body}.")
	}

	/// Account fixture living in `login.example.com` / `tenant-1`.
	pub fn test_account() -> Account {
		Account::builder(
			HomeAccountId::new(TEST_HOME_ACCOUNT_ID).expect("Home account fixture should parse."),
			"login.example.com".parse().expect("Environment fixture should be valid."),
			Realm::new("tenant-1").expect("Realm fixture should be valid."),
		)
		.local_account_id("uid-1")
		.username("user@example.com")
		.build()
	}

	/// Client identifier fixture.
	pub fn test_client_id() -> ClientId {
		ClientId::new(TEST_CLIENT_ID).expect("Client identifier fixture should be valid.")
	}

	/// Configuration fixture pointing at [`TEST_AUTHORITY`].
	pub fn test_config() -> ClientConfig {
		ClientConfig::new(
			test_client_id(),
			Url::parse(TEST_AUTHORITY).expect("Authority fixture should parse."),
		)
	}

	/// Access token fixture for [`test_account`] cached at `cached_at`.
	pub fn test_access_token(
		target: &str,
		secret: &str,
		cached_at: OffsetDateTime,
		expires_on: OffsetDateTime,
	) -> AccessToken {
		AccessToken::builder(&test_account(), test_client_id())
			.target(target)
			.secret(secret)
			.cached_at(cached_at)
			.expires_on(expires_on)
			.build()
			.expect("Access token fixture should build.")
	}

	/// ID token fixture for [`test_account`] carrying the provided claims.
	pub fn test_id_token(claims: serde_json::Value) -> IdToken {
		IdToken::new(&test_account(), test_client_id(), test_jwt(claims))
	}

	/// Refresh token fixture for [`test_account`].
	pub fn test_refresh_token(secret: &str) -> RefreshToken {
		RefreshToken::new(&test_account(), test_client_id(), secret)
	}

	/// Writes a full cache record for [`test_account`].
	pub fn seed_cache(
		store: &CredentialStore,
		access_token: Option<AccessToken>,
		id_token: Option<IdToken>,
		refresh_token: Option<RefreshToken>,
	) {
		let record = CacheRecord {
			account: Some(test_account()),
			id_token,
			access_token,
			refresh_token,
		};

		store.save_record(&record).expect("Seeding the credential store should succeed.");
	}

	/// Scripted refresh collaborator that counts calls and replays a fixed response.
	#[derive(Debug)]
	pub struct MockRefreshClient {
		response: Mutex<Option<Result<CacheRecord>>>,
		template: Option<CacheRecord>,
		calls: AtomicUsize,
		last_request: Mutex<Option<RefreshRequest>>,
	}
	impl MockRefreshClient {
		/// Returns `record` on every call.
		pub fn succeeding(record: CacheRecord) -> Self {
			Self {
				response: Mutex::new(None),
				template: Some(record),
				calls: AtomicUsize::new(0),
				last_request: Mutex::new(None),
			}
		}

		/// Returns `error` on the first call and a scripted invalid-grant error afterwards.
		pub fn failing(error: Error) -> Self {
			Self {
				response: Mutex::new(Some(Err(error))),
				template: None,
				calls: AtomicUsize::new(0),
				last_request: Mutex::new(None),
			}
		}

		/// Number of refresh calls observed so far.
		pub fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}

		/// Most recent refresh request, if any.
		pub fn last_request(&self) -> Option<RefreshRequest> {
			self.last_request.lock().clone()
		}
	}
	impl RefreshClient for MockRefreshClient {
		fn refresh(&self, request: RefreshRequest) -> RefreshFuture<'_> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			*self.last_request.lock() = Some(request);

			let outcome = match self.response.lock().take() {
				Some(outcome) => outcome,
				None => self
					.template
					.clone()
					.ok_or_else(|| Error::InvalidGrant { reason: "scripted failure".into() }),
			};

			Box::pin(async move { outcome })
		}
	}

	/// Client wired to an in-memory store, a pinned clock, and the provided refresh collaborator.
	pub fn build_test_client(
		refresh: Arc<dyn RefreshClient>,
		now: OffsetDateTime,
	) -> (SilentFlowClient, Arc<CredentialStore>, Arc<CacheCounters>) {
		build_test_client_with_config(test_config(), refresh, now)
	}

	/// Same as [`build_test_client`] with a caller-supplied configuration.
	pub fn build_test_client_with_config(
		config: ClientConfig,
		refresh: Arc<dyn RefreshClient>,
		now: OffsetDateTime,
	) -> (SilentFlowClient, Arc<CredentialStore>, Arc<CacheCounters>) {
		let store = Arc::new(CredentialStore::new(Arc::new(MemoryStorage::default())));
		let counters = Arc::new(CacheCounters::default());
		let client = SilentFlowClient::new(config, store.clone(), refresh)
			.with_telemetry(counters.clone())
			.with_clock(Arc::new(FixedClock::new(now)));

		(client, store, counters)
	}
}

#[cfg(test)] use color_eyre as _;
#[cfg(test)] use oauth2_silent as _;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use url;
