//! Refresh-token orchestration: the collaborator contract, atomic write-back, and background
//! renewal.
//!
//! [`SilentFlowClient::acquire_token`] runs the cache lookup first and only reaches the
//! [`RefreshClient`] when the lookup reports that a refresh is required. The collaborator's
//! response is written back as one group so concurrent lookups see either the previous or the new
//! token set. Collaborator failures are returned unmodified and never retried.
//!
//! Cache hits past an access token's `refresh_on` spawn a background refresh on the current tokio
//! runtime. Its failures are logged and dropped; dropping the [`BackgroundRefresh`] handle
//! detaches the task instead of cancelling it.

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use tokio::{runtime::Handle, task::JoinHandle};
// self
use crate::{
	_prelude::*,
	auth::{
		Account, AuthenticationScheme, ClaimsRequest, ClientId, CorrelationId, ScopeSet,
		TokenSecret,
	},
	cache::CacheRecord,
	error::TransientError,
	flows::{
		CcsHint, PreparedRequest, SilentFlowClient, SilentFlowOutcome, SilentFlowRequest,
		SilentFlowResult, common,
	},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	telemetry::CacheOutcome,
};

/// Boxed future returned by [`RefreshClient::refresh`].
pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = Result<CacheRecord>> + 'a + Send>>;

/// Collaborator that exchanges a refresh token at the token endpoint.
///
/// Implementations own the wire format. They return the entities to cache, built for
/// [`RefreshRequest::account`] and [`RefreshRequest::client_id`], or fail with the crate's
/// [`Error`] vocabulary (`InvalidGrant`, `Transient`, `Transport`).
pub trait RefreshClient
where
	Self: Send + Sync,
{
	/// Performs one refresh-token exchange.
	fn refresh(&self, request: RefreshRequest) -> RefreshFuture<'_>;
}

/// Parameters handed to the [`RefreshClient`].
#[derive(Clone, Debug)]
pub struct RefreshRequest {
	/// Account being refreshed.
	pub account: Account,
	/// Application identifier.
	pub client_id: ClientId,
	/// Cached refresh token value.
	pub refresh_token: TokenSecret,
	/// Requested scopes plus the default OIDC scopes.
	pub scopes: ScopeSet,
	/// Authority to refresh against.
	pub authority: Url,
	/// Canonical claims JSON including client capabilities, if any.
	pub claims: Option<String>,
	/// Routing hint derived from the account.
	pub ccs_hint: Option<CcsHint>,
	/// Token type to request.
	pub authentication_scheme: AuthenticationScheme,
	/// Correlation identifier of the originating request.
	pub correlation_id: CorrelationId,
	/// Extra query parameters; never contains empty values.
	pub token_query_parameters: BTreeMap<String, String>,
}

/// Handle to a background refresh scheduled by a cache hit.
#[derive(Debug)]
pub struct BackgroundRefresh {
	handle: JoinHandle<bool>,
}
impl BackgroundRefresh {
	/// Waits for the refresh and reports whether the store was updated.
	pub async fn wait(self) -> bool {
		self.handle.await.unwrap_or(false)
	}
}

impl SilentFlowClient {
	/// Returns a cached token when one is valid, otherwise refreshes and writes the result back.
	///
	/// A refresh that is required but has no cached refresh token fails with
	/// [`Error::NoTokensFound`]. Dropping the returned future cancels the foreground refresh.
	pub async fn acquire_token(&self, request: &SilentFlowRequest) -> Result<SilentFlowResult> {
		const KIND: FlowKind = FlowKind::Refresh;

		let prepared = request.prepare(&self.config)?;
		let outcome = match self.evaluate(&prepared)? {
			SilentFlowOutcome::CacheHit { result, .. } => return Ok(*result),
			SilentFlowOutcome::RefreshRequired { outcome } => outcome,
		};
		let span = FlowSpan::new(KIND, "acquire_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.refresh_and_store(&prepared, outcome)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	pub(crate) fn schedule_background_refresh(
		&self,
		prepared: &PreparedRequest,
	) -> Option<BackgroundRefresh> {
		let Ok(runtime) = Handle::try_current() else {
			obs::background_refresh_skipped("no tokio runtime", prepared.correlation_id.as_str());

			return None;
		};
		let client = self.clone();
		let prepared = PreparedRequest { max_age: None, ..prepared.clone() };

		self.refresh_metrics.record_background();

		let handle = runtime.spawn(async move { client.refresh_in_background(prepared).await });

		Some(BackgroundRefresh { handle })
	}

	async fn refresh_in_background(self, prepared: PreparedRequest) -> bool {
		const KIND: FlowKind = FlowKind::BackgroundRefresh;

		let span = FlowSpan::new(KIND, "refresh_in_background");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		match span
			.instrument(self.refresh_and_store(&prepared, CacheOutcome::ProactivelyRefreshed))
			.await
		{
			Ok(_) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Success);

				true
			},
			Err(e) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				obs::background_refresh_failed(&e, prepared.correlation_id.as_str());

				false
			},
		}
	}

	async fn refresh_and_store(
		&self,
		prepared: &PreparedRequest,
		outcome: CacheOutcome,
	) -> Result<SilentFlowResult> {
		self.refresh_metrics.record_attempt();

		let result = self.refresh_and_store_inner(prepared, outcome).await;

		match &result {
			Ok(_) => self.refresh_metrics.record_success(),
			Err(_) => self.refresh_metrics.record_failure(),
		}

		result
	}

	async fn refresh_and_store_inner(
		&self,
		prepared: &PreparedRequest,
		outcome: CacheOutcome,
	) -> Result<SilentFlowResult> {
		let account = &prepared.account;
		let client_id = &self.config.client_id;
		let refresh_token = self
			.store
			.refresh_token(
				&account.home_account_id,
				&account.environment,
				client_id,
				&account.realm,
			)?
			.ok_or(Error::NoTokensFound)?;
		let request = RefreshRequest {
			account: account.clone(),
			client_id: client_id.clone(),
			refresh_token: refresh_token.secret,
			scopes: prepared.scopes.with_default_oidc_scopes(),
			authority: prepared.authority.clone(),
			claims: ClaimsRequest::merge_client_capabilities(
				prepared.claims.as_ref(),
				&self.config.client_capabilities,
			),
			ccs_hint: CcsHint::for_account(&account.home_account_id, &account.username),
			authentication_scheme: prepared.authentication_scheme,
			correlation_id: prepared.correlation_id.clone(),
			token_query_parameters: prepared.token_query_parameters.clone(),
		};
		let mut record = self.refresh_client.refresh(request).await?;

		if record.account.as_ref().is_some_and(|issued| !issued.is_same_account(account)) {
			return Err(TransientError::TokenEndpoint {
				message: "refresh response was issued for a different account".into(),
				status: None,
				retry_after: None,
			}
			.into());
		}

		let Some(access_token) = record.access_token.as_mut() else {
			return Err(TransientError::TokenEndpoint {
				message: "refresh response carried no access token".into(),
				status: None,
				retry_after: None,
			}
			.into());
		};

		if let Some(claims) =
			prepared.claims.as_ref().filter(|_| self.config.claims_based_caching_enabled)
		{
			access_token.requested_claims_hash = Some(claims.hash());
		}

		let access_token = access_token.clone();
		let stored_account = record.account.get_or_insert_with(|| account.clone()).clone();

		self.store.save_record(&record)?;

		let id_token = match record.id_token {
			Some(token) => Some(token),
			None => self.store.id_token(
				&account.home_account_id,
				&account.environment,
				client_id,
				&account.realm,
			)?,
		};
		let id_token_claims = common::decode_claims(id_token.as_ref(), prepared.max_age)?;

		common::check_max_age(prepared.max_age, id_token_claims.as_ref(), self.clock.now())?;

		Ok(SilentFlowResult::build(
			stored_account,
			&access_token,
			id_token.as_ref(),
			id_token_claims,
			false,
			prepared.correlation_id.clone(),
			outcome,
		))
	}
}
