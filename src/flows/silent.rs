//! Cache-only silent lookup: the decision between a cached token and a required refresh.
//!
//! Rules apply in order and the first match wins:
//!
//! 1. no account on the request fails with [`Error::NoAccountInSilentRequest`];
//! 2. no scopes fail with [`Error::EmptyInputScopes`];
//! 3. `force_refresh`, or claims while claims-based caching is off, require a refresh;
//! 4. no matching access token requires a refresh;
//! 5. an access token written in the future (clock turned back) requires a refresh;
//! 6. an access token within the renewal offset of expiry requires a refresh;
//! 7. `max_age` fails with [`Error::AuthTimeNotFound`] or [`Error::MaxAgeTranspired`];
//! 8. otherwise the cached token is returned, and a background refresh starts once `refresh_on`
//!    has passed.
//!
//! Rules 1 and 2 run before the store is touched.

// self
use crate::{
	_prelude::*,
	cache::{CacheLookup, CacheMatcher, MatchQuery},
	flows::{
		PreparedRequest, SilentFlowClient, SilentFlowOutcome, SilentFlowRequest, SilentFlowResult,
		common,
	},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	telemetry::{self, CacheOutcome},
};

impl SilentFlowClient {
	/// Looks up a cached token without contacting the token endpoint.
	///
	/// Returns [`SilentFlowOutcome::RefreshRequired`] when the cache can't satisfy the request; use
	/// [`SilentFlowOutcome::into_result`] for the error form.
	pub async fn acquire_cached_token(
		&self,
		request: &SilentFlowRequest,
	) -> Result<SilentFlowOutcome> {
		const KIND: FlowKind = FlowKind::Silent;

		let span = FlowSpan::new(KIND, "acquire_cached_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let prepared = request.prepare(&self.config)?;

				self.evaluate(&prepared)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	pub(crate) fn evaluate(&self, prepared: &PreparedRequest) -> Result<SilentFlowOutcome> {
		if prepared.force_refresh
			|| (prepared.claims.is_some() && !self.config.claims_based_caching_enabled)
		{
			return Ok(self.refresh_required(prepared, CacheOutcome::ForceRefreshOrClaims));
		}

		let account = &prepared.account;
		let lookup = CacheMatcher::new(&self.store).resolve(&MatchQuery {
			home_account_id: &account.home_account_id,
			environment: &account.environment,
			client_id: &self.config.client_id,
			realm: &account.realm,
			scopes: &prepared.search_scopes,
			claims: prepared.claims.as_ref(),
			claims_based_caching_enabled: self.config.claims_based_caching_enabled,
			scheme: prepared.authentication_scheme,
		})?;
		let CacheLookup::Resolved(entities) = lookup else {
			return Ok(self.refresh_required(prepared, CacheOutcome::NoCachedAccessToken));
		};
		let Some(access_token) = entities.access_token.as_ref() else {
			return Ok(self.refresh_required(prepared, CacheOutcome::NoCachedAccessToken));
		};
		let now = self.clock.now();

		if access_token.was_clock_turned_back(now)
			|| access_token.is_expired(now, self.config.token_renewal_offset)
		{
			return Ok(self.refresh_required(prepared, CacheOutcome::CachedAccessTokenExpired));
		}

		let id_token_claims = common::decode_claims(entities.id_token.as_ref(), prepared.max_age)?;

		common::check_max_age(prepared.max_age, id_token_claims.as_ref(), now)?;

		let (outcome, background) = if access_token.needs_proactive_refresh(now) {
			(CacheOutcome::ProactivelyRefreshed, self.schedule_background_refresh(prepared))
		} else {
			(CacheOutcome::NotApplicable, None)
		};

		telemetry::report_hit(self.telemetry.as_ref(), outcome);
		obs::cache_decision(outcome, prepared.correlation_id.as_str());

		let result = SilentFlowResult::build(
			entities.account.clone(),
			access_token,
			entities.id_token.as_ref(),
			id_token_claims,
			true,
			prepared.correlation_id.clone(),
			outcome,
		);

		Ok(SilentFlowOutcome::CacheHit { result: Box::new(result), background })
	}

	fn refresh_required(
		&self,
		prepared: &PreparedRequest,
		outcome: CacheOutcome,
	) -> SilentFlowOutcome {
		telemetry::report_miss(self.telemetry.as_ref(), outcome);
		obs::cache_decision(outcome, prepared.correlation_id.as_str());

		SilentFlowOutcome::RefreshRequired { outcome }
	}
}
