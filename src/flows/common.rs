//! Request, result, and outcome types shared by the silent and refresh flows.

// self
use crate::{
	_prelude::*,
	auth::{
		AccessToken, Account, AuthenticationScheme, ClaimsRequest, CorrelationId, HomeAccountId,
		IdToken, IdTokenClaims, ScopeSet, TokenSecret,
	},
	error::ConfigError,
	flows::{BackgroundRefresh, ClientConfig},
	telemetry::CacheOutcome,
};

/// Caller-facing silent token request.
#[derive(Clone, Debug)]
pub struct SilentFlowRequest {
	/// Requested scopes.
	pub scopes: Vec<String>,
	/// Previously signed-in account.
	pub account: Option<Account>,
	/// Authority override; the configured authority is used when absent.
	pub authority: Option<Url>,
	/// Correlation identifier forwarded to the refresh collaborator.
	pub correlation_id: CorrelationId,
	/// Bypasses the cached access token when true.
	pub force_refresh: bool,
	/// Claims request as a JSON object string.
	pub claims: Option<String>,
	/// Maximum time since the last end-user authentication.
	pub max_age: Option<Duration>,
	/// Extra query parameters for the token endpoint; empty values are dropped.
	pub token_query_parameters: BTreeMap<String, String>,
	/// Token type to look up and request.
	pub authentication_scheme: AuthenticationScheme,
}
impl SilentFlowRequest {
	/// Creates a request for `scopes` with a fresh correlation id.
	pub fn new<I, S>(scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			scopes: scopes.into_iter().map(Into::into).collect(),
			account: None,
			authority: None,
			correlation_id: CorrelationId::generate(),
			force_refresh: false,
			claims: None,
			max_age: None,
			token_query_parameters: BTreeMap::new(),
			authentication_scheme: AuthenticationScheme::default(),
		}
	}

	/// Sets the account to acquire a token for.
	pub fn with_account(mut self, account: Account) -> Self {
		self.account = Some(account);

		self
	}

	/// Overrides the authority.
	pub fn with_authority(mut self, authority: Url) -> Self {
		self.authority = Some(authority);

		self
	}

	/// Overrides the correlation identifier.
	pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
		self.correlation_id = correlation_id;

		self
	}

	/// Forces the flow to bypass cached access tokens.
	pub fn force_refresh(mut self) -> Self {
		self.force_refresh = true;

		self
	}

	/// Attaches a claims request.
	pub fn with_claims(mut self, claims: impl Into<String>) -> Self {
		self.claims = Some(claims.into());

		self
	}

	/// Requires the last authentication to be younger than `max_age`; negatives clamp to zero.
	pub fn with_max_age(mut self, max_age: Duration) -> Self {
		self.max_age = Some(if max_age.is_negative() { Duration::ZERO } else { max_age });

		self
	}

	/// Adds a token endpoint query parameter.
	pub fn with_token_query_parameter(
		mut self,
		name: impl Into<String>,
		value: impl Into<String>,
	) -> Self {
		self.token_query_parameters.insert(name.into(), value.into());

		self
	}

	/// Sets the token type.
	pub fn with_authentication_scheme(mut self, scheme: AuthenticationScheme) -> Self {
		self.authentication_scheme = scheme;

		self
	}

	/// Validates the request against `config` without touching the store.
	pub(crate) fn prepare(&self, config: &ClientConfig) -> Result<PreparedRequest> {
		let account = self.account.clone().ok_or(Error::NoAccountInSilentRequest)?;
		let scopes = ScopeSet::new(self.scopes.iter().map(String::as_str))
			.map_err(ConfigError::from)?;

		if scopes.is_empty() {
			return Err(Error::EmptyInputScopes);
		}

		let claims = match self.claims.as_deref() {
			Some(raw) => ClaimsRequest::parse(raw).map_err(ConfigError::from)?,
			None => None,
		};

		Ok(PreparedRequest {
			search_scopes: scopes.search_scopes(),
			scopes,
			account,
			authority: self.authority.clone().unwrap_or_else(|| config.authority.clone()),
			correlation_id: self.correlation_id.clone(),
			force_refresh: self.force_refresh,
			claims,
			max_age: self.max_age,
			token_query_parameters: self
				.token_query_parameters
				.iter()
				.filter(|(_, value)| !value.is_empty())
				.map(|(name, value)| (name.clone(), value.clone()))
				.collect(),
			authentication_scheme: self.authentication_scheme,
		})
	}
}

/// Validated request state carried from the cache lookup into a refresh.
#[derive(Clone, Debug)]
pub(crate) struct PreparedRequest {
	pub(crate) account: Account,
	pub(crate) scopes: ScopeSet,
	pub(crate) search_scopes: ScopeSet,
	pub(crate) authority: Url,
	pub(crate) correlation_id: CorrelationId,
	pub(crate) force_refresh: bool,
	pub(crate) claims: Option<ClaimsRequest>,
	pub(crate) max_age: Option<Duration>,
	pub(crate) token_query_parameters: BTreeMap<String, String>,
	pub(crate) authentication_scheme: AuthenticationScheme,
}

/// Routing hint telling the token endpoint which account a refresh belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CcsHint {
	/// Object and tenant identifiers from a `<uid>.<utid>` home account id.
	Oid {
		/// Object identifier.
		uid: String,
		/// Tenant identifier.
		utid: String,
	},
	/// Sign-in name.
	Upn(String),
}
impl CcsHint {
	/// Derives the hint from the account, preferring the home account id.
	pub fn for_account(home_account_id: &HomeAccountId, username: &str) -> Option<Self> {
		if let Some((uid, utid)) = home_account_id.client_info_parts() {
			return Some(Self::Oid { uid: uid.to_owned(), utid: utid.to_owned() });
		}
		if !username.is_empty() {
			return Some(Self::Upn(username.to_owned()));
		}

		None
	}
}
impl Display for CcsHint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			CcsHint::Oid { uid, utid } => write!(f, "Oid:{uid}@{utid}"),
			CcsHint::Upn(username) => write!(f, "UPN:{username}"),
		}
	}
}

/// Token material returned by a silent flow.
#[derive(Clone, Debug, PartialEq)]
pub struct SilentFlowResult {
	/// Access token value.
	pub access_token: TokenSecret,
	/// Raw ID token, if one is cached for the realm.
	pub id_token: Option<TokenSecret>,
	/// Decoded ID token claims, when decodable.
	pub id_token_claims: Option<IdTokenClaims>,
	/// Account the token belongs to.
	pub account: Account,
	/// Granted scopes in the order the token's target lists them.
	pub scopes: Vec<String>,
	/// Hard expiry.
	pub expires_on: OffsetDateTime,
	/// Soft refresh threshold.
	pub refresh_on: Option<OffsetDateTime>,
	/// Token type.
	pub token_type: AuthenticationScheme,
	/// Tenant of the token (`tid` claim, else the account realm).
	pub tenant_id: String,
	/// Stable user identifier (`oid`, else `sub`, else the local account id).
	pub unique_id: String,
	/// True when served without a network call.
	pub from_cache: bool,
	/// Correlation identifier of the request.
	pub correlation_id: CorrelationId,
	/// Cache decision that produced the result.
	pub cache_outcome: CacheOutcome,
}
impl SilentFlowResult {
	pub(crate) fn build(
		account: Account,
		access_token: &AccessToken,
		id_token: Option<&IdToken>,
		id_token_claims: Option<IdTokenClaims>,
		from_cache: bool,
		correlation_id: CorrelationId,
		cache_outcome: CacheOutcome,
	) -> Self {
		let tenant_id = id_token_claims
			.as_ref()
			.and_then(|claims| claims.tid.clone())
			.unwrap_or_else(|| account.realm.to_string());
		let unique_id = id_token_claims
			.as_ref()
			.and_then(|claims| claims.unique_id().map(str::to_owned))
			.unwrap_or_else(|| account.local_account_id.clone());

		Self {
			access_token: access_token.secret.clone(),
			id_token: id_token.map(|token| token.secret.clone()),
			id_token_claims,
			scopes: access_token.scopes().as_slice().to_vec(),
			expires_on: access_token.expires_on,
			refresh_on: access_token.refresh_on,
			token_type: access_token.token_type,
			tenant_id,
			unique_id,
			account,
			from_cache,
			correlation_id,
			cache_outcome,
		}
	}
}

/// Tagged result of [`acquire_cached_token`](crate::flows::SilentFlowClient::acquire_cached_token).
#[derive(Debug)]
pub enum SilentFlowOutcome {
	/// A cached token satisfies the request.
	CacheHit {
		/// Token material.
		result: Box<SilentFlowResult>,
		/// Handle to the background refresh scheduled past the soft refresh threshold.
		background: Option<BackgroundRefresh>,
	},
	/// The caller must perform a network refresh.
	RefreshRequired {
		/// Reason the cache was bypassed.
		outcome: CacheOutcome,
	},
}
impl SilentFlowOutcome {
	/// Cache decision carried by either variant.
	pub fn cache_outcome(&self) -> CacheOutcome {
		match self {
			SilentFlowOutcome::CacheHit { result, .. } => result.cache_outcome,
			SilentFlowOutcome::RefreshRequired { outcome } => *outcome,
		}
	}

	/// Converts the outcome into its error form, detaching any background refresh.
	pub fn into_result(self) -> Result<SilentFlowResult> {
		match self {
			SilentFlowOutcome::CacheHit { result, .. } => Ok(*result),
			SilentFlowOutcome::RefreshRequired { outcome } =>
				Err(Error::TokenRefreshRequired { outcome }),
		}
	}
}

/// Enforces `max_age` against the ID token's `auth_time`.
pub(crate) fn check_max_age(
	max_age: Option<Duration>,
	claims: Option<&IdTokenClaims>,
	now: OffsetDateTime,
) -> Result<()> {
	let Some(max_age) = max_age else {
		return Ok(());
	};
	let auth_time = claims.and_then(IdTokenClaims::auth_time).ok_or(Error::AuthTimeNotFound)?;
	let elapsed = now - auth_time;

	if max_age.is_zero() || elapsed >= max_age {
		return Err(Error::MaxAgeTranspired { max_age, elapsed });
	}

	Ok(())
}

/// Decodes ID token claims; failures only matter when `max_age` needs them.
pub(crate) fn decode_claims(
	id_token: Option<&IdToken>,
	max_age: Option<Duration>,
) -> Result<Option<IdTokenClaims>> {
	let Some(token) = id_token else {
		return Ok(None);
	};

	match token.claims() {
		Ok(claims) => Ok(Some(claims)),
		Err(e) if max_age.is_some() => Err(Error::InvalidIdToken { reason: e.to_string() }),
		Err(_) => Ok(None),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::*;

	fn claims_with_auth_time(auth_time: i64) -> IdTokenClaims {
		IdTokenClaims { auth_time: Some(auth_time), ..Default::default() }
	}

	#[test]
	fn prepare_checks_account_before_scopes() {
		let config = test_config();

		assert!(matches!(
			SilentFlowRequest::new(Vec::<String>::new()).prepare(&config),
			Err(Error::NoAccountInSilentRequest)
		));
		assert!(matches!(
			SilentFlowRequest::new(["  "]).with_account(test_account()).prepare(&config),
			Err(Error::EmptyInputScopes)
		));
	}

	#[test]
	fn prepare_normalizes_inputs() {
		let prepared = SilentFlowRequest::new(["openid", "Graph.Read", "offline_access"])
			.with_account(test_account())
			.with_claims("{}")
			.with_token_query_parameter("slice", "testslice")
			.with_token_query_parameter("dc", "")
			.prepare(&test_config())
			.expect("Request should prepare.");

		assert_eq!(prepared.search_scopes.to_target(), "Graph.Read");
		assert!(prepared.claims.is_none());
		assert_eq!(prepared.authority.as_str(), "https://login.example.com/tenant-1");
		assert_eq!(prepared.token_query_parameters.len(), 1);
		assert!(matches!(
			SilentFlowRequest::new(["a"])
				.with_account(test_account())
				.with_claims("[]")
				.prepare(&test_config()),
			Err(Error::Config(ConfigError::InvalidClaims(_)))
		));
	}

	#[test]
	fn ccs_hint_prefers_client_info() {
		let home = HomeAccountId::new("uid.utid").expect("Home account fixture should be valid.");

		assert_eq!(
			CcsHint::for_account(&home, "user@example.com").map(|h| h.to_string()),
			Some("Oid:uid@utid".into())
		);

		let adfs = HomeAccountId::new("adfs-user").expect("Home account fixture should be valid.");

		assert_eq!(
			CcsHint::for_account(&adfs, "user@example.com").map(|h| h.to_string()),
			Some("UPN:user@example.com".into())
		);
		assert_eq!(CcsHint::for_account(&adfs, ""), None);
	}

	#[test]
	fn max_age_rules() {
		let now = OffsetDateTime::from_unix_timestamp(1_700_000_000)
			.expect("Timestamp fixture should be valid.");
		let fresh = claims_with_auth_time(1_700_000_000 - 10);

		assert!(check_max_age(None, None, now).is_ok());
		assert!(check_max_age(Some(Duration::minutes(1)), Some(&fresh), now).is_ok());
		assert!(matches!(
			check_max_age(Some(Duration::ZERO), Some(&fresh), now),
			Err(Error::MaxAgeTranspired { .. })
		));
		assert!(matches!(
			check_max_age(Some(Duration::seconds(10)), Some(&fresh), now),
			Err(Error::MaxAgeTranspired { .. })
		));
		assert!(matches!(
			check_max_age(Some(Duration::minutes(1)), Some(&IdTokenClaims::default()), now),
			Err(Error::AuthTimeNotFound)
		));
		assert!(matches!(
			check_max_age(Some(Duration::minutes(1)), None, now),
			Err(Error::AuthTimeNotFound)
		));
	}

	#[test]
	fn undecodable_id_tokens_only_fail_with_max_age() {
		let token = IdToken::new(&test_account(), test_client_id(), "not-a-jwt");

		assert_eq!(decode_claims(Some(&token), None).expect("Decode errors are tolerated."), None);
		assert!(matches!(
			decode_claims(Some(&token), Some(Duration::hours(1))),
			Err(Error::InvalidIdToken { .. })
		));
	}
}
