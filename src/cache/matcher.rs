//! Resolves the account and credentials that fit a silent request.
//!
//! The matcher never looks at the clock: expiry, clock skew, and `max_age` are the orchestrator's
//! business. It only answers "which entities fit this identity, scope set, claims binding, and
//! scheme".

// self
use crate::{
	_prelude::*,
	auth::{
		AccessToken, Account, AuthenticationScheme, ClaimsRequest, ClientId, Environment,
		HomeAccountId, IdToken, Realm, RefreshToken, ScopeSet,
	},
	cache::CredentialStore,
};

/// Lookup parameters for [`CacheMatcher::resolve`].
#[derive(Clone, Copy, Debug)]
pub struct MatchQuery<'a> {
	/// Owning account.
	pub home_account_id: &'a HomeAccountId,
	/// Issuer host.
	pub environment: &'a Environment,
	/// Application identifier.
	pub client_id: &'a ClientId,
	/// Tenant identifier.
	pub realm: &'a Realm,
	/// Search scopes the access token must cover.
	pub scopes: &'a ScopeSet,
	/// Normalized claims request, if any.
	pub claims: Option<&'a ClaimsRequest>,
	/// Whether cached tokens may be bound to claims requests.
	pub claims_based_caching_enabled: bool,
	/// Required token type.
	pub scheme: AuthenticationScheme,
}

/// Entities resolved for a query whose account exists.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedEntities {
	/// Stored account.
	pub account: Account,
	/// ID token for the realm, if cached.
	pub id_token: Option<IdToken>,
	/// Best-fit access token, if any satisfies the query.
	pub access_token: Option<AccessToken>,
	/// Refresh token, resolved regardless of the access token outcome.
	pub refresh_token: Option<RefreshToken>,
}

/// Outcome of a cache lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheLookup {
	/// No account is stored for `(home_account_id, environment)`.
	NoAccountInCache,
	/// The account exists; credentials may still be missing.
	Resolved(ResolvedEntities),
}
impl CacheLookup {
	/// Resolved access token, if any.
	pub fn access_token(&self) -> Option<&AccessToken> {
		match self {
			CacheLookup::Resolved(entities) => entities.access_token.as_ref(),
			CacheLookup::NoAccountInCache => None,
		}
	}
}

/// Matching layer over a [`CredentialStore`].
#[derive(Clone, Copy, Debug)]
pub struct CacheMatcher<'a> {
	store: &'a CredentialStore,
}
impl<'a> CacheMatcher<'a> {
	/// Creates a matcher reading from `store`.
	pub fn new(store: &'a CredentialStore) -> Self {
		Self { store }
	}

	/// Resolves every entity relevant to `query` from one consistent view of the store.
	pub fn resolve(&self, query: &MatchQuery) -> Result<CacheLookup> {
		self.store.read_group(|store| {
			let Some(account) = store.account(query.home_account_id, query.environment)? else {
				return Ok(CacheLookup::NoAccountInCache);
			};
			let id_token = store.id_token(
				query.home_account_id,
				query.environment,
				query.client_id,
				query.realm,
			)?;
			let access_token = Self::match_access_token(store, query)?;
			let refresh_token = store.refresh_token(
				query.home_account_id,
				query.environment,
				query.client_id,
				query.realm,
			)?;

			Ok(CacheLookup::Resolved(ResolvedEntities {
				account,
				id_token,
				access_token,
				refresh_token,
			}))
		})
	}

	fn match_access_token(
		store: &CredentialStore,
		query: &MatchQuery,
	) -> Result<Option<AccessToken>> {
		let required_hash = match query.claims {
			Some(_) if !query.claims_based_caching_enabled => return Ok(None),
			Some(claims) => Some(claims.hash()),
			None => None,
		};
		let candidates = store.access_tokens(
			query.home_account_id,
			query.environment,
			query.client_id,
			query.realm,
			query.scheme,
		)?;

		Ok(candidates
			.into_iter()
			.filter(|token| token.scopes().is_superset_of(query.scopes))
			.filter(|token| match &required_hash {
				Some(hash) => token.requested_claims_hash.as_deref() == Some(hash.as_str()),
				None => true,
			})
			.min_by_key(|token| token.scopes().len()))
	}
}
