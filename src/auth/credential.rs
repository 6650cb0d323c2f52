//! Credential entities (ID, access, and refresh tokens), their secrets, and lifecycle helpers.

// self
use crate::{
	_prelude::*,
	auth::{
		Account, ClaimsError, ClientId, Environment, HomeAccountId, IdTokenClaims, Realm, ScopeSet,
	},
	cache::key,
};

/// Redacted secret wrapper keeping token material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Discriminator stored with every credential and embedded in its key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialType {
	/// OIDC identity assertion.
	IdToken,
	/// OAuth access token.
	AccessToken,
	/// OAuth refresh token.
	RefreshToken,
}
impl CredentialType {
	/// Lower-case label used inside cache keys.
	pub const fn as_str(self) -> &'static str {
		match self {
			CredentialType::IdToken => "idtoken",
			CredentialType::AccessToken => "accesstoken",
			CredentialType::RefreshToken => "refreshtoken",
		}
	}
}

/// Token type an access token was issued for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationScheme {
	/// `Authorization: Bearer`.
	#[default]
	Bearer,
	/// Proof-of-possession.
	Pop,
}
impl AuthenticationScheme {
	/// Lower-case label used inside cache keys and on the wire.
	pub const fn as_str(self) -> &'static str {
		match self {
			AuthenticationScheme::Bearer => "bearer",
			AuthenticationScheme::Pop => "pop",
		}
	}
}
impl Display for AuthenticationScheme {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Realm-scoped identity assertion. No expiry is tracked for it in the cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdToken {
	/// Owning account.
	pub home_account_id: HomeAccountId,
	/// Issuer host.
	pub environment: Environment,
	/// Application the token was issued to.
	pub client_id: ClientId,
	/// Tenant the token was issued in.
	pub realm: Realm,
	/// Signed compact JWT.
	pub secret: TokenSecret,
}
impl IdToken {
	/// Creates an ID token for `account`.
	pub fn new(account: &Account, client_id: ClientId, secret: impl Into<String>) -> Self {
		Self {
			home_account_id: account.home_account_id.clone(),
			environment: account.environment.clone(),
			client_id,
			realm: account.realm.clone(),
			secret: TokenSecret::new(secret),
		}
	}

	/// Cache key for this entity.
	pub fn cache_key(&self) -> String {
		key::credential_key(&key::CredentialKeyParts {
			home_account_id: &self.home_account_id,
			environment: &self.environment,
			credential_type: CredentialType::IdToken,
			client_id: &self.client_id,
			realm: &self.realm,
			target: None,
			requested_claims_hash: None,
			scheme: None,
		})
	}

	/// Decodes the token's claims.
	pub fn claims(&self) -> Result<IdTokenClaims, ClaimsError> {
		IdTokenClaims::decode(self.secret.expose())
	}
}

/// Errors produced by [`AccessTokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum AccessTokenBuilderError {
	/// Issued when no token value was provided.
	#[error("Access token secret is required.")]
	MissingSecret,
	/// Issued when no write time was provided.
	#[error("Access token write time (cached_at) is required.")]
	MissingCachedAt,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_on or expires_in.")]
	MissingExpiry,
	/// Issued when the soft refresh threshold is not strictly before expiry.
	#[error("refresh_on must be earlier than expires_on.")]
	RefreshOnNotBeforeExpiry,
	/// Issued when a relative duration pushes an instant outside the supported range.
	#[error("Relative {field} is out of range for cached_at.")]
	OutOfRange {
		/// Builder field that overflowed.
		field: &'static str,
	},
}

/// Cached access token.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessToken {
	/// Owning account.
	pub home_account_id: HomeAccountId,
	/// Issuer host.
	pub environment: Environment,
	/// Application the token was issued to.
	pub client_id: ClientId,
	/// Tenant the token was issued in.
	pub realm: Realm,
	/// Granted scopes, space-delimited, in the order the server returned them.
	pub target: String,
	/// Token value; callers must avoid logging it.
	pub secret: TokenSecret,
	/// Write time.
	#[serde(with = "time::serde::timestamp")]
	pub cached_at: OffsetDateTime,
	/// Hard expiry.
	#[serde(with = "time::serde::timestamp")]
	pub expires_on: OffsetDateTime,
	/// Soft refresh threshold, strictly before `expires_on`.
	#[serde(default, with = "time::serde::timestamp::option")]
	pub refresh_on: Option<OffsetDateTime>,
	/// Scheme the token is bound to.
	#[serde(default)]
	pub token_type: AuthenticationScheme,
	/// Hash of the claims request that produced the token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub requested_claims_hash: Option<String>,
}
impl AccessToken {
	/// Returns a builder for a token owned by `account`.
	pub fn builder(account: &Account, client_id: ClientId) -> AccessTokenBuilder {
		AccessTokenBuilder::new(account, client_id)
	}

	/// Cache key for this entity.
	pub fn cache_key(&self) -> String {
		key::credential_key(&key::CredentialKeyParts {
			home_account_id: &self.home_account_id,
			environment: &self.environment,
			credential_type: CredentialType::AccessToken,
			client_id: &self.client_id,
			realm: &self.realm,
			target: Some(&self.scopes()),
			requested_claims_hash: self.requested_claims_hash.as_deref(),
			scheme: Some(self.token_type),
		})
	}

	/// Granted scopes.
	pub fn scopes(&self) -> ScopeSet {
		ScopeSet::from_target(&self.target)
	}

	/// Returns true when the write time lies in the future, i.e. the clock was turned back.
	pub fn was_clock_turned_back(&self, now: OffsetDateTime) -> bool {
		self.cached_at > now
	}

	/// Returns true when `now` is past expiry or within `offset` of it.
	///
	/// An expiry too close to the representable minimum to subtract `offset` counts as expired.
	pub fn is_expired(&self, now: OffsetDateTime, offset: Duration) -> bool {
		self.expires_on.checked_sub(offset).is_none_or(|threshold| now >= threshold)
	}

	/// Returns true when the soft refresh threshold has been reached.
	pub fn needs_proactive_refresh(&self, now: OffsetDateTime) -> bool {
		self.refresh_on.is_some_and(|refresh_on| now >= refresh_on)
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("home_account_id", &self.home_account_id)
			.field("environment", &self.environment)
			.field("client_id", &self.client_id)
			.field("realm", &self.realm)
			.field("target", &self.target)
			.field("secret", &"<redacted>")
			.field("cached_at", &self.cached_at)
			.field("expires_on", &self.expires_on)
			.field("refresh_on", &self.refresh_on)
			.field("token_type", &self.token_type)
			.field("requested_claims_hash", &self.requested_claims_hash)
			.finish()
	}
}
impl PartialEq for AccessToken {
	fn eq(&self, other: &Self) -> bool {
		self.cache_key() == other.cache_key()
			&& self.secret == other.secret
			&& self.cached_at == other.cached_at
			&& self.expires_on == other.expires_on
			&& self.refresh_on == other.refresh_on
	}
}

/// Builder for [`AccessToken`].
#[derive(Clone, Debug)]
pub struct AccessTokenBuilder {
	home_account_id: HomeAccountId,
	environment: Environment,
	client_id: ClientId,
	realm: Realm,
	target: String,
	secret: Option<TokenSecret>,
	cached_at: Option<OffsetDateTime>,
	expires_on: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	refresh_on: Option<OffsetDateTime>,
	refresh_in: Option<Duration>,
	token_type: AuthenticationScheme,
	requested_claims_hash: Option<String>,
}
impl AccessTokenBuilder {
	fn new(account: &Account, client_id: ClientId) -> Self {
		Self {
			home_account_id: account.home_account_id.clone(),
			environment: account.environment.clone(),
			client_id,
			realm: account.realm.clone(),
			target: String::new(),
			secret: None,
			cached_at: None,
			expires_on: None,
			expires_in: None,
			refresh_on: None,
			refresh_in: None,
			token_type: AuthenticationScheme::default(),
			requested_claims_hash: None,
		}
	}

	/// Sets the granted scopes.
	pub fn target(mut self, target: impl Into<String>) -> Self {
		self.target = target.into();

		self
	}

	/// Provides the token value.
	pub fn secret(mut self, secret: impl Into<String>) -> Self {
		self.secret = Some(TokenSecret::new(secret));

		self
	}

	/// Sets the write time; required, and should come from the client's clock.
	pub fn cached_at(mut self, instant: OffsetDateTime) -> Self {
		self.cached_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_on(mut self, instant: OffsetDateTime) -> Self {
		self.expires_on = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the write time.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Sets an absolute soft refresh threshold.
	pub fn refresh_on(mut self, instant: OffsetDateTime) -> Self {
		self.refresh_on = Some(instant);

		self
	}

	/// Sets a relative soft refresh threshold from the write time.
	pub fn refresh_in(mut self, duration: Duration) -> Self {
		self.refresh_in = Some(duration);

		self
	}

	/// Sets the token type.
	pub fn token_type(mut self, scheme: AuthenticationScheme) -> Self {
		self.token_type = scheme;

		self
	}

	/// Binds the token to a claims request hash.
	pub fn requested_claims_hash(mut self, hash: impl Into<String>) -> Self {
		self.requested_claims_hash = Some(hash.into());

		self
	}

	/// Consumes the builder and produces an [`AccessToken`].
	pub fn build(self) -> Result<AccessToken, AccessTokenBuilderError> {
		let secret = self.secret.ok_or(AccessTokenBuilderError::MissingSecret)?;
		let cached_at = self.cached_at.ok_or(AccessTokenBuilderError::MissingCachedAt)?;
		let expires_on = match (self.expires_on, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => cached_at
				.checked_add(delta)
				.ok_or(AccessTokenBuilderError::OutOfRange { field: "expires_in" })?,
			(None, None) => return Err(AccessTokenBuilderError::MissingExpiry),
		};
		let refresh_on = match (self.refresh_on, self.refresh_in) {
			(Some(instant), _) => Some(instant),
			(None, Some(delta)) => Some(
				cached_at
					.checked_add(delta)
					.ok_or(AccessTokenBuilderError::OutOfRange { field: "refresh_in" })?,
			),
			(None, None) => None,
		};

		if refresh_on.is_some_and(|refresh_on| refresh_on >= expires_on) {
			return Err(AccessTokenBuilderError::RefreshOnNotBeforeExpiry);
		}

		Ok(AccessToken {
			home_account_id: self.home_account_id,
			environment: self.environment,
			client_id: self.client_id,
			realm: self.realm,
			target: self.target,
			secret,
			cached_at,
			expires_on,
			refresh_on,
			token_type: self.token_type,
			requested_claims_hash: self.requested_claims_hash,
		})
	}
}

/// Long-lived refresh token, only ever handed to the refresh collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
	/// Owning account.
	pub home_account_id: HomeAccountId,
	/// Issuer host.
	pub environment: Environment,
	/// Application the token was issued to.
	pub client_id: ClientId,
	/// Tenant the token was issued in.
	pub realm: Realm,
	/// Token value; callers must avoid logging it.
	pub secret: TokenSecret,
}
impl RefreshToken {
	/// Creates a refresh token for `account`.
	pub fn new(account: &Account, client_id: ClientId, secret: impl Into<String>) -> Self {
		Self {
			home_account_id: account.home_account_id.clone(),
			environment: account.environment.clone(),
			client_id,
			realm: account.realm.clone(),
			secret: TokenSecret::new(secret),
		}
	}

	/// Cache key for this entity.
	pub fn cache_key(&self) -> String {
		key::credential_key(&key::CredentialKeyParts {
			home_account_id: &self.home_account_id,
			environment: &self.environment,
			credential_type: CredentialType::RefreshToken,
			client_id: &self.client_id,
			realm: &self.realm,
			target: None,
			requested_claims_hash: None,
			scheme: None,
		})
	}
}

/// Any credential the cache stores.
#[derive(Clone, Debug, PartialEq)]
pub enum Credential {
	/// ID token variant.
	IdToken(IdToken),
	/// Access token variant.
	AccessToken(AccessToken),
	/// Refresh token variant.
	RefreshToken(RefreshToken),
}
impl From<IdToken> for Credential {
	fn from(value: IdToken) -> Self {
		Self::IdToken(value)
	}
}
impl From<AccessToken> for Credential {
	fn from(value: AccessToken) -> Self {
		Self::AccessToken(value)
	}
}
impl From<RefreshToken> for Credential {
	fn from(value: RefreshToken) -> Self {
		Self::RefreshToken(value)
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn account() -> Account {
		Account::builder(
			HomeAccountId::new("uid.utid").expect("Home account fixture should be valid."),
			Environment::new("login.example.com").expect("Environment fixture should be valid."),
			Realm::new("utid").expect("Realm fixture should be valid."),
		)
		.build()
	}

	fn client() -> ClientId {
		ClientId::new("client").expect("Client fixture should be valid.")
	}

	#[test]
	fn builder_handles_relative_expiry_and_refresh() {
		let cached = macros::datetime!(2025-01-01 00:00 UTC);
		let token = AccessToken::builder(&account(), client())
			.target("openid user.read")
			.secret("secret")
			.cached_at(cached)
			.expires_in(Duration::hours(1))
			.refresh_in(Duration::minutes(30))
			.build()
			.expect("Access token builder should succeed.");

		assert_eq!(token.expires_on, macros::datetime!(2025-01-01 01:00 UTC));
		assert_eq!(token.refresh_on, Some(macros::datetime!(2025-01-01 00:30 UTC)));
	}

	#[test]
	fn builder_rejects_refresh_after_expiry() {
		let cached = macros::datetime!(2025-01-01 00:00 UTC);
		let err = AccessToken::builder(&account(), client())
			.secret("secret")
			.cached_at(cached)
			.expires_in(Duration::minutes(10))
			.refresh_in(Duration::minutes(10))
			.build()
			.expect_err("refresh_on equal to expires_on must be rejected.");

		assert_eq!(err, AccessTokenBuilderError::RefreshOnNotBeforeExpiry);
		assert_eq!(
			AccessToken::builder(&account(), client()).secret("s").build().map(|_| ()),
			Err(AccessTokenBuilderError::MissingCachedAt)
		);
		assert_eq!(
			AccessToken::builder(&account(), client())
				.secret("s")
				.cached_at(cached)
				.build()
				.map(|_| ()),
			Err(AccessTokenBuilderError::MissingExpiry)
		);
	}

	#[test]
	fn builder_rejects_out_of_range_durations() {
		let err = AccessToken::builder(&account(), client())
			.secret("secret")
			.cached_at(macros::datetime!(9999-12-31 23:00 UTC))
			.expires_in(Duration::hours(2))
			.build()
			.expect_err("Expiry past the supported range must be rejected.");

		assert_eq!(err, AccessTokenBuilderError::OutOfRange { field: "expires_in" });
	}

	#[test]
	fn extreme_expiry_counts_as_expired() {
		let floor = OffsetDateTime::from_unix_timestamp(-377_705_116_800)
			.expect("Minimum timestamp fixture should be valid.");
		let token = AccessToken::builder(&account(), client())
			.secret("secret")
			.cached_at(floor)
			.expires_on(floor)
			.build()
			.expect("Access token builder should succeed.");

		assert!(token.is_expired(macros::datetime!(2025-01-01 00:00 UTC), Duration::minutes(5)));
		assert!(token.is_expired(floor, Duration::ZERO));
	}

	#[test]
	fn lifecycle_checks_honor_offset_and_clock() {
		let cached = macros::datetime!(2025-01-01 00:00 UTC);
		let token = AccessToken::builder(&account(), client())
			.secret("secret")
			.cached_at(cached)
			.expires_in(Duration::hours(1))
			.refresh_in(Duration::minutes(45))
			.build()
			.expect("Access token builder should succeed.");
		let offset = Duration::minutes(5);

		assert!(token.was_clock_turned_back(macros::datetime!(2024-12-31 23:59 UTC)));
		assert!(!token.is_expired(macros::datetime!(2025-01-01 00:54 UTC), offset));
		assert!(token.is_expired(macros::datetime!(2025-01-01 00:55 UTC), offset));
		assert!(!token.needs_proactive_refresh(macros::datetime!(2025-01-01 00:44 UTC)));
		assert!(token.needs_proactive_refresh(macros::datetime!(2025-01-01 00:45 UTC)));
	}

	#[test]
	fn secrets_are_redacted() {
		let secret = TokenSecret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "TokenSecret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
	}
}
