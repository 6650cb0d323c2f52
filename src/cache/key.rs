//! Deterministic cache key construction.
//!
//! Keys are `-` joined, lower-cased identity segments. Credential keys always carry eight
//! segments (`home-environment-type-client-realm-target-claimshash-scheme`), with empty segments
//! for fields a credential type does not have. The claims hash keeps its case because it is a
//! base64 digest.
//!
//! `%` and `-` inside a segment are percent-escaped, so distinct identity tuples never share a
//! key.

// self
use crate::auth::{
	AuthenticationScheme, ClientId, CredentialType, Environment, HomeAccountId, Realm, ScopeSet,
};

const SEPARATOR: &str = "-";

/// Identity fields that make up a credential key.
#[derive(Clone, Copy, Debug)]
pub struct CredentialKeyParts<'a> {
	/// Owning account.
	pub home_account_id: &'a HomeAccountId,
	/// Issuer host.
	pub environment: &'a Environment,
	/// Credential kind.
	pub credential_type: CredentialType,
	/// Application identifier.
	pub client_id: &'a ClientId,
	/// Tenant identifier.
	pub realm: &'a Realm,
	/// Granted scopes (access tokens only).
	pub target: Option<&'a ScopeSet>,
	/// Claims binding (access tokens only).
	pub requested_claims_hash: Option<&'a str>,
	/// Token type (access tokens only).
	pub scheme: Option<AuthenticationScheme>,
}

/// Key of an account entity.
pub fn account_key(home_account_id: &HomeAccountId, environment: &Environment) -> String {
	[escape(&home_account_id.key_segment()), escape(&environment.key_segment())].join(SEPARATOR)
}

/// Key of a credential entity.
pub fn credential_key(parts: &CredentialKeyParts) -> String {
	let mut key = credential_prefix(
		parts.home_account_id,
		parts.environment,
		parts.credential_type,
		parts.client_id,
		parts.realm,
	);

	key.push_str(&escape(&parts.target.map(ScopeSet::normalized).unwrap_or_default()));
	key.push_str(SEPARATOR);
	key.push_str(&escape(parts.requested_claims_hash.unwrap_or_default()));
	key.push_str(SEPARATOR);
	key.push_str(parts.scheme.map(AuthenticationScheme::as_str).unwrap_or_default());

	key
}

/// Shared prefix of every credential key for the given identity, including the trailing
/// separator. Used to pre-filter key listings before entities are decoded.
pub fn credential_prefix(
	home_account_id: &HomeAccountId,
	environment: &Environment,
	credential_type: CredentialType,
	client_id: &ClientId,
	realm: &Realm,
) -> String {
	let mut key = [
		escape(&home_account_id.key_segment()),
		escape(&environment.key_segment()),
		credential_type.as_str().to_owned(),
		escape(&client_id.key_segment()),
		escape(&realm.key_segment()),
	]
	.join(SEPARATOR);

	key.push_str(SEPARATOR);

	key
}

fn escape(segment: &str) -> String {
	segment.replace('%', "%25").replace('-', "%2D")
}
