//! Account entities identifying an authenticated end-user inside one environment.

// self
use crate::{
	_prelude::*,
	auth::{Environment, HomeAccountId, Realm},
	cache::key,
};

/// Kind of authority that issued the account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorityType {
	/// Microsoft-style security token service (`<uid>.<utid>` home account ids).
	#[default]
	Mssts,
	/// Active Directory Federation Services.
	Adfs,
	/// Any other OIDC-compliant issuer.
	Generic,
}

/// Cached account entity.
///
/// Keyed by `(home_account_id, environment)`; everything except the display fields is fixed once
/// written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
	/// Composite user + directory identifier.
	pub home_account_id: HomeAccountId,
	/// Issuer host.
	pub environment: Environment,
	/// Tenant the account signed in to.
	pub realm: Realm,
	/// Object identifier inside `realm`.
	pub local_account_id: String,
	/// Sign-in name.
	pub username: String,
	/// Issuer flavour.
	pub authority_type: AuthorityType,
	/// Display name, if known.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}
impl Account {
	/// Returns a builder seeded with the identity fields.
	pub fn builder(
		home_account_id: HomeAccountId,
		environment: Environment,
		realm: Realm,
	) -> AccountBuilder {
		AccountBuilder {
			account: Account {
				home_account_id,
				environment,
				realm,
				local_account_id: String::new(),
				username: String::new(),
				authority_type: AuthorityType::default(),
				name: None,
			},
		}
	}

	/// Cache key for this entity.
	pub fn cache_key(&self) -> String {
		key::account_key(&self.home_account_id, &self.environment)
	}

	/// Returns true when both values describe the same stored account.
	pub fn is_same_account(&self, other: &Account) -> bool {
		self.cache_key() == other.cache_key()
	}
}

/// Builder for [`Account`].
#[derive(Clone, Debug)]
pub struct AccountBuilder {
	account: Account,
}
impl AccountBuilder {
	/// Sets the object identifier inside the realm.
	pub fn local_account_id(mut self, value: impl Into<String>) -> Self {
		self.account.local_account_id = value.into();

		self
	}

	/// Sets the sign-in name.
	pub fn username(mut self, value: impl Into<String>) -> Self {
		self.account.username = value.into();

		self
	}

	/// Sets the issuer flavour.
	pub fn authority_type(mut self, value: AuthorityType) -> Self {
		self.account.authority_type = value;

		self
	}

	/// Sets the display name.
	pub fn name(mut self, value: impl Into<String>) -> Self {
		self.account.name = Some(value.into());

		self
	}

	/// Finishes the account.
	pub fn build(self) -> Account {
		self.account
	}
}
