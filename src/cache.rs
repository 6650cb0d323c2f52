//! Credential store: typed entity access over a [`StorageBackend`], atomic group writes, and the
//! matching layer used by silent flows.

pub mod key;
pub mod matcher;

pub use matcher::*;

// self
use crate::{
	_prelude::*,
	auth::{
		AccessToken, Account, AuthenticationScheme, ClientId, Credential, CredentialType,
		Environment, HomeAccountId, IdToken, Realm, RefreshToken,
	},
	obs,
	store::{StorageBackend, StoreError},
};

/// Any entity the credential store persists, tagged with `entity_type` on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity_type")]
pub enum CacheEntity {
	/// Account entity.
	Account(Account),
	/// ID token entity.
	IdToken(IdToken),
	/// Access token entity.
	AccessToken(AccessToken),
	/// Refresh token entity.
	RefreshToken(RefreshToken),
}
impl CacheEntity {
	/// Cache key of the wrapped entity.
	pub fn cache_key(&self) -> String {
		match self {
			CacheEntity::Account(account) => account.cache_key(),
			CacheEntity::IdToken(token) => token.cache_key(),
			CacheEntity::AccessToken(token) => token.cache_key(),
			CacheEntity::RefreshToken(token) => token.cache_key(),
		}
	}

	fn encode(&self) -> Result<String, StoreError> {
		serde_json::to_string(self).map_err(|e| StoreError::Serialization {
			message: format!("Failed to encode cache entity: {e}"),
		})
	}

	fn decode(key: &str, raw: &str) -> Result<Self, StoreError> {
		let mut deserializer = serde_json::Deserializer::from_str(raw);

		serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
			StoreError::Serialization {
				message: format!("Failed to decode `{key}` at `{}`: {}", e.path(), e.inner()),
			}
		})
	}
}
impl From<Account> for CacheEntity {
	fn from(value: Account) -> Self {
		Self::Account(value)
	}
}
impl From<Credential> for CacheEntity {
	fn from(value: Credential) -> Self {
		match value {
			Credential::IdToken(token) => Self::IdToken(token),
			Credential::AccessToken(token) => Self::AccessToken(token),
			Credential::RefreshToken(token) => Self::RefreshToken(token),
		}
	}
}

/// Entities produced by one token exchange, written together.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheRecord {
	/// Account entity.
	pub account: Option<Account>,
	/// ID token entity.
	pub id_token: Option<IdToken>,
	/// Access token entity.
	pub access_token: Option<AccessToken>,
	/// Refresh token entity.
	pub refresh_token: Option<RefreshToken>,
}
impl CacheRecord {
	/// Returns the record's credentials in write order.
	pub fn credentials(&self) -> Vec<Credential> {
		let id_token = self.id_token.clone().map(Credential::from);
		let access_token = self.access_token.clone().map(Credential::from);
		let refresh_token = self.refresh_token.clone().map(Credential::from);

		[id_token, access_token, refresh_token].into_iter().flatten().collect()
	}

	/// Returns the record's entities in write order, account first.
	pub fn entities(&self) -> Vec<CacheEntity> {
		self.account
			.clone()
			.map(CacheEntity::from)
			.into_iter()
			.chain(self.credentials().into_iter().map(CacheEntity::from))
			.collect()
	}
}

/// Typed view over a shared [`StorageBackend`].
///
/// Group writes ([`save_record`](Self::save_record)) and multi-entity lookups
/// ([`read_group`](Self::read_group)) are serialized against each other, so a lookup sees either
/// every entity of a group write or none of them.
pub struct CredentialStore {
	backend: Arc<dyn StorageBackend>,
	group_lock: RwLock<()>,
}
impl CredentialStore {
	/// Wraps a backend.
	pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
		Self { backend, group_lock: RwLock::new(()) }
	}

	/// Reads and decodes the entity stored under `key`.
	pub fn get(&self, key: &str) -> Result<Option<CacheEntity>> {
		match self.backend.get(key)? {
			Some(raw) => Ok(Some(CacheEntity::decode(key, &raw)?)),
			None => Ok(None),
		}
	}

	/// Stores a single entity under its derived key and returns that key.
	pub fn set(&self, entity: &CacheEntity) -> Result<String> {
		let key = entity.cache_key();
		let raw = entity.encode()?;
		let _guard = self.group_lock.write();

		self.backend.set(&key, raw)?;

		Ok(key)
	}

	/// Lists every stored key.
	pub fn list_keys(&self) -> Result<Vec<String>> {
		Ok(self.backend.keys()?)
	}

	/// Atomically writes every entity of `record`.
	pub fn save_record(&self, record: &CacheRecord) -> Result<()> {
		let entries = record
			.entities()
			.iter()
			.map(|entity| Ok((entity.cache_key(), entity.encode()?)))
			.collect::<Result<Vec<_>, StoreError>>()?;

		if entries.is_empty() {
			return Ok(());
		}

		let _guard = self.group_lock.write();

		self.backend.set_batch(entries)?;

		Ok(())
	}

	/// Runs `f` while group writes are held off.
	///
	/// `f` must only use the lock-free accessors below; calling [`set`](Self::set) or
	/// [`save_record`](Self::save_record) from inside would deadlock.
	pub fn read_group<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
		let _guard = self.group_lock.read();

		f(self)
	}

	/// Account stored for `(home_account_id, environment)`.
	pub fn account(
		&self,
		home_account_id: &HomeAccountId,
		environment: &Environment,
	) -> Result<Option<Account>> {
		match self.get(&key::account_key(home_account_id, environment))? {
			Some(CacheEntity::Account(account))
				if same_segment(&account.home_account_id, home_account_id)
					&& same_segment(&account.environment, environment) =>
				Ok(Some(account)),
			_ => Ok(None),
		}
	}

	/// ID token stored for the identity tuple.
	pub fn id_token(
		&self,
		home_account_id: &HomeAccountId,
		environment: &Environment,
		client_id: &ClientId,
		realm: &Realm,
	) -> Result<Option<IdToken>> {
		let key = key::credential_key(&key::CredentialKeyParts {
			home_account_id,
			environment,
			credential_type: CredentialType::IdToken,
			client_id,
			realm,
			target: None,
			requested_claims_hash: None,
			scheme: None,
		});

		match self.get(&key)? {
			Some(CacheEntity::IdToken(token))
				if same_identity(
					(&token.home_account_id, &token.environment, &token.client_id, &token.realm),
					(home_account_id, environment, client_id, realm),
				) =>
				Ok(Some(token)),
			_ => Ok(None),
		}
	}

	/// Refresh token stored for the identity tuple.
	pub fn refresh_token(
		&self,
		home_account_id: &HomeAccountId,
		environment: &Environment,
		client_id: &ClientId,
		realm: &Realm,
	) -> Result<Option<RefreshToken>> {
		let key = key::credential_key(&key::CredentialKeyParts {
			home_account_id,
			environment,
			credential_type: CredentialType::RefreshToken,
			client_id,
			realm,
			target: None,
			requested_claims_hash: None,
			scheme: None,
		});

		match self.get(&key)? {
			Some(CacheEntity::RefreshToken(token))
				if same_identity(
					(&token.home_account_id, &token.environment, &token.client_id, &token.realm),
					(home_account_id, environment, client_id, realm),
				) =>
				Ok(Some(token)),
			_ => Ok(None),
		}
	}

	/// Every access token issued for the identity tuple and scheme, regardless of target.
	///
	/// Entries that fail to decode are skipped and logged rather than failing the lookup.
	pub fn access_tokens(
		&self,
		home_account_id: &HomeAccountId,
		environment: &Environment,
		client_id: &ClientId,
		realm: &Realm,
		scheme: AuthenticationScheme,
	) -> Result<Vec<AccessToken>> {
		let prefix = key::credential_prefix(
			home_account_id,
			environment,
			CredentialType::AccessToken,
			client_id,
			realm,
		);
		let mut tokens = Vec::new();

		for key in self.backend.keys()? {
			if !key.starts_with(&prefix) {
				continue;
			}

			let Some(raw) = self.backend.get(&key)? else {
				continue;
			};
			let token = match CacheEntity::decode(&key, &raw) {
				Ok(CacheEntity::AccessToken(token)) => token,
				Ok(_) => continue,
				Err(e) => {
					obs::skipped_cache_entry(&key, &e);

					continue;
				},
			};

			if same_identity(
				(&token.home_account_id, &token.environment, &token.client_id, &token.realm),
				(home_account_id, environment, client_id, realm),
			) && token.token_type == scheme
			{
				tokens.push(token);
			}
		}

		Ok(tokens)
	}
}
impl Debug for CredentialStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialStore").finish_non_exhaustive()
	}
}

type Identity<'a> = (&'a HomeAccountId, &'a Environment, &'a ClientId, &'a Realm);

fn same_identity(stored: Identity, requested: Identity) -> bool {
	same_segment(stored.0, requested.0)
		&& same_segment(stored.1, requested.1)
		&& same_segment(stored.2, requested.2)
		&& same_segment(stored.3, requested.3)
}

fn same_segment(stored: &str, requested: &str) -> bool {
	stored.to_lowercase() == requested.to_lowercase()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::*, store::MemoryStorage};

	fn store() -> (CredentialStore, Arc<MemoryStorage>) {
		let backend = Arc::new(MemoryStorage::default());

		(CredentialStore::new(backend.clone()), backend)
	}

	#[test]
	fn save_record_writes_every_entity() {
		let (store, backend) = store();
		let now = OffsetDateTime::now_utc();

		seed_cache(
			&store,
			Some(test_access_token("openid user.read", "at", now, now + Duration::hours(1))),
			Some(test_id_token(serde_json::json!({ "sub": "s" }))),
			Some(test_refresh_token("rt")),
		);

		assert_eq!(backend.len(), 4);

		let account = test_account();
		let client = test_client_id();

		assert_eq!(
			store
				.account(&account.home_account_id, &account.environment)
				.expect("Account lookup should succeed."),
			Some(account.clone())
		);
		assert!(
			store
				.refresh_token(
					&account.home_account_id,
					&account.environment,
					&client,
					&account.realm
				)
				.expect("Refresh token lookup should succeed.")
				.is_some()
		);
	}

	#[test]
	fn equal_access_token_keys_overwrite() {
		let (store, backend) = store();
		let now = OffsetDateTime::now_utc();
		let first = test_access_token("openid user.read", "first", now, now + Duration::hours(1));
		let second = test_access_token("USER.READ openid", "second", now, now + Duration::hours(2));

		store.set(&CacheEntity::AccessToken(first)).expect("First write should succeed.");
		store.set(&CacheEntity::AccessToken(second)).expect("Second write should succeed.");

		assert_eq!(backend.len(), 1);

		let account = test_account();
		let tokens = store
			.access_tokens(
				&account.home_account_id,
				&account.environment,
				&test_client_id(),
				&account.realm,
				AuthenticationScheme::Bearer,
			)
			.expect("Access token scan should succeed.");

		assert_eq!(tokens.len(), 1);
		assert_eq!(tokens[0].secret.expose(), "second");
	}

	#[test]
	fn corrupt_entries_fail_direct_reads_but_not_scans() {
		let (store, backend) = store();
		let now = OffsetDateTime::now_utc();
		let token = test_access_token("user.read", "at", now, now + Duration::hours(1));
		let key = token.cache_key();

		backend
			.set(&key, r#"{"entity_type":"AccessToken","secret":1}"#.into())
			.expect("Raw write should succeed.");

		assert!(matches!(store.get(&key), Err(Error::Storage(StoreError::Serialization { .. }))));

		let account = test_account();
		let tokens = store
			.access_tokens(
				&account.home_account_id,
				&account.environment,
				&test_client_id(),
				&account.realm,
				AuthenticationScheme::Bearer,
			)
			.expect("Scans should skip corrupt entries.");

		assert!(tokens.is_empty());
		assert_eq!(store.get("absent").expect("Missing keys are not errors."), None);
	}

	#[test]
	fn entity_encoding_round_trips() {
		let now = OffsetDateTime::from_unix_timestamp(1_700_000_000)
			.expect("Timestamp fixture should be valid.");
		let entity = CacheEntity::AccessToken(test_access_token(
			"openid user.read",
			"at",
			now,
			now + Duration::hours(1),
		));
		let raw = entity.encode().expect("Entity should encode.");

		assert!(raw.contains("\"entity_type\":\"AccessToken\""));
		assert!(raw.contains("\"cached_at\":1700000000"));
		assert_eq!(CacheEntity::decode("k", &raw).expect("Entity should decode."), entity);
	}

	#[test]
	fn hyphenated_identities_stay_isolated() {
		let (store, backend) = store();
		let account = |home: &str, environment: &str| {
			Account::builder(
				HomeAccountId::new(home).expect("Home account fixture should be valid."),
				Environment::new(environment).expect("Environment fixture should be valid."),
				Realm::new("tenant-1").expect("Realm fixture should be valid."),
			)
			.build()
		};
		let alice = account("x", "y-z.com");
		let bob = account("x-y", "z.com");
		let client = test_client_id();
		let save = |account: &Account, secret: &str| {
			store
				.save_record(&CacheRecord {
					account: Some(account.clone()),
					refresh_token: Some(RefreshToken::new(account, client.clone(), secret)),
					..Default::default()
				})
				.expect("Group write should succeed.");
		};
		let refresh_secret = |account: &Account| {
			store
				.refresh_token(
					&account.home_account_id,
					&account.environment,
					&client,
					&account.realm,
				)
				.expect("Refresh token lookup should succeed.")
				.map(|token| token.secret.expose().to_owned())
		};

		save(&alice, "alice-rt");
		save(&bob, "bob-rt");

		assert_eq!(backend.len(), 4);
		assert_eq!(refresh_secret(&alice).as_deref(), Some("alice-rt"));
		assert_eq!(refresh_secret(&bob).as_deref(), Some("bob-rt"));

		let foreign = CacheEntity::RefreshToken(RefreshToken::new(&bob, client.clone(), "bob-rt"))
			.encode()
			.expect("Entity should encode.");
		let alice_key = RefreshToken::new(&alice, client.clone(), "unused").cache_key();

		backend.set(&alice_key, foreign).expect("Raw write should succeed.");

		assert_eq!(refresh_secret(&alice), None, "Foreign entities are never returned.");
		assert_eq!(
			store
				.account(&alice.home_account_id, &alice.environment)
				.expect("Account lookup should succeed."),
			Some(alice.clone())
		);
	}

	#[test]
	fn records_expand_into_credentials_in_write_order() {
		let now = OffsetDateTime::from_unix_timestamp(1_700_000_000)
			.expect("Timestamp fixture should be valid.");
		let record = CacheRecord {
			account: Some(test_account()),
			id_token: None,
			access_token: Some(test_access_token("user.read", "at", now, now + Duration::hours(1))),
			refresh_token: Some(test_refresh_token("rt")),
		};
		let credentials = record.credentials();

		assert!(matches!(
			credentials.as_slice(),
			[Credential::AccessToken(_), Credential::RefreshToken(_)]
		));

		let entities = record.entities();

		assert!(matches!(
			entities.as_slice(),
			[CacheEntity::Account(_), CacheEntity::AccessToken(_), CacheEntity::RefreshToken(_)]
		));
		assert!(CacheRecord::default().entities().is_empty());
	}
}
