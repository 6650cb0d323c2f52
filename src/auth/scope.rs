//! Scope modeling helpers: case-insensitive sets, superset matching, and search-scope shaping.

// std
use std::{
	collections::BTreeSet,
	hash::{Hash, Hasher},
};
// self
use crate::_prelude::*;

/// `openid` scope.
pub const OPENID_SCOPE: &str = "openid";
/// `profile` scope.
pub const PROFILE_SCOPE: &str = "profile";
/// `offline_access` scope.
pub const OFFLINE_ACCESS_SCOPE: &str = "offline_access";
/// Scopes every OIDC token request carries implicitly.
pub const OIDC_DEFAULT_SCOPES: [&str; 3] = [OPENID_SCOPE, PROFILE_SCOPE, OFFLINE_ACCESS_SCOPE];

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ScopeValidationError {
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
}

/// Set of OAuth scopes that compares case-insensitively while remembering the caller's order.
///
/// Entries are trimmed and blank entries are dropped. Duplicates are detected without regard to
/// case and the first spelling wins, so [`iter`](Self::iter) reproduces the order in which scopes
/// were first seen. Equality, hashing, and [`normalized`](Self::normalized) all work on the
/// lower-cased, sorted view so two sets holding the same scopes in different orders or casings
/// are interchangeable.
#[derive(Clone, Default)]
pub struct ScopeSet {
	scopes: Arc<[String]>,
}
impl ScopeSet {
	/// Creates a scope set from any iterator.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut ordered = Vec::new();

		for scope in scopes {
			let owned: String = scope.into();
			let trimmed = owned.trim();

			if trimmed.is_empty() {
				continue;
			}
			if trimmed.chars().any(char::is_whitespace) {
				return Err(ScopeValidationError::ContainsWhitespace { scope: owned });
			}

			push_unique(&mut ordered, trimmed);
		}

		Ok(Self { scopes: Arc::from(ordered) })
	}

	/// Parses a space-delimited `target` string as stored on cached access tokens.
	pub fn from_target(target: &str) -> Self {
		let mut ordered = Vec::new();

		for scope in target.split_whitespace() {
			push_unique(&mut ordered, scope);
		}

		Self { scopes: Arc::from(ordered) }
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.scopes.len()
	}

	/// Returns true if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.scopes.is_empty()
	}

	/// Case-insensitive membership test.
	pub fn contains(&self, scope: &str) -> bool {
		self.scopes.iter().any(|candidate| candidate.eq_ignore_ascii_case(scope))
	}

	/// Iterator over scopes in first-seen order.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.scopes.iter().map(|s| s.as_str())
	}

	/// Returns the underlying scopes in first-seen order.
	pub fn as_slice(&self) -> &[String] {
		&self.scopes
	}

	/// Space-delimited scopes in first-seen order, suitable for a request body or `target`.
	pub fn to_target(&self) -> String {
		self.scopes.join(" ")
	}

	/// Canonical representation: lower-cased, sorted, space-delimited.
	pub fn normalized(&self) -> String {
		self.lowercase_view().into_iter().collect::<Vec<_>>().join(" ")
	}

	/// Returns true when every scope in `other` is also present in `self`.
	pub fn is_superset_of(&self, other: &ScopeSet) -> bool {
		other.iter().all(|scope| self.contains(scope))
	}

	/// Returns true when every scope in `self` is also present in `other`.
	pub fn is_subset_of(&self, other: &ScopeSet) -> bool {
		other.is_superset_of(self)
	}

	/// Returns true when the set only holds the default OIDC scopes.
	pub fn contains_only_oidc_scopes(&self) -> bool {
		self.iter().all(is_oidc_scope)
	}

	/// Shapes request scopes for a cache lookup.
	///
	/// Resource scopes are matched on their own, so the default OIDC scopes are dropped whenever
	/// anything else was requested. A pure OIDC request keeps `openid`/`profile` but never
	/// `offline_access`, which is not reflected in an access token's `target`.
	pub fn search_scopes(&self) -> Self {
		let keep: Vec<String> = if self.contains_only_oidc_scopes() {
			self.iter()
				.filter(|scope| !scope.eq_ignore_ascii_case(OFFLINE_ACCESS_SCOPE))
				.map(str::to_owned)
				.collect()
		} else {
			self.iter().filter(|scope| !is_oidc_scope(scope)).map(str::to_owned).collect()
		};

		Self { scopes: Arc::from(keep) }
	}

	/// Returns a copy extended with the default OIDC scopes, as sent on a refresh request.
	pub fn with_default_oidc_scopes(&self) -> Self {
		self.union(&Self::from_target(&OIDC_DEFAULT_SCOPES.join(" ")))
	}

	/// Order-preserving union; scopes from `self` come first.
	pub fn union(&self, other: &ScopeSet) -> Self {
		let mut ordered = self.scopes.to_vec();

		for scope in other.iter() {
			push_unique(&mut ordered, scope);
		}

		Self { scopes: Arc::from(ordered) }
	}

	fn lowercase_view(&self) -> BTreeSet<String> {
		self.scopes.iter().map(|scope| scope.to_ascii_lowercase()).collect()
	}
}
impl PartialEq for ScopeSet {
	fn eq(&self, other: &Self) -> bool {
		self.lowercase_view() == other.lowercase_view()
	}
}
impl Eq for ScopeSet {}
impl Hash for ScopeSet {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.normalized().hash(state);
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.scopes).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.to_target())
	}
}

fn push_unique(ordered: &mut Vec<String>, scope: &str) {
	if !ordered.iter().any(|existing| existing.eq_ignore_ascii_case(scope)) {
		ordered.push(scope.to_owned());
	}
}

fn is_oidc_scope(scope: &str) -> bool {
	OIDC_DEFAULT_SCOPES.iter().any(|oidc| oidc.eq_ignore_ascii_case(scope))
}
