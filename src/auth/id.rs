//! Strongly typed identifiers for the accounts, tenants, and clients that key the credential cache.

// std
use std::{borrow::Borrow, ops::Deref};
// crates.io
use rand::Rng;
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}

			/// Returns the identifier as a string slice.
			pub fn as_str(&self) -> &str {
				&self.0
			}

			/// Lower-cased rendition used when the identifier becomes part of a cache key.
			pub fn key_segment(&self) -> String {
				self.0.to_lowercase()
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 256;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (home account, environment, realm, client).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (home account, environment, realm, client).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (home account, environment, realm, client).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
	/// The authority URL carries no host to derive an environment from.
	#[error("Authority `{authority}` has no host.")]
	MissingHost {
		/// Offending authority.
		authority: String,
	},
}

def_id! { HomeAccountId, "User + directory identifier, usually `<uid>.<utid>`.", "HomeAccount" }
def_id! { Environment, "Issuer host an account or credential was minted by.", "Environment" }
def_id! { Realm, "Tenant or directory identifier.", "Realm" }
def_id! { ClientId, "OAuth 2.0 client identifier of the application.", "Client" }

impl Environment {
	/// Derives the environment from an authority URL's host.
	pub fn from_authority(authority: &Url) -> Result<Self, IdentifierError> {
		let host = authority
			.host_str()
			.ok_or_else(|| IdentifierError::MissingHost { authority: authority.to_string() })?;

		Self::new(host)
	}
}

impl HomeAccountId {
	/// Splits `<uid>.<utid>` into its object and tenant halves.
	pub fn client_info_parts(&self) -> Option<(&str, &str)> {
		let (uid, utid) = self.0.split_once('.')?;

		if uid.is_empty() || utid.is_empty() || utid.contains('.') {
			return None;
		}

		Some((uid, utid))
	}
}

/// Per-request correlation identifier forwarded to the refresh collaborator and the logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);
impl CorrelationId {
	/// Wraps a caller-supplied correlation identifier.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Generates a random RFC 4122 version 4 identifier.
	pub fn generate() -> Self {
		let mut bytes: [u8; 16] = rand::rng().random();

		bytes[6] = (bytes[6] & 0x0f) | 0x40;
		bytes[8] = (bytes[8] & 0x3f) | 0x80;

		let hex = bytes.iter().map(|b| format!("{b:02x}")).collect::<String>();

		Self(format!(
			"{}-{}-{}-{}-{}",
			&hex[0..8],
			&hex[8..12],
			&hex[12..16],
			&hex[16..20],
			&hex[20..32]
		))
	}

	/// Returns the identifier as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Default for CorrelationId {
	fn default() -> Self {
		Self::generate()
	}
}
impl Debug for CorrelationId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Correlation({})", self.0)
	}
}
impl Display for CorrelationId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}
