//! Claims request canonicalization, hashing, and ID token claim decoding.

// crates.io
use base64::{
	Engine as _,
	engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD},
};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Errors raised while parsing claims material.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ClaimsError {
	/// Claims request is not valid JSON.
	#[error("Claims request is not valid JSON: {message}.")]
	InvalidJson {
		/// Parser message.
		message: String,
	},
	/// Claims request parsed but is not a JSON object.
	#[error("Claims request must be a JSON object.")]
	NotAnObject,
	/// ID token is not a three-part compact JWT.
	#[error("ID token is not a compact JWT.")]
	MalformedIdToken,
	/// ID token payload could not be decoded.
	#[error("ID token payload could not be decoded: {message}.")]
	IdTokenPayload {
		/// Decoder message.
		message: String,
	},
}

/// Canonicalized claims request.
///
/// Object keys are sorted recursively before serialization, so two requests that differ only in
/// key order produce the same [`hash`](Self::hash). An empty object is treated as no claims.
#[derive(Clone, PartialEq, Eq)]
pub struct ClaimsRequest {
	canonical: String,
}
impl ClaimsRequest {
	/// Parses a JSON claims request; blank input and `{}` yield `None`.
	pub fn parse(raw: &str) -> Result<Option<Self>, ClaimsError> {
		if raw.trim().is_empty() {
			return Ok(None);
		}

		let value: Value = serde_json::from_str(raw)
			.map_err(|e| ClaimsError::InvalidJson { message: e.to_string() })?;
		let Value::Object(map) = value else {
			return Err(ClaimsError::NotAnObject);
		};

		if map.is_empty() {
			return Ok(None);
		}

		Ok(Some(Self::from_object(map)))
	}

	fn from_object(map: Map<String, Value>) -> Self {
		Self { canonical: canonicalize(&Value::Object(map)).to_string() }
	}

	/// Canonical JSON text (sorted keys, no insignificant whitespace).
	pub fn as_json(&self) -> &str {
		&self.canonical
	}

	/// Base64 (no padding) SHA-256 digest of the canonical JSON.
	pub fn hash(&self) -> String {
		let mut hasher = Sha256::new();

		hasher.update(self.canonical.as_bytes());

		STANDARD_NO_PAD.encode(hasher.finalize())
	}

	/// Merges client capabilities into `access_token.xms_cc.values`.
	///
	/// Returns the canonical JSON that should be sent on the wire. `claims` may be absent, in which
	/// case only the capabilities are emitted; with no capabilities the input is returned as-is.
	pub fn merge_client_capabilities(
		claims: Option<&ClaimsRequest>,
		capabilities: &[String],
	) -> Option<String> {
		if capabilities.is_empty() {
			return claims.map(|c| c.canonical.clone());
		}

		let mut root = match claims.and_then(|c| serde_json::from_str::<Value>(&c.canonical).ok()) {
			Some(Value::Object(map)) => map,
			_ => Map::new(),
		};
		let access_token = root
			.entry("access_token")
			.or_insert_with(|| Value::Object(Map::new()));

		if !access_token.is_object() {
			*access_token = Value::Object(Map::new());
		}
		if let Value::Object(section) = access_token {
			let values = capabilities.iter().cloned().map(Value::String).collect::<Vec<_>>();
			let mut xms_cc = Map::new();

			xms_cc.insert("values".into(), Value::Array(values));
			section.insert("xms_cc".into(), Value::Object(xms_cc));
		}

		Some(Self::from_object(root).canonical)
	}
}
impl Debug for ClaimsRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ClaimsRequest").field(&self.canonical).finish()
	}
}

/// Decoded ID token payload.
///
/// Signature verification is the token endpoint client's job; the cache only needs the claims to
/// populate results and to evaluate `max_age`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
	/// Time of the end-user authentication, epoch seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub auth_time: Option<i64>,
	/// Object identifier of the user.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub oid: Option<String>,
	/// Subject identifier.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sub: Option<String>,
	/// Tenant identifier.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tid: Option<String>,
	/// Preferred username.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub preferred_username: Option<String>,
	/// Display name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Every other claim.
	#[serde(flatten)]
	pub additional: Map<String, Value>,
}
impl IdTokenClaims {
	/// Decodes the payload segment of a compact JWT.
	pub fn decode(token: &str) -> Result<Self, ClaimsError> {
		let mut parts = token.split('.');
		let (Some(_header), Some(payload), Some(_signature), None) =
			(parts.next(), parts.next(), parts.next(), parts.next())
		else {
			return Err(ClaimsError::MalformedIdToken);
		};
		let bytes = URL_SAFE_NO_PAD
			.decode(payload.trim_end_matches('='))
			.map_err(|e| ClaimsError::IdTokenPayload { message: e.to_string() })?;

		serde_json::from_slice(&bytes)
			.map_err(|e| ClaimsError::IdTokenPayload { message: e.to_string() })
	}

	/// `auth_time` as an instant.
	pub fn auth_time(&self) -> Option<OffsetDateTime> {
		self.auth_time.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
	}

	/// Stable user identifier: `oid` when present, otherwise `sub`.
	pub fn unique_id(&self) -> Option<&str> {
		self.oid.as_deref().or(self.sub.as_deref())
	}
}

fn canonicalize(value: &Value) -> Value {
	match value {
		Value::Object(map) => {
			let sorted: BTreeMap<&String, Value> =
				map.iter().map(|(k, v)| (k, canonicalize(v))).collect();

			Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
		},
		Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
		other => other.clone(),
	}
}
