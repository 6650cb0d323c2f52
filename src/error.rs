//! Crate-level error types shared across the cache, silent flows, and refresh collaborators.

// self
use crate::{_prelude::*, telemetry::CacheOutcome};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration or request validation problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure reported by the refresh collaborator.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure reported by the refresh collaborator.
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Provider rejected the refresh token.
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider- or collaborator-supplied reason string.
		reason: String,
	},
	/// Silent request carried no account.
	#[error("No account was provided for the silent request.")]
	NoAccountInSilentRequest,
	/// Silent request carried no scopes.
	#[error("At least one scope is required for the silent request.")]
	EmptyInputScopes,
	/// Cached tokens cannot satisfy the request; a network refresh is needed.
	#[error("Token refresh is required ({outcome}).")]
	TokenRefreshRequired {
		/// Reason the cache was bypassed.
		outcome: CacheOutcome,
	},
	/// `max_age` was requested but the ID token carries no `auth_time`.
	#[error("The ID token has no auth_time claim but max_age was requested.")]
	AuthTimeNotFound,
	/// Time since the last end-user authentication is at least `max_age`.
	#[error("Authentication is {elapsed} old which exceeds the requested max_age of {max_age}.")]
	MaxAgeTranspired {
		/// Requested limit.
		max_age: Duration,
		/// Time elapsed since `auth_time`.
		elapsed: Duration,
	},
	/// A refresh is required but no refresh token is cached; interaction is needed.
	#[error("No refresh token is cached for the account.")]
	NoTokensFound,
	/// ID token could not be decoded when its claims were needed.
	#[error("ID token is invalid: {reason}.")]
	InvalidIdToken {
		/// Decoder message.
		reason: String,
	},
}
impl Error {
	/// Returns true for outcomes that only an interactive sign-in can resolve.
	pub fn requires_interaction(&self) -> bool {
		matches!(
			self,
			Error::NoTokensFound
				| Error::InvalidGrant { .. }
				| Error::AuthTimeNotFound
				| Error::MaxAgeTranspired { .. }
		)
	}
}

/// Configuration and request validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Authority URL cannot be parsed or has no usable host.
	#[error("Authority is invalid.")]
	InvalidAuthority {
		/// Underlying failure.
		#[source]
		source: BoxError,
	},
	/// An identifier failed validation.
	#[error("Identifier is invalid.")]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// Claims request is not a JSON object.
	#[error("Claims request is invalid.")]
	InvalidClaims(#[from] crate::auth::ClaimsError),
	/// Request scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Access token builder validation failed.
	#[error("Unable to build access token.")]
	TokenBuild(#[from] crate::auth::AccessTokenBuilderError),
}
impl ConfigError {
	/// Wraps an authority parsing failure.
	pub fn invalid_authority(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::InvalidAuthority { source: Box::new(src) }
	}
}

/// Temporary failure variants (safe to retry at the caller's discretion).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Token endpoint returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Collaborator-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
}

/// Transport-level failures reported by the refresh collaborator.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// The token endpoint could not be reached.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Collaborator-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a collaborator-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
