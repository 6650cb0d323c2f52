//! Cache hit/miss reporting.
//!
//! The engine calls a [`TelemetryHook`] once per silent lookup. Hooks must be cheap and must never
//! block; any error they return is logged and discarded so reporting can't fail a token request.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{_prelude::*, obs};

/// Why a silent lookup ended the way it did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOutcome {
	/// Plain cache hit.
	#[default]
	NotApplicable,
	/// The request forced a refresh or carried claims the cache cannot honor.
	ForceRefreshOrClaims,
	/// No access token satisfied the request.
	NoCachedAccessToken,
	/// The matching access token is expired, near expiry, or written in the future.
	CachedAccessTokenExpired,
	/// Cache hit that also scheduled a background refresh.
	ProactivelyRefreshed,
}
impl CacheOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CacheOutcome::NotApplicable => "not_applicable",
			CacheOutcome::ForceRefreshOrClaims => "force_refresh_or_claims",
			CacheOutcome::NoCachedAccessToken => "no_cached_access_token",
			CacheOutcome::CachedAccessTokenExpired => "cached_access_token_expired",
			CacheOutcome::ProactivelyRefreshed => "proactively_refreshed",
		}
	}

	/// Returns true when the outcome still served a cached token.
	pub const fn is_hit(self) -> bool {
		matches!(self, CacheOutcome::NotApplicable | CacheOutcome::ProactivelyRefreshed)
	}
}
impl Display for CacheOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Error a hook may report; always discarded by the engine.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Telemetry hook failed: {message}.")]
pub struct TelemetryError {
	/// Human-readable error payload.
	pub message: String,
}
impl TelemetryError {
	/// Creates a new error.
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

/// Receiver for cache hit/miss signals.
pub trait TelemetryHook
where
	Self: Send + Sync,
{
	/// Records a lookup that served a cached token.
	fn record_cache_hit(&self, outcome: CacheOutcome) -> Result<(), TelemetryError>;

	/// Records a lookup that required a network refresh.
	fn record_cache_miss(&self, outcome: CacheOutcome) -> Result<(), TelemetryError>;
}

/// Hook that drops every signal.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTelemetry;
impl TelemetryHook for NoopTelemetry {
	fn record_cache_hit(&self, _: CacheOutcome) -> Result<(), TelemetryError> {
		Ok(())
	}

	fn record_cache_miss(&self, _: CacheOutcome) -> Result<(), TelemetryError> {
		Ok(())
	}
}

/// Thread-safe in-process hit/miss counters.
#[derive(Debug, Default)]
pub struct CacheCounters {
	hits: AtomicU64,
	misses: AtomicU64,
}
impl CacheCounters {
	/// Returns the number of cache hits recorded.
	pub fn hits(&self) -> u64 {
		self.hits.load(Ordering::Relaxed)
	}

	/// Returns the number of cache misses recorded.
	pub fn misses(&self) -> u64 {
		self.misses.load(Ordering::Relaxed)
	}
}
impl TelemetryHook for CacheCounters {
	fn record_cache_hit(&self, _: CacheOutcome) -> Result<(), TelemetryError> {
		self.hits.fetch_add(1, Ordering::Relaxed);

		Ok(())
	}

	fn record_cache_miss(&self, _: CacheOutcome) -> Result<(), TelemetryError> {
		self.misses.fetch_add(1, Ordering::Relaxed);

		Ok(())
	}
}

/// Reports a hit, swallowing hook errors.
pub(crate) fn report_hit(hook: &dyn TelemetryHook, outcome: CacheOutcome) {
	obs::record_cache_outcome(outcome);

	if let Err(e) = hook.record_cache_hit(outcome) {
		obs::telemetry_discarded(&e);
	}
}

/// Reports a miss, swallowing hook errors.
pub(crate) fn report_miss(hook: &dyn TelemetryHook, outcome: CacheOutcome) {
	obs::record_cache_outcome(outcome);

	if let Err(e) = hook.record_cache_miss(outcome) {
		obs::telemetry_discarded(&e);
	}
}
