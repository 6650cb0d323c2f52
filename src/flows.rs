//! Silent flow orchestration powered by the credential store.

pub mod common;
pub mod refresh;
pub mod silent;

pub use common::*;
pub use refresh::*;
pub use silent::*;

// self
use crate::{
	_prelude::*,
	auth::{ClientId, Environment},
	cache::CredentialStore,
	error::ConfigError,
	telemetry::{NoopTelemetry, TelemetryHook},
};

/// Source of the current instant for every expiry and `max_age` comparison.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Returns the current instant.
	fn now(&self) -> OffsetDateTime;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Clock pinned to a settable instant.
#[derive(Debug)]
pub struct FixedClock(Mutex<OffsetDateTime>);
impl FixedClock {
	/// Creates a clock reporting `now`.
	pub fn new(now: OffsetDateTime) -> Self {
		Self(Mutex::new(now))
	}

	/// Moves the clock by `delta`.
	pub fn advance(&self, delta: Duration) {
		*self.0.lock() += delta;
	}
}
impl Clock for FixedClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.lock()
	}
}

/// Application-level settings shared by every silent request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
	/// OAuth 2.0 client identifier.
	pub client_id: ClientId,
	/// Default authority used when a request names none.
	pub authority: Url,
	/// Tokens closer than this to expiry are treated as expired.
	#[serde(default = "ClientConfig::default_token_renewal_offset")]
	pub token_renewal_offset: Duration,
	/// Allows cached access tokens to be bound to, and matched by, a claims request.
	#[serde(default)]
	pub claims_based_caching_enabled: bool,
	/// Capabilities advertised to the token endpoint through `xms_cc`.
	#[serde(default)]
	pub client_capabilities: Vec<String>,
}
impl ClientConfig {
	const DEFAULT_TOKEN_RENEWAL_OFFSET: Duration = Duration::seconds(300);

	/// Creates a configuration with default knobs.
	pub fn new(client_id: ClientId, authority: Url) -> Self {
		Self {
			client_id,
			authority,
			token_renewal_offset: Self::DEFAULT_TOKEN_RENEWAL_OFFSET,
			claims_based_caching_enabled: false,
			client_capabilities: Vec::new(),
		}
	}

	/// Parses the client identifier and authority from strings.
	pub fn parse(client_id: &str, authority: &str) -> Result<Self> {
		let client_id = ClientId::new(client_id).map_err(ConfigError::from)?;
		let authority = Url::parse(authority).map_err(ConfigError::invalid_authority)?;

		Environment::from_authority(&authority).map_err(ConfigError::invalid_authority)?;

		Ok(Self::new(client_id, authority))
	}

	/// Overrides the expiry skew buffer (defaults to 300 seconds); negative values clamp to zero.
	pub fn with_token_renewal_offset(mut self, offset: Duration) -> Self {
		self.token_renewal_offset = if offset.is_negative() { Duration::ZERO } else { offset };

		self
	}

	/// Enables or disables claims-based caching.
	pub fn with_claims_based_caching(mut self, enabled: bool) -> Self {
		self.claims_based_caching_enabled = enabled;

		self
	}

	/// Replaces the advertised client capabilities.
	pub fn with_client_capabilities<I, S>(mut self, capabilities: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.client_capabilities = capabilities.into_iter().map(Into::into).collect();

		self
	}

	fn default_token_renewal_offset() -> Duration {
		Self::DEFAULT_TOKEN_RENEWAL_OFFSET
	}
}

/// Entry point for silent token acquisition.
///
/// The client owns handles to the shared credential store, the refresh collaborator, the telemetry
/// hook, and the clock. It is cheap to clone; background refreshes run on a clone.
#[derive(Clone)]
pub struct SilentFlowClient {
	/// Application-level settings.
	pub config: Arc<ClientConfig>,
	/// Shared credential store.
	pub store: Arc<CredentialStore>,
	/// Collaborator performing the refresh-token exchange.
	pub refresh_client: Arc<dyn RefreshClient>,
	/// Cache hit/miss receiver.
	pub telemetry: Arc<dyn TelemetryHook>,
	/// Time source.
	pub clock: Arc<dyn Clock>,
	/// Shared counters for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
}
impl SilentFlowClient {
	/// Creates a client with the system clock and no telemetry.
	pub fn new(
		config: ClientConfig,
		store: Arc<CredentialStore>,
		refresh_client: Arc<dyn RefreshClient>,
	) -> Self {
		Self {
			config: Arc::new(config),
			store,
			refresh_client,
			telemetry: Arc::new(NoopTelemetry),
			clock: Arc::new(SystemClock),
			refresh_metrics: Default::default(),
		}
	}

	/// Replaces the telemetry hook.
	pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetryHook>) -> Self {
		self.telemetry = telemetry;

		self
	}

	/// Replaces the clock.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}
}
impl Debug for SilentFlowClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SilentFlowClient")
			.field("config", &self.config)
			.field("store", &self.store)
			.field("refresh_metrics", &self.refresh_metrics)
			.finish_non_exhaustive()
	}
}
