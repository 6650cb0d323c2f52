// self
use crate::{
	_prelude::*,
	obs::FlowKind,
	store::StoreError,
	telemetry::{CacheOutcome, TelemetryError},
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by silent flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("oauth2_silent.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Logs the decision a silent lookup reached.
pub fn cache_decision(outcome: CacheOutcome, correlation_id: &str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(outcome = outcome.as_str(), correlation_id, "Silent cache lookup finished.");

	#[cfg(not(feature = "tracing"))]
	let _ = (outcome, correlation_id);
}

/// Logs a stored entry that was skipped because it failed to decode.
pub fn skipped_cache_entry(key: &str, error: &StoreError) {
	#[cfg(feature = "tracing")]
	tracing::warn!(key, %error, "Skipping undecodable cache entry.");

	#[cfg(not(feature = "tracing"))]
	let _ = (key, error);
}

/// Logs a telemetry hook failure that was discarded.
pub fn telemetry_discarded(error: &TelemetryError) {
	#[cfg(feature = "tracing")]
	tracing::debug!(%error, "Discarding telemetry hook failure.");

	#[cfg(not(feature = "tracing"))]
	let _ = error;
}

/// Logs a background refresh failure that was swallowed.
pub fn background_refresh_failed(error: &Error, correlation_id: &str) {
	#[cfg(feature = "tracing")]
	tracing::warn!(%error, correlation_id, "Background token refresh failed.");

	#[cfg(not(feature = "tracing"))]
	let _ = (error, correlation_id);
}

/// Logs a background refresh that could not be scheduled.
pub fn background_refresh_skipped(reason: &str, correlation_id: &str) {
	#[cfg(feature = "tracing")]
	tracing::warn!(reason, correlation_id, "Background token refresh skipped.");

	#[cfg(not(feature = "tracing"))]
	let _ = (reason, correlation_id);
}
