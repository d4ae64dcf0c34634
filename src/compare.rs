use std::fmt;

use tracing::{info, warn};

use crate::error::Result;
use crate::prefs::{parse_bool, ConfigStore, KEY_USER_CAN_ADJUST_CACHE};
use crate::probe::{ProbeSample, Prober};
use crate::sampler::{run_samples, Cancel};
use crate::stats::{summarize, Summary};
use crate::transport::AnalyzerConfig;

/// Which half of a comparison is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparePhase {
	Enabled,
	Disabled,
}

impl fmt::Display for ComparePhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ComparePhase::Enabled => f.write_str("cache enabled"),
			ComparePhase::Disabled => f.write_str("cache disabled"),
		}
	}
}

/// Progress reported while a comparison runs
#[derive(Debug)]
pub enum CompareEvent<'a> {
	PhaseStarted(ComparePhase),
	Sample(ComparePhase, usize, &'a ProbeSample),
	PhaseFinished(ComparePhase, &'a SampleRun),
	CacheDisabled,
	CacheRestored,
}

/// Samples and summary from one sampling pass
#[derive(Debug, Clone)]
pub struct SampleRun {
	pub samples: Vec<ProbeSample>,
	pub summary: Option<Summary>,
}

impl SampleRun {
	fn from_samples(samples: Vec<ProbeSample>) -> Self {
		let summary = summarize(&samples);
		SampleRun { samples, summary }
	}
}

/// Both passes of an enabled-vs-disabled comparison
#[derive(Debug, Clone)]
pub struct Comparison {
	pub enabled: SampleRun,
	pub disabled: SampleRun,
}

/// Holds the user cache switch off and puts the prior value back.
///
/// Restoration runs on every exit path: explicitly through [`restore`]
/// or, if the guard is dropped first, from `Drop` with failures logged.
///
/// [`restore`]: CacheToggleGuard::restore
pub struct CacheToggleGuard<'a> {
	store: &'a dyn ConfigStore,
	prior: Option<String>,
	restored: bool,
}

impl<'a> CacheToggleGuard<'a> {
	/// Record the current switch value, then turn caching off.
	///
	/// If the write fails the prior value is restored before the error
	/// is returned.
	pub fn disable(store: &'a dyn ConfigStore) -> Result<Self> {
		let prior = store.read(KEY_USER_CAN_ADJUST_CACHE)?;
		let guard = CacheToggleGuard {
			store,
			prior,
			restored: false,
		};
		guard.store.write_bool(KEY_USER_CAN_ADJUST_CACHE, false)?;
		Ok(guard)
	}

	pub fn prior(&self) -> Option<&str> {
		self.prior.as_deref()
	}

	/// Put the prior value back, surfacing any write failure.
	pub fn restore(mut self) -> Result<()> {
		self.restored = true;
		self.restore_prior()
	}

	fn restore_prior(&self) -> Result<()> {
		match self.prior.as_deref() {
			None => self.store.remove(KEY_USER_CAN_ADJUST_CACHE),
			Some(raw) => {
				let value = parse_bool(raw).unwrap_or_else(|| {
					warn!(value = raw, "unrecognized prior cache setting, re-enabling");
					true
				});
				self.store.write_bool(KEY_USER_CAN_ADJUST_CACHE, value)
			}
		}
	}
}

impl Drop for CacheToggleGuard<'_> {
	fn drop(&mut self) {
		if self.restored {
			return;
		}
		if let Err(e) = self.restore_prior() {
			warn!(error = %e, "failed to restore cache setting");
		}
	}
}

/// Sample `domain` with the current cache setting, then again with the
/// user cache switch off.
///
/// The switch is restored on every exit path. Only configuration failures
/// are returned as errors; probe failures stay in the samples.
pub async fn compare_enabled_vs_disabled(
	prober: &Prober<'_>,
	store: &dyn ConfigStore,
	domain: &str,
	config: &AnalyzerConfig,
	cancel: &Cancel,
	mut on_event: impl FnMut(CompareEvent<'_>),
) -> Result<Comparison> {
	let iterations = config.compare_iterations;

	on_event(CompareEvent::PhaseStarted(ComparePhase::Enabled));
	let samples = run_samples(prober, domain, iterations, config.test_delay, cancel, |i, s| {
		on_event(CompareEvent::Sample(ComparePhase::Enabled, i, s))
	}).await;
	let enabled = SampleRun::from_samples(samples);
	on_event(CompareEvent::PhaseFinished(ComparePhase::Enabled, &enabled));

	if cancel.is_cancelled() {
		info!(domain, "comparison cancelled before touching the cache switch");
		return Ok(Comparison { enabled, disabled: SampleRun::from_samples(Vec::new()) });
	}

	let guard = CacheToggleGuard::disable(store)?;
	info!(domain, prior = ?guard.prior(), "user cache switch disabled");
	on_event(CompareEvent::CacheDisabled);

	let disabled = if cancel.sleep(config.propagation_pause).await {
		on_event(CompareEvent::PhaseStarted(ComparePhase::Disabled));
		let samples = run_samples(prober, domain, iterations, config.test_delay, cancel, |i, s| {
			on_event(CompareEvent::Sample(ComparePhase::Disabled, i, s))
		}).await;
		SampleRun::from_samples(samples)
	} else {
		SampleRun::from_samples(Vec::new())
	};
	on_event(CompareEvent::PhaseFinished(ComparePhase::Disabled, &disabled));

	guard.restore()?;
	info!(domain, "user cache switch restored");
	on_event(CompareEvent::CacheRestored);

	Ok(Comparison { enabled, disabled })
}
