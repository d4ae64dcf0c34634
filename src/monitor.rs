use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::probe::{Classification, ProbeSample, Prober};
use crate::sampler::Cancel;

/// Half-width of the window around the expected TTL in which a fresh
/// answer counts as an expiry
pub const EXPIRY_WINDOW: Duration = Duration::from_secs(5);

/// Extra time monitored past the expected TTL by default
pub const DEFAULT_MARGIN: Duration = Duration::from_secs(60);

/// Monitor session parameters
#[derive(Debug, Clone)]
pub struct MonitorSettings {
	pub expected_ttl: Duration,
	pub duration: Duration,
	pub cadence: Duration,
}

impl MonitorSettings {
	/// Settings monitoring until `DEFAULT_MARGIN` past the expected TTL
	pub fn new(expected_ttl_secs: u64, cadence: Duration) -> Self {
		let expected_ttl = Duration::from_secs(expected_ttl_secs);
		MonitorSettings {
			expected_ttl,
			duration: expected_ttl.saturating_add(DEFAULT_MARGIN),
			cadence,
		}
	}
}

/// Where a monitor session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
	Idle,
	Sampling,
	/// An expiry was seen; sampling continues until the duration bound
	Expired,
	TimedOut,
	Cancelled,
}

/// One sampled point of a monitor session
#[derive(Debug, Clone, PartialEq)]
pub struct TtlObservation {
	pub elapsed_since_start: f64,
	pub sample: ProbeSample,
	pub is_near_expected_expiry: bool,
}

/// Progress reported while a session runs
#[derive(Debug)]
pub enum MonitorEvent<'a> {
	Primed(&'a ProbeSample),
	Observed {
		observation: &'a TtlObservation,
		cached: usize,
		total: usize,
	},
	ExpiryDetected {
		elapsed_since_start: f64,
		expected_ttl: Duration,
	},
}

/// Whether `elapsed_secs` lies strictly inside the expiry window around `expected_ttl`
pub fn is_near_expiry(elapsed_secs: f64, expected_ttl: Duration) -> bool {
	let ttl = expected_ttl.as_secs_f64();
	let window = EXPIRY_WINDOW.as_secs_f64();
	elapsed_secs > ttl - window && elapsed_secs < ttl + window
}

/// State of one TTL-expiry watch.
///
/// Driven by [`TtlMonitor::run`]; `observe` is the per-sample transition.
#[derive(Debug)]
pub struct TtlMonitor {
	settings: MonitorSettings,
	state: MonitorState,
	priming: Option<ProbeSample>,
	observations: Vec<TtlObservation>,
	cached: usize,
	first_expiry: Option<f64>,
}

/// What a finished (or interrupted) session saw
#[derive(Debug, Clone)]
pub struct TtlReport {
	pub expected_ttl: Duration,
	pub duration: Duration,
	pub final_state: MonitorState,
	pub priming: Option<ProbeSample>,
	pub observations: Vec<TtlObservation>,
	pub cached_count: usize,
	pub total_count: usize,
	/// Seconds since start of the first fresh answer inside the expiry window
	pub expiry_detected_at: Option<f64>,
}

impl TtlReport {
	/// Seconds between the detected and the expected expiry
	pub fn deviation_secs(&self) -> Option<f64> {
		self.expiry_detected_at
			.map(|at| at - self.expected_ttl.as_secs_f64())
	}

	/// Samples taken inside the expiry window
	pub fn near_expiry_count(&self) -> usize {
		self.observations.iter()
			.filter(|o| o.is_near_expected_expiry)
			.count()
	}
}

impl TtlMonitor {
	pub fn new(settings: MonitorSettings) -> Self {
		TtlMonitor {
			settings,
			state: MonitorState::Idle,
			priming: None,
			observations: Vec::new(),
			cached: 0,
			first_expiry: None,
		}
	}

	pub fn state(&self) -> MonitorState {
		self.state
	}

	/// Record the cache-warming probe; it is reported but not analyzed.
	pub fn prime(&mut self, sample: ProbeSample) {
		self.priming = Some(sample);
		self.state = MonitorState::Sampling;
	}

	/// Fold one sample taken `elapsed_since_start` seconds into the session.
	///
	/// Returns the observation and whether it marks an expiry.
	pub fn observe(&mut self, elapsed_since_start: f64, sample: ProbeSample) -> (&TtlObservation, bool) {
		let near = is_near_expiry(elapsed_since_start, self.settings.expected_ttl);
		let classification = sample.classification();
		if classification == Classification::Cached {
			self.cached += 1;
		}

		let expired = near && classification == Classification::Fresh;
		if expired {
			self.state = MonitorState::Expired;
			self.first_expiry.get_or_insert(elapsed_since_start);
		}

		self.observations.push(TtlObservation {
			elapsed_since_start,
			sample,
			is_near_expected_expiry: near,
		});
		let last = self.observations.len() - 1;
		(&self.observations[last], expired)
	}

	pub fn total_count(&self) -> usize {
		self.observations.len()
	}

	/// Close the session in `state` and hand back everything collected.
	pub fn finish(self, state: MonitorState) -> TtlReport {
		debug!(from = ?self.state(), to = ?state, samples = self.observations.len(), "monitor finished");
		TtlReport {
			expected_ttl: self.settings.expected_ttl,
			duration: self.settings.duration,
			final_state: state,
			priming: self.priming,
			cached_count: self.cached,
			total_count: self.observations.len(),
			observations: self.observations,
			expiry_detected_at: self.first_expiry,
		}
	}

	/// Watch `domain` until the duration bound or cancellation.
	///
	/// One priming probe warms the cache, then one probe per cadence tick.
	/// Cancellation is honored between probes and yields a partial report.
	pub async fn run(
		mut self,
		prober: &Prober<'_>,
		domain: &str,
		cancel: &Cancel,
		mut on_event: impl FnMut(MonitorEvent<'_>),
	) -> TtlReport {
		let start = Instant::now();
		info!(
			domain,
			expected_ttl_secs = self.settings.expected_ttl.as_secs(),
			duration_secs = self.settings.duration.as_secs(),
			"starting TTL monitor"
		);

		if cancel.is_cancelled() {
			return self.finish(MonitorState::Cancelled);
		}
		let priming = prober.probe(domain).await;
		on_event(MonitorEvent::Primed(&priming));
		self.prime(priming);

		loop {
			let elapsed = start.elapsed();
			if elapsed >= self.settings.duration {
				break;
			}
			if cancel.is_cancelled() {
				info!(domain, samples = self.total_count(), "TTL monitor cancelled");
				return self.finish(MonitorState::Cancelled);
			}

			let elapsed_secs = elapsed.as_secs_f64();
			let sample = prober.probe(domain).await;
			let expected_ttl = self.settings.expected_ttl;
			let cached = self.cached + usize::from(sample.classification() == Classification::Cached);
			let total = self.observations.len() + 1;
			let (observation, expired) = self.observe(elapsed_secs, sample);
			if expired {
				warn!(domain, elapsed_secs, "cache expiry detected");
				on_event(MonitorEvent::ExpiryDetected {
					elapsed_since_start: elapsed_secs,
					expected_ttl,
				});
			}
			on_event(MonitorEvent::Observed { observation, cached, total });

			if !cancel.sleep(self.settings.cadence).await {
				info!(domain, samples = self.total_count(), "TTL monitor cancelled");
				return self.finish(MonitorState::Cancelled);
			}
		}

		self.finish(MonitorState::TimedOut)
	}
}
