use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::probe::{ProbeSample, Prober};

/// Cooperative cancellation observed at iteration boundaries.
///
/// A probe in flight is always allowed to finish; only the waits
/// between probes are cut short.
#[derive(Debug, Clone)]
pub struct Cancel {
	rx: watch::Receiver<bool>,
}

/// Triggers the paired `Cancel`
#[derive(Debug)]
pub struct CancelHandle {
	tx: watch::Sender<bool>,
}

impl CancelHandle {
	pub fn cancel(&self) {
		self.tx.send_replace(true);
	}
}

/// Create a linked trigger and observer
pub fn cancel_pair() -> (CancelHandle, Cancel) {
	let (tx, rx) = watch::channel(false);
	(CancelHandle { tx }, Cancel { rx })
}

impl Cancel {
	/// A token that is never cancelled
	#[cfg(test)]
	pub fn never() -> Self {
		cancel_pair().1
	}

	pub fn is_cancelled(&self) -> bool {
		*self.rx.borrow()
	}

	/// Sleep for `duration`; returns `false` if cancelled first.
	pub async fn sleep(&self, duration: Duration) -> bool {
		if self.is_cancelled() {
			return false;
		}
		let mut rx = self.rx.clone();
		tokio::select! {
			_ = tokio::time::sleep(duration) => !self.is_cancelled(),
			Ok(_) = rx.wait_for(|cancelled| *cancelled) => false,
		}
	}
}

/// Run `iterations` sequential probes, sleeping `delay` between them.
///
/// Failed probes are kept as `Error` samples, so an uninterrupted run
/// always returns exactly `iterations` samples in query order. On
/// cancellation the samples collected so far are returned.
pub async fn run_samples(
	prober: &Prober<'_>,
	domain: &str,
	iterations: u32,
	delay: Duration,
	cancel: &Cancel,
	mut on_sample: impl FnMut(usize, &ProbeSample),
) -> Vec<ProbeSample> {
	let mut samples = Vec::with_capacity(iterations as usize);

	for i in 0..iterations {
		if cancel.is_cancelled() {
			info!(domain, completed = samples.len(), "sampling cancelled");
			break;
		}

		let sample = prober.probe(domain).await;
		on_sample(i as usize, &sample);
		samples.push(sample);

		if i + 1 < iterations && !cancel.sleep(delay).await {
			info!(domain, completed = samples.len(), "sampling cancelled");
			break;
		}
	}

	debug!(domain, collected = samples.len(), requested = iterations, "sampling finished");
	samples
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::probe::Classification;
	use crate::testutil::{Scripted, ScriptedResolver};
	use crate::transport::AnalyzerConfig;
	use tokio::time::Instant;

	#[tokio::test(start_paused = true)]
	async fn test_collects_requested_iterations_in_order() {
		let resolver = ScriptedResolver::new(vec![
			Scripted::Answer(30.0),
			Scripted::Answer(1.0),
			Scripted::Fail(0.5, "refused"),
			Scripted::Answer(2.0),
		]);
		let prober = Prober::new(&resolver, &AnalyzerConfig::default());

		let mut seen = Vec::new();
		let samples = run_samples(
			&prober, "example.com", 4, Duration::from_millis(100),
			&Cancel::never(), |i, _| seen.push(i),
		).await;

		assert_eq!(samples.len(), 4);
		assert_eq!(seen, vec![0, 1, 2, 3]);
		let classes: Vec<_> = samples.iter().map(|s| s.classification()).collect();
		assert_eq!(classes, vec![
			Classification::Fresh,
			Classification::Cached,
			Classification::Error,
			Classification::Cached,
		]);
	}

	#[tokio::test(start_paused = true)]
	async fn test_no_delay_after_last_probe() {
		let resolver = ScriptedResolver::new(vec![Scripted::Answer(1.0)]);
		let prober = Prober::new(&resolver, &AnalyzerConfig::default());

		let start = Instant::now();
		run_samples(
			&prober, "example.com", 3, Duration::from_secs(1),
			&Cancel::never(), |_, _| {},
		).await;

		// Two delays plus three 1 ms probes, no trailing delay
		let elapsed = start.elapsed();
		assert!(elapsed >= Duration::from_millis(2003), "elapsed {:?}", elapsed);
		assert!(elapsed < Duration::from_millis(2100), "elapsed {:?}", elapsed);
	}

	#[tokio::test(start_paused = true)]
	async fn test_timeouts_are_recorded_not_retried() {
		let resolver = ScriptedResolver::new(vec![Scripted::Timeout]);
		let prober = Prober::new(&resolver, &AnalyzerConfig::default());

		let samples = run_samples(
			&prober, "example.com", 3, Duration::ZERO,
			&Cancel::never(), |_, _| {},
		).await;

		assert_eq!(resolver.calls(), 3);
		assert!(samples.iter().all(|s| s.classification() == Classification::Error));
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancel_between_iterations_keeps_partial_run() {
		let resolver = ScriptedResolver::new(vec![Scripted::Answer(1.0)]);
		let prober = Prober::new(&resolver, &AnalyzerConfig::default());
		let (handle, cancel) = cancel_pair();

		let samples = run_samples(
			&prober, "example.com", 10, Duration::from_secs(1),
			&cancel, |i, _| {
				if i == 2 {
					handle.cancel();
				}
			},
		).await;

		assert_eq!(samples.len(), 3);
		assert_eq!(resolver.calls(), 3);
	}

	#[tokio::test]
	async fn test_already_cancelled_issues_no_probe() {
		let resolver = ScriptedResolver::new(vec![Scripted::Answer(1.0)]);
		let prober = Prober::new(&resolver, &AnalyzerConfig::default());
		let (handle, cancel) = cancel_pair();
		handle.cancel();

		let samples = run_samples(
			&prober, "example.com", 5, Duration::ZERO,
			&cancel, |_, _| {},
		).await;

		assert!(samples.is_empty());
		assert_eq!(resolver.calls(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancel_interrupts_sleep() {
		let (handle, cancel) = cancel_pair();
		let start = Instant::now();
		let sleeper = tokio::spawn(async move { cancel.sleep(Duration::from_secs(60)).await });
		tokio::time::sleep(Duration::from_secs(1)).await;
		handle.cancel();

		assert!(!sleeper.await.unwrap());
		assert!(start.elapsed() < Duration::from_secs(60));
	}

	#[tokio::test(start_paused = true)]
	async fn test_never_cancelled_sleep_completes() {
		assert!(Cancel::never().sleep(Duration::from_secs(5)).await);
	}
}
