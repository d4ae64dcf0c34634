use std::fmt;

use crate::probe::ProbeSample;

/// Later probes must be faster than this fraction of the first to confirm caching
pub const CONFIRMED_RATIO: f64 = 0.5;

/// Probes slower than this are treated as upstream resolutions
pub const FRESH_FLOOR_MS: f64 = 10.0;

/// Aggregate judgment about whether caching was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheVerdict {
	Confirmed,
	NotDetected,
	Inconsistent,
}

impl fmt::Display for CacheVerdict {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let text = match self {
			CacheVerdict::Confirmed => "Caching appears to be working",
			CacheVerdict::NotDetected => "No caching detected - all queries appear fresh",
			CacheVerdict::Inconsistent => "Inconsistent caching behavior detected",
		};
		f.write_str(text)
	}
}

/// Summary statistics for one sample sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
	pub count: usize,
	pub min_ms: f64,
	pub max_ms: f64,
	pub mean_ms: f64,
	pub median_ms: f64,
	/// `None` when fewer than two samples were collected
	pub verdict: Option<CacheVerdict>,
}

/// Calculate the arithmetic mean of a slice of values.
pub fn mean(values: &[f64]) -> Option<f64> {
	if values.is_empty() {
		return None;
	}
	let sum: f64 = values.iter().sum();
	Some(sum / values.len() as f64)
}

/// Calculate the median, averaging the two middle values for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
	if values.is_empty() {
		return None;
	}
	let mut sorted = values.to_vec();
	sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
	let mid = sorted.len() / 2;
	if sorted.len() % 2 == 0 {
		Some((sorted[mid - 1] + sorted[mid]) / 2.0)
	} else {
		Some(sorted[mid])
	}
}

/// Judge a latency sequence.
///
/// Every later probe is compared with the first one only, not with a
/// rolling baseline, so a slow outlier in first position dominates.
pub fn verdict(latencies_ms: &[f64]) -> Option<CacheVerdict> {
	let (first, rest) = latencies_ms.split_first()?;
	if rest.is_empty() {
		return None;
	}
	if rest.iter().all(|&t| t < first * CONFIRMED_RATIO) {
		Some(CacheVerdict::Confirmed)
	} else if latencies_ms.iter().all(|&t| t > FRESH_FLOOR_MS) {
		Some(CacheVerdict::NotDetected)
	} else {
		Some(CacheVerdict::Inconsistent)
	}
}

/// Summarize a completed sample sequence.
///
/// Error samples count with their recorded latency. Returns `None` for an
/// empty sequence.
pub fn summarize(samples: &[ProbeSample]) -> Option<Summary> {
	let latencies: Vec<f64> = samples.iter().map(|s| s.elapsed_ms).collect();
	let min_ms = latencies.iter().copied().reduce(f64::min)?;
	let max_ms = latencies.iter().copied().reduce(f64::max)?;

	Some(Summary {
		count: latencies.len(),
		min_ms,
		max_ms,
		mean_ms: mean(&latencies)?,
		median_ms: median(&latencies)?,
		verdict: verdict(&latencies),
	})
}
