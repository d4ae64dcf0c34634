use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::dns::Resolve;
use crate::transport::{AnalyzerConfig, ProbeTarget, QueryType};

/// Probes answered faster than this are assumed to come from the local cache.
///
/// Latency is measured around the whole resolve call, so this is a
/// heuristic: a loopback cache hit needs no upstream round trip.
pub const CACHE_LATENCY_THRESHOLD_MS: f64 = 5.0;

/// Error text recorded for a probe that hit its timeout
pub const TIMEOUT_ERROR_TEXT: &str = "Timeout";

/// How a single probe was interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
	Cached,
	Fresh,
	Error,
}

impl fmt::Display for Classification {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let label = match self {
			Classification::Cached => "CACHED",
			Classification::Fresh => "FRESH",
			Classification::Error => "ERROR",
		};
		f.write_str(label)
	}
}

/// Classify one probe from its latency and error text.
///
/// Any error wins over latency, so a timeout sentinel is never read as a hit.
pub fn classify(elapsed_ms: f64, error_text: &str) -> Classification {
	if !error_text.is_empty() {
		Classification::Error
	} else if elapsed_ms < CACHE_LATENCY_THRESHOLD_MS {
		Classification::Cached
	} else {
		Classification::Fresh
	}
}

/// One classified query result
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSample {
	pub elapsed_ms: f64,
	/// Raw resolved value; empty when the resolver gave no answer
	pub answer: String,
	pub error_text: String,
}

impl ProbeSample {
	pub fn new(elapsed_ms: f64, answer: impl Into<String>, error_text: impl Into<String>) -> Self {
		ProbeSample {
			elapsed_ms: elapsed_ms.max(0.0),
			answer: answer.into(),
			error_text: error_text.into(),
		}
	}

	/// Sample recorded when a probe exceeds its timeout
	pub fn timeout(timeout: Duration) -> Self {
		ProbeSample::new(timeout.as_secs_f64() * 1000.0, "", TIMEOUT_ERROR_TEXT)
	}

	pub fn classification(&self) -> Classification {
		classify(self.elapsed_ms, &self.error_text)
	}

	pub fn has_answer(&self) -> bool {
		!self.answer.is_empty()
	}
}

/// Issue one query and classify the result.
///
/// Never fails: timeouts and resolver errors become `Error` samples.
pub async fn probe<R: Resolve + ?Sized>(
	resolver: &R,
	domain: &str,
	query_type: QueryType,
	target: &ProbeTarget,
	timeout: Duration,
) -> ProbeSample {
	let call = resolver.resolve(domain, query_type, target.addr, timeout);
	let sample = match tokio::time::timeout(timeout, call).await {
		Ok(outcome) if outcome.timed_out => ProbeSample::timeout(timeout),
		Ok(outcome) => ProbeSample::new(
			outcome.elapsed.as_secs_f64() * 1000.0,
			outcome.answer.unwrap_or_default(),
			outcome.error.unwrap_or_default(),
		),
		Err(_) => ProbeSample::timeout(timeout),
	};

	debug!(
		domain,
		server = %target.addr,
		elapsed_ms = sample.elapsed_ms,
		classification = %sample.classification(),
		"probe complete"
	);
	sample
}

/// A resolver bound to the server, record type and timeout every probe uses
pub struct Prober<'a> {
	pub resolver: &'a dyn Resolve,
	pub target: ProbeTarget,
	pub query_type: QueryType,
	pub timeout: Duration,
}

impl<'a> Prober<'a> {
	pub fn new(resolver: &'a dyn Resolve, config: &AnalyzerConfig) -> Self {
		Prober {
			resolver,
			target: config.target.clone(),
			query_type: config.query_type,
			timeout: config.timeout,
		}
	}

	pub async fn probe(&self, domain: &str) -> ProbeSample {
		probe(self.resolver, domain, self.query_type, &self.target, self.timeout).await
	}
}
