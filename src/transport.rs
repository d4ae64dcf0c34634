use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Port assumed when a server address names none
pub const DNS_PORT: u16 = 53;

/// Environment variable overriding the probed server
pub const SERVER_ENV: &str = "DNS_CACHE_PROBE_SERVER";

/// The resolver being probed
#[derive(Debug, Clone)]
pub struct ProbeTarget {
	pub label: String,
	pub addr: SocketAddr,
}

impl ProbeTarget {
	pub fn new(addr: SocketAddr) -> Self {
		ProbeTarget { label: addr.ip().to_string(), addr }
	}

	/// The `DNS_CACHE_PROBE_SERVER` override if set, else the local resolver.
	pub fn from_env() -> Result<Self> {
		match std::env::var(SERVER_ENV) {
			Ok(value) => value.parse::<ProbeTarget>().with_context(|| format!("bad {}", SERVER_ENV)),
			Err(_) => Ok(ProbeTarget::default()),
		}
	}
}

impl Default for ProbeTarget {
	fn default() -> Self {
		ProbeTarget::new(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DNS_PORT))
	}
}

/// Accepts `ip`, `ip:port`, `[ipv6]` and `[ipv6]:port`.
impl FromStr for ProbeTarget {
	type Err = anyhow::Error;

	fn from_str(s: &str) -> Result<Self> {
		let s = s.trim();
		if s.is_empty() {
			bail!("empty server address");
		}
		if let Ok(addr) = s.parse::<SocketAddr>() {
			return Ok(ProbeTarget::new(addr));
		}
		let host = s.strip_prefix('[')
			.and_then(|rest| rest.strip_suffix(']'))
			.unwrap_or(s);
		let ip: IpAddr = host.parse()
			.with_context(|| format!("invalid server address '{}'", s))?;
		Ok(ProbeTarget::new(SocketAddr::new(ip, DNS_PORT)))
	}
}

/// DNS record type to query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryType {
	#[default]
	A,
	AAAA,
	CNAME,
	MX,
	NS,
	TXT,
}

impl fmt::Display for QueryType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			QueryType::A => "A",
			QueryType::AAAA => "AAAA",
			QueryType::CNAME => "CNAME",
			QueryType::MX => "MX",
			QueryType::NS => "NS",
			QueryType::TXT => "TXT",
		};
		f.write_str(name)
	}
}

/// Raw result of one resolve call, before classification.
///
/// `elapsed` is wall-clock time around the whole call, not a
/// resolver-reported duration.
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
	pub elapsed: Duration,
	pub answer: Option<String>,
	pub error: Option<String>,
	pub timed_out: bool,
}

impl ResolveOutcome {
	pub fn answered(elapsed: Duration, answer: Option<String>) -> Self {
		ResolveOutcome { elapsed, answer, error: None, timed_out: false }
	}

	pub fn failed(elapsed: Duration, error: impl Into<String>) -> Self {
		ResolveOutcome { elapsed, answer: None, error: Some(error.into()), timed_out: false }
	}

	pub fn timeout(elapsed: Duration) -> Self {
		ResolveOutcome {
			elapsed,
			answer: None,
			error: Some("Timeout".to_string()),
			timed_out: true,
		}
	}
}

/// Analyzer configuration
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
	pub target: ProbeTarget,
	pub query_type: QueryType,
	pub timeout: Duration,
	pub test_iterations: u32,
	pub test_delay: Duration,
	pub compare_iterations: u32,
	pub propagation_pause: Duration,
	pub monitor_cadence: Duration,
}

impl Default for AnalyzerConfig {
	fn default() -> Self {
		AnalyzerConfig {
			target: ProbeTarget::default(),
			query_type: QueryType::A,
			timeout: Duration::from_secs(5),
			test_iterations: 10,
			test_delay: Duration::from_millis(100),
			compare_iterations: 5,
			propagation_pause: Duration::from_secs(2),
			monitor_cadence: Duration::from_secs(10),
		}
	}
}
