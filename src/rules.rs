use std::fmt;

use tracing::debug;

use crate::prefs::{ConfigStore, KEY_DOMAIN_CACHE_RULES};

/// TTL assumed when no rule sets one
pub const DEFAULT_TTL_SECONDS: u64 = 300;

/// Lines examined for `action`/`ttl` fields, counting the matching line
const RULE_WINDOW_LINES: usize = 5;

/// Cache policy scraped for one domain. Either field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheRule {
	pub action: Option<String>,
	pub ttl_seconds: Option<u64>,
}

impl CacheRule {
	pub fn ttl_or_default(&self) -> u64 {
		self.ttl_seconds.unwrap_or(DEFAULT_TTL_SECONDS)
	}
}

impl fmt::Display for CacheRule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut parts = Vec::new();
		if let Some(action) = &self.action {
			parts.push(format!("action={}", action));
		}
		if let Some(ttl) = self.ttl_seconds {
			parts.push(format!("ttl={}s", ttl));
		}
		if parts.is_empty() {
			f.write_str("(no fields)")
		} else {
			f.write_str(&parts.join(", "))
		}
	}
}

/// Wildcard pattern covering the domain's siblings: `a.b.com` -> `*.b.com`
fn wildcard_pattern(domain: &str) -> String {
	let suffix = domain.split_once('.').map(|(_, rest)| rest).unwrap_or(domain);
	format!("*.{}", suffix)
}

/// Value after the first `=`, stripped of spaces, quotes and semicolons
fn field_value(line: &str) -> Option<&str> {
	let (_, value) = line.split_once('=')?;
	Some(value.trim_matches(|c: char| c.is_whitespace() || c == '"' || c == ';'))
}

/// Extract the rule for `domain` from raw rule text.
///
/// Scans lines in order and takes the first one naming the domain or its
/// wildcard parent (ignoring ASCII case), then reads fields from that line and the next four.
/// The match is textual, so reordered or longer blocks are not understood.
/// Returns `None` when nothing matches or a `ttl` value is not an integer.
pub fn parse_rule(text: &str, domain: &str) -> Option<CacheRule> {
	let domain = domain.to_ascii_lowercase();
	let wildcard = wildcard_pattern(&domain);
	let lines: Vec<&str> = text.lines().collect();

	let start = lines.iter().position(|line| {
		let line = line.to_ascii_lowercase();
		line.contains(&domain) || line.contains(&wildcard)
	})?;
	let end = (start + RULE_WINDOW_LINES).min(lines.len());

	let mut rule = CacheRule::default();
	for line in &lines[start..end] {
		if line.contains("action") {
			if let Some(action) = field_value(line) {
				rule.action = Some(action.to_string());
			}
		} else if line.contains("ttl") {
			let Some(value) = field_value(line) else {
				continue;
			};
			match value.parse::<u64>() {
				Ok(ttl) => rule.ttl_seconds = Some(ttl),
				Err(e) => {
					debug!(domain = %domain, value, error = %e, "unparseable ttl in cache rule");
					return None;
				}
			}
		}
	}
	Some(rule)
}

/// Look up the cache rule for `domain` in the configuration store.
///
/// Advisory only: read failures and a missing key both yield `None`.
pub fn resolve_rule(store: &dyn ConfigStore, domain: &str) -> Option<CacheRule> {
	let text = match store.read(KEY_DOMAIN_CACHE_RULES) {
		Ok(Some(text)) => text,
		Ok(None) => return None,
		Err(e) => {
			debug!(domain, error = %e, "cache rules unavailable");
			return None;
		}
	};
	parse_rule(&text, domain)
}
