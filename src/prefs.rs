use std::process::Command;

use tracing::debug;

use crate::error::{AnalyzerError, Result};

/// Preference domain holding the resolver's cache settings
pub const PREFERENCE_DOMAIN: &str = "com.dnshield.app";

/// Administrator-managed cache switch; takes precedence when present
pub const KEY_ENABLE_DNS_CACHE: &str = "EnableDNSCache";
/// User-adjustable cache switch, toggled by the comparison run
pub const KEY_USER_CAN_ADJUST_CACHE: &str = "UserCanAdjustCache";
/// Free-form per-domain cache rules
pub const KEY_DOMAIN_CACHE_RULES: &str = "DomainCacheRules";

/// Host-side configuration store.
///
/// A missing key reads as `Ok(None)`; only store failures are errors.
pub trait ConfigStore: Send + Sync {
	fn read(&self, key: &str) -> Result<Option<String>>;
	fn write_bool(&self, key: &str, value: bool) -> Result<()>;
	fn remove(&self, key: &str) -> Result<()>;
}

/// Store backed by the macOS `defaults` tool
#[derive(Debug, Clone)]
pub struct DefaultsStore {
	domain: String,
}

impl Default for DefaultsStore {
	fn default() -> Self {
		DefaultsStore::new(PREFERENCE_DOMAIN)
	}
}

impl DefaultsStore {
	pub fn new(domain: impl Into<String>) -> Self {
		DefaultsStore { domain: domain.into() }
	}

	fn run(&self, args: &[&str]) -> std::io::Result<std::process::Output> {
		debug!(domain = %self.domain, ?args, "invoking defaults");
		Command::new("defaults").args(args).output()
	}
}

impl ConfigStore for DefaultsStore {
	fn read(&self, key: &str) -> Result<Option<String>> {
		let output = self.run(&["read", &self.domain, key])
			.map_err(|e| AnalyzerError::ConfigRead {
				key: key.to_string(),
				reason: e.to_string(),
			})?;

		if output.status.success() {
			return Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()));
		}

		let stderr = String::from_utf8_lossy(&output.stderr);
		if stderr.contains("does not exist") {
			Ok(None)
		} else {
			Err(AnalyzerError::ConfigRead {
				key: key.to_string(),
				reason: stderr.trim().to_string(),
			})
		}
	}

	fn write_bool(&self, key: &str, value: bool) -> Result<()> {
		let rendered = if value { "YES" } else { "NO" };
		let output = self.run(&["write", &self.domain, key, "-bool", rendered])
			.map_err(|e| AnalyzerError::ConfigWrite {
				key: key.to_string(),
				reason: e.to_string(),
			})?;

		if output.status.success() {
			Ok(())
		} else {
			Err(AnalyzerError::ConfigWrite {
				key: key.to_string(),
				reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
			})
		}
	}

	fn remove(&self, key: &str) -> Result<()> {
		let output = self.run(&["delete", &self.domain, key])
			.map_err(|e| AnalyzerError::ConfigWrite {
				key: key.to_string(),
				reason: e.to_string(),
			})?;

		let stderr = String::from_utf8_lossy(&output.stderr);
		if output.status.success() || stderr.contains("does not exist") {
			Ok(())
		} else {
			Err(AnalyzerError::ConfigWrite {
				key: key.to_string(),
				reason: stderr.trim().to_string(),
			})
		}
	}
}

/// Interpret a stored value as a boolean.
///
/// `defaults` prints booleans as `1`/`0`; plist-style spellings are accepted too.
pub fn parse_bool(value: &str) -> Option<bool> {
	match value.trim().to_ascii_lowercase().as_str() {
		"1" | "yes" | "true" => Some(true),
		"0" | "no" | "false" => Some(false),
		_ => None,
	}
}

/// Describe whether caching is enabled, for display.
///
/// A managed `EnableDNSCache` value wins; otherwise the user switch is
/// reported, defaulting to `0`.
pub fn cache_status(store: &dyn ConfigStore) -> String {
	if let Ok(Some(managed)) = store.read(KEY_ENABLE_DNS_CACHE) {
		return format!("{} (managed)", managed);
	}
	match store.read(KEY_USER_CAN_ADJUST_CACHE) {
		Ok(Some(value)) => value,
		_ => "0".to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testutil::MemoryStore;

	#[test]
	fn test_parse_bool_spellings() {
		assert_eq!(parse_bool("1"), Some(true));
		assert_eq!(parse_bool(" YES\n"), Some(true));
		assert_eq!(parse_bool("false"), Some(false));
		assert_eq!(parse_bool("0"), Some(false));
		assert_eq!(parse_bool("maybe"), None);
	}

	#[test]
	fn test_cache_status_prefers_managed_value() {
		let store = MemoryStore::with(&[
			(KEY_ENABLE_DNS_CACHE, "1"),
			(KEY_USER_CAN_ADJUST_CACHE, "0"),
		]);
		assert_eq!(cache_status(&store), "1 (managed)");
	}

	#[test]
	fn test_cache_status_falls_back_to_user_switch() {
		let store = MemoryStore::with(&[(KEY_USER_CAN_ADJUST_CACHE, "1")]);
		assert_eq!(cache_status(&store), "1");
	}

	#[test]
	fn test_cache_status_defaults_to_disabled() {
		assert_eq!(cache_status(&MemoryStore::default()), "0");
		assert_eq!(cache_status(&MemoryStore::failing_reads()), "0");
	}
}
