use crate::error::{AnalyzerError, Result};

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Validate and normalize a domain argument.
///
/// Accepts an optional trailing dot and returns the name without it.
/// Labels may contain letters, digits, hyphens and underscores; a
/// leading `*` label is rejected since a wildcard cannot be queried.
pub fn validate_domain(input: &str) -> Result<String> {
	let invalid = |reason: &str| AnalyzerError::InvalidDomain {
		domain: input.to_string(),
		reason: reason.to_string(),
	};

	let trimmed = input.trim();
	let name = trimmed.strip_suffix('.').unwrap_or(trimmed);
	if name.is_empty() {
		return Err(invalid("domain is empty"));
	}
	if name.len() > MAX_NAME_LEN {
		return Err(invalid("domain exceeds 253 characters"));
	}

	for label in name.split('.') {
		if label.is_empty() {
			return Err(invalid("empty label"));
		}
		if label.len() > MAX_LABEL_LEN {
			return Err(invalid("label exceeds 63 characters"));
		}
		if label.starts_with('-') || label.ends_with('-') {
			return Err(invalid("label starts or ends with a hyphen"));
		}
		if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
			return Err(invalid("label contains invalid characters"));
		}
	}

	Ok(name.to_ascii_lowercase())
}
