use thiserror::Error;

/// Result type alias for analyzer operations
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Failures that cross component boundaries.
///
/// Probe failures are not here: timeouts and resolver errors are
/// recorded as `Error` samples instead.
#[derive(Error, Debug)]
pub enum AnalyzerError {
	/// Domain argument rejected before any probing began
	#[error("invalid domain '{domain}': {reason}")]
	InvalidDomain {
		domain: String,
		reason: String,
	},

	/// Configuration store could not be read
	#[error("failed to read configuration key '{key}': {reason}")]
	ConfigRead {
		key: String,
		reason: String,
	},

	/// Configuration store could not be written
	#[error("failed to write configuration key '{key}': {reason}")]
	ConfigWrite {
		key: String,
		reason: String,
	},
}
