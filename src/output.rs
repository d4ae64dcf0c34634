use std::time::Duration;

use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};

use crate::compare::{CompareEvent, Comparison, SampleRun};
use crate::monitor::{MonitorEvent, MonitorSettings, TtlReport, EXPIRY_WINDOW};
use crate::probe::{Classification, ProbeSample};
use crate::rules::{CacheRule, DEFAULT_TTL_SECONDS};
use crate::stats::{CacheVerdict, Summary};
use crate::transport::AnalyzerConfig;

/// Print the header of a quick cache test.
pub fn print_test_header(
	domain: &str,
	cache_status: &str,
	rule: Option<&CacheRule>,
	config: &AnalyzerConfig,
	iterations: u32,
) {
	println!("\nTesting DNS cache for: {}", domain);
	println!("==================================================");
	println!("Server:         {} ({})", config.target.label, config.target.addr);
	println!("Cache Enabled:  {}", cache_status);
	match rule {
		Some(rule) => println!("Cache Rule:     {}", rule),
		None => println!("Cache Rule:     Default ({}s TTL)", DEFAULT_TTL_SECONDS),
	}
	println!(
		"\nPerforming {} {} queries with {:.1}s delay...",
		iterations, config.query_type, config.test_delay.as_secs_f64(),
	);
}

/// One per-sample report line: index, latency, classification, answer marker.
pub fn format_sample_line(index: usize, sample: &ProbeSample) -> String {
	let status = if sample.has_answer() { "✓" } else { "✗" };
	let mut line = format!(
		"Query {:2}: {:7.2}ms [{}] {}",
		index + 1, sample.elapsed_ms, sample.classification(), status,
	);
	if !sample.error_text.is_empty() {
		line.push_str(&format!(" ({})", sample.error_text));
	}
	line
}

pub fn print_sample_line(index: usize, sample: &ProbeSample) {
	println!("{}", format_sample_line(index, sample));
}

fn verdict_line(verdict: CacheVerdict) -> String {
	let marker = match verdict {
		CacheVerdict::Confirmed => "✓",
		CacheVerdict::NotDetected => "✗",
		CacheVerdict::Inconsistent => "?",
	};
	format!("{} {}", marker, verdict)
}

fn ms(value: f64) -> String {
	format!("{:.2} ms", value)
}

/// Print min/max/mean/median and the caching verdict.
pub fn print_summary(summary: Option<&Summary>) {
	let Some(summary) = summary else {
		println!("\nNo samples collected.");
		return;
	};

	let mut table = Table::new();
	table.load_preset(UTF8_FULL);
	table.set_content_arrangement(ContentArrangement::Dynamic);
	table.set_header(vec!["Samples", "Min", "Max", "Mean", "Median"]);
	table.add_row(vec![
		summary.count.to_string(),
		ms(summary.min_ms),
		ms(summary.max_ms),
		ms(summary.mean_ms),
		ms(summary.median_ms),
	]);

	println!("\nStatistics");
	println!("{table}");
	if let Some(verdict) = summary.verdict {
		println!("\n{}", verdict_line(verdict));
	}
}

pub fn print_monitor_header(domain: &str, settings: &MonitorSettings) {
	println!("\nMonitoring cache TTL for {}", domain);
	println!(
		"Expected TTL: {}s, Test duration: {}s",
		settings.expected_ttl.as_secs(), settings.duration.as_secs(),
	);
	println!("==================================================");
}

pub fn print_monitor_event(event: &MonitorEvent<'_>) {
	match event {
		MonitorEvent::Primed(sample) => {
			println!("Initial query: {:.2}ms [{}]", sample.elapsed_ms, sample.classification());
		}
		MonitorEvent::ExpiryDetected { elapsed_since_start, expected_ttl } => {
			println!(
				"\n>>> Cache expired at ~{:.0}s (expected: {}s)",
				elapsed_since_start, expected_ttl.as_secs(),
			);
		}
		MonitorEvent::Observed { observation, cached, total } => {
			let near = if observation.is_near_expected_expiry { " *" } else { "" };
			println!(
				"[{:6.1}s] {:7.2}ms - {}{}  ({}/{} cached)",
				observation.elapsed_since_start,
				observation.sample.elapsed_ms,
				observation.sample.classification(),
				near, cached, total,
			);
		}
	}
}

pub fn print_monitor_summary(report: &TtlReport) {
	if let Some(priming) = &report.priming {
		println!("\nInitial query took {:.2}ms", priming.elapsed_ms);
	}
	println!(
		"Summary: {}/{} queries were cached over {}s ({:?})",
		report.cached_count, report.total_count, report.duration.as_secs(), report.final_state,
	);
	println!(
		"{} queries fell within {}s of the expected TTL",
		report.near_expiry_count(), EXPIRY_WINDOW.as_secs(),
	);
	match report.deviation_secs() {
		Some(deviation) => println!(
			"Detected expiry deviates from expected TTL by {:+.0}s",
			deviation,
		),
		None => println!("No expiry detected near the expected TTL"),
	}
}

pub fn print_compare_event(event: &CompareEvent<'_>, propagation_pause: Duration) {
	match event {
		CompareEvent::PhaseStarted(phase) => {
			println!("\nTesting with {}...", phase);
		}
		CompareEvent::Sample(_, index, sample) => print_sample_line(*index, sample),
		CompareEvent::PhaseFinished(phase, run) => {
			println!("\nResults with {}:", phase);
			print_summary(run.summary.as_ref());
		}
		CompareEvent::CacheDisabled => {
			println!("\n==================================================");
			println!(
				"Disabling cache for comparison (waiting {}s)...",
				propagation_pause.as_secs(),
			);
		}
		CompareEvent::CacheRestored => println!("\nRestored previous cache setting."),
	}
}

fn cached_share(run: &SampleRun) -> String {
	let cached = run.samples.iter()
		.filter(|s| s.classification() == Classification::Cached)
		.count();
	format!("{}/{}", cached, run.samples.len())
}

/// Side-by-side summary of both comparison passes.
pub fn comparison_table(comparison: &Comparison) -> Table {
	let mut table = Table::new();
	table.load_preset(UTF8_FULL);
	table.set_content_arrangement(ContentArrangement::Dynamic);
	table.set_header(vec!["Run", "Cached", "Min", "Max", "Mean", "Median", "Verdict"]);

	for (label, run) in [("Cache enabled", &comparison.enabled), ("Cache disabled", &comparison.disabled)] {
		let mut row = vec![label.to_string(), cached_share(run)];
		match &run.summary {
			Some(s) => {
				row.extend([ms(s.min_ms), ms(s.max_ms), ms(s.mean_ms), ms(s.median_ms)]);
				row.push(s.verdict.map(|v| format!("{:?}", v)).unwrap_or_else(|| "-".to_string()));
			}
			None => row.extend(std::iter::repeat("-".to_string()).take(5)),
		}
		table.add_row(row);
	}
	table
}

pub fn print_comparison(comparison: &Comparison) {
	println!("\nComparison");
	println!("==========\n");
	println!("{}", comparison_table(comparison));
}
