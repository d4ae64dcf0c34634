mod cli;
mod compare;
mod dns;
mod domain;
mod error;
mod monitor;
mod output;
mod prefs;
mod probe;
mod rules;
mod sampler;
mod stats;
mod transport;

#[cfg(test)]
mod testutil;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::dns::UdpResolver;
use crate::monitor::{MonitorSettings, TtlMonitor};
use crate::prefs::{cache_status, DefaultsStore};
use crate::probe::Prober;
use crate::sampler::{cancel_pair, run_samples, Cancel};
use crate::stats::summarize;
use crate::transport::{AnalyzerConfig, ProbeTarget};

/// Initialize logging to stderr so the report on stdout stays clean
fn init_logging(verbose: bool) {
	let fallback = if verbose {
		"dns_cache_probe=debug"
	} else {
		"dns_cache_probe=warn"
	};
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
		.with_writer(std::io::stderr)
		.with_target(false)
		.init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	init_logging(cli.verbose);

	let domain = domain::validate_domain(&cli.domain)?;
	let config = AnalyzerConfig {
		target: ProbeTarget::from_env()?,
		..AnalyzerConfig::default()
	};
	let store = DefaultsStore::default();
	let resolver = UdpResolver;
	let prober = Prober::new(&resolver, &config);

	// Ctrl-C stops at the next iteration boundary; partial results still print
	let (handle, cancel) = cancel_pair();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			warn!("interrupt received, finishing current probe");
			handle.cancel();
		}
	});

	info!(domain = %domain, command = ?cli.command, server = %config.target.addr, "starting");
	match cli.command {
		Command::Test => run_test(&prober, &store, &domain, &config, &cancel).await,
		Command::Ttl => run_ttl(&prober, &store, &domain, &config, &cancel).await,
		Command::Compare => {
			let comparison = compare::compare_enabled_vs_disabled(
				&prober, &store, &domain, &config, &cancel,
				|event| output::print_compare_event(&event, config.propagation_pause),
			)
			.await
			.context("cache comparison failed")?;
			output::print_comparison(&comparison);
		}
	}

	Ok(())
}

async fn run_test(
	prober: &Prober<'_>,
	store: &DefaultsStore,
	domain: &str,
	config: &AnalyzerConfig,
	cancel: &Cancel,
) {
	let status = cache_status(store);
	let rule = rules::resolve_rule(store, domain);
	output::print_test_header(domain, &status, rule.as_ref(), config, config.test_iterations);

	let samples = run_samples(
		prober, domain, config.test_iterations, config.test_delay, cancel,
		output::print_sample_line,
	).await;
	output::print_summary(summarize(&samples).as_ref());
}

async fn run_ttl(
	prober: &Prober<'_>,
	store: &DefaultsStore,
	domain: &str,
	config: &AnalyzerConfig,
	cancel: &Cancel,
) {
	let expected_ttl = rules::resolve_rule(store, domain)
		.map(|rule| rule.ttl_or_default())
		.unwrap_or(rules::DEFAULT_TTL_SECONDS);
	let settings = MonitorSettings::new(expected_ttl, config.monitor_cadence);
	output::print_monitor_header(domain, &settings);

	let report = TtlMonitor::new(settings)
		.run(prober, domain, cancel, |event| output::print_monitor_event(&event))
		.await;
	output::print_monitor_summary(&report);
}
