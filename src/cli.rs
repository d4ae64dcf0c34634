use clap::{Parser, ValueEnum};

/// DNS cache behavior analyzer
#[derive(Parser, Debug)]
#[command(name = "dns-cache-probe")]
#[command(about = "Infer DNS cache behavior for a domain from response latency")]
pub struct Cli {
	/// Domain to probe (e.g. github.com)
	pub domain: String,

	/// Analysis to run
	#[arg(value_enum, default_value_t = Command::Test)]
	pub command: Command,

	/// Show diagnostic logging on stderr
	#[arg(short = 'v', long = "verbose")]
	pub verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
	/// Quick cache test
	Test,
	/// Monitor TTL expiration
	Ttl,
	/// Compare cached vs uncached performance
	Compare,
}
