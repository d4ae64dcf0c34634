//! Test doubles for the resolve and configuration primitives.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::dns::Resolve;
use crate::error::{AnalyzerError, Result};
use crate::prefs::ConfigStore;
use crate::transport::{QueryType, ResolveOutcome};

/// One scripted resolver reaction
#[derive(Debug, Clone)]
pub enum Scripted {
	/// Answer after the given latency in milliseconds
	Answer(f64),
	/// Fail after the given latency with the given message
	Fail(f64, &'static str),
	/// Report a timeout immediately
	Timeout,
	/// Never complete
	Hang,
}

type Script = Box<dyn Fn(usize) -> Scripted + Send + Sync>;

/// Resolver that replays a script indexed by call number.
///
/// Latencies are slept on the tokio clock, so paused-time tests see
/// them advance virtual time.
pub struct ScriptedResolver {
	script: Script,
	calls: AtomicUsize,
}

impl ScriptedResolver {
	/// Replay `steps` in order, repeating the last one when exhausted
	pub fn new(steps: Vec<Scripted>) -> Self {
		let last = steps.last().cloned().unwrap_or(Scripted::Answer(1.0));
		ScriptedResolver::from_fn(move |i| steps.get(i).cloned().unwrap_or_else(|| last.clone()))
	}

	pub fn from_fn(f: impl Fn(usize) -> Scripted + Send + Sync + 'static) -> Self {
		ScriptedResolver {
			script: Box::new(f),
			calls: AtomicUsize::new(0),
		}
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Resolve for ScriptedResolver {
	async fn resolve(
		&self,
		_domain: &str,
		_query_type: QueryType,
		_server: SocketAddr,
		timeout: Duration,
	) -> ResolveOutcome {
		let index = self.calls.fetch_add(1, Ordering::SeqCst);
		match (self.script)(index) {
			Scripted::Answer(ms) => {
				let elapsed = Duration::from_micros((ms * 1000.0).round() as u64);
				tokio::time::sleep(elapsed).await;
				ResolveOutcome::answered(elapsed, Some("93.184.216.34".to_string()))
			}
			Scripted::Fail(ms, message) => {
				let elapsed = Duration::from_micros((ms * 1000.0).round() as u64);
				tokio::time::sleep(elapsed).await;
				ResolveOutcome::failed(elapsed, message)
			}
			Scripted::Timeout => ResolveOutcome::timeout(timeout),
			Scripted::Hang => std::future::pending::<ResolveOutcome>().await,
		}
	}
}

/// In-memory configuration store with injectable write failures
#[derive(Default)]
pub struct MemoryStore {
	values: Mutex<HashMap<String, String>>,
	writes: Mutex<Vec<(String, Option<bool>)>>,
	fail_writes_of: Mutex<Option<bool>>,
	fail_reads: bool,
}

impl MemoryStore {
	pub fn with(entries: &[(&str, &str)]) -> Self {
		let store = MemoryStore::default();
		{
			let mut values = store.values.lock().unwrap();
			for (k, v) in entries {
				values.insert(k.to_string(), v.to_string());
			}
		}
		store
	}

	pub fn failing_reads() -> Self {
		MemoryStore {
			fail_reads: true,
			..MemoryStore::default()
		}
	}

	/// Make every write of `value` fail
	pub fn fail_writes_of(&self, value: bool) {
		*self.fail_writes_of.lock().unwrap() = Some(value);
	}

	pub fn get(&self, key: &str) -> Option<String> {
		self.values.lock().unwrap().get(key).cloned()
	}

	pub fn set(&self, key: &str, value: &str) {
		self.values.lock().unwrap().insert(key.to_string(), value.to_string());
	}

	/// Every write and removal attempted, `None` marking a removal
	pub fn writes(&self) -> Vec<(String, Option<bool>)> {
		self.writes.lock().unwrap().clone()
	}
}

impl ConfigStore for MemoryStore {
	fn read(&self, key: &str) -> Result<Option<String>> {
		if self.fail_reads {
			return Err(AnalyzerError::ConfigRead {
				key: key.to_string(),
				reason: "store unavailable".to_string(),
			});
		}
		Ok(self.get(key))
	}

	fn write_bool(&self, key: &str, value: bool) -> Result<()> {
		self.writes.lock().unwrap().push((key.to_string(), Some(value)));
		if *self.fail_writes_of.lock().unwrap() == Some(value) {
			return Err(AnalyzerError::ConfigWrite {
				key: key.to_string(),
				reason: "injected failure".to_string(),
			});
		}
		let rendered = if value { "1" } else { "0" };
		self.set(key, rendered);
		Ok(())
	}

	fn remove(&self, key: &str) -> Result<()> {
		self.writes.lock().unwrap().push((key.to_string(), None));
		self.values.lock().unwrap().remove(key);
		Ok(())
	}
}
