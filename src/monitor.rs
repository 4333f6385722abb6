use std::sync::Arc;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use take_once::TakeOnce;
use tokio::task::JoinHandle;
use tokio::time;

use crate::cancel::CancelToken;
use crate::cancel::StopReason;
use crate::registry::Mode;

/// Lock-free counters for one registry. Shared by every actor the registry
/// owns, so depth and throughput aggregate across the whole key space.
/// Counters survive registry shutdown; they reset only with the process.
pub struct MailboxStats {
	name: String,
	mode: Mode,
	capacity: usize,
	depth: AtomicI64,
	actors: AtomicUsize,
	processed: AtomicU64,
	failed: AtomicU64,
	dropped: AtomicU64,
	busy_us: AtomicU64,
}

impl MailboxStats {
	pub(crate) fn new(name: &str, mode: Mode, capacity: usize) -> Arc<Self> {
		Arc::new(Self {
			name: name.to_string(),
			mode,
			capacity,
			depth: AtomicI64::new(0),
			actors: AtomicUsize::new(0),
			processed: AtomicU64::new(0),
			failed: AtomicU64::new(0),
			dropped: AtomicU64::new(0),
			busy_us: AtomicU64::new(0),
		})
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn mode(&self) -> Mode {
		self.mode
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn depth(&self) -> i64 {
		self.depth.load(Ordering::Relaxed)
	}

	pub fn actors(&self) -> usize {
		self.actors.load(Ordering::Relaxed)
	}

	pub fn processed(&self) -> u64 {
		self.processed.load(Ordering::Relaxed)
	}

	pub fn failed(&self) -> u64 {
		self.failed.load(Ordering::Relaxed)
	}

	pub fn dropped(&self) -> u64 {
		self.dropped.load(Ordering::Relaxed)
	}

	pub fn snapshot(&self) -> MetricsSnapshot {
		let processed = self.processed.load(Ordering::Relaxed);
		let busy_us = self.busy_us.load(Ordering::Relaxed);
		let avg_busy = match processed {
			0 => Duration::ZERO,
			n => Duration::from_micros(busy_us / n),
		};

		MetricsSnapshot {
			name: self.name.clone(),
			mode: self.mode,
			capacity: self.capacity,
			depth: self.depth.load(Ordering::Relaxed),
			actors: self.actors.load(Ordering::Relaxed),
			processed,
			failed: self.failed.load(Ordering::Relaxed),
			dropped: self.dropped.load(Ordering::Relaxed),
			avg_busy,
		}
	}

	pub(crate) fn actor_started(&self) {
		self.actors.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn actor_stopped(&self) {
		self.actors.fetch_sub(1, Ordering::Relaxed);
	}

	pub(crate) fn msg_enqueued(&self) {
		self.depth.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn msg_dequeued(&self) {
		self.depth.fetch_sub(1, Ordering::Relaxed);
	}

	pub(crate) fn msg_processed(&self, elapsed: Duration) {
		self.processed.fetch_add(1, Ordering::Relaxed);
		self.busy_us
			.fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
	}

	pub(crate) fn msg_failed(&self) {
		self.failed.fetch_add(1, Ordering::Relaxed);
	}

	/// Returns the new total so callers can sample their warnings.
	pub(crate) fn msg_dropped(&self) -> u64 {
		self.dropped.fetch_add(1, Ordering::Relaxed) + 1
	}
}

/// Point-in-time view of one [`MailboxStats`] record.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
	pub name: String,
	pub mode: Mode,
	pub capacity: usize,
	pub depth: i64,
	pub actors: usize,
	pub processed: u64,
	pub failed: u64,
	pub dropped: u64,
	pub avg_busy: Duration,
}

impl MetricsSnapshot {
	/// Total queue slots across the registry's live actors.
	pub fn limit(&self) -> usize {
		self.capacity * self.actors.max(1)
	}

	pub fn occupancy(&self) -> f64 {
		self.depth.max(0) as f64 / self.limit().max(1) as f64
	}
}

/// Observational aggregator over registry stats.
///
/// A monitor is plain data until [`start`](Monitor::start) spawns its
/// reporter, which periodically logs every registered record, flags
/// mailboxes above 80 % occupancy, keeps flagging any registry that has
/// ever dropped a message, and mirrors the numbers through the `metrics`
/// facade. Registries attach to a monitor at build time; independent
/// monitors aggregate independently.
#[derive(Clone, Default)]
pub struct Monitor {
	inner: Arc<MonitorInner>,
}

struct MonitorInner {
	records: DashMap<String, Arc<MailboxStats>>,
	reporter: TakeOnce<JoinHandle<()>>,
	token: CancelToken,
}

impl Default for MonitorInner {
	fn default() -> Self {
		Self {
			records: DashMap::new(),
			reporter: TakeOnce::new(),
			token: CancelToken::new(),
		}
	}
}

impl Monitor {
	pub fn new() -> Self {
		Self::default()
	}

	pub(crate) fn register(&self, stats: Arc<MailboxStats>) {
		let name = stats.name().to_string();
		if self.inner.records.insert(name.clone(), stats).is_some() {
			tracing::warn!("monitor record `{name}` replaced");
		}
	}

	/// Spawns the periodic reporter. Calling this twice keeps the first
	/// reporter and logs a warning.
	pub fn start(&self, interval: Duration) {
		let inner = self.inner.clone();
		let token = self.inner.token.clone();

		let handle = tokio::spawn(async move {
			let mut ticker = time::interval(interval);

			loop {
				tokio::select! {
					_ = token.cancelled() => {
						tracing::info!("monitor stopping, final snapshot follows");
						report(&inner.records);
						break;
					}
					_ = ticker.tick() => report(&inner.records),
				}
			}
		});

		if let Err(handle) = self.inner.reporter.store(handle) {
			handle.abort();
			tracing::warn!("monitor reporter already running");
		}
	}

	/// Logs a final snapshot and shuts the reporter down.
	pub async fn stop(&self) {
		self.inner.token.cancel(StopReason::Shutdown);
		if let Some(handle) = self.inner.reporter.take() {
			let _ = handle.await;
		}
	}

	pub fn snapshot(&self, name: &str) -> Option<MetricsSnapshot> {
		self.inner.records.get(name).map(|r| r.snapshot())
	}

	pub fn snapshots(&self) -> Vec<MetricsSnapshot> {
		self.inner.records.iter().map(|r| r.snapshot()).collect()
	}
}

fn report(records: &DashMap<String, Arc<MailboxStats>>) {
	for entry in records.iter() {
		let snap = entry.value().snapshot();
		let occupancy = snap.occupancy();

		tracing::info!(
			"[monitor] `{}` ({}): {} actors, depth {}/{} ({:.1}%), processed {}, failed {}, avg {:?}",
			snap.name,
			snap.mode.as_str(),
			snap.actors,
			snap.depth,
			snap.limit(),
			occupancy * 100.0,
			snap.processed,
			snap.failed,
			snap.avg_busy,
		);

		if occupancy > 0.8 {
			tracing::warn!(
				"[monitor] `{}` mailbox occupancy at {:.1}%",
				snap.name,
				occupancy * 100.0
			);
		}

		if snap.dropped > 0 {
			tracing::error!(
				"[monitor] `{}` has dropped {} message(s) since start",
				snap.name,
				snap.dropped
			);
		}

		metrics::gauge!("mailroom_mailbox_depth", "registry" => snap.name.clone())
			.set(snap.depth as f64);
		metrics::gauge!("mailroom_actors", "registry" => snap.name.clone())
			.set(snap.actors as f64);
		metrics::counter!("mailroom_messages_processed", "registry" => snap.name.clone())
			.absolute(snap.processed);
		metrics::counter!("mailroom_messages_failed", "registry" => snap.name.clone())
			.absolute(snap.failed);
		metrics::counter!("mailroom_messages_dropped", "registry" => snap.name.clone())
			.absolute(snap.dropped);
	}
}
