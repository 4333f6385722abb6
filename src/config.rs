use std::time::Duration;

use crate::mailbox::Backpressure;

pub const DEFAULT_CAPACITY: usize = 1000;
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_SEND_GRACE: Duration = Duration::from_secs(3);

/// Mailbox and timing parameters, shared by every actor of a registry.
#[derive(Debug, Clone)]
pub struct ActorConfig {
	/// Queue slots per actor before the backpressure policy kicks in.
	pub capacity: usize,
	pub backpressure: Backpressure,
	/// How long [`call`](crate::ActorRef::call) waits for a reply.
	pub call_timeout: Duration,
	/// How long a blocking send waits quietly before it logs and keeps
	/// waiting.
	pub warn_after: Duration,
}

impl Default for ActorConfig {
	fn default() -> Self {
		ActorConfig {
			capacity: DEFAULT_CAPACITY,
			backpressure: Backpressure::Block,
			call_timeout: DEFAULT_CALL_TIMEOUT,
			warn_after: DEFAULT_SEND_GRACE,
		}
	}
}

impl ActorConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_capacity(mut self, capacity: usize) -> Self {
		self.capacity = capacity;
		self
	}

	pub fn with_backpressure(mut self, policy: Backpressure) -> Self {
		self.backpressure = policy;
		self
	}

	pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
		self.call_timeout = timeout;
		self
	}

	pub fn with_warn_after(mut self, grace: Duration) -> Self {
		self.warn_after = grace;
		self
	}
}
