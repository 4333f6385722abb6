use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::join_all;

use crate::actor::ActorRef;
use crate::cancel::CancelToken;
use crate::cancel::StopReason;
use crate::config::ActorConfig;
use crate::error::ConfigError;
use crate::handler::Handler;
use crate::mailbox::DropFn;
use crate::message::Message;
use crate::monitor::MailboxStats;
use crate::monitor::Monitor;

/// Key of the one actor a [`Mode::Single`] registry owns.
pub const GLOBAL_KEY: &str = "global";

/// How a registry maps keys to actors. Fixed for the registry's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
	/// One actor under [`GLOBAL_KEY`], created at start. Keys are ignored
	/// on lookup and removal is forbidden.
	Single,
	/// One actor per distinct key, created on demand.
	PerKey,
}

impl Mode {
	pub fn as_str(&self) -> &'static str {
		match self {
			Mode::Single => "single",
			Mode::PerKey => "per-key",
		}
	}
}

type Factory = dyn Fn() -> Box<dyn Handler> + Send + Sync;

enum Phase {
	Idle,
	Running(CancelToken),
	Stopped,
}

/// Exclusive owner of a set of actors addressed by string keys.
///
/// A registry is built once, started once and stopped once; stopping
/// drains every mailbox before the workers exit. Lookup handles
/// ([`ActorRef`]) stay cheap to clone but never extend an actor's life.
pub struct Registry {
	name: String,
	mode: Mode,
	config: ActorConfig,
	factory: Box<Factory>,
	actors: DashMap<String, ActorRef>,
	phase: ArcSwap<Phase>,
	stats: Arc<MailboxStats>,
	monitor: Option<Monitor>,
	on_drop: Option<Arc<DropFn>>,
}

pub struct RegistryBuilder {
	name: String,
	mode: Mode,
	config: ActorConfig,
	factory: Box<Factory>,
	monitor: Option<Monitor>,
	on_drop: Option<Arc<DropFn>>,
}

impl RegistryBuilder {
	pub fn config(mut self, config: ActorConfig) -> Self {
		self.config = config;
		self
	}

	/// Attaches the registry's stats to a [`Monitor`] when it starts.
	pub fn monitor(mut self, monitor: &Monitor) -> Self {
		self.monitor = Some(monitor.clone());
		self
	}

	/// Observer invoked for every message lost to a full mailbox.
	pub fn on_drop(mut self, f: impl Fn(&str, &Message) + Send + Sync + 'static) -> Self {
		self.on_drop = Some(Arc::new(f));
		self
	}

	pub fn build(self) -> Registry {
		let stats = MailboxStats::new(&self.name, self.mode, self.config.capacity.max(1));
		Registry {
			name: self.name,
			mode: self.mode,
			config: self.config,
			factory: self.factory,
			actors: DashMap::new(),
			phase: ArcSwap::from_pointee(Phase::Idle),
			stats,
			monitor: self.monitor,
			on_drop: self.on_drop,
		}
	}
}

impl Registry {
	/// The factory produces one fresh handler per created actor; with
	/// [`Dispatch`](crate::Dispatch) that means fresh state over a shared
	/// route table.
	pub fn builder<H, F>(name: impl Into<String>, mode: Mode, factory: F) -> RegistryBuilder
	where
		H: Handler,
		F: Fn() -> H + Send + Sync + 'static,
	{
		RegistryBuilder {
			name: name.into(),
			mode,
			config: ActorConfig::default(),
			factory: Box::new(move || Box::new(factory())),
			monitor: None,
			on_drop: None,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn mode(&self) -> Mode {
		self.mode
	}

	pub fn len(&self) -> usize {
		self.actors.len()
	}

	pub fn is_empty(&self) -> bool {
		self.actors.is_empty()
	}

	pub fn stats(&self) -> &MailboxStats {
		&self.stats
	}

	/// Idle to running. A single-mode registry creates its actor here, so
	/// a factory init failure surfaces at startup rather than on first
	/// use.
	pub fn start(&self) -> Result<(), ConfigError> {
		let phase = self.phase.load();
		match &**phase {
			Phase::Running(_) => return Err(ConfigError::AlreadyStarted(self.name.clone())),
			Phase::Stopped => return Err(ConfigError::Stopped(self.name.clone())),
			Phase::Idle => {}
		}

		let root = CancelToken::new();
		let next = Arc::new(Phase::Running(root.clone()));
		let prev = self.phase.compare_and_swap(&phase, next);
		if !Arc::ptr_eq(&*prev, &*phase) {
			return Err(ConfigError::AlreadyStarted(self.name.clone()));
		}

		if let Some(monitor) = &self.monitor {
			monitor.register(self.stats.clone());
		}

		if self.mode == Mode::Single {
			self.create(GLOBAL_KEY, &root)?;
		}

		tracing::info!("registry `{}` started ({})", self.name, self.mode.as_str());
		Ok(())
	}

	/// Returns the actor for `key`, creating it atomically if absent.
	/// Concurrent creations for one key collapse to a single actor.
	pub fn get_or_create(&self, key: &str) -> Result<ActorRef, ConfigError> {
		let root = self.running_token()?;
		let key = self.resolve(key);

		if let Some(actor) = self.actors.get(key) {
			return Ok(actor.value().clone());
		}
		self.create(key, &root)
	}

	/// Lookup without creation.
	pub fn get(&self, key: &str) -> Option<ActorRef> {
		self.actors.get(self.resolve(key)).map(|a| a.value().clone())
	}

	/// Stops the actor and waits for its mailbox to drain. Forbidden in
	/// single mode; removing an absent key is a no-op.
	pub async fn remove(&self, key: &str) -> Result<(), ConfigError> {
		if self.mode == Mode::Single {
			return Err(ConfigError::RemoveForbidden(self.name.clone()));
		}

		let Some((_, actor)) = self.actors.remove(key) else {
			return Ok(());
		};
		actor.stop(StopReason::Removed).await;
		tracing::info!("registry `{}` removed actor `{key}`", self.name);
		Ok(())
	}

	/// Non-blocking best-effort delivery, creating the target if needed.
	/// A full mailbox counts a drop; it never blocks and never errors.
	pub fn send_to(&self, key: &str, msg: Message) -> Result<(), ConfigError> {
		let actor = self.get_or_create(key)?;
		actor.offer(msg);
		Ok(())
	}

	/// [`send_to`](Self::send_to) addressed by the message's own key. A
	/// per-key registry discards keyless messages.
	pub fn route(&self, msg: Message) -> Result<(), ConfigError> {
		let key = match (self.mode, msg.key()) {
			(Mode::Single, _) => GLOBAL_KEY.to_string(),
			(Mode::PerKey, Some(key)) => key.to_string(),
			(Mode::PerKey, None) => {
				tracing::warn!(
					"registry `{}` dropped keyless message {:#06x}",
					self.name,
					msg.type_id()
				);
				return Ok(());
			}
		};
		self.send_to(&key, msg)
	}

	/// Best-effort fan-out to every actor present when the call started.
	pub fn broadcast(&self, msg: Message) {
		let targets: Vec<ActorRef> = self.actors.iter().map(|a| a.value().clone()).collect();
		for actor in &targets {
			actor.offer(msg.duplicate());
		}
	}

	/// Running to stopped, terminal. Cancels every actor, waits for all
	/// mailboxes to drain and clears the key space.
	pub async fn stop(&self) -> Result<(), ConfigError> {
		let phase = self.phase.load();
		let Phase::Running(root) = &**phase else {
			return Err(match &**phase {
				Phase::Idle => ConfigError::NotStarted(self.name.clone()),
				_ => ConfigError::Stopped(self.name.clone()),
			});
		};

		let prev = self.phase.compare_and_swap(&phase, Arc::new(Phase::Stopped));
		if !Arc::ptr_eq(&*prev, &*phase) {
			return Err(ConfigError::Stopped(self.name.clone()));
		}

		root.cancel(StopReason::Shutdown);

		let actors: Vec<ActorRef> = self.actors.iter().map(|a| a.value().clone()).collect();
		join_all(actors.iter().map(|a| a.stop(StopReason::Shutdown))).await;
		self.actors.clear();

		let snap = self.stats.snapshot();
		tracing::info!(
			"registry `{}` stopped: processed {}, failed {}, dropped {}",
			self.name,
			snap.processed,
			snap.failed,
			snap.dropped
		);
		Ok(())
	}

	fn resolve<'a>(&self, key: &'a str) -> &'a str {
		match self.mode {
			Mode::Single => GLOBAL_KEY,
			Mode::PerKey => key,
		}
	}

	fn running_token(&self) -> Result<CancelToken, ConfigError> {
		let phase = self.phase.load();
		match &**phase {
			Phase::Idle => Err(ConfigError::NotStarted(self.name.clone())),
			Phase::Stopped => Err(ConfigError::Stopped(self.name.clone())),
			Phase::Running(token) => Ok(token.clone()),
		}
	}

	fn create(&self, key: &str, root: &CancelToken) -> Result<ActorRef, ConfigError> {
		match self.actors.entry(key.to_string()) {
			Entry::Occupied(entry) => Ok(entry.get().clone()),
			// the vacant entry holds a shard lock, so the factory runs
			// exactly once per key; init hooks should stay cheap
			Entry::Vacant(entry) => {
				let handler = (self.factory)();
				let actor = ActorRef::spawn(
					&self.name,
					key,
					handler,
					&self.config,
					root.child(),
					self.stats.clone(),
					self.on_drop.clone(),
				)?;
				entry.insert(actor.clone());
				tracing::info!("registry `{}` created actor `{key}`", self.name);
				Ok(actor)
			}
		}
	}
}

impl Drop for Registry {
	fn drop(&mut self) {
		// workers of a registry dropped without stop() still wind down
		let phase = self.phase.load();
		if let Phase::Running(root) = &**phase {
			root.cancel(StopReason::Shutdown);
		}
	}
}
