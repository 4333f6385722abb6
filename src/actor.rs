use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::FutureExt;
use take_once::TakeOnce;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use crate::cancel::CancelToken;
use crate::cancel::StopReason;
use crate::config::ActorConfig;
use crate::context::ActorContext;
use crate::context::DataMap;
use crate::error::CallError;
use crate::error::ConfigError;
use crate::error::SendError;
use crate::handler::Handler;
use crate::mailbox::DropFn;
use crate::mailbox::MailboxSender;
use crate::message::Message;
use crate::monitor::MailboxStats;

/// Cheap-to-clone handle to a running actor. Handles are lookup results;
/// the owning registry controls the actor's lifetime.
#[derive(Clone)]
pub struct ActorRef {
	inner: Arc<ActorCore>,
}

struct ActorCore {
	ctx: Arc<ActorContext>,
	outbox: MailboxSender,
	token: CancelToken,
	running: AtomicBool,
	call_timeout: Duration,
	worker: TakeOnce<JoinHandle<()>>,
	stats: Arc<MailboxStats>,
}

impl ActorRef {
	/// Runs the handler's init hook, spawns the worker and hands back the
	/// handle. The handler observes `on_init` and `on_start` before any
	/// message can reach it.
	pub(crate) fn spawn(
		registry: &str,
		key: &str,
		mut handler: Box<dyn Handler>,
		config: &ActorConfig,
		token: CancelToken,
		stats: Arc<MailboxStats>,
		on_drop: Option<Arc<DropFn>>,
	) -> Result<ActorRef, ConfigError> {
		handler.on_init().map_err(|error| ConfigError::HandlerInit {
			key: key.to_string(),
			error,
		})?;

		let label = format!("{registry}/{key}");
		// the channel rejects a zero capacity
		let (tx, rx) = mpsc::channel(config.capacity.max(1));
		let outbox = MailboxSender::new(
			&label,
			tx,
			config.backpressure,
			config.warn_after,
			stats.clone(),
			on_drop,
		);

		let ctx = Arc::new(ActorContext::new(key, registry, outbox.clone(), token.clone()));
		handler.on_start(&ctx);

		let span = tracing::info_span!("actor", registry = %registry, id = %key);
		let worker = Worker {
			ctx: ctx.clone(),
			rx,
			handler,
			token: token.clone(),
			stats: stats.clone(),
		};
		let handle = tokio::spawn(worker.run().instrument(span));

		let core = ActorCore {
			ctx,
			outbox,
			token,
			running: AtomicBool::new(true),
			call_timeout: config.call_timeout,
			worker: TakeOnce::new(),
			stats,
		};
		let _ = core.worker.store(handle);

		tracing::info!("actor `{label}` started");
		Ok(ActorRef {
			inner: Arc::new(core),
		})
	}

	pub fn id(&self) -> &str {
		self.inner.ctx.id()
	}

	pub fn registry(&self) -> &str {
		self.inner.ctx.registry()
	}

	pub fn is_running(&self) -> bool {
		self.inner.running.load(Ordering::Acquire) && !self.inner.token.is_cancelled()
	}

	pub fn data(&self) -> &DataMap {
		self.inner.ctx.data()
	}

	pub fn stats(&self) -> &MailboxStats {
		&self.inner.stats
	}

	/// Enqueues a message under the registry's backpressure policy. Only
	/// the `Block` policy ever suspends the caller.
	pub async fn send(&self, msg: Message) -> Result<(), SendError> {
		if !self.is_running() {
			return self.inner.outbox.refuse(msg);
		}
		self.inner.outbox.push(msg).await
	}

	/// Send plus reply wait, bounded by the registry's call timeout.
	pub async fn call(&self, msg: Message) -> Result<Message, CallError> {
		self.call_with_timeout(msg, self.inner.call_timeout).await
	}

	/// A timed-out or cancelled call abandons the wait only: the message
	/// stays queued, runs to completion and its late reply is discarded.
	pub async fn call_with_timeout(
		&self,
		mut msg: Message,
		timeout: Duration,
	) -> Result<Message, CallError> {
		let token = msg.token().clone();
		let (reply_tx, reply_rx) = oneshot::channel();
		msg.attach_reply(reply_tx);
		self.send(msg).await?;

		tokio::select! {
			reason = token.cancelled() => Err(CallError::Cancelled(reason)),
			_ = tokio::time::sleep(timeout) => Err(CallError::Timeout(timeout)),
			reply = reply_rx => match reply {
				Ok(reply) => Ok(reply),
				Err(_) => Err(CallError::NoReply),
			},
		}
	}

	/// Non-blocking best-effort enqueue for registry routing and
	/// broadcast.
	pub(crate) fn offer(&self, msg: Message) -> bool {
		if !self.is_running() {
			tracing::debug!("actor `{}` is stopped, message discarded", self.id());
			return false;
		}
		self.inner.outbox.offer(msg)
	}

	/// Cancels the actor and waits for its worker to drain the mailbox
	/// and exit. Registry-driven; idempotent.
	pub(crate) async fn stop(&self, reason: StopReason) {
		self.inner.running.store(false, Ordering::Release);
		self.inner.token.cancel(reason);

		if let Some(worker) = self.inner.worker.take() {
			if let Err(err) = worker.await {
				tracing::error!("worker task of actor `{}` failed: {err}", self.id());
			}
		}
	}
}

impl fmt::Debug for ActorRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ActorRef")
			.field("registry", &self.registry())
			.field("id", &self.id())
			.field("running", &self.is_running())
			.finish()
	}
}

struct Worker {
	ctx: Arc<ActorContext>,
	rx: mpsc::Receiver<Message>,
	handler: Box<dyn Handler>,
	token: CancelToken,
	stats: Arc<MailboxStats>,
}

impl Worker {
	async fn run(mut self) {
		self.stats.actor_started();

		let reason = loop {
			// a panicking tick must not take the worker down with the
			// mailbox still holding accepted messages
			if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.handler.tick(&self.ctx))) {
				let what = panic_message(panic.as_ref());
				tracing::error!("tick panicked in actor `{}`: {what}", self.ctx.id());
			}

			tokio::select! {
				reason = self.token.cancelled_or_dropped() => {
					break reason.map(|r| r.value()).unwrap_or_default();
				}
				next = self.rx.recv() => match next {
					Some(msg) => self.process(msg).await,
					None => break StopReason::Shutdown,
				},
			}
		};

		// work that was accepted still runs; new senders are turned away
		// from the moment the token fired
		self.rx.close();
		while let Some(msg) = self.rx.recv().await {
			self.process(msg).await;
		}

		self.handler.on_stop(&self.ctx);
		self.stats.actor_stopped();
		tracing::info!(reason = ?reason, "actor `{}` stopped", self.ctx.id());
	}

	async fn process(&mut self, mut msg: Message) {
		self.stats.msg_dequeued();

		let reply_to = msg.take_reply();
		let type_id = msg.type_id();
		let started = Instant::now();

		let outcome = AssertUnwindSafe(self.handler.handle(&self.ctx, msg))
			.catch_unwind()
			.await;

		// every outcome counts as processed and consumed worker time;
		// failures increment failed on top
		self.stats.msg_processed(started.elapsed());

		match outcome {
			Ok(Ok(reply)) => {
				if let (Some(tx), Some(reply)) = (reply_to, reply) {
					// the caller may have given up already
					let _ = tx.send(reply);
				}
			}
			Ok(Err(err)) => {
				self.stats.msg_failed();
				tracing::error!("handler failed on message {type_id:#06x}: {err:#}");
				if let Some(tx) = reply_to {
					let _ = tx.send(Message::error_reply(&err));
				}
			}
			Err(panic) => {
				self.stats.msg_failed();
				// the panic hook has already printed the backtrace
				let what = panic_message(panic.as_ref());
				tracing::error!("handler panicked on message {type_id:#06x}: {what}");
				if let Some(tx) = reply_to {
					let _ = tx.send(Message::error_reply(&what));
				}
			}
		}
	}
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
	if let Some(s) = panic.downcast_ref::<&str>() {
		(*s).to_string()
	} else if let Some(s) = panic.downcast_ref::<String>() {
		s.clone()
	} else {
		"non-string panic payload".to_string()
	}
}
