use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time;

use crate::error::SendError;
use crate::message::Message;
use crate::monitor::MailboxStats;

/// What [`send`](crate::ActorRef::send) does when the mailbox is at
/// capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backpressure {
	/// Wait for room, warning once after the grace period. Never fails
	/// with a capacity error.
	#[default]
	Block,
	/// Discard the message, count it, report success.
	Drop,
	/// Refuse the message with [`SendError::Full`].
	Reject,
}

/// Observer for messages lost to a full mailbox. Receives the mailbox
/// label and the message that was discarded.
pub type DropFn = dyn Fn(&str, &Message) + Send + Sync;

#[derive(Clone)]
pub(crate) struct MailboxSender {
	label: Arc<str>,
	tx: mpsc::Sender<Message>,
	policy: Backpressure,
	warn_after: Duration,
	stats: Arc<MailboxStats>,
	on_drop: Option<Arc<DropFn>>,
}

impl MailboxSender {
	pub(crate) fn new(
		label: &str,
		tx: mpsc::Sender<Message>,
		policy: Backpressure,
		warn_after: Duration,
		stats: Arc<MailboxStats>,
		on_drop: Option<Arc<DropFn>>,
	) -> Self {
		Self {
			label: Arc::from(label),
			tx,
			policy,
			warn_after,
			stats,
			on_drop,
		}
	}

	/// Enqueue under the configured policy. Only [`Backpressure::Block`]
	/// ever awaits.
	pub(crate) async fn push(&self, msg: Message) -> Result<(), SendError> {
		match self.policy {
			Backpressure::Block => self.push_blocking(msg).await,
			Backpressure::Drop => {
				match self.tx.try_send(msg) {
					Ok(()) => self.stats.msg_enqueued(),
					Err(TrySendError::Full(msg)) => self.note_drop(&msg),
					Err(TrySendError::Closed(msg)) => {
						tracing::debug!(
							"mailbox `{}` is closed, message {:#06x} discarded",
							self.label,
							msg.type_id()
						);
					}
				}
				Ok(())
			}
			Backpressure::Reject => match self.tx.try_send(msg) {
				Ok(()) => {
					self.stats.msg_enqueued();
					Ok(())
				}
				Err(TrySendError::Full(msg)) => {
					self.note_drop(&msg);
					Err(SendError::Full(self.label.to_string()))
				}
				Err(TrySendError::Closed(_)) => Err(SendError::Closed(self.label.to_string())),
			},
		}
	}

	async fn push_blocking(&self, msg: Message) -> Result<(), SendError> {
		let permit = match time::timeout(self.warn_after, self.tx.reserve()).await {
			Ok(Ok(permit)) => permit,
			Ok(Err(_)) => return Err(SendError::Closed(self.label.to_string())),
			Err(_) => {
				tracing::warn!(
					"mailbox `{}` full for {:?}, still waiting",
					self.label,
					self.warn_after
				);
				match self.tx.reserve().await {
					Ok(permit) => permit,
					Err(_) => return Err(SendError::Closed(self.label.to_string())),
				}
			}
		};

		permit.send(msg);
		self.stats.msg_enqueued();
		Ok(())
	}

	/// Non-blocking best-effort enqueue, used by registry routing,
	/// broadcast and self-sends. Losses are counted, not reported.
	pub(crate) fn offer(&self, msg: Message) -> bool {
		match self.tx.try_send(msg) {
			Ok(()) => {
				self.stats.msg_enqueued();
				true
			}
			Err(TrySendError::Full(msg)) => {
				self.note_drop(&msg);
				false
			}
			Err(TrySendError::Closed(msg)) => {
				tracing::debug!(
					"mailbox `{}` is closed, message {:#06x} discarded",
					self.label,
					msg.type_id()
				);
				false
			}
		}
	}

	/// Outcome of a policy send against an actor that already stopped.
	pub(crate) fn refuse(&self, msg: Message) -> Result<(), SendError> {
		match self.policy {
			Backpressure::Drop => {
				tracing::debug!(
					"mailbox `{}` is closed, message {:#06x} discarded",
					self.label,
					msg.type_id()
				);
				Ok(())
			}
			_ => Err(SendError::Closed(self.label.to_string())),
		}
	}

	fn note_drop(&self, msg: &Message) {
		let count = self.stats.msg_dropped();
		// one line per hundred losses keeps an overload from flooding the log
		if count % 100 == 1 {
			tracing::warn!(
				"mailbox `{}` full, {} message(s) dropped so far (last type {:#06x})",
				self.label,
				count,
				msg.type_id()
			);
		}
		if let Some(on_drop) = &self.on_drop {
			on_drop(&self.label, msg);
		}
	}
}
