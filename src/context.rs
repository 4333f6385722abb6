use std::any::Any;
use std::any::TypeId;
use std::collections::HashMap;

use downcast_rs::DowncastSync;
use downcast_rs::impl_downcast;
use parking_lot::Mutex;

use crate::cancel::CancelToken;
use crate::mailbox::MailboxSender;
use crate::message::Message;

/// What a handler sees of its own actor: identity, cancellation state,
/// the typed data table and a way to feed its own mailbox.
pub struct ActorContext {
	id: String,
	registry: String,
	outbox: MailboxSender,
	token: CancelToken,
	data: DataMap,
}

impl ActorContext {
	pub(crate) fn new(
		id: &str,
		registry: &str,
		outbox: MailboxSender,
		token: CancelToken,
	) -> Self {
		Self {
			id: id.to_string(),
			registry: registry.to_string(),
			outbox,
			token,
			data: DataMap::new(),
		}
	}

	/// The key this actor lives under ([`GLOBAL_KEY`](crate::GLOBAL_KEY)
	/// for a single-mode registry).
	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn registry(&self) -> &str {
		&self.registry
	}

	pub fn token(&self) -> &CancelToken {
		&self.token
	}

	pub fn data(&self) -> &DataMap {
		&self.data
	}

	pub fn is_stopping(&self) -> bool {
		self.token.is_cancelled()
	}

	/// Best-effort enqueue onto this actor's own mailbox, the re-arm half
	/// of the tick pattern. Returns false when the mailbox is full or
	/// already draining. Gate the re-arm on pending work: the worker arms
	/// no timer, so a skipped re-arm is only retried once the next
	/// message wakes the loop.
	pub fn send_to_self(&self, msg: Message) -> bool {
		self.outbox.offer(msg)
	}
}

/// Values storable in a [`DataMap`]. Blanket-implemented for anything
/// `Send + Sync + 'static`.
pub trait DataValue: DowncastSync {}

impl_downcast!(sync DataValue);

impl<T: Any + Send + Sync> DataValue for T {}

/// Per-actor typed attachments, keyed by value type. One slot per type;
/// inserting again replaces and returns the previous value.
#[derive(Default)]
pub struct DataMap {
	slots: Mutex<HashMap<TypeId, Box<dyn DataValue>>>,
}

impl DataMap {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	pub fn insert<T: DataValue>(&self, value: T) -> Option<T> {
		self.slots
			.lock()
			.insert(TypeId::of::<T>(), Box::new(value))
			.and_then(|prev| prev.downcast::<T>().ok())
			.map(|prev| *prev)
	}

	pub fn get<T: DataValue + Clone>(&self) -> Option<T> {
		self.slots
			.lock()
			.get(&TypeId::of::<T>())
			.and_then(|slot| slot.downcast_ref::<T>())
			.cloned()
	}

	/// Read access without requiring `Clone`. The map stays locked while
	/// `f` runs, keep it short.
	pub fn with<T: DataValue, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
		self.slots
			.lock()
			.get(&TypeId::of::<T>())
			.and_then(|slot| slot.downcast_ref::<T>())
			.map(f)
	}

	pub fn take<T: DataValue>(&self) -> Option<T> {
		self.slots
			.lock()
			.remove(&TypeId::of::<T>())
			.and_then(|slot| slot.downcast::<T>().ok())
			.map(|slot| *slot)
	}

	pub fn contains<T: DataValue>(&self) -> bool {
		self.slots.lock().contains_key(&TypeId::of::<T>())
	}
}
