use std::fmt;
use std::future::Future;
use std::panic::Location;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch::Receiver;
use tokio::sync::watch::Sender;

/// Why a token fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopReason {
	/// The owning registry is shutting down.
	#[default]
	Shutdown,
	/// The actor was removed by key.
	Removed,
	/// The initiator abandoned the operation.
	Aborted,
}

/// Tree-structured cancellation token. Cancelling a token cancels every
/// child derived from it; a child derived from an already cancelled token
/// is born cancelled.
#[derive(Clone)]
pub struct CancelToken {
	inner: Arc<TreeNode>,
}

impl Default for CancelToken {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for CancelToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CancelToken")
			.field("state", &*self.inner.state.borrow())
			.finish()
	}
}

impl CancelToken {
	pub fn new() -> Self {
		CancelToken {
			inner: TreeNode::new(),
		}
	}

	#[track_caller]
	pub fn cancel(&self, reason: StopReason) {
		self.inner
			.cancel_with_reason(CancelReason::new_with_loc(reason, Location::caller()))
	}

	pub fn cancel_with_reason(&self, reason: CancelReason) {
		self.inner.cancel_with_reason(reason)
	}

	pub fn is_cancelled(&self) -> bool {
		let state = self.inner.state.borrow();
		match &*state {
			State::Running => false,
			State::Cancelled(_) => true,
		}
	}

	pub fn reason(&self) -> Option<CancelReason> {
		let state = self.inner.state.borrow();
		match &*state {
			State::Running => None,
			State::Cancelled(reason) => Some(*reason),
		}
	}

	pub fn cancelled(&self) -> impl Future<Output = CancelReason> {
		TreeNode::cancelled(self.inner.state.subscribe())
	}

	pub fn cancelled_or_dropped(&self) -> impl Future<Output = Option<CancelReason>> {
		TreeNode::cancelled_or_dropped(self.inner.state.subscribe())
	}

	pub fn child(&self) -> CancelToken {
		CancelToken {
			inner: self.inner.child(),
		}
	}
}

#[derive(Debug)]
enum State {
	Running,
	Cancelled(CancelReason),
}

/// A [`StopReason`] plus the source location that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelReason {
	value: StopReason,
	location: &'static Location<'static>,
}

impl Default for CancelReason {
	#[track_caller]
	fn default() -> Self {
		CancelReason {
			value: StopReason::default(),
			location: Location::caller(),
		}
	}
}

impl fmt::Display for CancelReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:?} (from {})", self.value, self.location)
	}
}

impl CancelReason {
	#[track_caller]
	pub fn new(value: StopReason) -> Self {
		Self {
			value,
			location: Location::caller(),
		}
	}

	pub fn new_with_loc(value: StopReason, location: &'static Location<'static>) -> Self {
		Self { value, location }
	}

	pub fn value(&self) -> StopReason {
		self.value
	}

	pub fn location(&self) -> &'static Location<'static> {
		self.location
	}
}

struct TreeNode {
	state: Sender<State>,
	children: Mutex<Vec<Arc<TreeNode>>>,
}

impl TreeNode {
	fn new() -> Arc<Self> {
		Arc::new(Self {
			state: Sender::new(State::Running),
			children: Mutex::new(Vec::new()),
		})
	}

	fn child(self: &Arc<Self>) -> Arc<Self> {
		let mut children = self.children.lock();
		match *self.state.borrow() {
			State::Running => {
				let node = TreeNode::new();
				children.push(node.clone());
				node
			}
			// already cancelled, a clone of this node keeps that visible
			State::Cancelled(_) => self.clone(),
		}
	}

	async fn cancelled(mut recv: Receiver<State>) -> CancelReason {
		{
			let result = recv
				.wait_for(|state| match state {
					State::Running => false,
					State::Cancelled(_) => true,
				})
				.await;

			match result.as_deref() {
				Err(_) => {}
				Ok(State::Running) => unreachable!(),
				Ok(State::Cancelled(reason)) => return *reason,
			};
		}

		std::future::pending::<()>().await;
		unreachable!();
	}

	async fn cancelled_or_dropped(mut recv: Receiver<State>) -> Option<CancelReason> {
		let result = recv
			.wait_for(|state| match state {
				State::Running => false,
				State::Cancelled(_) => true,
			})
			.await;

		match result.as_deref() {
			Err(_) => None,
			Ok(State::Running) => unreachable!(),
			Ok(State::Cancelled(reason)) => Some(*reason),
		}
	}

	fn cancel_with_reason(&self, reason: CancelReason) {
		// hold the child lock so no child can be added mid-cancel
		let children = self.children.lock();

		let need_cancel = self.state.send_if_modified(|state| match state {
			State::Running => {
				*state = State::Cancelled(reason);
				true
			}
			// the first reason wins
			State::Cancelled(_) => false,
		});

		if need_cancel {
			for child in children.iter() {
				child.cancel_with_reason(reason)
			}
		}
	}
}
