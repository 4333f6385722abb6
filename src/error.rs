use std::time::Duration;

use crate::cancel::CancelReason;

/// Startup and lifecycle misuse. These are fatal for the caller: a registry
/// or route table that reports one is not usable.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
	#[error("route {0:#06x} is registered twice")]
	DuplicateRoute(u16),

	#[error("route {0:#06x} is reserved for error replies")]
	ReservedRoute(u16),

	#[error("registry `{0}` is not started")]
	NotStarted(String),

	#[error("registry `{0}` is already started")]
	AlreadyStarted(String),

	#[error("registry `{0}` is stopped")]
	Stopped(String),

	#[error("registry `{0}` keeps a single actor, removal is forbidden")]
	RemoveForbidden(String),

	#[error("handler init failed for actor `{key}`: {error:#}")]
	HandlerInit { key: String, error: anyhow::Error },
}

#[derive(thiserror::Error, Debug)]
pub enum SendError {
	#[error("mailbox of actor `{0}` is full")]
	Full(String),

	#[error("actor `{0}` is stopped")]
	Closed(String),
}

#[derive(thiserror::Error, Debug)]
pub enum CallError {
	#[error(transparent)]
	Send(#[from] SendError),

	#[error("call timed out after {0:?}")]
	Timeout(Duration),

	#[error("call cancelled: {0}")]
	Cancelled(CancelReason),

	#[error("actor dropped the reply")]
	NoReply,
}
