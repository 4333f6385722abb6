mod actor;
mod cancel;
mod config;
mod context;
mod error;
mod handler;
mod mailbox;
mod message;
mod monitor;
mod registry;

pub mod prelude {
	pub use super::actor::ActorRef;
	pub use super::config::ActorConfig;
	pub use super::context::ActorContext;
	pub use super::handler::Dispatch;
	pub use super::handler::Handler;
	pub use super::handler::HandlerResult;
	pub use super::handler::RouteTable;
	pub use super::mailbox::Backpressure;
	pub use super::message::Message;
	pub use super::monitor::Monitor;
	pub use super::registry::Mode;
	pub use super::registry::Registry;
}

pub use actor::ActorRef;
pub use cancel::CancelReason;
pub use cancel::CancelToken;
pub use cancel::StopReason;
pub use config::ActorConfig;
pub use config::DEFAULT_CALL_TIMEOUT;
pub use config::DEFAULT_CAPACITY;
pub use config::DEFAULT_SEND_GRACE;
pub use context::ActorContext;
pub use context::DataMap;
pub use context::DataValue;
pub use error::CallError;
pub use error::ConfigError;
pub use error::SendError;
pub use handler::Dispatch;
pub use handler::Handler;
pub use handler::HandlerResult;
pub use handler::Route;
pub use handler::RouteFn;
pub use handler::RouteTable;
pub use handler::RouteTableBuilder;
pub use handler::Throttle;
pub use mailbox::Backpressure;
pub use mailbox::DropFn;
pub use message::ERROR_TYPE;
pub use message::Message;
pub use monitor::MailboxStats;
pub use monitor::MetricsSnapshot;
pub use monitor::Monitor;
pub use registry::GLOBAL_KEY;
pub use registry::Mode;
pub use registry::Registry;
pub use registry::RegistryBuilder;
