use std::fmt;

use tokio::sync::oneshot;

use crate::cancel::CancelToken;

/// Type id reserved for replies synthesized from handler failures.
/// [`RouteTableBuilder::route`](crate::RouteTableBuilder::route) refuses it.
pub const ERROR_TYPE: u16 = u16::MAX;

/// The unit of communication between actors.
///
/// A message is immutable once built: a numeric type id selects the route,
/// the payload carries opaque bytes whose ownership moves with the message,
/// the optional key addresses an actor inside a keyed registry, and the
/// token ties the message to a cancellation scope. The reply slot exists
/// only while a [`call`](crate::ActorRef::call) is in flight.
pub struct Message {
    token: CancelToken,
    type_id: u16,
    payload: Vec<u8>,
    key: Option<String>,
    reply: Option<oneshot::Sender<Message>>,
}

impl Message {
    pub fn new(type_id: u16, payload: impl Into<Vec<u8>>) -> Self {
        Message {
            token: CancelToken::new(),
            type_id,
            payload: payload.into(),
            key: None,
            reply: None,
        }
    }

    /// Addressing hint for keyed registries.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Ties the message to an existing cancellation scope. A caller that
    /// cancels the token while waiting on a call abandons the wait; the
    /// message itself still runs once enqueued.
    pub fn with_token(mut self, token: CancelToken) -> Self {
        self.token = token;
        self
    }

    pub fn type_id(&self) -> u16 {
        self.type_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// True for replies synthesized from a handler failure.
    pub fn is_error(&self) -> bool {
        self.type_id == ERROR_TYPE
    }

    pub(crate) fn error_reply(err: impl fmt::Display) -> Message {
        Message::new(ERROR_TYPE, format!("{err:#}").into_bytes())
    }

    pub(crate) fn attach_reply(&mut self, tx: oneshot::Sender<Message>) {
        self.reply = Some(tx);
    }

    pub(crate) fn take_reply(&mut self) -> Option<oneshot::Sender<Message>> {
        self.reply.take()
    }

    /// Copy for fan-out. The reply slot never survives duplication, so a
    /// broadcast can not answer a call.
    pub(crate) fn duplicate(&self) -> Message {
        Message {
            token: self.token.clone(),
            type_id: self.type_id,
            payload: self.payload.clone(),
            key: self.key.clone(),
            reply: None,
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("type_id", &format_args!("{:#06x}", self.type_id))
            .field("len", &self.payload.len())
            .field("key", &self.key)
            .field("reply", &self.reply.is_some())
            .finish()
    }
}
