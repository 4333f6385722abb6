use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future;
use futures::future::BoxFuture;
use tokio::time::Instant;

use crate::context::ActorContext;
use crate::error::ConfigError;
use crate::message::ERROR_TYPE;
use crate::message::Message;

/// What a route or handler produces: `Ok(Some(reply))` answers a waiting
/// call, `Ok(None)` answers nothing, `Err` is counted, logged and turned
/// into an [`ERROR_TYPE`] reply for a waiting caller.
pub type HandlerResult = anyhow::Result<Option<Message>>;

/// Behavior attached to one actor. The worker owns the handler
/// exclusively, so `&mut self` is safe everywhere and invocations never
/// overlap.
pub trait Handler: Send + 'static {
    /// Runs before the actor becomes visible. Failure fails the creation.
    fn on_init(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs after init, before the first message can be observed.
    fn on_start(&mut self, _cx: &ActorContext) {}

    /// Runs after the mailbox has drained, right before the worker exits.
    fn on_stop(&mut self, _cx: &ActorContext) {}

    /// Runs exactly once per worker iteration, before the next wait.
    /// Schedule follow-up work with
    /// [`send_to_self`](ActorContext::send_to_self) rather than blocking
    /// here.
    fn tick(&mut self, _cx: &ActorContext) {}

    fn handle<'a>(&'a mut self, cx: &'a ActorContext, msg: Message) -> BoxFuture<'a, HandlerResult>;
}

/// One dispatch-table entry. Blanket-implemented for plain
/// `async fn(&mut S, &ActorContext, Message) -> HandlerResult`.
pub trait Route<S>: Send + Sync + 'static {
    fn invoke<'a>(
        &'a self,
        state: &'a mut S,
        cx: &'a ActorContext,
        msg: Message,
    ) -> BoxFuture<'a, HandlerResult>;
}

/// Lifetime-carrying helper that lets [`Route`] accept async functions
/// borrowing their state. An implementation detail of the blanket impl.
pub trait RouteFn<'a, S: 'a>: Send + Sync {
    type Fut: Future<Output = HandlerResult> + Send + 'a;

    fn call(&'a self, state: &'a mut S, cx: &'a ActorContext, msg: Message) -> Self::Fut;
}

impl<'a, S: 'a, F, Fut> RouteFn<'a, S> for F
where
    F: Fn(&'a mut S, &'a ActorContext, Message) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'a,
{
    type Fut = Fut;

    fn call(&'a self, state: &'a mut S, cx: &'a ActorContext, msg: Message) -> Self::Fut {
        self(state, cx, msg)
    }
}

impl<S, F> Route<S> for F
where
    S: 'static,
    F: for<'a> RouteFn<'a, S> + 'static,
{
    fn invoke<'a>(
        &'a self,
        state: &'a mut S,
        cx: &'a ActorContext,
        msg: Message,
    ) -> BoxFuture<'a, HandlerResult> {
        <F as RouteFn<'a, S>>::call(self, state, cx, msg).boxed()
    }
}

type InitHook<S> = Box<dyn Fn(&mut S) -> anyhow::Result<()> + Send + Sync>;
type Hook<S> = Box<dyn Fn(&mut S, &ActorContext) + Send + Sync>;

/// Immutable dispatch table mapping message type ids to routes, plus the
/// lifecycle hooks of the actors built from it. Built once, shared by
/// every actor of a registry through an `Arc`.
pub struct RouteTable<S> {
    routes: HashMap<u16, Box<dyn Route<S>>>,
    fallback: Option<Box<dyn Route<S>>>,
    init: Option<InitHook<S>>,
    start: Option<Hook<S>>,
    stop: Option<Hook<S>>,
    tick: Option<Hook<S>>,
}

impl<S: Send + 'static> RouteTable<S> {
    pub fn builder() -> RouteTableBuilder<S> {
        RouteTableBuilder {
            routes: HashMap::new(),
            duplicate: None,
            reserved: None,
            fallback: None,
            init: None,
            start: None,
            stop: None,
            tick: None,
        }
    }
}

impl<S> fmt::Debug for RouteTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes.len())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

pub struct RouteTableBuilder<S> {
    routes: HashMap<u16, Box<dyn Route<S>>>,
    duplicate: Option<u16>,
    reserved: Option<u16>,
    fallback: Option<Box<dyn Route<S>>>,
    init: Option<InitHook<S>>,
    start: Option<Hook<S>>,
    stop: Option<Hook<S>>,
    tick: Option<Hook<S>>,
}

impl<S: Send + 'static> RouteTableBuilder<S> {
    /// Registers a route. Registering the same id twice, or the reserved
    /// [`ERROR_TYPE`] id, is reported by [`build`](Self::build).
    pub fn route(mut self, type_id: u16, route: impl Route<S>) -> Self {
        if type_id == ERROR_TYPE {
            self.reserved.get_or_insert(type_id);
            return self;
        }
        if self.routes.insert(type_id, Box::new(route)).is_some() {
            self.duplicate.get_or_insert(type_id);
        }
        self
    }

    /// Receives every message whose id has no route. Without a fallback
    /// such messages are logged and discarded.
    pub fn fallback(mut self, route: impl Route<S>) -> Self {
        self.fallback = Some(Box::new(route));
        self
    }

    pub fn on_init(mut self, f: impl Fn(&mut S) -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        self.init = Some(Box::new(f));
        self
    }

    pub fn on_start(mut self, f: impl Fn(&mut S, &ActorContext) + Send + Sync + 'static) -> Self {
        self.start = Some(Box::new(f));
        self
    }

    pub fn on_stop(mut self, f: impl Fn(&mut S, &ActorContext) + Send + Sync + 'static) -> Self {
        self.stop = Some(Box::new(f));
        self
    }

    pub fn on_tick(mut self, f: impl Fn(&mut S, &ActorContext) + Send + Sync + 'static) -> Self {
        self.tick = Some(Box::new(f));
        self
    }

    /// Validates and freezes the table. Registration conflicts surface
    /// here, before any actor can exist.
    pub fn build(self) -> Result<Arc<RouteTable<S>>, ConfigError> {
        if let Some(id) = self.reserved {
            return Err(ConfigError::ReservedRoute(id));
        }
        if let Some(id) = self.duplicate {
            return Err(ConfigError::DuplicateRoute(id));
        }
        Ok(Arc::new(RouteTable {
            routes: self.routes,
            fallback: self.fallback,
            init: self.init,
            start: self.start,
            stop: self.stop,
            tick: self.tick,
        }))
    }
}

/// The standard [`Handler`]: per-actor state plus a shared [`RouteTable`].
/// A registry factory hands every new actor fresh state while all actors
/// reuse the same table.
pub struct Dispatch<S> {
    state: S,
    table: Arc<RouteTable<S>>,
}

impl<S: Send + 'static> Dispatch<S> {
    pub fn new(state: S, table: Arc<RouteTable<S>>) -> Self {
        Self { state, table }
    }

    pub fn state(&self) -> &S {
        &self.state
    }
}

impl<S: Send + 'static> Handler for Dispatch<S> {
    fn on_init(&mut self) -> anyhow::Result<()> {
        match &self.table.init {
            Some(hook) => hook(&mut self.state),
            None => Ok(()),
        }
    }

    fn on_start(&mut self, cx: &ActorContext) {
        if let Some(hook) = &self.table.start {
            hook(&mut self.state, cx);
        }
    }

    fn on_stop(&mut self, cx: &ActorContext) {
        if let Some(hook) = &self.table.stop {
            hook(&mut self.state, cx);
        }
    }

    fn tick(&mut self, cx: &ActorContext) {
        if let Some(hook) = &self.table.tick {
            hook(&mut self.state, cx);
        }
    }

    fn handle<'a>(&'a mut self, cx: &'a ActorContext, msg: Message) -> BoxFuture<'a, HandlerResult> {
        let Dispatch { state, table } = self;
        let route = match table.routes.get(&msg.type_id()) {
            Some(route) => route,
            None => match &table.fallback {
                Some(route) => route,
                None => {
                    tracing::warn!(
                        "actor `{}` has no route for message {:#06x}, discarding",
                        cx.id(),
                        msg.type_id()
                    );
                    return future::ready(Ok(None)).boxed();
                }
            },
        };
        route.invoke(state, cx, msg)
    }
}

/// Minimum-interval gate for periodic duties piggybacked on the worker
/// loop, status reports and similar. Not a scheduler: a declined call
/// arms no timer, so anything gated on it waits until the loop runs
/// again.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Throttle {
            min_interval,
            last: None,
        }
    }

    /// True at most once per interval.
    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
