use mailroom::{
    ActorContext, ConfigError, Dispatch, ERROR_TYPE, GLOBAL_KEY, HandlerResult, Message, Mode,
    Registry, RouteTable,
};

// Counter actors shared by the registry tests

const MSG_HIT: u16 = 1;
const MSG_REPORT: u16 = 2;

struct Counter {
    hits: u64,
}

async fn hit(state: &mut Counter, _cx: &ActorContext, _msg: Message) -> HandlerResult {
    state.hits += 1;
    Ok(None)
}

async fn report(state: &mut Counter, _cx: &ActorContext, _msg: Message) -> HandlerResult {
    Ok(Some(Message::new(MSG_REPORT, state.hits.to_le_bytes())))
}

fn counter_registry(name: &str, mode: Mode) -> Registry {
    let table = RouteTable::builder()
        .route(MSG_HIT, hit)
        .route(MSG_REPORT, report)
        .build()
        .expect("route table");
    Registry::builder(name, mode, move || {
        Dispatch::new(Counter { hits: 0 }, table.clone())
    })
    .build()
}

// A report call doubles as a barrier: the mailbox is FIFO, so the reply
// proves every earlier message was processed.
async fn hits(registry: &Registry, key: &str) -> u64 {
    let actor = registry.get_or_create(key).expect("actor");
    let reply = actor
        .call(Message::new(MSG_REPORT, []))
        .await
        .expect("report reply");
    u64::from_le_bytes(reply.payload().try_into().expect("u64 payload"))
}

#[tokio::test]
async fn per_key_actors_are_independent() {
    let registry = counter_registry("players", Mode::PerKey);
    registry.start().expect("start");

    for _ in 0..3 {
        registry
            .send_to("alice", Message::new(MSG_HIT, []))
            .expect("send");
    }
    registry
        .send_to("bob", Message::new(MSG_HIT, []))
        .expect("send");

    assert_eq!(hits(&registry, "alice").await, 3);
    assert_eq!(hits(&registry, "bob").await, 1);
    assert_eq!(registry.len(), 2);

    registry.stop().await.expect("stop");
}

#[tokio::test]
async fn same_key_resolves_to_the_same_actor() {
    let registry = counter_registry("players", Mode::PerKey);
    registry.start().expect("start");

    let first = registry.get_or_create("alice").expect("actor");
    first.data().insert(41u64);

    let second = registry.get_or_create("alice").expect("actor");
    assert_eq!(second.data().get::<u64>(), Some(41));
    assert_eq!(registry.len(), 1);

    registry.stop().await.expect("stop");
}

#[tokio::test]
async fn removed_key_gets_a_fresh_actor() {
    let registry = counter_registry("players", Mode::PerKey);
    registry.start().expect("start");

    registry
        .send_to("alice", Message::new(MSG_HIT, []))
        .expect("send");
    registry
        .send_to("alice", Message::new(MSG_HIT, []))
        .expect("send");
    assert_eq!(hits(&registry, "alice").await, 2);

    registry.remove("alice").await.expect("remove");
    assert!(registry.get("alice").is_none());

    assert_eq!(hits(&registry, "alice").await, 0, "state starts over");

    registry.stop().await.expect("stop");
}

#[tokio::test]
async fn removing_an_absent_key_is_a_no_op() {
    let registry = counter_registry("players", Mode::PerKey);
    registry.start().expect("start");

    registry.remove("nobody").await.expect("no-op remove");

    registry.stop().await.expect("stop");
}

#[tokio::test]
async fn single_mode_ignores_keys_and_forbids_removal() {
    let registry = counter_registry("world", Mode::Single);
    registry.start().expect("start");
    assert_eq!(registry.len(), 1, "singleton exists right after start");

    registry
        .send_to("whatever", Message::new(MSG_HIT, []))
        .expect("send");
    assert_eq!(hits(&registry, "something-else").await, 1);
    assert_eq!(registry.len(), 1);

    let err = registry.remove(GLOBAL_KEY).await.unwrap_err();
    assert!(matches!(err, ConfigError::RemoveForbidden(_)));

    registry.stop().await.expect("stop");
}

#[tokio::test]
async fn broadcast_in_single_mode_hits_exactly_one_actor() {
    let registry = counter_registry("world", Mode::Single);
    registry.start().expect("start");

    registry.broadcast(Message::new(MSG_HIT, []));

    assert_eq!(hits(&registry, GLOBAL_KEY).await, 1);

    registry.stop().await.expect("stop");
}

#[tokio::test]
async fn broadcast_reaches_every_actor() {
    let registry = counter_registry("players", Mode::PerKey);
    registry.start().expect("start");

    for key in ["alice", "bob", "carol"] {
        registry.get_or_create(key).expect("actor");
    }
    registry.broadcast(Message::new(MSG_HIT, []));

    for key in ["alice", "bob", "carol"] {
        assert_eq!(hits(&registry, key).await, 1);
    }

    registry.stop().await.expect("stop");
}

#[tokio::test]
async fn route_uses_the_message_key() {
    let registry = counter_registry("players", Mode::PerKey);
    registry.start().expect("start");

    registry
        .route(Message::new(MSG_HIT, []).with_key("alice"))
        .expect("route");
    assert_eq!(hits(&registry, "alice").await, 1);

    // keyless messages have no target in per-key mode
    registry.route(Message::new(MSG_HIT, [])).expect("route");
    assert_eq!(registry.len(), 1);

    registry.stop().await.expect("stop");
}

#[test]
fn duplicate_route_fails_at_build() {
    let err = RouteTable::<Counter>::builder()
        .route(MSG_HIT, hit)
        .route(MSG_HIT, report)
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateRoute(MSG_HIT)));
}

#[test]
fn reserved_route_fails_at_build() {
    let err = RouteTable::<Counter>::builder()
        .route(ERROR_TYPE, hit)
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::ReservedRoute(ERROR_TYPE)));
}

#[tokio::test]
async fn lifecycle_misuse_is_reported() {
    let registry = counter_registry("players", Mode::PerKey);

    assert!(matches!(
        registry.get_or_create("alice"),
        Err(ConfigError::NotStarted(_))
    ));

    registry.start().expect("start");
    assert!(matches!(
        registry.start(),
        Err(ConfigError::AlreadyStarted(_))
    ));

    registry.stop().await.expect("stop");
    assert!(matches!(registry.start(), Err(ConfigError::Stopped(_))));
    assert!(matches!(
        registry.send_to("alice", Message::new(MSG_HIT, [])),
        Err(ConfigError::Stopped(_))
    ));
    assert!(matches!(registry.stop().await, Err(ConfigError::Stopped(_))));
}
