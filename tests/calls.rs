use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use mailroom::{
    ActorContext, CallError, CancelToken, Dispatch, ERROR_TYPE, GLOBAL_KEY, HandlerResult, Message,
    Mode, Registry, RouteTable, StopReason,
};

const MSG_ECHO: u16 = 1;
const MSG_SLOW: u16 = 2;
const MSG_SILENT: u16 = 3;
const MSG_FAIL: u16 = 4;
const MSG_PARK: u16 = 5;
const MSG_UNROUTED: u16 = 99;

struct Responder {
    gate: Arc<Semaphore>,
}

async fn echo(_state: &mut Responder, _cx: &ActorContext, msg: Message) -> HandlerResult {
    Ok(Some(Message::new(MSG_ECHO, msg.into_payload())))
}

async fn slow(_state: &mut Responder, _cx: &ActorContext, msg: Message) -> HandlerResult {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Ok(Some(Message::new(MSG_SLOW, msg.into_payload())))
}

async fn silent(_state: &mut Responder, _cx: &ActorContext, _msg: Message) -> HandlerResult {
    Ok(None)
}

async fn fail(_state: &mut Responder, _cx: &ActorContext, _msg: Message) -> HandlerResult {
    Err(anyhow::anyhow!("boom"))
}

async fn park(state: &mut Responder, _cx: &ActorContext, _msg: Message) -> HandlerResult {
    state.gate.acquire().await?.forget();
    Ok(Some(Message::new(MSG_PARK, [])))
}

fn responder_registry(name: &str) -> (Registry, Arc<Semaphore>) {
    let gate = Arc::new(Semaphore::new(0));
    let table = RouteTable::builder()
        .route(MSG_ECHO, echo)
        .route(MSG_SLOW, slow)
        .route(MSG_SILENT, silent)
        .route(MSG_FAIL, fail)
        .route(MSG_PARK, park)
        .build()
        .expect("route table");

    let registry = {
        let gate = gate.clone();
        Registry::builder(name, Mode::Single, move || {
            Dispatch::new(Responder { gate: gate.clone() }, table.clone())
        })
        .build()
    };
    (registry, gate)
}

#[tokio::test]
async fn call_round_trip() {
    let (registry, _gate) = responder_registry("calls");
    registry.start().expect("start");
    let actor = registry.get_or_create(GLOBAL_KEY).expect("actor");

    let reply = actor
        .call(Message::new(MSG_ECHO, *b"marco"))
        .await
        .expect("reply");
    assert_eq!(reply.type_id(), MSG_ECHO);
    assert_eq!(reply.payload(), b"marco");

    registry.stop().await.expect("stop");
}

#[tokio::test(start_paused = true)]
async fn call_times_out_before_a_slow_handler() {
    let (registry, _gate) = responder_registry("calls");
    registry.start().expect("start");
    let actor = registry.get_or_create(GLOBAL_KEY).expect("actor");

    let err = actor.call(Message::new(MSG_SLOW, [])).await.unwrap_err();
    assert!(matches!(err, CallError::Timeout(t) if t == Duration::from_secs(3)));

    // the slow handler still ran to completion; its late reply went nowhere
    let reply = actor
        .call(Message::new(MSG_ECHO, *b"still here"))
        .await
        .expect("reply");
    assert_eq!(reply.payload(), b"still here");

    registry.stop().await.expect("stop");
}

#[tokio::test(start_paused = true)]
async fn call_timeout_can_be_raised_per_call() {
    let (registry, _gate) = responder_registry("calls");
    registry.start().expect("start");
    let actor = registry.get_or_create(GLOBAL_KEY).expect("actor");

    let reply = actor
        .call_with_timeout(
            Message::new(MSG_SLOW, *b"worth the wait"),
            Duration::from_secs(8),
        )
        .await
        .expect("reply");
    assert_eq!(reply.payload(), b"worth the wait");

    registry.stop().await.expect("stop");
}

#[tokio::test]
async fn caller_cancellation_abandons_the_wait_only() {
    let (registry, gate) = responder_registry("calls");
    registry.start().expect("start");
    let actor = registry.get_or_create(GLOBAL_KEY).expect("actor");

    let token = CancelToken::new();
    let call = tokio::spawn({
        let actor = actor.clone();
        let msg = Message::new(MSG_PARK, []).with_token(token.clone());
        async move { actor.call(msg).await }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel(StopReason::Aborted);

    let err = call.await.expect("join").unwrap_err();
    assert!(matches!(err, CallError::Cancelled(r) if r.value() == StopReason::Aborted));

    // the parked handler was not interrupted; it finishes once released
    gate.add_permits(1);
    let reply = actor
        .call(Message::new(MSG_ECHO, *b"after"))
        .await
        .expect("reply");
    assert_eq!(reply.payload(), b"after");

    registry.stop().await.expect("stop");
}

#[tokio::test]
async fn a_route_without_a_reply_yields_no_reply() {
    let (registry, _gate) = responder_registry("calls");
    registry.start().expect("start");
    let actor = registry.get_or_create(GLOBAL_KEY).expect("actor");

    let err = actor.call(Message::new(MSG_SILENT, [])).await.unwrap_err();
    assert!(matches!(err, CallError::NoReply));

    registry.stop().await.expect("stop");
}

#[tokio::test]
async fn an_unrouted_call_yields_no_reply() {
    let (registry, _gate) = responder_registry("calls");
    registry.start().expect("start");
    let actor = registry.get_or_create(GLOBAL_KEY).expect("actor");

    let err = actor
        .call(Message::new(MSG_UNROUTED, []))
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::NoReply));

    registry.stop().await.expect("stop");
}

#[tokio::test]
async fn handler_failure_becomes_an_error_reply() {
    let (registry, _gate) = responder_registry("calls");
    registry.start().expect("start");
    let actor = registry.get_or_create(GLOBAL_KEY).expect("actor");

    let reply = actor.call(Message::new(MSG_FAIL, [])).await.expect("reply");
    assert!(reply.is_error());
    assert_eq!(reply.type_id(), ERROR_TYPE);
    assert_eq!(reply.payload(), b"boom");
    assert_eq!(registry.stats().failed(), 1);
    assert_eq!(
        registry.stats().processed(),
        1,
        "a failed message still counts as processed"
    );

    registry.stop().await.expect("stop");
}
