use mailroom::prelude::*;

const MSG_CHAT: u16 = 1;
const MSG_GIFT: u16 = 2;
const MSG_REPORT: u16 = 3;

// Per-player session state. The registry creates one session per key the
// moment the first message addresses it.
struct Session {
    messages: u32,
    gifts: u32,
}

async fn chat(state: &mut Session, cx: &ActorContext, msg: Message) -> HandlerResult {
    state.messages += 1;
    println!(
        "[{}] says: {}",
        cx.id(),
        String::from_utf8_lossy(msg.payload())
    );
    Ok(None)
}

async fn gift(state: &mut Session, cx: &ActorContext, _msg: Message) -> HandlerResult {
    state.gifts += 1;
    println!("[{}] received a gift ({} total)", cx.id(), state.gifts);
    Ok(None)
}

async fn report(state: &mut Session, cx: &ActorContext, _msg: Message) -> HandlerResult {
    let line = format!(
        "{}: {} chat message(s), {} gift(s)",
        cx.id(),
        state.messages,
        state.gifts
    );
    Ok(Some(Message::new(MSG_REPORT, line.into_bytes())))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let table = RouteTable::builder()
        .route(MSG_CHAT, chat)
        .route(MSG_GIFT, gift)
        .route(MSG_REPORT, report)
        .build()?;

    let sessions = Registry::builder("sessions", Mode::PerKey, move || {
        Dispatch::new(
            Session {
                messages: 0,
                gifts: 0,
            },
            table.clone(),
        )
    })
    .build();
    sessions.start()?;

    println!("=== Players chat ===");
    sessions.send_to("alice", Message::new(MSG_CHAT, *b"hello there"))?;
    sessions.send_to("bob", Message::new(MSG_CHAT, *b"hi alice"))?;
    sessions.send_to("alice", Message::new(MSG_CHAT, *b"ready for the raid?"))?;

    // messages can also carry their own address
    sessions.route(Message::new(MSG_CHAT, *b"sorry, busy tonight").with_key("bob"))?;

    println!("\n=== Season reward for everyone ===");
    sessions.broadcast(Message::new(MSG_GIFT, []));

    println!("\n=== Per-session reports ===");
    for player in ["alice", "bob"] {
        let session = sessions.get_or_create(player)?;
        let reply = session.call(Message::new(MSG_REPORT, [])).await?;
        println!("{}", String::from_utf8_lossy(reply.payload()));
    }

    println!("\n=== Logout ===");
    sessions.remove("bob").await?;
    println!("bob logged out, {} session(s) left", sessions.len());

    sessions.stop().await?;
    println!("all sessions drained");
    Ok(())
}
