use std::time::Duration;

use mailroom::Throttle;
use mailroom::prelude::*;

const MSG_JOIN: u16 = 1;
const MSG_SLAY: u16 = 2;
const MSG_RESPAWN: u16 = 3;
const MSG_CAST: u16 = 4;

// The whole dungeon lives in one actor, so fights and respawns never race.
struct Dungeon {
    heroes: Vec<String>,
    monsters: u32,
    pending_respawns: u32,
    status: Throttle,
}

async fn join(state: &mut Dungeon, _cx: &ActorContext, msg: Message) -> HandlerResult {
    let hero = String::from_utf8_lossy(msg.payload()).into_owned();
    state.heroes.push(hero.clone());
    let line = format!(
        "{hero} enters the dungeon ({} monster(s) lurking)",
        state.monsters
    );
    Ok(Some(Message::new(MSG_JOIN, line.into_bytes())))
}

async fn slay(state: &mut Dungeon, _cx: &ActorContext, msg: Message) -> HandlerResult {
    if state.monsters == 0 {
        anyhow::bail!("nothing left to slay");
    }
    state.monsters -= 1;
    state.pending_respawns += 1;
    println!(
        "{} slays a monster ({} left, {} respawn(s) pending)",
        String::from_utf8_lossy(msg.payload()),
        state.monsters,
        state.pending_respawns
    );
    Ok(None)
}

async fn respawn(state: &mut Dungeon, _cx: &ActorContext, _msg: Message) -> HandlerResult {
    state.pending_respawns -= 1;
    state.monsters += 1;
    println!("a monster crawls out of the dark ({} now)", state.monsters);
    Ok(None)
}

async fn cast(_state: &mut Dungeon, _cx: &ActorContext, msg: Message) -> HandlerResult {
    let spell = String::from_utf8_lossy(msg.payload()).into_owned();
    Err(anyhow::anyhow!("the runes for `{spell}` are not in the book"))
}

fn heartbeat(state: &mut Dungeon, cx: &ActorContext) {
    // one respawn per pass keeps the mailbox fair to real traffic
    if state.pending_respawns > 0 {
        cx.send_to_self(Message::new(MSG_RESPAWN, []));
    }
    if state.status.ready() {
        println!(
            "~ dungeon status: {} hero(es), {} monster(s)",
            state.heroes.len(),
            state.monsters
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let table = RouteTable::builder()
        .route(MSG_JOIN, join)
        .route(MSG_SLAY, slay)
        .route(MSG_RESPAWN, respawn)
        .route(MSG_CAST, cast)
        .on_start(|_state: &mut Dungeon, cx| {
            println!("dungeon `{}` opens its gates", cx.registry());
        })
        .on_stop(|state: &mut Dungeon, _cx| {
            println!("gates close behind {} hero(es)", state.heroes.len());
        })
        .on_tick(heartbeat)
        .build()?;

    let world = Registry::builder("dungeon", Mode::Single, move || {
        Dispatch::new(
            Dungeon {
                heroes: Vec::new(),
                monsters: 3,
                pending_respawns: 0,
                status: Throttle::new(Duration::from_millis(50)),
            },
            table.clone(),
        )
    })
    .build();
    world.start()?;
    let dungeon = world.get_or_create("anything")?; // single mode ignores the key

    println!("=== Heroes arrive ===");
    for hero in ["alice", "bob"] {
        let reply = dungeon.call(Message::new(MSG_JOIN, hero.as_bytes())).await?;
        println!("{}", String::from_utf8_lossy(reply.payload()));
    }

    println!("\n=== The fight ===");
    for _ in 0..3 {
        dungeon.send(Message::new(MSG_SLAY, *b"alice")).await?;
    }

    println!("\n=== A spell goes wrong ===");
    let reply = dungeon.call(Message::new(MSG_CAST, *b"fireball")).await?;
    if reply.is_error() {
        println!(
            "the spell fizzles: {}",
            String::from_utf8_lossy(reply.payload())
        );
    }

    // give the respawn pump a moment to work through its backlog
    tokio::time::sleep(Duration::from_millis(100)).await;

    world.stop().await?;
    Ok(())
}
