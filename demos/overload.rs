use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use mailroom::prelude::*;
use mailroom::{ActorConfig, GLOBAL_KEY, SendError};

const MSG_FRAME: u16 = 1;

// A deliberately slow consumer: every frame takes 2 ms to encode while
// the producer pushes frames far faster than that.
struct Encoder {
    encoded: u64,
}

async fn encode(state: &mut Encoder, _cx: &ActorContext, _msg: Message) -> HandlerResult {
    tokio::time::sleep(Duration::from_millis(2)).await;
    state.encoded += 1;
    Ok(None)
}

fn encoder_registry(
    name: &str,
    config: ActorConfig,
    monitor: &Monitor,
    drops: Arc<AtomicU64>,
) -> anyhow::Result<Registry> {
    let table = RouteTable::builder().route(MSG_FRAME, encode).build()?;
    Ok(Registry::builder(name, Mode::Single, move || {
        Dispatch::new(Encoder { encoded: 0 }, table.clone())
    })
    .config(config)
    .monitor(monitor)
    .on_drop(move |label, msg| {
        let n = drops.fetch_add(1, Ordering::Relaxed) + 1;
        if n <= 3 {
            println!("  lost frame {:#06x} at `{label}`", msg.type_id());
        }
    })
    .build())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let monitor = Monitor::new();
    monitor.start(Duration::from_millis(200));

    println!("=== Drop policy: the stream stays live, stale frames are lost ===");
    let drops = Arc::new(AtomicU64::new(0));
    let stream = encoder_registry(
        "stream",
        ActorConfig::new()
            .with_capacity(64)
            .with_backpressure(Backpressure::Drop),
        &monitor,
        drops.clone(),
    )?;
    stream.start()?;
    let encoder = stream.get_or_create(GLOBAL_KEY)?;

    for _ in 0..500 {
        encoder.send(Message::new(MSG_FRAME, [])).await?;
    }
    println!(
        "producer done: {} frame(s) accepted, {} dropped on the floor",
        500 - stream.stats().dropped(),
        stream.stats().dropped()
    );
    stream.stop().await?;

    println!("\n=== Reject policy: the producer is told and backs off ===");
    let ledger = encoder_registry(
        "ledger",
        ActorConfig::new()
            .with_capacity(64)
            .with_backpressure(Backpressure::Reject),
        &monitor,
        Arc::new(AtomicU64::new(0)),
    )?;
    ledger.start()?;
    let writer = ledger.get_or_create(GLOBAL_KEY)?;

    let mut refused = 0u32;
    for _ in 0..500 {
        match writer.send(Message::new(MSG_FRAME, [])).await {
            Ok(()) => {}
            Err(SendError::Full(_)) => {
                refused += 1;
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
    println!("producer done: {refused} send(s) refused at capacity");
    ledger.stop().await?;

    println!("\n=== Final accounting ===");
    for snap in monitor.snapshots() {
        println!(
            "`{}`: processed {}, dropped {}, average handling {:?}",
            snap.name, snap.processed, snap.dropped, snap.avg_busy
        );
    }
    monitor.stop().await;
    Ok(())
}
