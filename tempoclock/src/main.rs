use anyhow::Result;
use colored::Colorize;
use tempoclock::prelude::*;
use tempoclock::{LIB_NAME, VERSION};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    println!("{} v{}", LIB_NAME.cyan().bold(), VERSION);

    // 2. Load the clock configuration from an optional `clock.toml` and
    //    TEMPOCLOCK_* environment overrides.
    let config = ClockConfig::load("clock")?;
    info!(?config, "loaded configuration");

    // 3. Create the clock. Its tick loop is already running, paused.
    let clock = TempoClock::new(config);

    // 4. Spawn listeners on the broadcast event streams.
    spawn_event_listeners(&clock);

    // 5. Register synchronous callbacks for precise per-tick work.
    clock.add_pulse_callback(|pulse| {
        if pulse % 4 == 0 {
            info!("[PULSE CALLBACK] pulse #{pulse}");
        }
    });
    clock.add_beat_callback(|beat, pulse| {
        info!("[BEAT CALLBACK] beat #{beat} at pulse #{pulse}");
    });

    // 6. Configure fluently and start. One beat per second at 60 BPM,
    //    subdivided into 4 pulses.
    clock.set_name("demo").set_bpm(60).set_ppqn(4).start();

    info!("Clock running. Press Ctrl+C to shut down.");
    tokio::signal::ctrl_c().await?;

    clock.shutdown();
    clock.join().await;
    info!(
        pulses = clock.pulse_count(),
        beats = clock.beat_count(),
        "clock stopped"
    );
    Ok(())
}

/// Spawns tasks, each subscribing to a different event stream from the clock.
fn spawn_event_listeners(clock: &TempoClock) {
    let mut transport_rx = clock.subscribe_transport_events();
    tokio::spawn(async move {
        while let Ok(event) = transport_rx.recv().await {
            info!("[TRANSPORT] => {:?}", event);
        }
    });

    let mut beat_rx = clock.subscribe_beat_events();
    tokio::spawn(async move {
        while let Ok(event) = beat_rx.recv().await {
            info!(
                "[BEAT STREAM] => beat #{} (pulse #{})",
                event.beat_count, event.pulse_count
            );
        }
    });
}
