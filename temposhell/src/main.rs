use anyhow::Result;
use colored::Colorize;
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempoclock::prelude::*;
use tempoclock::{LIB_NAME, VERSION as LIB_VERSION};
use tracing::info;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct CommandHighlighter;

impl Highlighter for CommandHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    println!("{}", LIB_NAME.cyan().bold());
    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!("{}", version_string.dimmed());
    println!(
        "{}",
        "---------------------------------------------------------".dimmed()
    );
}

/// Spawns tasks subscribing to the clock's event streams. The raw pulse
/// stream printer is gated by a shared flag toggled from the shell.
fn spawn_event_listeners(clock: &TempoClock, is_watching_pulses: Arc<AtomicBool>) {
    let mut transport_rx = clock.subscribe_transport_events();
    tokio::spawn(async move {
        while let Ok(event) = transport_rx.recv().await {
            println!("\n<-- [TRANSPORT EVENT] {:?}", event);
        }
    });

    let mut pulse_rx = clock.subscribe_pulse_events();
    let is_watching_pulses_for_pulse = is_watching_pulses.clone();
    tokio::spawn(async move {
        while let Ok(event) = pulse_rx.recv().await {
            if is_watching_pulses_for_pulse.load(Ordering::Relaxed) {
                println!("<-- [PULSE] #{}", event.pulse_count);
            }
        }
    });

    let mut beat_rx = clock.subscribe_beat_events();
    tokio::spawn(async move {
        while let Ok(event) = beat_rx.recv().await {
            if is_watching_pulses.load(Ordering::Relaxed) {
                println!(
                    "<-- [BEAT] #{} (pulse #{})",
                    event.beat_count, event.pulse_count
                );
            }
        }
    });
}

fn print_status(clock: &TempoClock) {
    let (pulse_cbs, beat_cbs) = clock.callback_counts();
    println!("Clock '{}':", clock.name());
    println!("  state       : {:?}", clock.transport_state());
    println!("  bpm         : {}", clock.bpm());
    println!("  ppqn        : {}", clock.ppqn());
    println!("  pulse count : {}", clock.pulse_count());
    println!("  beat count  : {}", clock.beat_count());
    println!("  callbacks   : {} pulse, {} beat", pulse_cbs, beat_cbs);
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_target(false)
        .init();

    let clock = TempoClock::new(ClockConfig::default());
    clock.set_name("shell");

    // Shared flag for the pulse stream printer.
    let is_watching_pulses = Arc::new(AtomicBool::new(false));
    spawn_event_listeners(&clock, is_watching_pulses.clone());

    info!("{} clock spawned in the background", LIB_NAME);

    let mut rl = Editor::new()?;
    rl.set_helper(Some(CommandHighlighter));

    println!(
        "{} is paused. Type 'help' for commands or 'exit' to quit.",
        LIB_NAME.cyan()
    );

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let readline = rl.readline(&prompt);
        match readline {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.trim().split_whitespace().collect::<Vec<_>>();

                match args.as_slice() {
                    ["bpm", value] => match value.parse::<u16>() {
                        Ok(bpm) => {
                            clock.set_bpm(bpm);
                            println!("--> bpm set to {} (clamped to [20, 300])", clock.bpm());
                        }
                        Err(_) => println!("Error: '{}' is not a valid BPM.", value),
                    },
                    ["ppqn", value] => match value.parse::<u16>() {
                        Ok(ppqn) => {
                            clock.set_ppqn(ppqn);
                            println!("--> ppqn set to {} (clamped to [1, 192])", clock.ppqn());
                        }
                        Err(_) => println!("Error: '{}' is not a valid PPQN.", value),
                    },
                    ["start"] => {
                        clock.start();
                        println!("--> Clock started.");
                    }
                    ["pause"] => {
                        clock.pause();
                        println!("--> Clock paused.");
                    }
                    ["reset"] => {
                        clock.reset_counts();
                        println!("--> Counters reset to zero.");
                    }
                    ["status"] => print_status(&clock),
                    ["watch", "on"] => {
                        is_watching_pulses.store(true, Ordering::Relaxed);
                        println!("--> Watching the raw pulse/beat stream.");
                    }
                    ["watch", "off"] => {
                        is_watching_pulses.store(false, Ordering::Relaxed);
                        println!("--> Stopped watching the pulse/beat stream.");
                    }
                    ["help"] => {
                        println!("Available commands:");
                        println!("  bpm <N>       - Sets beats per minute (clamped to [20, 300]).");
                        println!("  ppqn <N>      - Sets pulses per quarter note (clamped to [1, 192]).");
                        println!("  start         - Starts counting and dispatching pulses.");
                        println!("  pause         - Pauses the transport (loop keeps its grid).");
                        println!("  reset         - Zeroes the pulse and beat counters.");
                        println!("  status        - Shows the clock's current state.");
                        println!("  watch on|off  - Toggles printing of the pulse/beat stream.");
                        println!("  exit          - Shuts the clock down and quits.");
                    }
                    ["exit"] => break,
                    [] => {}
                    _ => println!("Unknown command: '{}'. Type 'help'.", line),
                }
            }
            Err(_) => {
                println!("Exiting temposhell...");
                break;
            }
        }
    }

    clock.shutdown();
    clock.join().await;
    Ok(())
}
