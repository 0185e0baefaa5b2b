use clap::{Parser, Subcommand};
use client::local::LocalMatch;
use client::timer::TickOutcome;
use client::{ClientConfig, FileStore, KeyValueStore, MemoryStore, OfflineHub, SyncClient};
use log::{info, warn};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::interval;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Play hot-seat on this terminal
    Local {
        /// Seconds per turn before the player forfeits
        #[arg(short = 't', long, default_value = "30")]
        turn_seconds: u32,
    },

    /// Feed a recorded push log (one JSON event per line) through the client
    Replay {
        /// File with lines like {"event": "BoardUpdated", "payload": [...]}
        file: PathBuf,

        /// Player id of the recording client, so own events are recognised
        #[arg(short = 'p', long)]
        player_id: Option<String>,

        /// Room code of the recording client
        #[arg(short = 'r', long)]
        room: Option<String>,

        /// Persist the session slots to this JSON file instead of memory
        #[arg(long)]
        session_file: Option<PathBuf>,

        /// Full turn length the server restarts clocks with
        #[arg(short = 't', long, default_value = "30")]
        turn_seconds: u32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    match args.mode {
        Mode::Local { turn_seconds } => run_local(turn_seconds).await?,
        Mode::Replay {
            file,
            player_id,
            room,
            session_file,
            turn_seconds,
        } => {
            let identity = (room, player_id);
            let config = ClientConfig::default().with_turn_duration(turn_seconds);
            match session_file {
                Some(path) => replay(&file, FileStore::open(path), identity, config).await?,
                None => replay(&file, MemoryStore::new(), identity, config).await?,
            }
        }
    }

    Ok(())
}

async fn run_local(turn_seconds: u32) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting local game, {}s per turn", turn_seconds);
    println!("Enter a cell 0-8 to play, 'r' to restart, 'q' to quit.");

    let mut game = LocalMatch::new(turn_seconds);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = interval(Duration::from_secs(1));
    ticker.tick().await;

    print!("{}", game.board());
    println!("{} to move", game.current_turn());

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match line.trim() {
                    "q" => break,
                    "r" => {
                        game.restart();
                        println!("New game.");
                    }
                    input => match input.parse::<usize>() {
                        Ok(cell) => {
                            if let Err(e) = game.play(cell) {
                                println!("{}", e.user_message());
                            }
                        }
                        Err(_) => println!("Unknown input '{}'", input),
                    },
                }

                print!("{}", game.board());
                match game.outcome() {
                    Some(outcome) => println!("{} ('r' to play again)", outcome),
                    None => println!("{} to move", game.current_turn()),
                }
            },

            _ = ticker.tick() => {
                match game.tick() {
                    TickOutcome::Running { remaining, .. } if remaining <= 5 => {
                        println!("{}: {}s left", game.current_turn(), remaining);
                    }
                    TickOutcome::TimedOut(_) => {
                        if let Some(outcome) = game.outcome() {
                            println!("Time's up! {}", outcome);
                        }
                    }
                    _ => {}
                }
            },
        }
    }

    Ok(())
}

async fn replay<S: KeyValueStore>(
    file: &Path,
    store: S,
    identity: (Option<String>, Option<String>),
    config: ClientConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let contents = tokio::fs::read_to_string(file).await?;

    let (room, player_id) = identity;
    if let Some(room) = &room {
        store.set(client::store::ROOM_CODE_KEY, room)?;
    }
    if let Some(player_id) = &player_id {
        store.set(client::store::PLAYER_ID_KEY, player_id)?;
    }

    let (_tx, rx) = mpsc::channel(1);
    let mut client = SyncClient::new(OfflineHub, store, rx, config);
    if client.load_stored_identity() {
        info!("Replaying as {:?}", client.session().player_id);
    }

    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((name, payload)) = parse_log_line(line) else {
            warn!("Line {}: not a recorded event", number + 1);
            continue;
        };

        client.handle_raw_push(&name, payload);
        println!("#{} {}", number + 1, name);
        println!("{}", client.session());
    }

    Ok(())
}

/// Accepts `{"event": name, "payload": value}` or `[name, value]`.
fn parse_log_line(line: &str) -> Option<(String, Value)> {
    match serde_json::from_str::<Value>(line).ok()? {
        Value::Object(mut map) => {
            let name = map.remove("event")?.as_str()?.to_string();
            Some((name, map.remove("payload").unwrap_or(Value::Null)))
        }
        Value::Array(mut items) if !items.is_empty() => {
            let payload = if items.len() > 1 { items.remove(1) } else { Value::Null };
            let name = items.first()?.as_str()?.to_string();
            Some((name, payload))
        }
        _ => None,
    }
}
