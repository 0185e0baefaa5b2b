//! # Tic-Tac-Toe Sync Client Library
//!
//! This library keeps a client's view of a remote, authoritative tic-tac-toe
//! room consistent despite dropped connections, out-of-order delivery, and
//! events that arrive twice (once as a call response, once as a broadcast).
//! It also reproduces the server's turn clock locally, corrected for clock
//! skew between the two machines.
//!
//! ## Architecture Overview
//!
//! Components are built once, leaves first, and owned by a single
//! [`SyncClient`]:
//!
//! ### Clock Reconciler (`clock`)
//! Turns server-issued expiry timestamps into local remaining seconds:
//! - Offset correction between client and server clocks
//! - Fallback to relative seconds when timestamps are missing
//! - Legacy single-value expiry shapes
//!
//! ### Correlation Tracker (`correlation`)
//! Remembers correlation ids from direct responses and broadcasts so the
//! second copy of an event can be skipped. Bounded in size and age.
//!
//! ### Turn Timer Engine (`timer`)
//! Two per-side countdowns, at most one running:
//! - Local mode ticks once per second and reports timeouts
//! - Online mode mirrors server ticks and drops values that go stale
//! - Pause and resume around disconnects
//!
//! ### Game-Over Reconciler (`game_over`)
//! Normalizes every termination shape into one canonical outcome and keeps
//! rematch negotiation already on screen.
//!
//! ### Session Protocol (`protocol`, `dispatch`)
//! Create, join and reconnect sequencing with the reconnect fallback chain,
//! plus handlers for every push event.
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::{ClientConfig, ClientInput, Command, MemoryStore, OfflineHub, SyncClient};
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), client::ClientError> {
//! let (tx, rx) = mpsc::channel(64);
//! let mut client = SyncClient::new(OfflineHub, MemoryStore::new(), rx, ClientConfig::default());
//!
//! // Resume a stored session, unless this is the room's own invite link
//! client.startup(Some("/")).await?;
//!
//! // Pushes, connection changes and user commands all go through one channel
//! tx.send(ClientInput::Command(Command::Join("ABCD".to_string())))
//!     .await
//!     .ok();
//! drop(tx);
//!
//! client.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Design Philosophy
//!
//! ### The Server Decides
//! The client never predicts outcomes in online play. Every board and every
//! game over comes from the server; local countdowns are display only.
//!
//! ### Duplicates Are Normal
//! Moves, creates and joins are delivered on two channels. Suppressing the
//! second copy is an optimization and never gates authoritative state.
//!
//! ### Errors Have Kinds
//! Every operation returns a [`ClientError`]. Transport failures become a
//! short status message, terminal rejections send the user back to the idle
//! screen, and timer problems are never shown at all.

pub mod clock;
pub mod config;
pub mod correlation;
pub mod dispatch;
pub mod error;
pub mod game_over;
pub mod hub;
pub mod local;
pub mod protocol;
pub mod session;
pub mod store;
pub mod timer;

pub use config::ClientConfig;
pub use error::{ClientError, ErrorCode, ErrorKind};
pub use hub::{ConnectionState, Hub, OfflineHub};
pub use protocol::{ClientInput, Command, StartupAction, SyncClient};
pub use session::{Session, SessionPhase};
pub use store::{FileStore, KeyValueStore, MemoryStore, SessionStorage};
