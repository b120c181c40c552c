//! Bulls and Cows Library
//!
//! A 4-digit code-breaking game with a single-player mode and a realtime
//! multiplayer mode built on a shared room store.
//!
//! # Features
//! - Secret code generation (4 distinct digits, 1-9)
//! - Guess validation and scoring (count / position matches)
//! - Derived turn order for multiplayer rooms
//! - Room store actor with per-room change feeds
//! - WebSocket gateway and remote store client
//! - Game controller with optimistic, reconciled guess submission
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `StoreServer` is the central actor owning rooms and players
//! - Each gateway connection has a `handler` task talking to the store
//! - Every client runs a `GameController` over a `RoomStore`, local or remote
//! - Turn order is recomputed from replicated guess counts, never stored
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use bulls_cows::{serve, StoreServer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let store = StoreServer::spawn(256);
//!     serve(listener, store, 32).await;
//! }
//! ```

pub mod code;
pub mod config;
pub mod controller;
pub mod error;
pub mod handler;
pub mod message;
pub mod remote;
pub mod room;
pub mod scoring;
pub mod server;
pub mod store;
pub mod subscriber;
pub mod turn;
pub mod types;

// Re-export main types for convenience
pub use code::{Guess, SecretCode};
pub use config::Config;
pub use controller::{GameController, GuessSync, Mode, SingleGame};
pub use error::{AppError, ConfigError, GuessError, SendError, StoreError};
pub use handler::{handle_connection, serve};
pub use message::{ClientMessage, ClientRequest, ErrorCode, ServerMessage};
pub use remote::RemoteStore;
pub use room::{Player, Room};
pub use scoring::{score, GuessResult};
pub use server::{StoreCommand, StoreHandle, StoreServer};
pub use store::{ChangeEvent, RoomStore, Subscription};
pub use types::{ConnectionId, PlayerId, RoomCode, SubscriptionId};
