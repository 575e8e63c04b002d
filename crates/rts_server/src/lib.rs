//! # Age Arena Server
//!
//! Authoritative match server. Clients connect over WebSocket, meet in
//! lobbies or the quick-match queue, and send commands; each match runs in
//! its own task and streams snapshots back.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod config;
pub mod context;
pub mod error;
pub mod lobby;
pub mod match_loop;
pub mod network;
pub mod protocol;
pub mod registry;

pub use config::ServerConfig;
pub use error::ServerError;
pub use network::run;
