//! # Relay Server Library
//!
//! This library provides the session and dispatch core of a multiplayer relay
//! server. Game clients connect over UDP, prove that they run a compatible set
//! of content plugins, authenticate with a password, and then exchange typed
//! packets that the server applies to its own view of each player and relays
//! to everyone else who is in the world.
//!
//! ## Core Responsibilities
//!
//! ### Connection Lifecycle
//! Peers connect with a protocol version, receive a random 64-bit connection
//! guid, and are kept alive by periodic pings. Silent peers time out and are
//! torn down exactly like peers that disconnect on purpose.
//!
//! ### Admission
//! Before a session exists a client may send a plugin probe. The server
//! compares the client's ordered plugin list against its manifest, position
//! by position, and either replies with an empty manifest (compatible) or with
//! its full manifest followed by closing the connection. The first regular
//! packet then opens a session, and the server asks for the handshake.
//!
//! ### Load States
//! A handshaked session moves from `NotLoaded` to `Loaded` when the client
//! reports that it finished loading, and to `PostLoaded` on its next player
//! packet. Entering `PostLoaded` exchanges player state with every other
//! player already in the world. Actor and world traffic is only accepted
//! from `PostLoaded` sessions.
//!
//! ## Architecture Design
//!
//! ### Single Dispatch Loop
//! All relay state lives in one [`dispatch::Dispatcher`] that handles one
//! transport event at a time through `&mut self`. Outbound traffic is queued
//! in an [`transport::Outbox`] and flushed by the network layer after each
//! event, so the dispatcher never touches a socket and is fully testable in
//! memory.
//!
//! ### Packet Controllers
//! Player, actor and world packets each have a [`controller::PacketController`]
//! mapping packet identifiers to [`controller::Processor`] trait objects. A
//! processor decodes a packet into its target, applies it, and decides who
//! receives the re-encoded result.
//!
//! ### Scripting Hooks
//! Lifecycle points (server start and stop, player connect and disconnect,
//! message box answers, object numbering) are reported to a
//! [`script::ScriptHooks`] implementation, which may also reject a player
//! and supplies the plugin manifest.
//!
//! ## Module Organization
//!
//! - `transport`: connection ids, transport events and the outbox
//! - `connection`: accepted peers, capacity, pings and timeouts
//! - `session`: player sessions, load states and slot allocation
//! - `controller` and `processors`: per-domain packet handling
//! - `handshake`: plugin compatibility and password checks
//! - `dispatch`: routing and session-state gating
//! - `master`: heartbeats to the master directory
//! - `network`: the tokio socket tasks and main loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use server::script::ConfigHooks;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         bind_addr: "127.0.0.1:25565".to_string(),
//!         password: Some("hunter2".to_string()),
//!         ..ServerConfig::default()
//!     };
//!     let hooks = ConfigHooks::new(config.plugins.clone());
//!
//!     let mut server = Server::new(config, Box::new(hooks)).await?;
//!
//!     // Stop from another task with the handle
//!     let handle = server.handle();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         handle.stop(0);
//!     });
//!
//!     let exit_code = server.run().await?;
//!     std::process::exit(exit_code);
//! }
//! ```
//!
//! The server runs three internal async tasks next to the main loop:
//! - **Network Receiver**: decodes incoming datagrams
//! - **Network Sender**: writes queued datagrams to the socket
//! - **Liveness Checker**: pings peers and reports the ones that time out

pub mod config;
pub mod connection;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod handshake;
pub mod master;
pub mod network;
pub mod processors;
pub mod script;
pub mod session;
pub mod transport;
