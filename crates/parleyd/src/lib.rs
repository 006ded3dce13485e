//! Parley Daemon - Rendezvous and relay server
//!
//! This crate provides the core infrastructure for the relay daemon:
//! - `registry` - Client registry actor owning names and pairings
//! - `server` - TCP listener, per-connection sessions and writers
//! - `config` - Listen address resolution
//!
//! Clients connect over TCP, register a unique name, pair with another
//! registered client, and exchange text lines through the server.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       parleyd daemon                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  RelayServer    │     │     RegistryActor           │   │
//! │  │ (TCP listener)  │     │  (names + pairings owner)   │   │
//! │  └────────┬────────┘     └──────────────▲──────────────┘   │
//! │           │                             │                   │
//! │           │ connections                 │ commands          │
//! │           ▼                             │                   │
//! │  ┌─────────────────┐                    │                   │
//! │  │    Session      │────────────────────┘                   │
//! │  │  (per client)   │──────▶ Outbound (own + peer writers)   │
//! │  └─────────────────┘                                        │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod registry;
pub mod server;
