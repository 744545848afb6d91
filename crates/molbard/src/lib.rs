//! molbard - molecule bar inventory server
//!
//! This crate provides the server and its client helpers:
//! - `store` - atom inventory, in memory or in a shared record file
//! - `transport` - stream, datagram and console sources
//! - `reactor` - single-task readiness loop dispatching every source
//! - `handlers` - command semantics applied to the inventory
//! - `config` - flags, TOML file and validation
//! - `client` - supplier and requester clients
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        molbard                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  StreamListener   DatagramEndpoint   Console (stdin thread) │
//! │        │                 │                  │               │
//! │        └────────────┬────┴──────────────────┘               │
//! │                     ▼                                       │
//! │            ┌─────────────────┐                              │
//! │            │     Reactor     │── LiveTable<Session>         │
//! │            │  (one task)     │                              │
//! │            └────────┬────────┘                              │
//! │                     │ handlers                              │
//! │                     ▼                                       │
//! │            ┌─────────────────┐     ┌──────────────────┐     │
//! │            │   BarContext    │────▶│ dyn Inventory    │     │
//! │            │ idle timer,     │     │ memory | mmap    │     │
//! │            │ cancel, watch   │     │ file + lock      │     │
//! │            └─────────────────┘     └──────────────────┘     │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate:
//! - Uses no `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Returns `Result` or `Option` from every fallible operation
//! - Recovers per-client failures locally and keeps serving

pub mod client;
pub mod config;
pub mod handlers;
pub mod reactor;
pub mod store;
pub mod transport;
