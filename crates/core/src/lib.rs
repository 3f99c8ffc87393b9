//! Core library for the cccc collaboration daemon.
//!
//! Each group owns an append-only ledger of events. Actors (agent processes behind a PTY, or
//! headless clients) and the human operator talk through it: messages are routed and injected,
//! read and ack state is derived from the ledger, and an automation scheduler nudges whoever has
//! gone quiet. The daemon exposes everything as JSON-RPC over a Unix socket.
//!
//! Quick start:
//! - Load config via `cccc_core::config::load(Some(&home))`.
//! - Run `cccc_core::daemon::start(socket, home, config, factory)` with
//!   `adapters::NativeRunnerFactory` to serve the control surface.
//! - Call methods such as `group.attach`, `actor.add` and `message.send` with `{group_id, by, args}`.

pub mod adapters;
pub mod agent;
pub mod automation;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod group;
pub mod ledger;
pub mod logging;
pub mod permission;
pub mod router;
pub mod rpc;
pub mod supervisor;
