//! Maxwin is the turn-exchange pipeline behind the Max-Win-Win sales
//! advisor: a terminal chat client and the relay server it talks to.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns conversation state (transcript, in-flight guard),
//!   configuration, and the versioned persona templates.
//! - [`client`] dispatches turns to the relay and consumes replies in
//!   both transport shapes, and hosts the file-ingest and
//!   voice-capture input adapters.
//! - [`server`] assembles the per-turn instruction prompt, invokes the
//!   model provider, and relays buffered or incremental replies.
//! - [`ui`] renders the terminal interface and runs the interactive
//!   event loop.
//! - [`api`] defines the wire payloads shared by all of the above,
//!   plus the provider adapter.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`): the
//! default command runs [`ui::chat_loop`], `serve` runs
//! [`server::run`].

pub mod api;
pub mod client;
pub mod commands;
pub mod core;
pub mod logging;
pub mod server;
pub mod ui;
