//! Client for a line-oriented text chat protocol.
//!
//! One [`ChatClient`] owns at most one connection to a chat server. Commands
//! go out as single lines; a background listen task turns every inbound line
//! into a [`ChatEvent`] and hands it to the registered listeners in arrival
//! order.
//!
//! - [`line`] wraps a duplex byte stream as a line reader and writer.
//! - [`command`] encodes outbound requests and checks their arguments.
//! - [`event`] parses server lines into events.
//! - [`listener`] holds the listener trait and the registry that fans events out.
//! - [`client`] manages the connection lifecycle and sending.
//! - [`console`] and [`cli`] make up the interactive terminal client.
//!
//! Unit tests drive the client over `tokio::io::duplex`; the integration tests
//! talk to a scripted TCP peer.

pub mod cli;
pub mod client;
pub mod command;
pub mod console;
pub mod error;
pub mod event;
mod listen;
pub mod line;
pub mod listener;

pub use client::ChatClient;
pub use error::ClientError;
pub use event::{ChatEvent, TextMessage};
pub use listener::{ChatListener, ChannelListener, ListenerRegistry};
