use std::io;

use thiserror::Error;

/// Reasons a client operation did not go through.
///
/// The public [`ChatClient`](crate::client::ChatClient) surface reports these
/// as `false` plus [`last_error`](crate::client::ChatClient::last_error) text.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("already connected")]
    AlreadyConnected,

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("not connected")]
    NotConnected,

    #[error("command is empty")]
    EmptyCommand,

    #[error("command must fit on a single line")]
    MultiLineCommand,

    #[error("{field} '{value}' must be a single word without spaces")]
    InvalidArgument { field: &'static str, value: String },

    #[error("failed to write to server: {0}")]
    Write(#[source] io::Error),

    #[error("connection closed while sending")]
    Interrupted,

    #[error("failed to read from server: {0}")]
    Read(#[source] io::Error),

    #[error("listen loop already started or no connection")]
    NotListening,
}
