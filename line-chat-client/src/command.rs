use std::fmt;

use crate::error::ClientError;

/// Outbound requests understood by the chat server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { username: String },
    PublicMessage { text: String },
    PrivateMessage { recipient: String, text: String },
    UserListRequest,
    CapabilityRequest,
}

impl Command {
    pub fn login(username: impl Into<String>) -> Self {
        Self::Login {
            username: username.into(),
        }
    }

    pub fn public_message(text: impl Into<String>) -> Self {
        Self::PublicMessage { text: text.into() }
    }

    pub fn private_message(recipient: impl Into<String>, text: impl Into<String>) -> Self {
        Self::PrivateMessage {
            recipient: recipient.into(),
            text: text.into(),
        }
    }

    /// Checks the arguments the server splits on whitespace.
    ///
    /// Usernames and recipients are single tokens on the wire; a space inside
    /// one would shift every following field, so those are refused up front.
    /// Message text runs to the end of the line and is not inspected here.
    pub fn validate(&self) -> Result<(), ClientError> {
        match self {
            Self::Login { username } => validate_word("username", username),
            Self::PrivateMessage { recipient, .. } => validate_word("recipient", recipient),
            Self::PublicMessage { .. } | Self::UserListRequest | Self::CapabilityRequest => Ok(()),
        }
    }

    /// Protocol line for this command, without the line terminator.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login { username } => write!(f, "login {username}"),
            Self::PublicMessage { text } => write!(f, "msg {text}"),
            Self::PrivateMessage { recipient, text } => write!(f, "privmsg {recipient} {text}"),
            Self::UserListRequest => f.write_str("users"),
            Self::CapabilityRequest => f.write_str("help"),
        }
    }
}

fn validate_word(field: &'static str, value: &str) -> Result<(), ClientError> {
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        return Err(ClientError::InvalidArgument {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Rejects raw lines that cannot be sent as exactly one protocol command.
pub(crate) fn validate_line(line: &str) -> Result<(), ClientError> {
    if line.trim().is_empty() {
        return Err(ClientError::EmptyCommand);
    }
    if line.contains(['\n', '\r']) {
        return Err(ClientError::MultiLineCommand);
    }
    Ok(())
}
