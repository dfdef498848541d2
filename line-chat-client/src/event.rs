use serde::{Deserialize, Serialize};

/// A chat message relayed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMessage {
    pub sender: String,
    pub private: bool,
    pub text: String,
}

/// Notifications produced from server lines, plus the local disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    LoginResult {
        success: bool,
        error: Option<String>,
    },
    Disconnected,
    /// Names in server order. Runs of spaces never produce empty names.
    UserList {
        users: Vec<String>,
    },
    MessageReceived(TextMessage),
    MessageError {
        error: String,
    },
    CommandError {
        error: String,
    },
    /// Command words in server order, split the same way as [`ChatEvent::UserList`].
    SupportedCommands {
        commands: Vec<String>,
    },
}

/// Maps one inbound line to an event.
///
/// Unknown command words yield `None` so newer servers can add responses
/// without breaking older clients.
pub fn parse_line(line: &str) -> Option<ChatEvent> {
    let (word, remainder) = match line.split_once(' ') {
        Some((word, remainder)) => (word, Some(remainder)),
        None => (line, None),
    };

    let event = match word {
        "loginok" => ChatEvent::LoginResult {
            success: true,
            error: None,
        },
        "loginerr" => ChatEvent::LoginResult {
            success: false,
            error: remainder.map(str::to_string),
        },
        "users" => ChatEvent::UserList {
            users: split_names(remainder),
        },
        "msg" => ChatEvent::MessageReceived(parse_message(remainder?, false)),
        "privmsg" => ChatEvent::MessageReceived(parse_message(remainder?, true)),
        "msgerr" => ChatEvent::MessageError {
            error: remainder.unwrap_or_default().to_string(),
        },
        "cmderr" => ChatEvent::CommandError {
            error: remainder.unwrap_or_default().to_string(),
        },
        "supported" => ChatEvent::SupportedCommands {
            commands: split_names(remainder),
        },
        _ => return None,
    };
    Some(event)
}

// The text after the sender is kept even when empty; listeners always get a string.
fn parse_message(argument: &str, private: bool) -> TextMessage {
    let (sender, text) = argument.split_once(' ').unwrap_or((argument, ""));
    TextMessage {
        sender: sender.to_string(),
        private,
        text: text.to_string(),
    }
}

fn split_names(remainder: Option<&str>) -> Vec<String> {
    remainder
        .unwrap_or_default()
        .split(' ')
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
