use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::event::{ChatEvent, TextMessage};

/// Receives chat events from the listen loop.
///
/// Callbacks run on the listen task, one event at a time, in wire order.
/// A callback that blocks stalls parsing of everything behind it.
pub trait ChatListener: Send + Sync {
    /// Routes `event` to the matching callback. Override to handle events as values.
    fn on_event(&self, event: &ChatEvent) {
        match event {
            ChatEvent::LoginResult { success, error } => {
                self.on_login_result(*success, error.as_deref());
            }
            ChatEvent::Disconnected => self.on_disconnect(),
            ChatEvent::UserList { users } => self.on_user_list(users),
            ChatEvent::MessageReceived(message) => self.on_message_received(message),
            ChatEvent::MessageError { error } => self.on_message_error(error),
            ChatEvent::CommandError { error } => self.on_command_error(error),
            ChatEvent::SupportedCommands { commands } => self.on_supported_commands(commands),
        }
    }

    fn on_login_result(&self, _success: bool, _error: Option<&str>) {}

    fn on_disconnect(&self) {}

    fn on_user_list(&self, _users: &[String]) {}

    fn on_message_received(&self, _message: &TextMessage) {}

    fn on_message_error(&self, _error: &str) {}

    fn on_command_error(&self, _error: &str) {}

    fn on_supported_commands(&self, _commands: &[String]) {}
}

/// Ordered set of listeners.
///
/// Each dispatch iterates a copy of the list taken when the dispatch begins,
/// so adds and removes never interleave with a delivery in progress.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<Vec<Arc<dyn ChatListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener`; returns `false` if that same instance is already registered.
    pub fn add(&self, listener: Arc<dyn ChatListener>) -> bool {
        let mut listeners = self.listeners.lock();
        let target = identity(&listener);
        if listeners.iter().any(|existing| identity(existing) == target) {
            return false;
        }
        listeners.push(listener);
        true
    }

    pub fn remove<L>(&self, listener: &Arc<L>) -> bool
    where
        L: ChatListener + ?Sized,
    {
        let target = identity(listener);
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|existing| identity(existing) != target);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, event: &ChatEvent) {
        let snapshot = self.listeners.lock().clone();
        for listener in snapshot {
            listener.on_event(event);
        }
    }
}

fn identity<L: ?Sized>(listener: &Arc<L>) -> *const () {
    Arc::as_ptr(listener).cast::<()>()
}

/// Forwards every event into an unbounded channel.
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<ChatEvent>,
}

/// Creates a listener together with the receiving end of its channel.
pub fn channel() -> (Arc<ChannelListener>, mpsc::UnboundedReceiver<ChatEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelListener { tx }), rx)
}

impl ChatListener for ChannelListener {
    fn on_event(&self, event: &ChatEvent) {
        // Receiver gone means nobody is interested any more.
        let _ = self.tx.send(event.clone());
    }
}
