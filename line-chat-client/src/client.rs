use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use parking_lot::Mutex as SyncMutex;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    select,
    sync::{Mutex, watch},
    task::JoinHandle,
};
use tracing::{debug, info, trace, warn};

use crate::{
    command::{Command, validate_line},
    error::ClientError,
    event::ChatEvent,
    line::{self, LineReader, LineWriter},
    listen,
    listener::{ChatListener, ListenerRegistry},
};

/// Handle to a chat client.
///
/// Cloning is cheap; every clone drives the same connection and listener set,
/// so one clone can send while another disconnects.
#[derive(Clone, Default)]
pub struct ChatClient {
    inner: Arc<ClientInner>,
}

impl ChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects to a chat server over TCP.
    ///
    /// Returns `false` when the connection could not be opened or one is
    /// already live; [`last_error`](Self::last_error) says why.
    pub async fn connect(&self, host: &str, port: u16) -> bool {
        let result = self.inner.open_tcp(host, port).await;
        self.inner.report("connect failed", result)
    }

    /// Connects over an already established duplex stream.
    pub async fn connect_with<R, W>(&self, reader: R, writer: W) -> bool
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let result = self
            .inner
            .install(LineReader::new(reader), LineWriter::new(writer))
            .await;
        self.inner.report("connect failed", result)
    }

    /// Closes the connection and notifies listeners once.
    ///
    /// Safe to call from several tasks at once and when already disconnected.
    pub async fn disconnect(&self) {
        self.inner.teardown(None).await;
    }

    pub fn is_connection_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Most recent error message, or an empty string.
    pub fn last_error(&self) -> String {
        self.inner.last_error.lock().clone().unwrap_or_default()
    }

    /// Spawns the listen loop for the current connection.
    ///
    /// Only the first call per connection starts a loop; later calls, and
    /// calls without a connection, return `None`.
    pub async fn start_listening(&self) -> Option<JoinHandle<()>> {
        match self.inner.claim_reader().await {
            Ok((reader, generation, shutdown)) => {
                let inner = Arc::clone(&self.inner);
                Some(tokio::spawn(listen::run(
                    inner, reader, generation, shutdown,
                )))
            }
            Err(err) => {
                debug!(error = %err, "listen loop not started");
                None
            }
        }
    }

    /// Writes one raw protocol line.
    pub async fn send_command(&self, raw: &str) -> bool {
        let result = self.inner.write_line(raw).await;
        self.inner.report("command not sent", result)
    }

    pub async fn send_public_message(&self, text: &str) -> bool {
        self.send(Command::public_message(text), "public message not sent")
            .await
    }

    pub async fn send_private_message(&self, recipient: &str, text: &str) -> bool {
        self.send(
            Command::private_message(recipient, text),
            "private message not sent",
        )
        .await
    }

    /// Asks the server to log in as `username`; the outcome arrives as a
    /// [`ChatEvent::LoginResult`].
    pub async fn try_login(&self, username: &str) -> bool {
        self.send(Command::login(username), "login not sent").await
    }

    pub async fn refresh_user_list(&self) -> bool {
        self.send(Command::UserListRequest, "user list request not sent")
            .await
    }

    pub async fn ask_supported_commands(&self) -> bool {
        self.send(Command::CapabilityRequest, "help request not sent")
            .await
    }

    /// Registers a listener; a listener already registered is left as is.
    pub fn add_listener(&self, listener: Arc<dyn ChatListener>) -> bool {
        self.inner.listeners.add(listener)
    }

    pub fn remove_listener<L>(&self, listener: &Arc<L>) -> bool
    where
        L: ChatListener + ?Sized,
    {
        self.inner.listeners.remove(listener)
    }

    async fn send(&self, command: Command, context: &str) -> bool {
        let result = match command.validate() {
            Ok(()) => self.inner.write_line(&command.encode()).await,
            Err(err) => Err(err),
        };
        self.inner.report(context, result)
    }
}

#[derive(Default)]
pub(crate) struct ClientInner {
    /// Held only for bookkeeping and dispatch, never across socket I/O.
    connection: Mutex<Option<Connection>>,
    active: AtomicBool,
    generations: AtomicU64,
    last_error: SyncMutex<Option<String>>,
    listeners: ListenerRegistry,
}

struct Connection {
    generation: u64,
    writer: Arc<Mutex<LineWriter>>,
    reader: Option<LineReader>,
    shutdown: watch::Sender<bool>,
}

impl Connection {
    async fn close(self) {
        let mut writer = self.writer.lock().await;
        if let Err(error) = writer.close().await {
            debug!(
                generation = self.generation,
                ?error,
                "failed to shut down chat connection cleanly"
            );
        }
    }
}

impl ClientInner {
    async fn open_tcp(&self, host: &str, port: u16) -> Result<(), ClientError> {
        if self.active.load(Ordering::Acquire) {
            return Err(ClientError::AlreadyConnected);
        }
        let (reader, writer) = line::open(host, port)
            .await
            .map_err(|source| ClientError::Connect {
                addr: format!("{host}:{port}"),
                source,
            })?;
        info!(host, port, "connected to chat server");
        self.install(reader, writer).await
    }

    async fn install(&self, reader: LineReader, writer: LineWriter) -> Result<(), ClientError> {
        let mut slot = self.connection.lock().await;
        if slot.is_some() {
            return Err(ClientError::AlreadyConnected);
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let (shutdown, _) = watch::channel(false);
        *slot = Some(Connection {
            generation,
            writer: Arc::new(Mutex::new(writer)),
            reader: Some(reader),
            shutdown,
        });
        self.active.store(true, Ordering::Release);
        debug!(generation, "connection installed");
        Ok(())
    }

    async fn claim_reader(
        &self,
    ) -> Result<(LineReader, u64, watch::Receiver<bool>), ClientError> {
        let mut slot = self.connection.lock().await;
        let connection = slot.as_mut().ok_or(ClientError::NotListening)?;
        let reader = connection.reader.take().ok_or(ClientError::NotListening)?;
        Ok((
            reader,
            connection.generation,
            connection.shutdown.subscribe(),
        ))
    }

    async fn write_line(&self, line: &str) -> Result<(), ClientError> {
        validate_line(line)?;

        let (generation, writer, mut shutdown) = {
            let slot = self.connection.lock().await;
            let connection = slot.as_ref().ok_or(ClientError::NotConnected)?;
            (
                connection.generation,
                Arc::clone(&connection.writer),
                connection.shutdown.subscribe(),
            )
        };

        // Teardown abandons a write stuck on a full socket.
        let written = select! {
            biased;
            _ = shutdown.changed() => None,
            result = async { writer.lock().await.write_line(line).await } => Some(result),
        };

        match written {
            None => {
                debug!(generation, "send abandoned, connection closed");
                Err(ClientError::Interrupted)
            }
            Some(Err(source)) => {
                warn!(generation, error = ?source, "write failed, dropping connection");
                self.teardown(Some(generation)).await;
                Err(ClientError::Write(source))
            }
            Some(Ok(())) => {
                trace!(generation, line, "sent command");
                Ok(())
            }
        }
    }

    /// Closes the connection if it is live and, when `generation` is given,
    /// belongs to that generation. Returns whether this call did the closing.
    pub(crate) async fn teardown(&self, generation: Option<u64>) -> bool {
        let connection = {
            let mut slot = self.connection.lock().await;
            let matches = slot
                .as_ref()
                .is_some_and(|current| generation.is_none_or(|g| g == current.generation));
            if !matches {
                return false;
            }
            let Some(connection) = slot.take() else {
                return false;
            };

            self.active.store(false, Ordering::Release);
            // Wakes the listen loop and any send stuck on a full socket.
            connection.shutdown.send_replace(true);
            info!(generation = connection.generation, "disconnected from chat server");

            // Still under the lock so no event of this generation can follow.
            self.listeners.notify(&ChatEvent::Disconnected);
            connection
        };

        connection.close().await;
        true
    }

    /// Delivers `event` if `generation` is still the live connection.
    pub(crate) async fn deliver(&self, generation: u64, event: &ChatEvent) -> bool {
        let slot = self.connection.lock().await;
        if slot.as_ref().map(|current| current.generation) != Some(generation) {
            return false;
        }
        self.listeners.notify(event);
        true
    }

    pub(crate) fn record_error(&self, message: String) {
        *self.last_error.lock() = Some(message);
    }

    fn report(&self, context: &str, result: Result<(), ClientError>) -> bool {
        match result {
            Ok(()) => true,
            Err(err) => {
                let message = format!("{context}: {err}");
                debug!(%message, "client operation failed");
                self.record_error(message);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{
        io::{DuplexStream, ReadHalf, WriteHalf},
        sync::mpsc,
        time::timeout,
    };

    use super::*;
    use crate::{event::TextMessage, listener};

    struct Peer {
        reader: LineReader,
        writer: WriteHalf<DuplexStream>,
    }

    async fn connected_client() -> (ChatClient, Peer, mpsc::UnboundedReceiver<ChatEvent>) {
        connected_over(4096).await
    }

    async fn connected_over(
        capacity: usize,
    ) -> (ChatClient, Peer, mpsc::UnboundedReceiver<ChatEvent>) {
        let (client_end, server_end) = tokio::io::duplex(capacity);
        let (client_read, client_write): (ReadHalf<DuplexStream>, WriteHalf<DuplexStream>) =
            tokio::io::split(client_end);
        let (server_read, server_write) = tokio::io::split(server_end);

        let client = ChatClient::new();
        let (listener, events) = listener::channel();
        client.add_listener(listener);
        assert!(client.connect_with(client_read, client_write).await);

        let peer = Peer {
            reader: LineReader::new(server_read),
            writer: server_write,
        };
        (client, peer, events)
    }

    async fn next_line(peer: &mut Peer) -> Option<String> {
        timeout(Duration::from_secs(1), peer.reader.read_line())
            .await
            .expect("line in time")
            .expect("read line")
    }

    #[tokio::test]
    async fn typed_commands_use_wire_templates() {
        let (client, mut peer, _events) = connected_client().await;

        assert!(client.try_login("alice").await);
        assert!(client.send_public_message("hello world").await);
        assert!(client.send_private_message("bob", "psst, over here").await);
        assert!(client.refresh_user_list().await);
        assert!(client.ask_supported_commands().await);

        assert_eq!(next_line(&mut peer).await.as_deref(), Some("login alice"));
        assert_eq!(next_line(&mut peer).await.as_deref(), Some("msg hello world"));
        assert_eq!(
            next_line(&mut peer).await.as_deref(),
            Some("privmsg bob psst, over here")
        );
        assert_eq!(next_line(&mut peer).await.as_deref(), Some("users"));
        assert_eq!(next_line(&mut peer).await.as_deref(), Some("help"));
        assert_eq!(client.last_error(), "");
    }

    #[tokio::test]
    async fn blank_commands_are_rejected_without_writing() {
        let (client, mut peer, _events) = connected_client().await;

        assert!(!client.send_command("").await);
        assert!(!client.send_command("   ").await);
        assert!(client.last_error().contains("command is empty"));
        assert!(!client.send_command("msg one\nmsg two").await);

        assert!(client.send_command("users").await);
        assert_eq!(next_line(&mut peer).await.as_deref(), Some("users"));
    }

    #[tokio::test]
    async fn sending_while_disconnected_fails() {
        let client = ChatClient::new();

        assert!(!client.send_command("users").await);
        assert!(!client.send_public_message("hi").await);
        assert_eq!(client.last_error(), "public message not sent: not connected");
    }

    #[tokio::test]
    async fn names_with_spaces_are_rejected() {
        let (client, mut peer, _events) = connected_client().await;

        assert!(!client.try_login("alice smith").await);
        assert!(client.last_error().starts_with("login not sent"));
        assert!(!client.send_private_message("bob jr", "hi").await);
        assert!(
            client
                .last_error()
                .starts_with("private message not sent")
        );

        client.disconnect().await;
        assert_eq!(next_line(&mut peer).await, None);
    }

    #[tokio::test]
    async fn second_connect_is_refused() {
        let (client, _peer, _events) = connected_client().await;
        let (extra, _other) = tokio::io::duplex(64);
        let (read, write) = tokio::io::split(extra);

        assert!(!client.connect_with(read, write).await);
        assert_eq!(client.last_error(), "connect failed: already connected");
        assert!(client.is_connection_active());
    }

    #[tokio::test]
    async fn disconnect_twice_emits_one_event() {
        let (client, mut peer, mut events) = connected_client().await;

        client.disconnect().await;
        client.disconnect().await;

        assert!(!client.is_connection_active());
        assert_eq!(events.recv().await, Some(ChatEvent::Disconnected));
        assert!(events.try_recv().is_err());
        assert_eq!(next_line(&mut peer).await, None);
    }

    #[tokio::test]
    async fn concurrent_disconnects_emit_one_event() {
        let (client, _peer, mut events) = connected_client().await;
        let other = client.clone();

        let first = tokio::spawn(async move { other.disconnect().await });
        client.disconnect().await;
        first.await.expect("disconnect task");

        assert_eq!(events.recv().await, Some(ChatEvent::Disconnected));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn listen_loop_starts_once_per_connection() {
        let (client, _peer, _events) = connected_client().await;

        let handle = client.start_listening().await;
        assert!(handle.is_some());
        assert!(client.start_listening().await.is_none());

        client.disconnect().await;
        let handle = handle.expect("listen handle");
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("listen loop stops after disconnect")
            .expect("listen task");
    }

    #[tokio::test]
    async fn listen_loop_dispatches_and_stops_on_eof() {
        use tokio::io::AsyncWriteExt;

        let (client, mut peer, mut events) = connected_client().await;
        let handle = client.start_listening().await.expect("listen handle");

        peer.writer
            .write_all(b"loginok\nshrug\nusers alice bob\n")
            .await
            .expect("write");
        peer.writer.shutdown().await.expect("shutdown");

        assert_eq!(
            events.recv().await,
            Some(ChatEvent::LoginResult {
                success: true,
                error: None
            })
        );
        assert_eq!(
            events.recv().await,
            Some(ChatEvent::UserList {
                users: vec!["alice".into(), "bob".into()]
            })
        );
        assert_eq!(events.recv().await, Some(ChatEvent::Disconnected));

        timeout(Duration::from_secs(1), handle)
            .await
            .expect("listen loop stops at end of stream")
            .expect("listen task");
        assert!(!client.is_connection_active());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn reconnect_starts_a_fresh_generation() {
        let (client, _peer, mut events) = connected_client().await;
        let first = client.start_listening().await.expect("first loop");
        client.disconnect().await;
        assert_eq!(events.recv().await, Some(ChatEvent::Disconnected));
        first.await.expect("first loop ends");

        let (client_end, _server_end) = tokio::io::duplex(64);
        let (read, write) = tokio::io::split(client_end);
        assert!(client.connect_with(read, write).await);
        assert!(client.is_connection_active());
        assert!(client.start_listening().await.is_some());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn invalid_utf8_from_server_ends_the_session() {
        use tokio::io::AsyncWriteExt;

        let (client, mut peer, mut events) = connected_client().await;
        let handle = client.start_listening().await.expect("listen handle");

        peer.writer
            .write_all(&[0xff, 0xfe, b'\n'])
            .await
            .expect("write");

        assert_eq!(events.recv().await, Some(ChatEvent::Disconnected));
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("listen loop stops after a read failure")
            .expect("listen task");
        assert!(!client.is_connection_active());
        assert!(client.last_error().contains("failed to read from server"));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn write_to_vanished_peer_tears_down() {
        let (client, peer, mut events) = connected_client().await;
        drop(peer);

        assert!(!client.send_public_message("anyone there?").await);
        assert!(
            client
                .last_error()
                .starts_with("public message not sent: failed to write to server")
        );
        assert!(!client.is_connection_active());
        assert_eq!(events.recv().await, Some(ChatEvent::Disconnected));
        assert!(events.try_recv().is_err());

        assert!(!client.send_command("users").await);
        assert_eq!(client.last_error(), "command not sent: not connected");
    }

    #[tokio::test]
    async fn events_flow_while_a_send_is_blocked() {
        use tokio::io::AsyncWriteExt;

        let (client, mut peer, mut events) = connected_over(64).await;
        let handle = client.start_listening().await.expect("listen handle");

        let long_text = "x".repeat(4096);
        let sender = client.clone();
        let text = long_text.clone();
        let send = tokio::spawn(async move { sender.send_public_message(&text).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut burst = String::new();
        for n in 0..200 {
            burst.push_str(&format!("msg bob {n}\n"));
        }
        timeout(Duration::from_secs(1), peer.writer.write_all(burst.as_bytes()))
            .await
            .expect("listen loop keeps reading during the send")
            .expect("write");

        for n in 0..200 {
            let event = timeout(Duration::from_secs(1), events.recv())
                .await
                .expect("event in time");
            assert_eq!(
                event,
                Some(ChatEvent::MessageReceived(TextMessage {
                    sender: "bob".into(),
                    private: false,
                    text: n.to_string(),
                }))
            );
        }

        let expected = format!("msg {long_text}");
        assert_eq!(next_line(&mut peer).await.as_deref(), Some(expected.as_str()));
        assert!(send.await.expect("send task"));

        timeout(Duration::from_secs(1), client.disconnect())
            .await
            .expect("disconnect returns");
        assert_eq!(events.recv().await, Some(ChatEvent::Disconnected));
        handle.await.expect("listen task");
    }

    #[tokio::test]
    async fn disconnect_interrupts_a_blocked_send() {
        let (client, _peer, mut events) = connected_over(64).await;
        let handle = client.start_listening().await.expect("listen handle");

        let sender = client.clone();
        let send = tokio::spawn(async move {
            let text = "y".repeat(4096);
            sender.send_public_message(&text).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        timeout(Duration::from_secs(1), client.disconnect())
            .await
            .expect("disconnect does not wait for the stalled peer");

        let sent = timeout(Duration::from_secs(1), send)
            .await
            .expect("send gives up")
            .expect("send task");
        assert!(!sent);
        assert!(client.last_error().starts_with("public message not sent"));
        assert!(!client.is_connection_active());

        assert_eq!(events.recv().await, Some(ChatEvent::Disconnected));
        assert!(events.try_recv().is_err());
        handle.await.expect("listen task");
    }
}
