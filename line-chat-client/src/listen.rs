use std::sync::Arc;

use tokio::{select, sync::watch};
use tracing::{debug, info, warn};

use crate::{client::ClientInner, error::ClientError, event::parse_line, line::LineReader};

/// Reads server lines for one connection generation until it ends.
///
/// Each parsed event is delivered before the next read, so listeners see
/// events in wire order. End of stream and read failures close this
/// generation; a shutdown signal means someone else already closed it.
pub(crate) async fn run(
    inner: Arc<ClientInner>,
    mut reader: LineReader,
    generation: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(generation, "listen loop started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let line = select! {
            biased;
            _ = shutdown.changed() => break,
            line = reader.read_line() => line,
        };

        match line {
            Ok(Some(line)) => handle_line(&inner, generation, &line).await,
            Ok(None) => {
                info!(generation, "server closed the connection");
                inner.teardown(Some(generation)).await;
                break;
            }
            Err(err) => {
                warn!(generation, error = ?err, "failed to read from server");
                inner.record_error(ClientError::Read(err).to_string());
                inner.teardown(Some(generation)).await;
                break;
            }
        }
    }

    debug!(generation, "listen loop stopped");
}

async fn handle_line(inner: &ClientInner, generation: u64, line: &str) {
    match parse_line(line) {
        Some(event) => {
            if !inner.deliver(generation, &event).await {
                debug!(generation, ?event, "dropping event for closed connection");
            }
        }
        None => debug!(generation, line, "ignoring unrecognised server line"),
    }
}
