use std::io;

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
};
use tracing::debug;

const LINE_ENDINGS: &[char] = &['\n', '\r'];

type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Opens a TCP connection and splits it into line halves.
pub async fn open(host: &str, port: u16) -> io::Result<(LineReader, LineWriter)> {
    let stream = TcpStream::connect((host, port)).await?;
    if let Err(error) = stream.set_nodelay(true) {
        debug!(?error, "failed to disable nagle on chat connection");
    }
    let (reader, writer) = stream.into_split();
    Ok((LineReader::new(reader), LineWriter::new(writer)))
}

/// Inbound half of a line channel.
pub struct LineReader {
    inner: BufReader<BoxedRead>,
    buffer: String,
}

impl LineReader {
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            inner: BufReader::new(Box::new(reader)),
            buffer: String::new(),
        }
    }

    /// Reads the next non-blank line without its terminator.
    ///
    /// Returns `Ok(None)` once the peer has closed the stream.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        loop {
            self.buffer.clear();
            let bytes = self.inner.read_line(&mut self.buffer).await?;
            if bytes == 0 {
                return Ok(None);
            }

            let trimmed = self.buffer.trim_end_matches(LINE_ENDINGS);
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(trimmed.to_string()));
        }
    }
}

/// Outbound half of a line channel.
pub struct LineWriter {
    inner: BoxedWrite,
}

impl LineWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Box::new(writer),
        }
    }

    /// Writes `line` followed by a newline and flushes so the server sees it right away.
    pub async fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut encoded = Vec::with_capacity(line.len() + 1);
        encoded.extend_from_slice(line.as_bytes());
        encoded.push(b'\n');
        self.inner.write_all(&encoded).await?;
        self.inner.flush().await
    }

    /// Shuts down the outbound direction; the peer observes end of stream.
    pub async fn close(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}
