use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

use crate::error::ConnectionError;

/// Default bound on every connect, write and read.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest protocol line accepted, CRLF included. The Cube splits large
/// metadata into parts well below this.
pub const MAX_LINE: usize = 8192;

/// Line-oriented request/response transport to a Cube.
///
/// The trait exists so the cube client can be driven by a scripted
/// connection in tests.
#[async_trait]
pub trait Connection: Send {
    /// Open the connection. The Cube starts pushing its greeting right away.
    async fn connect(&mut self) -> Result<(), ConnectionError>;

    /// Write one protocol line (already CRLF-terminated).
    async fn send(&mut self, line: &str) -> Result<(), ConnectionError>;

    /// Read CRLF-terminated lines up to and including the first one that
    /// starts with `terminator` (e.g. `"L:"`), returning them verbatim.
    async fn read_response(&mut self, terminator: &str) -> Result<String, ConnectionError>;

    /// Close the connection. Safe to call when already closed.
    async fn disconnect(&mut self);
}

#[async_trait]
impl<C: Connection + ?Sized> Connection for Box<C> {
    async fn connect(&mut self) -> Result<(), ConnectionError> {
        (**self).connect().await
    }

    async fn send(&mut self, line: &str) -> Result<(), ConnectionError> {
        (**self).send(line).await
    }

    async fn read_response(&mut self, terminator: &str) -> Result<String, ConnectionError> {
        (**self).read_response(terminator).await
    }

    async fn disconnect(&mut self) {
        (**self).disconnect().await
    }
}

/// TCP connection to a Cube at `host:port`.
///
/// Construction never touches the network; an unparseable or unreachable
/// address is reported by [`Connection::connect`].
pub struct TcpConnection {
    host: String,
    port: u16,
    timeout: Duration,
    stream: Option<BufReader<TcpStream>>,
}

impl TcpConnection {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_timeout(host, port, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            stream: None,
        }
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn connect(&mut self) -> Result<(), ConnectionError> {
        // A stale stream from an aborted exchange is never reused.
        self.disconnect().await;

        let addr = self.addr();
        debug!("Connecting to cube at {}", addr);
        let stream = tokio::time::timeout(
            self.timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| ConnectionError::Timeout(self.timeout))?
        .map_err(|source| ConnectionError::Connect {
            addr: addr.clone(),
            source,
        })?;

        let _ = stream.set_nodelay(true);
        self.stream = Some(BufReader::new(stream));
        Ok(())
    }

    async fn send(&mut self, line: &str) -> Result<(), ConnectionError> {
        let stream = self.stream.as_mut().ok_or(ConnectionError::NotConnected)?;
        debug!("Sending {:?}", line.trim_end());

        let result = tokio::time::timeout(self.timeout, async {
            stream.get_mut().write_all(line.as_bytes()).await?;
            stream.get_mut().flush().await
        })
        .await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.disconnect().await;
                Err(ConnectionError::Io(e))
            }
            Err(_) => {
                self.disconnect().await;
                Err(ConnectionError::Timeout(self.timeout))
            }
        }
    }

    async fn read_response(&mut self, terminator: &str) -> Result<String, ConnectionError> {
        let stream = self.stream.as_mut().ok_or(ConnectionError::NotConnected)?;
        let deadline = Instant::now() + self.timeout;
        let mut payload = String::new();

        let outcome = loop {
            let mut line = String::new();
            let mut limited = (&mut *stream).take(MAX_LINE as u64);
            match tokio::time::timeout_at(deadline, limited.read_line(&mut line)).await {
                Err(_) => break Err(ConnectionError::Timeout(self.timeout)),
                Ok(Err(e)) => break Err(ConnectionError::Io(e)),
                Ok(Ok(0)) => break Err(ConnectionError::Closed),
                Ok(Ok(n)) if n >= MAX_LINE && !line.ends_with('\n') => {
                    break Err(ConnectionError::LineTooLong(MAX_LINE));
                }
                Ok(Ok(_)) => {
                    let done = line.starts_with(terminator);
                    payload.push_str(&line);
                    if done {
                        break Ok(());
                    }
                }
            }
        };

        match outcome {
            Ok(()) => Ok(payload),
            Err(e) => {
                self.disconnect().await;
                Err(e)
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            debug!("Disconnecting from cube at {}", self.addr());
            let _ = stream.get_mut().shutdown().await;
        }
    }
}

/// Scripted connection for tests.
///
/// Replies with `greeting` on connect, `list_reply` after `l:` and
/// `command_reply` after `s:`, recording every line sent.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockConnection {
    pub greeting: String,
    pub list_reply: String,
    pub command_reply: String,
    pub sent: Vec<String>,
    pub connects: usize,
    pub is_connected: bool,
    pub refuse: bool,
    pending: String,
}

#[cfg(test)]
impl MockConnection {
    pub fn new(greeting: &str, list_reply: &str) -> Self {
        Self {
            greeting: greeting.to_string(),
            list_reply: list_reply.to_string(),
            command_reply: "S:00,0,31\r\n".to_string(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
#[async_trait]
impl Connection for MockConnection {
    async fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.refuse {
            return Err(ConnectionError::Connect {
                addr: "mock:62910".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            });
        }
        self.connects += 1;
        self.is_connected = true;
        self.pending = self.greeting.clone();
        Ok(())
    }

    async fn send(&mut self, line: &str) -> Result<(), ConnectionError> {
        if !self.is_connected {
            return Err(ConnectionError::NotConnected);
        }
        self.sent.push(line.to_string());
        if line.starts_with("l:") {
            self.pending = self.list_reply.clone();
        } else if line.starts_with("s:") {
            self.pending = self.command_reply.clone();
        }
        Ok(())
    }

    async fn read_response(&mut self, _terminator: &str) -> Result<String, ConnectionError> {
        if !self.is_connected {
            return Err(ConnectionError::NotConnected);
        }
        if self.pending.is_empty() {
            return Err(ConnectionError::Timeout(Duration::ZERO));
        }
        Ok(std::mem::take(&mut self.pending))
    }

    async fn disconnect(&mut self) {
        self.is_connected = false;
    }
}
