//! Certificate-authenticated TLS connection to one APNs endpoint
//!
//! A channel owns its socket. Dropping it (or calling [`TlsChannel::close`])
//! releases the connection, so every exit path of the code holding it,
//! including `?` returns and cancelled futures, closes the socket.

use std::fmt;
use std::io;
use std::time::Duration;

use bytes::BytesMut;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use crate::config::ApnsConfig;
use crate::error::{ApnsError, ApnsResult, ConfigError};
use crate::tls;

pub type TlsTransport = TlsStream<TcpStream>;

/// Which gateway a channel talks to. The wire protocol differs, the transport
/// does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    Push,
    Feedback,
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRole::Push => f.write_str("push"),
            ChannelRole::Feedback => f.write_str("feedback"),
        }
    }
}

/// Result of [`TlsChannel::read_exactly`]. The non-complete variants carry
/// whatever arrived before the stream ended or the deadline passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Complete(Vec<u8>),
    Eof(Vec<u8>),
    TimedOut(Vec<u8>),
}

impl ReadOutcome {
    pub fn bytes(&self) -> &[u8] {
        match self {
            ReadOutcome::Complete(bytes) | ReadOutcome::Eof(bytes) | ReadOutcome::TimedOut(bytes) => {
                bytes
            }
        }
    }
}

/// Result of a single buffered read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkRead {
    Data(usize),
    Eof,
    TimedOut,
}

pub struct TlsChannel<S = TlsTransport> {
    stream: S,
    role: ChannelRole,
    peer: String,
    read_timeout: Option<Duration>,
    shutdown_timeout: Duration,
}

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

impl TlsChannel<TlsTransport> {
    /// Connect and complete the TLS handshake with the endpoint for `role`.
    ///
    /// Certificate files are read here, before any network I/O.
    pub async fn connect(config: &ApnsConfig, role: ChannelRole) -> ApnsResult<Self> {
        let tls_config = tls::client_config(config)?;

        let (host, port) = config.endpoint(role);
        let server_name =
            ServerName::try_from(host.to_string()).map_err(|e| ConfigError::InvalidSetting {
                name: "APNS_HOST",
                reason: e.to_string(),
            })?;
        let peer = format!("{host}:{port}");
        let connect_timeout = config.connect_timeout();

        let tcp = timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ApnsError::Timeout(connect_timeout))??;
        tcp.set_nodelay(true)?;

        let stream = timeout(
            connect_timeout,
            TlsConnector::from(tls_config).connect(server_name, tcp),
        )
        .await
        .map_err(|_| ApnsError::Timeout(connect_timeout))??;

        info!(role = %role, peer = %peer, "APNs channel established");

        Ok(Self {
            stream,
            role,
            peer,
            read_timeout: None,
            shutdown_timeout: connect_timeout,
        })
    }
}

impl<S> TlsChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already established stream.
    pub fn from_stream(stream: S, role: ChannelRole) -> Self {
        Self {
            stream,
            role,
            peer: "in-process".to_string(),
            read_timeout: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn role(&self) -> ChannelRole {
        self.role
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// `None` blocks reads until data or end of stream.
    pub fn set_read_timeout(&mut self, read_timeout: Option<Duration>) {
        self.read_timeout = read_timeout;
    }

    /// Write all of `bytes` and flush.
    pub async fn write(&mut self, bytes: &[u8]) -> ApnsResult<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read `n` bytes, stopping early at end of stream or when the read
    /// timeout elapses.
    pub async fn read_exactly(&mut self, n: usize) -> ApnsResult<ReadOutcome> {
        let deadline = self.read_timeout.map(|t| Instant::now() + t);
        let mut buf = vec![0u8; n];
        let mut filled = 0;

        while filled < n {
            let read = match deadline {
                Some(deadline) => timeout_at(deadline, self.stream.read(&mut buf[filled..]))
                    .await
                    .ok(),
                None => Some(self.stream.read(&mut buf[filled..]).await),
            };
            let Some(read) = read else {
                buf.truncate(filled);
                return Ok(ReadOutcome::TimedOut(buf));
            };

            match read {
                Ok(0) => {
                    buf.truncate(filled);
                    return Ok(ReadOutcome::Eof(buf));
                }
                Ok(count) => filled += count,
                Err(e) if is_timeout(&e) => {
                    buf.truncate(filled);
                    return Ok(ReadOutcome::TimedOut(buf));
                }
                Err(e) if is_unclean_eof(&e) => {
                    buf.truncate(filled);
                    return Ok(ReadOutcome::Eof(buf));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(ReadOutcome::Complete(buf))
    }

    /// Append whatever is available to `buf`, waiting at most the read timeout.
    pub async fn read_chunk(&mut self, buf: &mut BytesMut) -> ApnsResult<ChunkRead> {
        let read = match self.read_timeout {
            Some(read_timeout) => timeout(read_timeout, self.stream.read_buf(buf)).await.ok(),
            None => Some(self.stream.read_buf(buf).await),
        };
        let Some(read) = read else {
            return Ok(ChunkRead::TimedOut);
        };

        match read {
            Ok(0) => Ok(ChunkRead::Eof),
            Ok(count) => Ok(ChunkRead::Data(count)),
            Err(e) if is_timeout(&e) => Ok(ChunkRead::TimedOut),
            Err(e) if is_unclean_eof(&e) => Ok(ChunkRead::Eof),
            Err(e) => Err(e.into()),
        }
    }

    /// Bounds [`TlsChannel::close`]. Connected channels use the connect timeout.
    pub fn set_shutdown_timeout(&mut self, shutdown_timeout: Duration) {
        self.shutdown_timeout = shutdown_timeout;
    }

    /// Shut the connection down gracefully and release it.
    ///
    /// A peer that stops reading cannot hold the caller past the shutdown
    /// timeout; the socket is released either way.
    pub async fn close(mut self) -> ApnsResult<()> {
        let limit = self.shutdown_timeout;
        timeout(limit, self.stream.shutdown())
            .await
            .map_err(|_| ApnsError::Timeout(limit))??;
        debug!(role = %self.role, peer = %self.peer, "APNs channel closed");
        Ok(())
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

/// Peers that drop the TCP connection without a TLS close_notify.
fn is_unclean_eof(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::UnexpectedEof
}
