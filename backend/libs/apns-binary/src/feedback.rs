//! Feedback service reader
//!
//! The feedback gateway streams `(timestamp, token)` records for devices that
//! no longer accept notifications and then closes the connection.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::channel::{ChannelRole, ChunkRead, TlsChannel};
use crate::codec::{decode_feedback_record, FeedbackRecord};
use crate::config::ApnsConfig;
use crate::error::{ApnsError, ApnsResult};

const READ_BUFFER_CAPACITY: usize = 4096;

enum ReadState {
    Reading,
    Done,
    Failed(ApnsError),
}

#[derive(Debug, Clone, Copy)]
pub struct FeedbackReader {
    timeout: Duration,
    max_idle_retries: Option<u32>,
}

impl FeedbackReader {
    /// `timeout` bounds each read. A read that times out is retried; with
    /// `max_idle_retries` set, that many consecutive empty reads fail the
    /// fetch with [`ApnsError::Timeout`].
    pub fn new(timeout: Duration, max_idle_retries: Option<u32>) -> Self {
        Self {
            timeout,
            max_idle_retries,
        }
    }

    pub fn from_config(config: &ApnsConfig) -> Self {
        Self::new(config.feedback_timeout(), config.feedback_idle_retries)
    }

    /// Connect to the feedback gateway, read every record and close.
    pub async fn fetch(&self, config: &ApnsConfig) -> ApnsResult<Vec<FeedbackRecord>> {
        let mut channel = TlsChannel::connect(config, ChannelRole::Feedback).await?;
        let result = self.read_all(&mut channel).await;
        if let Err(e) = channel.close().await {
            debug!(error = %e, "feedback channel did not close cleanly");
        }
        result
    }

    /// Read records until the gateway ends the stream.
    ///
    /// Records are returned in arrival order. Any fault discards what was read
    /// so far.
    pub async fn read_all<S>(&self, channel: &mut TlsChannel<S>) -> ApnsResult<Vec<FeedbackRecord>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        channel.set_read_timeout(Some(self.timeout));

        let mut buf = BytesMut::with_capacity(READ_BUFFER_CAPACITY);
        let mut records = Vec::new();
        let mut idle = 0u32;

        loop {
            let state = match channel.read_chunk(&mut buf).await {
                Ok(ChunkRead::Data(_)) => {
                    idle = 0;
                    while let Some(record) = decode_feedback_record(&mut buf) {
                        records.push(record);
                    }
                    ReadState::Reading
                }
                Ok(ChunkRead::TimedOut)
                    if self.max_idle_retries.map_or(true, |max| idle < max) =>
                {
                    idle += 1;
                    debug!(idle, records = records.len(), "feedback read timed out, retrying");
                    ReadState::Reading
                }
                Ok(ChunkRead::TimedOut) => ReadState::Failed(ApnsError::Timeout(self.timeout)),
                Ok(ChunkRead::Eof) if buf.is_empty() => ReadState::Done,
                Ok(ChunkRead::Eof) => ReadState::Failed(ApnsError::Protocol(format!(
                    "feedback stream ended inside a record ({} trailing bytes)",
                    buf.len()
                ))),
                Err(e) => ReadState::Failed(e),
            };

            match state {
                ReadState::Reading => continue,
                ReadState::Done => {
                    info!(count = records.len(), "feedback records received");
                    break Ok(records);
                }
                ReadState::Failed(e) => {
                    warn!(error = %e, discarded = records.len(), "feedback fetch failed");
                    break Err(e);
                }
            }
        }
    }
}

/// Hex tokens of `records`, in order.
pub fn inactive_tokens(records: &[FeedbackRecord]) -> Vec<String> {
    records.iter().map(FeedbackRecord::token_hex).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::FailingStream;
    use crate::codec::encode_feedback_record;
    use std::io;
    use tokio::io::{duplex, AsyncWriteExt};

    const TOKEN_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const TOKEN_B: &str = "0fdc8d3d1c2a8c8c3fa5e0c6d9b1c5f2e1e0f2d3c4b5a69788796a5b4c3d2e1f";

    fn reader() -> FeedbackReader {
        FeedbackReader::new(Duration::from_millis(30), None)
    }

    fn record(timestamp: u32, token: &str) -> FeedbackRecord {
        FeedbackRecord {
            timestamp,
            token: hex::decode(token).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let (client, server) = duplex(64);
        let mut channel = TlsChannel::from_stream(client, ChannelRole::Feedback);
        drop(server);

        let records = reader().read_all(&mut channel).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_records_in_order() {
        let (client, mut server) = duplex(1024);
        let mut channel = TlsChannel::from_stream(client, ChannelRole::Feedback);

        let mut wire = BytesMut::new();
        encode_feedback_record(&record(1_600_000_000, TOKEN_A), &mut wire);
        encode_feedback_record(&record(1_600_000_100, TOKEN_B), &mut wire);
        server.write_all(&wire).await.unwrap();
        drop(server);

        let records = reader().read_all(&mut channel).await.unwrap();
        assert_eq!(
            inactive_tokens(&records),
            vec![TOKEN_A.to_string(), TOKEN_B.to_string()]
        );
        assert_eq!(records[0].timestamp, 1_600_000_000);
        assert_eq!(records[1].timestamp, 1_600_000_100);
    }

    #[tokio::test]
    async fn test_record_split_across_reads() {
        let (client, mut server) = duplex(1024);
        let mut channel = TlsChannel::from_stream(client, ChannelRole::Feedback);

        let mut wire = BytesMut::new();
        encode_feedback_record(&record(42, TOKEN_B), &mut wire);
        let (head, tail) = wire.split_at(10);
        let (head, tail) = (head.to_vec(), tail.to_vec());

        let writer = tokio::spawn(async move {
            server.write_all(&head).await.unwrap();
            tokio::time::sleep(Duration::from_millis(40)).await;
            server.write_all(&tail).await.unwrap();
        });

        let records = reader().read_all(&mut channel).await.unwrap();
        writer.await.unwrap();

        assert_eq!(records, vec![record(42, TOKEN_B)]);
    }

    #[tokio::test]
    async fn test_token_length_is_per_record() {
        let (client, mut server) = duplex(1024);
        let mut channel = TlsChannel::from_stream(client, ChannelRole::Feedback);

        let short = FeedbackRecord {
            timestamp: 7,
            token: vec![0xab, 0xcd],
        };
        let mut wire = BytesMut::new();
        encode_feedback_record(&short, &mut wire);
        encode_feedback_record(&record(8, TOKEN_A), &mut wire);
        server.write_all(&wire).await.unwrap();
        drop(server);

        let records = reader().read_all(&mut channel).await.unwrap();
        assert_eq!(inactive_tokens(&records), vec!["abcd".to_string(), TOKEN_A.to_string()]);
    }

    #[tokio::test]
    async fn test_trailing_bytes_at_eof() {
        let (client, mut server) = duplex(64);
        let mut channel = TlsChannel::from_stream(client, ChannelRole::Feedback);
        server.write_all(&[0, 0, 0, 1, 0, 32, 0xaa]).await.unwrap();
        drop(server);

        let err = reader().read_all(&mut channel).await.unwrap_err();
        assert!(matches!(err, ApnsError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_transient_timeout_keeps_reading() {
        let (client, mut server) = duplex(1024);
        let mut channel = TlsChannel::from_stream(client, ChannelRole::Feedback);

        let mut wire = BytesMut::new();
        encode_feedback_record(&record(1, TOKEN_A), &mut wire);

        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(45)).await;
            server.write_all(&wire).await.unwrap();
        });

        let records = reader().read_all(&mut channel).await.unwrap();
        writer.await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_paced_stream_outlasts_many_timeouts() {
        let (client, mut server) = duplex(1024);
        let mut channel = TlsChannel::from_stream(client, ChannelRole::Feedback);

        let mut wire = BytesMut::new();
        encode_feedback_record(&record(1_600_000_000, TOKEN_B), &mut wire);

        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(45)).await;
            server.write_all(&wire).await.unwrap();
        });

        let records = FeedbackReader::new(Duration::from_millis(10), None)
            .read_all(&mut channel)
            .await
            .unwrap();
        writer.await.unwrap();

        assert_eq!(records, vec![record(1_600_000_000, TOKEN_B)]);
    }

    #[test]
    fn test_default_config_has_no_idle_cap() {
        let config = ApnsConfig::new("/unused/cert.pem");
        assert_eq!(FeedbackReader::from_config(&config).max_idle_retries, None);
    }

    #[tokio::test]
    async fn test_idle_cap_fails_with_timeout() {
        let (client, _server) = duplex(64);
        let mut channel = TlsChannel::from_stream(client, ChannelRole::Feedback);

        let err = FeedbackReader::new(Duration::from_millis(10), Some(1))
            .read_all(&mut channel)
            .await
            .unwrap_err();
        assert!(matches!(err, ApnsError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_transport_fault_discards_results() {
        let mut channel = TlsChannel::from_stream(
            FailingStream::new(io::ErrorKind::ConnectionReset),
            ChannelRole::Feedback,
        );

        let err = reader().read_all(&mut channel).await.unwrap_err();
        assert!(matches!(err, ApnsError::Transport(_)));
    }
}
