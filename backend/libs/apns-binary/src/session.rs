//! Notification delivery over a single push channel
//!
//! Frames are written strictly in input order and the error stream is read
//! once, after the last write. Identifiers are batch positions, so an error
//! response maps back to exactly one input token.

use std::collections::HashMap;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::channel::{ChannelRole, TlsChannel};
use crate::codec::FrameCodec;
use crate::config::ApnsConfig;
use crate::drain::ErrorDrain;
use crate::error::{ApnsError, ApnsResult};
use crate::message::{Expiration, Message, Priority};
use crate::status::ErrorStatus;
use crate::token::token_prefix;

/// Why a token did not get its notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidToken,
    PayloadTooLarge,
    Server(ErrorStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub token: String,
    pub identifier: u32,
    pub reason: RejectReason,
}

/// Result of a bulk send that completed at the channel level
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    /// Frames written to the gateway
    pub written: usize,
    /// Tokens that should be deactivated: undecodable ones and any the
    /// gateway reported as invalid
    pub rejected: Vec<Rejection>,
    /// Notifications the gateway refused for reasons unrelated to the token
    pub failed: Vec<Rejection>,
}

impl BulkOutcome {
    pub fn rejected_tokens(&self) -> Vec<String> {
        self.rejected.iter().map(|r| r.token.clone()).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.failed.is_empty()
    }
}

/// Sends notifications over push channels built from one configuration.
#[derive(Debug, Clone)]
pub struct PushSession {
    config: ApnsConfig,
    codec: FrameCodec,
    drain: ErrorDrain,
}

impl PushSession {
    pub fn new(config: ApnsConfig) -> Self {
        let codec = FrameCodec::new(config.max_notification_size);
        let drain = ErrorDrain::from_config(&config);
        Self {
            config,
            codec,
            drain,
        }
    }

    pub fn config(&self) -> &ApnsConfig {
        &self.config
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    /// Encode and write one frame. The error stream is not read.
    pub async fn send_one<S>(
        &self,
        channel: &mut TlsChannel<S>,
        token: &str,
        payload: &[u8],
        identifier: u32,
        expiration: Expiration,
        priority: Priority,
    ) -> ApnsResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let frame =
            self.codec
                .encode_frame(token, payload, identifier, expiration.resolve(), priority)?;
        channel.write(&frame).await?;

        debug!(
            identifier,
            token = %token_prefix(token),
            bytes = frame.len(),
            "APNs frame written"
        );
        Ok(())
    }

    /// Open a push channel, send a single notification, check for an error
    /// response and close the channel.
    pub async fn deliver_one(
        &self,
        token: &str,
        message: &Message,
        identifier: u32,
    ) -> ApnsResult<()> {
        // reject bad input before connecting
        self.codec.encode_frame(
            token,
            &message.payload,
            identifier,
            0,
            message.priority,
        )?;

        let mut channel = TlsChannel::connect(&self.config, ChannelRole::Push).await?;
        let result = self.deliver_one_on(&mut channel, token, message, identifier).await;
        close_quietly(channel).await;
        result
    }

    /// Single send on a caller-owned channel, followed by an error check.
    /// The channel is left open.
    pub async fn deliver_one_on<S>(
        &self,
        channel: &mut TlsChannel<S>,
        token: &str,
        message: &Message,
        identifier: u32,
    ) -> ApnsResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.send_one(
            channel,
            token,
            &message.payload,
            identifier,
            message.expiration,
            message.priority,
        )
        .await?;

        match self.drain.drain(channel).await {
            Err(ApnsError::ServerReportedError {
                identifier: reported,
                ..
            }) if reported != identifier => Err(ApnsError::Protocol(format!(
                "error response names identifier {reported}, sent {identifier}"
            ))),
            other => other,
        }
    }

    /// Open a push channel, send `message` to every token, and report which
    /// tokens were rejected. The channel is closed before returning.
    pub async fn send_bulk<T>(&self, tokens: &[T], message: &Message) -> ApnsResult<BulkOutcome>
    where
        T: AsRef<str>,
    {
        let mut channel = TlsChannel::connect(&self.config, ChannelRole::Push).await?;
        let result = self.send_bulk_on(&mut channel, tokens, message).await;
        close_quietly(channel).await;
        result
    }

    /// Bulk send on a caller-owned channel. The channel is left open.
    ///
    /// Identifiers restart at zero on every call.
    pub async fn send_bulk_on<S, T>(
        &self,
        channel: &mut TlsChannel<S>,
        tokens: &[T],
        message: &Message,
    ) -> ApnsResult<BulkOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        T: AsRef<str>,
    {
        let mut outcome = BulkOutcome::default();
        let mut written: HashMap<u32, usize> = HashMap::with_capacity(tokens.len());

        for (position, token) in tokens.iter().enumerate() {
            let token = token.as_ref();
            let identifier = u32::try_from(position).map_err(|_| {
                ApnsError::Protocol(format!("batch of {} exceeds identifier space", tokens.len()))
            })?;

            match self
                .send_one(
                    channel,
                    token,
                    &message.payload,
                    identifier,
                    message.expiration,
                    message.priority,
                )
                .await
            {
                Ok(()) => {
                    written.insert(identifier, position);
                    outcome.written += 1;
                }
                Err(e) if e.is_item_fault() => {
                    warn!(
                        identifier,
                        token = %token_prefix(token),
                        error = %e,
                        "skipping notification"
                    );
                    outcome.rejected.push(Rejection {
                        token: token.to_string(),
                        identifier,
                        reason: item_reason(&e),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        match self.drain.drain(channel).await {
            Ok(()) => {}
            Err(ApnsError::ServerReportedError { status, identifier }) => {
                let position = written.get(&identifier).copied().ok_or_else(|| {
                    ApnsError::Protocol(format!(
                        "error response names identifier {identifier}, which was not sent"
                    ))
                })?;
                let token = tokens[position].as_ref();
                let rejection = Rejection {
                    token: token.to_string(),
                    identifier,
                    reason: RejectReason::Server(status),
                };

                if status.invalidates_token() {
                    warn!(identifier, token = %token_prefix(token), status = %status, "APNs rejected device token");
                    outcome.rejected.push(rejection);
                } else {
                    error!(identifier, token = %token_prefix(token), status = %status, "APNs refused notification");
                    outcome.failed.push(rejection);
                }
            }
            Err(e) => return Err(e),
        }

        info!(
            total = tokens.len(),
            written = outcome.written,
            rejected = outcome.rejected.len(),
            failed = outcome.failed.len(),
            "APNs bulk send complete"
        );
        Ok(outcome)
    }
}

fn item_reason(e: &ApnsError) -> RejectReason {
    match e {
        ApnsError::PayloadTooLarge { .. } => RejectReason::PayloadTooLarge,
        _ => RejectReason::InvalidToken,
    }
}

async fn close_quietly<S>(channel: TlsChannel<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = channel.close().await {
        warn!(error = %e, "APNs channel did not close cleanly");
    }
}
