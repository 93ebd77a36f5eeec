use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::channel::{ReadOutcome, TlsChannel};
use crate::codec::{decode_error_response, ERROR_RESPONSE_LENGTH};
use crate::config::ApnsConfig;
use crate::error::{ApnsError, ApnsResult};
use crate::status::ErrorStatus;

/// Reads the push gateway's error stream after a batch has been written.
///
/// The gateway only writes when it rejects a notification, so silence until
/// the timeout is the success path.
#[derive(Debug, Clone, Copy)]
pub struct ErrorDrain {
    timeout: Option<Duration>,
}

impl ErrorDrain {
    /// `None` disables the check: nothing is read and success is assumed.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn from_config(config: &ApnsConfig) -> Self {
        Self::new(config.error_timeout())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns `Err(ApnsError::ServerReportedError)` when the gateway rejected a
    /// notification, `Ok(())` when it stayed silent.
    ///
    /// The channel's own read timeout is restored before returning.
    pub async fn drain<S>(&self, channel: &mut TlsChannel<S>) -> ApnsResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let Some(timeout) = self.timeout else {
            debug!("APNs error check disabled, assuming batch accepted");
            return Ok(());
        };

        let saved = channel.read_timeout();
        channel.set_read_timeout(Some(timeout));
        let outcome = channel.read_exactly(ERROR_RESPONSE_LENGTH).await;
        channel.set_read_timeout(saved);

        match outcome? {
            ReadOutcome::Complete(bytes) => Self::interpret(&bytes),
            ReadOutcome::TimedOut(bytes) if bytes.is_empty() => {
                debug!(timeout_ms = timeout.as_millis() as u64, "no APNs error reported");
                Ok(())
            }
            ReadOutcome::Eof(bytes) if bytes.is_empty() => {
                debug!("APNs closed the error stream without reporting an error");
                Ok(())
            }
            ReadOutcome::TimedOut(bytes) | ReadOutcome::Eof(bytes) => Err(ApnsError::Protocol(
                format!(
                    "truncated error response: {} of {} bytes",
                    bytes.len(),
                    ERROR_RESPONSE_LENGTH
                ),
            )),
        }
    }

    fn interpret(bytes: &[u8]) -> ApnsResult<()> {
        match decode_error_response(bytes)? {
            None => Ok(()),
            Some(response) if response.status == ErrorStatus::NoErrors => {
                warn!(
                    identifier = response.identifier,
                    "APNs sent an error response with status 0; treating as no error"
                );
                Ok(())
            }
            Some(response) => Err(ApnsError::ServerReportedError {
                status: response.status,
                identifier: response.identifier,
            }),
        }
    }
}
