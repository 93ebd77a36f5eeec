use tracing::{error, info};

use crate::codec::FeedbackRecord;
use crate::config::ApnsConfig;
use crate::error::ApnsResult;
use crate::feedback::{inactive_tokens, FeedbackReader};
use crate::message::Message;
use crate::payload::NotificationOptions;
use crate::session::{BulkOutcome, PushSession};
use crate::token::token_prefix;

/// Trait for push notification providers
#[async_trait::async_trait]
pub trait PushProvider: Send + Sync {
    /// Sends one notification and waits for the gateway's verdict.
    ///
    /// # Arguments
    /// * `device_token` - Hex device token
    /// * `alert` - Alert body, `None` for a silent notification
    /// * `options` - Badge, sound, localization and delivery parameters
    async fn send_one(
        &self,
        device_token: &str,
        alert: Option<&str>,
        options: &NotificationOptions,
    ) -> ApnsResult<()>;

    /// Sends the same notification to every token over one connection.
    ///
    /// # Returns
    /// The tokens that were rejected, individually or by the gateway.
    async fn send_bulk(
        &self,
        device_tokens: &[String],
        alert: Option<&str>,
        options: &NotificationOptions,
    ) -> ApnsResult<BulkOutcome>;

    /// Hex tokens of devices that no longer accept notifications.
    async fn fetch_inactive_tokens(&self) -> ApnsResult<Vec<String>>;
}

pub type DynPushProvider = Box<dyn PushProvider>;

/// Legacy binary-protocol APNs provider
#[derive(Debug, Clone)]
pub struct ApnsClient {
    session: PushSession,
    feedback: FeedbackReader,
}

impl ApnsClient {
    /// Creates a client after validating `config`.
    ///
    /// Certificate files are not opened here; each channel reads them when it
    /// connects.
    pub fn new(config: ApnsConfig) -> ApnsResult<Self> {
        config.validate()?;

        info!(
            push = %format!("{}:{}", config.host, config.port),
            feedback = %format!("{}:{}", config.feedback_host, config.feedback_port),
            check_errors = config.check_errors,
            "Initialized APNs client"
        );

        Ok(Self {
            feedback: FeedbackReader::from_config(&config),
            session: PushSession::new(config),
        })
    }

    /// Client configured from `APNS_*` environment variables.
    pub fn from_env() -> ApnsResult<Self> {
        Self::new(ApnsConfig::from_env()?)
    }

    pub fn config(&self) -> &ApnsConfig {
        self.session.config()
    }

    pub fn session(&self) -> &PushSession {
        &self.session
    }

    /// Full feedback records, timestamps included.
    pub async fn fetch_feedback(&self) -> ApnsResult<Vec<FeedbackRecord>> {
        self.feedback.fetch(self.session.config()).await
    }
}

#[async_trait::async_trait]
impl PushProvider for ApnsClient {
    async fn send_one(
        &self,
        device_token: &str,
        alert: Option<&str>,
        options: &NotificationOptions,
    ) -> ApnsResult<()> {
        let message = Message::new(alert, options)?;
        let identifier = options.identifier.unwrap_or(0);

        match self
            .session
            .deliver_one(device_token, &message, identifier)
            .await
        {
            Ok(()) => {
                info!(
                    token = %token_prefix(device_token),
                    identifier,
                    "APNs notification sent"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    token = %token_prefix(device_token),
                    identifier,
                    error = %e,
                    "APNs send failed"
                );
                Err(e)
            }
        }
    }

    async fn send_bulk(
        &self,
        device_tokens: &[String],
        alert: Option<&str>,
        options: &NotificationOptions,
    ) -> ApnsResult<BulkOutcome> {
        if device_tokens.is_empty() {
            return Ok(BulkOutcome::default());
        }
        let message = Message::new(alert, options)?;
        self.session.send_bulk(device_tokens, &message).await
    }

    async fn fetch_inactive_tokens(&self) -> ApnsResult<Vec<String>> {
        let records = self.fetch_feedback().await?;
        Ok(inactive_tokens(&records))
    }
}
