use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::channel::ChannelRole;
use crate::error::ConfigError;

pub const PRODUCTION_PUSH_HOST: &str = "gateway.push.apple.com";
pub const SANDBOX_PUSH_HOST: &str = "gateway.sandbox.push.apple.com";
pub const PRODUCTION_FEEDBACK_HOST: &str = "feedback.push.apple.com";
pub const SANDBOX_FEEDBACK_HOST: &str = "feedback.sandbox.push.apple.com";
pub const PUSH_PORT: u16 = 2195;
pub const FEEDBACK_PORT: u16 = 2196;

/// Largest payload the legacy gateway accepts.
pub const DEFAULT_MAX_NOTIFICATION_SIZE: usize = 2048;

/// APNs transport configuration
///
/// Passed explicitly to every channel and session; nothing is read from
/// process-wide state after construction.
#[derive(Debug, Clone, Deserialize)]
pub struct ApnsConfig {
    #[serde(default = "default_push_host")]
    pub host: String,
    #[serde(default = "default_push_port")]
    pub port: u16,
    #[serde(default = "default_feedback_host")]
    pub feedback_host: String,
    #[serde(default = "default_feedback_port")]
    pub feedback_port: u16,
    /// PEM file holding the client certificate chain, and the private key
    /// unless `private_key` is set.
    #[serde(default)]
    pub certificate: Option<PathBuf>,
    #[serde(default)]
    pub private_key: Option<PathBuf>,
    /// Trust anchors for the gateway. Platform roots are used when unset.
    #[serde(default)]
    pub ca_certificates: Option<PathBuf>,
    #[serde(default = "default_max_notification_size")]
    pub max_notification_size: usize,
    /// When false the error channel is never read and every written frame is
    /// assumed accepted.
    #[serde(default = "default_check_errors")]
    pub check_errors: bool,
    #[serde(default = "default_error_timeout_ms")]
    pub error_timeout_ms: u64,
    #[serde(default = "default_feedback_timeout_ms")]
    pub feedback_timeout_ms: u64,
    /// Consecutive empty feedback reads tolerated before giving up. `None`
    /// keeps reading until the gateway closes the stream.
    #[serde(default)]
    pub feedback_idle_retries: Option<u32>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_push_host() -> String {
    PRODUCTION_PUSH_HOST.to_string()
}

fn default_push_port() -> u16 {
    PUSH_PORT
}

fn default_feedback_host() -> String {
    PRODUCTION_FEEDBACK_HOST.to_string()
}

fn default_feedback_port() -> u16 {
    FEEDBACK_PORT
}

fn default_max_notification_size() -> usize {
    DEFAULT_MAX_NOTIFICATION_SIZE
}

fn default_check_errors() -> bool {
    true
}

fn default_error_timeout_ms() -> u64 {
    1_000
}

fn default_feedback_timeout_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for ApnsConfig {
    fn default() -> Self {
        Self {
            host: default_push_host(),
            port: default_push_port(),
            feedback_host: default_feedback_host(),
            feedback_port: default_feedback_port(),
            certificate: None,
            private_key: None,
            ca_certificates: None,
            max_notification_size: default_max_notification_size(),
            check_errors: default_check_errors(),
            error_timeout_ms: default_error_timeout_ms(),
            feedback_timeout_ms: default_feedback_timeout_ms(),
            feedback_idle_retries: None,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl ApnsConfig {
    /// Production gateway configuration authenticated with `certificate`
    pub fn new(certificate: impl Into<PathBuf>) -> Self {
        Self {
            certificate: Some(certificate.into()),
            ..Self::default()
        }
    }

    /// Sandbox gateway configuration authenticated with `certificate`
    pub fn sandbox(certificate: impl Into<PathBuf>) -> Self {
        Self {
            host: SANDBOX_PUSH_HOST.to_string(),
            feedback_host: SANDBOX_FEEDBACK_HOST.to_string(),
            ..Self::new(certificate)
        }
    }

    /// Load configuration from `APNS_*` environment variables
    ///
    /// **Environment Variables**:
    /// - `APNS_CERTIFICATE`: client certificate PEM (required)
    /// - `APNS_PRIVATE_KEY`: private key PEM if not bundled with the certificate
    /// - `APNS_CA_CERTIFICATES`: CA bundle used to verify the gateway
    /// - `APNS_HOST` / `APNS_PORT`, `APNS_FEEDBACK_HOST` / `APNS_FEEDBACK_PORT`
    /// - `APNS_MAX_NOTIFICATION_SIZE`, `APNS_CHECK_ERRORS`, `APNS_ERROR_TIMEOUT_MS`
    /// - `APNS_FEEDBACK_TIMEOUT_MS`, `APNS_FEEDBACK_IDLE_RETRIES` (unbounded when unset)
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Self = envy::prefixed("APNS_").from_env()?;
        config.validate()?;

        info!(
            host = %config.host,
            port = config.port,
            feedback_host = %config.feedback_host,
            check_errors = config.check_errors,
            "APNs configuration loaded"
        );

        Ok(config)
    }

    pub fn with_private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key = Some(path.into());
        self
    }

    pub fn with_ca_certificates(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_certificates = Some(path.into());
        self
    }

    pub fn with_push_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_feedback_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.feedback_host = host.into();
        self.feedback_port = port;
        self
    }

    pub fn with_error_timeout(mut self, timeout: Duration) -> Self {
        self.check_errors = true;
        self.error_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Skip the error-response read after sending.
    pub fn without_error_check(mut self) -> Self {
        self.check_errors = false;
        self
    }

    /// Check that every required value is present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.certificate.is_none() {
            return Err(ConfigError::MissingCertificate);
        }
        if self.host.is_empty() {
            return Err(ConfigError::MissingSetting("APNS_HOST"));
        }
        if self.feedback_host.is_empty() {
            return Err(ConfigError::MissingSetting("APNS_FEEDBACK_HOST"));
        }
        if self.max_notification_size == 0 || self.max_notification_size > u16::MAX as usize {
            return Err(ConfigError::InvalidSetting {
                name: "APNS_MAX_NOTIFICATION_SIZE",
                reason: format!("must be between 1 and {}", u16::MAX),
            });
        }
        if self.check_errors && self.error_timeout_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "APNS_ERROR_TIMEOUT_MS",
                reason: "must be positive when error checking is enabled".to_string(),
            });
        }
        Ok(())
    }

    /// Remote address for a channel role
    pub fn endpoint(&self, role: ChannelRole) -> (&str, u16) {
        match role {
            ChannelRole::Push => (&self.host, self.port),
            ChannelRole::Feedback => (&self.feedback_host, self.feedback_port),
        }
    }

    /// `None` means error responses are not read at all.
    pub fn error_timeout(&self) -> Option<Duration> {
        self.check_errors
            .then(|| Duration::from_millis(self.error_timeout_ms))
    }

    pub fn feedback_timeout(&self) -> Duration {
        Duration::from_millis(self.feedback_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
