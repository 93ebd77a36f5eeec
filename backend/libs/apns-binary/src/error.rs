//! Error types for the APNs binary protocol engine

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::status::ErrorStatus;

/// Settings and credential problems. Always raised before any network I/O.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("APNs client certificate is not configured (set APNS_CERTIFICATE)")]
    MissingCertificate,

    #[error("The APNs certificate file at {path:?} is not readable: {source}")]
    CertificateUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No certificate found in {path:?}")]
    NoCertificate { path: PathBuf },

    #[error("No private key found in {path:?}")]
    NoPrivateKey { path: PathBuf },

    #[error("Required setting {0} is missing")]
    MissingSetting(&'static str),

    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("Invalid TLS configuration: {0}")]
    Tls(String),

    #[error("Failed to load APNs settings from environment: {0}")]
    Env(#[from] envy::Error),
}

/// Faults raised by the push and feedback operations.
///
/// `InvalidToken` and `PayloadTooLarge` concern a single notification and are
/// turned into rejections by bulk sends; everything else aborts the operation.
#[derive(Error, Debug)]
pub enum ApnsError {
    #[error("APNs configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Invalid device token {token:?}: {reason}")]
    InvalidToken { token: String, reason: String },

    #[error("Notification body cannot exceed {max} bytes (got {size})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("APNs rejected notification {identifier} with status {status}")]
    ServerReportedError { status: ErrorStatus, identifier: u32 },

    #[error("APNs protocol error: {0}")]
    Protocol(String),

    #[error("APNs transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("APNs operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid device record: {0}")]
    InvalidDevice(String),

    #[error("Device registry error: {0}")]
    Registry(#[source] anyhow::Error),
}

impl ApnsError {
    /// True for faults that only disqualify one notification in a batch.
    pub fn is_item_fault(&self) -> bool {
        matches!(
            self,
            ApnsError::InvalidToken { .. } | ApnsError::PayloadTooLarge { .. }
        )
    }

    pub(crate) fn invalid_token(token: &str, reason: impl Into<String>) -> Self {
        ApnsError::InvalidToken {
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}

pub type ApnsResult<T> = Result<T, ApnsError>;
