//! Device registrations and token invalidation
//!
//! Persistence is left to the caller through [`DeviceRegistry`]. This module
//! only decides which registrations to send to and which to deactivate.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::PushProvider;
use crate::error::{ApnsError, ApnsResult};
use crate::payload::NotificationOptions;
use crate::session::Rejection;

/// Longest registration id accepted for an APNs device (32 bytes as hex).
pub const MAX_APNS_REGISTRATION_ID_LENGTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Gcm,
    Apns,
    #[default]
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub registration_id: String,
    #[serde(default)]
    pub service: Service,
}

impl Device {
    pub fn apns(registration_id: impl Into<String>) -> Self {
        Self {
            registration_id: registration_id.into(),
            service: Service::Apns,
        }
    }

    pub fn gcm(registration_id: impl Into<String>) -> Self {
        Self {
            registration_id: registration_id.into(),
            service: Service::Gcm,
        }
    }

    pub fn is_active(&self) -> bool {
        self.service != Service::Inactive
    }

    pub fn invalidate(&mut self) {
        self.service = Service::Inactive;
    }

    /// Check the record before it is stored.
    ///
    /// An active device without a registration id is made inactive rather than
    /// rejected. APNs ids are stored lowercase, the form the feedback service
    /// reports them in.
    pub fn validate(&mut self) -> ApnsResult<()> {
        if self.is_active() && self.registration_id.is_empty() {
            debug!("device has no registration id, marking inactive");
            self.invalidate();
        }

        if self.service == Service::Apns {
            if self.registration_id.len() > MAX_APNS_REGISTRATION_ID_LENGTH {
                return Err(ApnsError::InvalidDevice(format!(
                    "APNS registration_id's max length is {MAX_APNS_REGISTRATION_ID_LENGTH}"
                )));
            }
            if !self.registration_id.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ApnsError::InvalidDevice(
                    "APNS registration_id must be hex".to_string(),
                ));
            }
            self.registration_id.make_ascii_lowercase();
        }
        Ok(())
    }
}

/// Storage for device registrations
#[async_trait::async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Marks every device registered under one of `registration_ids` inactive
    /// and returns how many records changed.
    async fn deactivate(&self, registration_ids: &[String]) -> anyhow::Result<usize>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyReport {
    /// APNs notifications written to the gateway
    pub sent: usize,
    /// Devices not handled here: inactive or served by another transport
    pub skipped: usize,
    /// Registration ids deactivated after this send
    pub deactivated: Vec<String>,
    /// Notifications the gateway refused without blaming the token
    pub failed: Vec<Rejection>,
}

/// Send one notification to every active APNs device in `devices` over a
/// single connection, then deactivate the registrations APNs rejected.
pub async fn notify_devices<P, R>(
    provider: &P,
    registry: &R,
    devices: &[Device],
    alert: Option<&str>,
    options: &NotificationOptions,
) -> ApnsResult<NotifyReport>
where
    P: PushProvider + ?Sized,
    R: DeviceRegistry + ?Sized,
{
    let tokens: Vec<String> = devices
        .iter()
        .filter(|d| d.service == Service::Apns)
        .map(|d| d.registration_id.clone())
        .collect();

    let mut report = NotifyReport {
        skipped: devices.len() - tokens.len(),
        ..NotifyReport::default()
    };
    if tokens.is_empty() {
        debug!(skipped = report.skipped, "no APNs devices to notify");
        return Ok(report);
    }

    let outcome = provider.send_bulk(&tokens, alert, options).await?;
    report.sent = outcome.written;
    report.failed = outcome.failed.clone();

    let rejected = outcome.rejected_tokens();
    if !rejected.is_empty() {
        let changed = registry
            .deactivate(&rejected)
            .await
            .map_err(ApnsError::Registry)?;
        warn!(
            rejected = rejected.len(),
            changed, "deactivated devices rejected by APNs"
        );
        report.deactivated = rejected;
    }

    info!(
        devices = devices.len(),
        sent = report.sent,
        deactivated = report.deactivated.len(),
        failed = report.failed.len(),
        "APNs devices notified"
    );
    Ok(report)
}

/// Deactivate every device the feedback service reports as gone.
///
/// Returns the hex tokens that were reported.
pub async fn prune_inactive<P, R>(provider: &P, registry: &R) -> ApnsResult<Vec<String>>
where
    P: PushProvider + ?Sized,
    R: DeviceRegistry + ?Sized,
{
    let tokens = provider.fetch_inactive_tokens().await?;
    if tokens.is_empty() {
        debug!("feedback service reported no inactive devices");
        return Ok(tokens);
    }

    let changed = registry
        .deactivate(&tokens)
        .await
        .map_err(ApnsError::Registry)?;
    info!(reported = tokens.len(), changed, "pruned inactive APNs devices");
    Ok(tokens)
}
