use chrono::Utc;

use crate::error::ApnsResult;
use crate::payload::{NotificationOptions, Payload};

/// Default notification lifetime on the gateway: 30 days.
pub const DEFAULT_EXPIRATION_SECS: i64 = 2_592_000;

/// Delivery priority byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    /// Deliver immediately (10)
    #[default]
    Immediate,
    /// Deliver at a time that conserves power on the device (5)
    PowerConsiderate,
    Raw(u8),
}

impl Priority {
    pub fn as_u8(&self) -> u8 {
        match self {
            Priority::Immediate => 10,
            Priority::PowerConsiderate => 5,
            Priority::Raw(value) => *value,
        }
    }
}

impl From<u8> for Priority {
    fn from(value: u8) -> Self {
        match value {
            10 => Priority::Immediate,
            5 => Priority::PowerConsiderate,
            other => Priority::Raw(other),
        }
    }
}

/// When the gateway may discard an undelivered notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiration {
    /// Thirty days after the frame is built
    #[default]
    Default,
    /// Absolute unix timestamp
    At(u32),
    /// Attempt delivery once, do not store
    Immediately,
}

impl Expiration {
    /// Unix time written into the frame. `Default` is evaluated on every call.
    pub fn resolve(&self) -> u32 {
        match self {
            Expiration::Default => {
                let at = Utc::now().timestamp() + DEFAULT_EXPIRATION_SECS;
                u32::try_from(at).unwrap_or(u32::MAX)
            }
            Expiration::At(timestamp) => *timestamp,
            Expiration::Immediately => 0,
        }
    }
}

impl From<Option<u32>> for Expiration {
    fn from(value: Option<u32>) -> Self {
        value.map(Expiration::At).unwrap_or_default()
    }
}

/// A serialized payload plus the per-frame delivery parameters shared by every
/// recipient of a bulk send.
#[derive(Debug, Clone)]
pub struct Message {
    pub payload: Vec<u8>,
    pub expiration: Expiration,
    pub priority: Priority,
}

impl Message {
    pub fn new(alert: Option<&str>, options: &NotificationOptions) -> ApnsResult<Self> {
        let payload = Payload::build(alert, options).to_bytes()?;
        Ok(Self {
            payload,
            expiration: options.expiration.into(),
            priority: options.priority,
        })
    }

    pub fn from_payload(payload: Vec<u8>) -> Self {
        Self {
            payload,
            expiration: Expiration::default(),
            priority: Priority::default(),
        }
    }

    pub fn with_expiration(mut self, expiration: Expiration) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}
