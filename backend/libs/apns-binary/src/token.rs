use std::fmt;
use std::str::FromStr;

use crate::error::{ApnsError, ApnsResult};

/// Byte length of a legacy APNs device token.
pub const TOKEN_LENGTH: usize = 32;

/// Binary device token, written and parsed as hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceToken([u8; TOKEN_LENGTH]);

impl DeviceToken {
    pub fn from_hex(token: &str) -> ApnsResult<Self> {
        let bytes = hex::decode(token)
            .map_err(|e| ApnsError::invalid_token(token, format!("not valid hex: {e}")))?;
        Self::from_bytes(&bytes).map_err(|_| {
            ApnsError::invalid_token(
                token,
                format!("decodes to {} bytes, expected {}", bytes.len(), TOKEN_LENGTH),
            )
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> ApnsResult<Self> {
        let raw: [u8; TOKEN_LENGTH] = bytes.try_into().map_err(|_| {
            ApnsError::invalid_token(
                &hex::encode(bytes),
                format!("{} bytes, expected {}", bytes.len(), TOKEN_LENGTH),
            )
        })?;
        Ok(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for DeviceToken {
    type Err = ApnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for DeviceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DeviceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceToken({})", token_prefix(&self.to_hex()))
    }
}

/// First eight characters of a token, for log lines.
pub(crate) fn token_prefix(token: &str) -> String {
    token.chars().take(8).collect()
}
