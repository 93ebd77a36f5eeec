use std::fmt;

/// Status byte carried in an APNs error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorStatus {
    NoErrors,
    ProcessingError,
    MissingDeviceToken,
    MissingTopic,
    MissingPayload,
    InvalidTokenSize,
    InvalidTopicSize,
    InvalidPayloadSize,
    InvalidToken,
    Shutdown,
    Unknown,
    Other(u8),
}

impl ErrorStatus {
    pub fn code(&self) -> u8 {
        match self {
            ErrorStatus::NoErrors => 0,
            ErrorStatus::ProcessingError => 1,
            ErrorStatus::MissingDeviceToken => 2,
            ErrorStatus::MissingTopic => 3,
            ErrorStatus::MissingPayload => 4,
            ErrorStatus::InvalidTokenSize => 5,
            ErrorStatus::InvalidTopicSize => 6,
            ErrorStatus::InvalidPayloadSize => 7,
            ErrorStatus::InvalidToken => 8,
            ErrorStatus::Shutdown => 10,
            ErrorStatus::Unknown => 255,
            ErrorStatus::Other(code) => *code,
        }
    }

    /// True when the device token itself was refused and the device should be
    /// deactivated.
    pub fn invalidates_token(&self) -> bool {
        matches!(
            self,
            ErrorStatus::InvalidToken | ErrorStatus::InvalidTokenSize
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErrorStatus::NoErrors => "no errors encountered",
            ErrorStatus::ProcessingError => "processing error",
            ErrorStatus::MissingDeviceToken => "missing device token",
            ErrorStatus::MissingTopic => "missing topic",
            ErrorStatus::MissingPayload => "missing payload",
            ErrorStatus::InvalidTokenSize => "invalid token size",
            ErrorStatus::InvalidTopicSize => "invalid topic size",
            ErrorStatus::InvalidPayloadSize => "invalid payload size",
            ErrorStatus::InvalidToken => "invalid token",
            ErrorStatus::Shutdown => "service shutting down",
            ErrorStatus::Unknown => "unknown error",
            ErrorStatus::Other(_) => "unrecognized status",
        }
    }
}

impl From<u8> for ErrorStatus {
    fn from(code: u8) -> Self {
        match code {
            0 => ErrorStatus::NoErrors,
            1 => ErrorStatus::ProcessingError,
            2 => ErrorStatus::MissingDeviceToken,
            3 => ErrorStatus::MissingTopic,
            4 => ErrorStatus::MissingPayload,
            5 => ErrorStatus::InvalidTokenSize,
            6 => ErrorStatus::InvalidTopicSize,
            7 => ErrorStatus::InvalidPayloadSize,
            8 => ErrorStatus::InvalidToken,
            10 => ErrorStatus::Shutdown,
            255 => ErrorStatus::Unknown,
            other => ErrorStatus::Other(other),
        }
    }
}

impl From<ErrorStatus> for u8 {
    fn from(status: ErrorStatus) -> Self {
        status.code()
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.description())
    }
}
