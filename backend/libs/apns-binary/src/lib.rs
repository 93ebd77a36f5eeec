//! Legacy APNs binary protocol client
//!
//! Sends notifications to the certificate-authenticated APNs gateway
//! (`gateway.push.apple.com:2195`) and reads the feedback service
//! (`feedback.push.apple.com:2196`) for devices that no longer accept them.
//!
//! **Delivery model**:
//! - One TLS connection per send or bulk send, closed on every exit path
//! - Frames written in input order, identifier = position in the batch
//! - The error stream is read once after the last write, bounded by a timeout
//! - Undecodable tokens and tokens APNs reports as invalid come back as
//!   rejections so the caller can deactivate them
//!
//! ```no_run
//! use apns_binary::{ApnsClient, ApnsConfig, NotificationOptions, PushProvider};
//!
//! # async fn run() -> apns_binary::ApnsResult<()> {
//! let client = ApnsClient::new(ApnsConfig::new("/etc/apns/push-cert.pem"))?;
//! let tokens = vec!["0fdc8d3d1c2a8c8c3fa5e0c6d9b1c5f2e1e0f2d3c4b5a69788796a5b4c3d2e1f".to_string()];
//!
//! let outcome = client
//!     .send_bulk(&tokens, Some("Hello world"), &NotificationOptions::default().with_badge(1))
//!     .await?;
//! for token in outcome.rejected_tokens() {
//!     println!("deactivate {token}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod client;
pub mod codec;
pub mod config;
pub mod device;
pub mod drain;
pub mod error;
pub mod feedback;
pub mod message;
pub mod payload;
pub mod session;
pub mod status;
pub mod tls;
pub mod token;

pub use channel::{ChannelRole, TlsChannel};
pub use client::{ApnsClient, DynPushProvider, PushProvider};
pub use codec::{ErrorResponse, FeedbackRecord, FrameCodec};
pub use config::ApnsConfig;
pub use device::{notify_devices, prune_inactive, Device, DeviceRegistry, NotifyReport, Service};
pub use drain::ErrorDrain;
pub use error::{ApnsError, ApnsResult, ConfigError};
pub use feedback::FeedbackReader;
pub use message::{Expiration, Message, Priority};
pub use payload::{NotificationOptions, Payload};
pub use session::{BulkOutcome, PushSession, RejectReason, Rejection};
pub use status::ErrorStatus;
pub use token::DeviceToken;
