//! Wire encoding for the legacy APNs binary protocol
//!
//! Notification frame (command 2):
//! ```text
//! | cmd:1 | frame_len:4 | { item_id:1 | item_len:2 | item } x 5 |
//! ```
//! Items are token (1), payload (2), identifier (3), expiration (4) and
//! priority (5). Error responses are `| cmd:1 = 8 | status:1 | identifier:4 |`
//! and feedback records are `| timestamp:4 | token_len:2 | token |`.
//! All integers are big-endian.

use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, Utc};

use crate::error::{ApnsError, ApnsResult};
use crate::message::Priority;
use crate::status::ErrorStatus;
use crate::token::{DeviceToken, TOKEN_LENGTH};

pub const COMMAND_NOTIFICATION: u8 = 2;
pub const COMMAND_ERROR_RESPONSE: u8 = 8;

pub const ITEM_TOKEN: u8 = 1;
pub const ITEM_PAYLOAD: u8 = 2;
pub const ITEM_IDENTIFIER: u8 = 3;
pub const ITEM_EXPIRATION: u8 = 4;
pub const ITEM_PRIORITY: u8 = 5;

/// item id + item length
const ITEM_HEADER_LENGTH: usize = 3;
const FRAME_HEADER_LENGTH: usize = 5;

pub const ERROR_RESPONSE_LENGTH: usize = 6;
pub const FEEDBACK_HEADER_LENGTH: usize = 6;

/// (status, identifier) read back from the push gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorResponse {
    pub status: ErrorStatus,
    pub identifier: u32,
}

/// One device reported unreachable by the feedback service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackRecord {
    pub timestamp: u32,
    pub token: Vec<u8>,
}

impl FeedbackRecord {
    pub fn token_hex(&self) -> String {
        hex::encode(&self.token)
    }

    /// When the service determined the app was no longer installed
    pub fn reported_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.timestamp), 0)
    }
}

/// A notification frame taken apart again. Used by protocol-compatible mock
/// gateways and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub token: Vec<u8>,
    pub payload: Vec<u8>,
    pub identifier: u32,
    pub expiration: u32,
    pub priority: u8,
}

/// Builds notification frames under a payload size limit.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_payload_bytes: usize,
}

impl FrameCodec {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    /// Encode one notification for the hex `token`.
    ///
    /// Nothing is returned unless the whole frame could be built.
    pub fn encode_frame(
        &self,
        token: &str,
        payload: &[u8],
        identifier: u32,
        expiration: u32,
        priority: Priority,
    ) -> ApnsResult<Vec<u8>> {
        let token = DeviceToken::from_hex(token)?;
        self.encode_token_frame(&token, payload, identifier, expiration, priority)
    }

    pub fn encode_token_frame(
        &self,
        token: &DeviceToken,
        payload: &[u8],
        identifier: u32,
        expiration: u32,
        priority: Priority,
    ) -> ApnsResult<Vec<u8>> {
        let max = self.max_payload_bytes.min(u16::MAX as usize);
        if payload.len() > max {
            return Err(ApnsError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload_bytes,
            });
        }

        let items_len = 5 * ITEM_HEADER_LENGTH + TOKEN_LENGTH + payload.len() + 4 + 4 + 1;
        let mut frame = BytesMut::with_capacity(FRAME_HEADER_LENGTH + items_len);

        frame.put_u8(COMMAND_NOTIFICATION);
        frame.put_u32(items_len as u32);

        frame.put_u8(ITEM_TOKEN);
        frame.put_u16(TOKEN_LENGTH as u16);
        frame.put_slice(token.as_bytes());

        frame.put_u8(ITEM_PAYLOAD);
        frame.put_u16(payload.len() as u16);
        frame.put_slice(payload);

        frame.put_u8(ITEM_IDENTIFIER);
        frame.put_u16(4);
        frame.put_u32(identifier);

        frame.put_u8(ITEM_EXPIRATION);
        frame.put_u16(4);
        frame.put_u32(expiration);

        frame.put_u8(ITEM_PRIORITY);
        frame.put_u16(1);
        frame.put_u8(priority.as_u8());

        Ok(frame.to_vec())
    }
}

/// Interpret bytes read from the push channel's error stream.
///
/// An empty read means nothing is pending. Anything other than a complete
/// response with command 8 is a protocol violation.
pub fn decode_error_response(bytes: &[u8]) -> ApnsResult<Option<ErrorResponse>> {
    if bytes.is_empty() {
        return Ok(None);
    }
    if bytes.len() != ERROR_RESPONSE_LENGTH {
        return Err(ApnsError::Protocol(format!(
            "error response must be {} bytes, got {}",
            ERROR_RESPONSE_LENGTH,
            bytes.len()
        )));
    }

    let mut buf = bytes;
    let command = buf.get_u8();
    if command != COMMAND_ERROR_RESPONSE {
        return Err(ApnsError::Protocol(format!(
            "unexpected command {command} in error response, expected {COMMAND_ERROR_RESPONSE}"
        )));
    }

    let status = ErrorStatus::from(buf.get_u8());
    let identifier = buf.get_u32();
    Ok(Some(ErrorResponse { status, identifier }))
}

pub fn encode_error_response(response: &ErrorResponse) -> [u8; ERROR_RESPONSE_LENGTH] {
    let id = response.identifier.to_be_bytes();
    [
        COMMAND_ERROR_RESPONSE,
        response.status.code(),
        id[0],
        id[1],
        id[2],
        id[3],
    ]
}

/// Take one feedback record off the front of `buf`.
///
/// Returns `None`, leaving `buf` untouched, until the header and the full
/// token it announces have arrived.
pub fn decode_feedback_record(buf: &mut BytesMut) -> Option<FeedbackRecord> {
    if buf.len() < FEEDBACK_HEADER_LENGTH {
        return None;
    }
    let token_len = u16::from_be_bytes([buf[4], buf[5]]) as usize;
    if buf.len() < FEEDBACK_HEADER_LENGTH + token_len {
        return None;
    }

    let timestamp = buf.get_u32();
    buf.advance(2);
    let token = buf.split_to(token_len).to_vec();
    Some(FeedbackRecord { timestamp, token })
}

pub fn encode_feedback_record(record: &FeedbackRecord, buf: &mut BytesMut) {
    buf.put_u32(record.timestamp);
    buf.put_u16(record.token.len() as u16);
    buf.put_slice(&record.token);
}

/// Parse a complete notification frame.
pub fn decode_frame(bytes: &[u8]) -> ApnsResult<DecodedFrame> {
    let mut buf = bytes;
    if buf.remaining() < FRAME_HEADER_LENGTH {
        return Err(ApnsError::Protocol("truncated frame header".into()));
    }
    let command = buf.get_u8();
    if command != COMMAND_NOTIFICATION {
        return Err(ApnsError::Protocol(format!(
            "unexpected command {command} in notification frame"
        )));
    }
    let frame_len = buf.get_u32() as usize;
    if buf.remaining() != frame_len {
        return Err(ApnsError::Protocol(format!(
            "frame declares {} bytes of items, found {}",
            frame_len,
            buf.remaining()
        )));
    }

    let mut frame = DecodedFrame {
        token: Vec::new(),
        payload: Vec::new(),
        identifier: 0,
        expiration: 0,
        priority: 0,
    };
    while buf.has_remaining() {
        if buf.remaining() < ITEM_HEADER_LENGTH {
            return Err(ApnsError::Protocol("truncated item header".into()));
        }
        let item_id = buf.get_u8();
        let item_len = buf.get_u16() as usize;
        if buf.remaining() < item_len {
            return Err(ApnsError::Protocol(format!("truncated item {item_id}")));
        }
        let (item, rest) = buf.split_at(item_len);
        match (item_id, item_len) {
            (ITEM_TOKEN, _) => frame.token = item.to_vec(),
            (ITEM_PAYLOAD, _) => frame.payload = item.to_vec(),
            (ITEM_IDENTIFIER, 4) => frame.identifier = be_u32(item),
            (ITEM_EXPIRATION, 4) => frame.expiration = be_u32(item),
            (ITEM_PRIORITY, 1) => frame.priority = item[0],
            _ => {
                return Err(ApnsError::Protocol(format!(
                    "unexpected item {item_id} of length {item_len}"
                )))
            }
        }
        buf = rest;
    }
    Ok(frame)
}

fn be_u32(item: &[u8]) -> u32 {
    u32::from_be_bytes([item[0], item[1], item[2], item[3]])
}

/// Length of the frame at the start of `bytes`, once its header is present.
pub fn frame_length(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < FRAME_HEADER_LENGTH {
        return None;
    }
    let items = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
    Some(FRAME_HEADER_LENGTH + items)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "0fdc8d3d1c2a8c8c3fa5e0c6d9b1c5f2e1e0f2d3c4b5a69788796a5b4c3d2e1f";

    #[test]
    fn test_frame_layout() {
        let codec = FrameCodec::new(2048);
        let payload = br#"{"aps":{"alert":"Hello world"}}"#;
        let frame = codec
            .encode_frame(TOKEN, payload, 7, 1_700_000_000, Priority::Immediate)
            .unwrap();

        let items_len = 15 + 32 + payload.len() + 9;
        assert_eq!(frame.len(), 5 + items_len);
        assert_eq!(frame[0], COMMAND_NOTIFICATION);
        assert_eq!(&frame[1..5], &(items_len as u32).to_be_bytes());
        // token item
        assert_eq!(frame[5], ITEM_TOKEN);
        assert_eq!(&frame[6..8], &[0, 32]);
        assert_eq!(&frame[8..40], hex::decode(TOKEN).unwrap().as_slice());
        // payload item
        assert_eq!(frame[40], ITEM_PAYLOAD);
        assert_eq!(&frame[41..43], &(payload.len() as u16).to_be_bytes());
        // trailing identifier, expiration, priority items
        let tail = &frame[frame.len() - 18..];
        assert_eq!(tail, &[3, 0, 4, 0, 0, 0, 7, 4, 0, 4, 0x65, 0x53, 0xf1, 0x00, 5, 0, 1, 10]);
    }

    #[test]
    fn test_frame_decodes_to_same_values() {
        let codec = FrameCodec::new(2048);
        let payload = br#"{"aps":{"badge":1}}"#;
        let frame = codec
            .encode_frame(TOKEN, payload, 41, 123_456, Priority::PowerConsiderate)
            .unwrap();

        assert_eq!(frame_length(&frame), Some(frame.len()));
        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded.token, hex::decode(TOKEN).unwrap());
        assert_eq!(decoded.payload, payload.to_vec());
        assert_eq!(decoded.identifier, 41);
        assert_eq!(decoded.expiration, 123_456);
        assert_eq!(decoded.priority, 5);
    }

    #[test]
    fn test_payload_at_limit_accepted() {
        let codec = FrameCodec::new(16);
        assert!(codec
            .encode_frame(TOKEN, &[b'x'; 16], 0, 0, Priority::Immediate)
            .is_ok());
    }

    #[test]
    fn test_payload_over_limit_rejected() {
        let codec = FrameCodec::new(16);
        let err = codec
            .encode_frame(TOKEN, &[b'x'; 17], 0, 0, Priority::Immediate)
            .unwrap_err();
        assert!(matches!(err, ApnsError::PayloadTooLarge { size: 17, max: 16 }));
    }

    #[test]
    fn test_invalid_token_rejected() {
        let codec = FrameCodec::new(2048);
        let err = codec
            .encode_frame("zz-not-hex", b"{}", 0, 0, Priority::Immediate)
            .unwrap_err();
        assert!(matches!(err, ApnsError::InvalidToken { .. }));

        let err = codec
            .encode_frame("abcdef", b"{}", 0, 0, Priority::Immediate)
            .unwrap_err();
        assert!(matches!(err, ApnsError::InvalidToken { .. }));
    }

    #[test]
    fn test_decode_error_response() {
        let response = decode_error_response(&[8, 8, 0, 0, 1, 2]).unwrap().unwrap();
        assert_eq!(response.status, ErrorStatus::InvalidToken);
        assert_eq!(response.identifier, 258);

        let encoded = encode_error_response(&response);
        assert_eq!(encoded, [8, 8, 0, 0, 1, 2]);
    }

    #[test]
    fn test_decode_empty_error_response() {
        assert_eq!(decode_error_response(&[]).unwrap(), None);
    }

    #[test]
    fn test_wrong_command_is_protocol_error() {
        let err = decode_error_response(&[7, 8, 0, 0, 0, 1]).unwrap_err();
        assert!(matches!(err, ApnsError::Protocol(_)));
    }

    #[test]
    fn test_truncated_error_response_is_protocol_error() {
        let err = decode_error_response(&[8, 8, 0]).unwrap_err();
        assert!(matches!(err, ApnsError::Protocol(_)));
    }

    #[test]
    fn test_feedback_records_in_order() {
        let mut buf = BytesMut::new();
        let first = FeedbackRecord {
            timestamp: 1_600_000_000,
            token: vec![0xaa; 32],
        };
        let second = FeedbackRecord {
            timestamp: 1_600_000_100,
            token: vec![0xbb; 3],
        };
        encode_feedback_record(&first, &mut buf);
        encode_feedback_record(&second, &mut buf);

        assert_eq!(decode_feedback_record(&mut buf), Some(first));
        assert_eq!(decode_feedback_record(&mut buf), Some(second));
        assert_eq!(decode_feedback_record(&mut buf), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_feedback_waits_for_full_token() {
        let mut buf = BytesMut::new();
        buf.put_u32(1);
        buf.put_u16(32);
        buf.put_slice(&[1u8; 10]);

        assert_eq!(decode_feedback_record(&mut buf), None);
        assert_eq!(buf.len(), 16);

        buf.put_slice(&[1u8; 22]);
        let record = decode_feedback_record(&mut buf).unwrap();
        assert_eq!(record.timestamp, 1);
        assert_eq!(record.token.len(), 32);
    }

    #[test]
    fn test_feedback_record_accessors() {
        let record = FeedbackRecord {
            timestamp: 0,
            token: vec![0xde, 0xad],
        };
        assert_eq!(record.token_hex(), "dead");
        assert_eq!(record.reported_at().unwrap().timestamp(), 0);
    }
}
