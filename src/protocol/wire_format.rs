//! Wire format encoding and decoding.
//!
//! Implements the 48-byte daemon header:
//! ```text
//! ┌─────────────┬───────────────┬─────────────┬──────────────┬─────────────┐
//! │ Service tag │ Private group │ Group count │ Message type │ Payload len │
//! │ 4 bytes     │ 32 bytes      │ 4 bytes     │ 4 bytes      │ 4 bytes     │
//! │             │ null-padded   │ uint32 LE   │              │ uint32 LE   │
//! └─────────────┴───────────────┴─────────────┴──────────────┴─────────────┘
//! ```
//!
//! The trailing region of a frame holds the group-name list (32 bytes per
//! entry, `group_count` entries) followed by the payload (`payload_len`
//! bytes), so the total frame length is
//! `48 + payload_len + 32 * group_count`.
//!
//! All multi-byte integers are Little Endian.

use crate::error::{Result, SpreadError};

/// Header size in bytes (fixed, exactly 48).
pub const HEADER_SIZE: usize = 48;

/// Width of a padded group name field.
pub const GROUP_NAME_LEN: usize = 32;

/// Offset of the group-count scalar within the header.
pub const GROUP_COUNT_OFFSET: usize = 36;

/// Offset of the message-type tag within the header.
pub const MESSAGE_TYPE_OFFSET: usize = 40;

/// Offset of the payload byte length within the header.
pub const PAYLOAD_LEN_OFFSET: usize = 44;

/// Default maximum trailing length per frame (1 MiB).
///
/// A declared length above this ceiling is treated as a corrupt header and
/// is fatal to the connection: skipping a frame based on a corrupted length
/// field can desynchronize the stream permanently.
pub const DEFAULT_MAX_FRAME_BYTES: u32 = 1024 * 1024;

/// Service tag of a membership / join-reply frame from the daemon.
pub const MEMBERSHIP_TAG: [u8; 4] = [0x80, 0x11, 0x00, 0x80];

/// Service tag of an outbound join request.
pub const JOIN_SERVICE_TAG: [u8; 4] = [0x80, 0x00, 0x01, 0x80];

/// Message-type tag carried by application send frames.
pub const SEND_MESSAGE_TYPE: [u8; 4] = [0x80, 0x01, 0x00, 0x80];

/// Message-type tag carried by join frames.
pub const JOIN_MESSAGE_TYPE: [u8; 4] = [0x80, 0x00, 0x00, 0x80];

/// Fixed preamble of the identity frame sent right after connecting.
pub const IDENTITY_PREAMBLE: [u8; 4] = [0x04, 0x03, 0x00, 0x01];

/// Length of the null-credential authentication frame.
pub const CREDENTIAL_LEN: usize = 90;

/// Maximum client name length (single-byte length field on the wire).
pub const MAX_CLIENT_NAME_LEN: usize = 255;

/// Ordering class of a message frame, identified by its 4-byte service tag.
///
/// The daemon distinguishes six delivery classes. This client recognizes
/// all six on receive but only ever emits [`OrderingClass::Unreliable`] for
/// application sends; no ordering guarantee beyond tag preservation is
/// implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingClass {
    Unreliable,
    Reliable,
    Fifo,
    Causal,
    Agreed,
    Safe,
}

impl OrderingClass {
    /// All ordering classes, in tag order.
    pub const ALL: [OrderingClass; 6] = [
        OrderingClass::Unreliable,
        OrderingClass::Reliable,
        OrderingClass::Fifo,
        OrderingClass::Causal,
        OrderingClass::Agreed,
        OrderingClass::Safe,
    ];

    /// The 4-byte service tag for this class.
    pub fn tag(self) -> [u8; 4] {
        let lead = match self {
            OrderingClass::Unreliable => 0x81,
            OrderingClass::Reliable => 0x82,
            OrderingClass::Fifo => 0x84,
            OrderingClass::Causal => 0x88,
            OrderingClass::Agreed => 0x90,
            OrderingClass::Safe => 0xa0,
        };
        [lead, 0x00, 0x00, 0x80]
    }

    /// Classify a 4-byte service tag, `None` for non-message tags.
    pub fn from_tag(tag: [u8; 4]) -> Option<Self> {
        OrderingClass::ALL.into_iter().find(|c| c.tag() == tag)
    }
}

/// Encode a 32-bit value as 4 little-endian bytes.
#[inline]
pub fn encode_u32(value: u32) -> [u8; 4] {
    value.to_le_bytes()
}

/// Decode 4 little-endian bytes starting at `offset`.
///
/// # Panics
///
/// Panics if `buf` holds fewer than `offset + 4` bytes. Callers confirm
/// header presence before decoding length fields.
#[inline]
pub fn decode_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

/// Null-pad a group name to its fixed 32-byte wire width.
///
/// An input longer than [`GROUP_NAME_LEN`] is a contract violation and is
/// rejected rather than silently truncated, since truncation would corrupt
/// the frame.
pub fn pad_group(name: &str) -> Result<[u8; GROUP_NAME_LEN]> {
    let bytes = name.as_bytes();
    if bytes.len() > GROUP_NAME_LEN {
        return Err(SpreadError::Protocol(format!(
            "group name {:?} exceeds {} bytes",
            name, GROUP_NAME_LEN
        )));
    }
    let mut padded = [0u8; GROUP_NAME_LEN];
    padded[..bytes.len()].copy_from_slice(bytes);
    Ok(padded)
}

/// Strip trailing null bytes from a padded field.
pub fn trim_trailing_nulls(buf: &[u8]) -> &[u8] {
    let end = buf.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    &buf[..end]
}

/// Read a padded group-name field back out as a `String`.
pub fn unpad_group(buf: &[u8]) -> String {
    String::from_utf8_lossy(trim_trailing_nulls(buf)).into_owned()
}

/// Decoded header from wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// 4-byte service tag (frame class).
    pub service_tag: [u8; 4],
    /// Sender's private group name (trimmed).
    pub private_group: String,
    /// Number of 32-byte group-name entries in the trailing region.
    pub group_count: u32,
    /// 4-byte message-type tag.
    pub message_type: [u8; 4],
    /// Payload byte length (excludes the group-name list).
    pub payload_len: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(
        service_tag: [u8; 4],
        private_group: &str,
        group_count: u32,
        message_type: [u8; 4],
        payload_len: u32,
    ) -> Self {
        Self {
            service_tag,
            private_group: private_group.to_string(),
            group_count,
            message_type,
            payload_len,
        }
    }

    /// Encode the header to its 48-byte wire form.
    ///
    /// Fails if the private group name exceeds the 32-byte field width.
    pub fn encode(&self) -> Result<[u8; HEADER_SIZE]> {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.service_tag);
        buf[4..36].copy_from_slice(&pad_group(&self.private_group)?);
        buf[GROUP_COUNT_OFFSET..GROUP_COUNT_OFFSET + 4]
            .copy_from_slice(&encode_u32(self.group_count));
        buf[MESSAGE_TYPE_OFFSET..MESSAGE_TYPE_OFFSET + 4].copy_from_slice(&self.message_type);
        buf[PAYLOAD_LEN_OFFSET..PAYLOAD_LEN_OFFSET + 4]
            .copy_from_slice(&encode_u32(self.payload_len));
        Ok(buf)
    }

    /// Decode a header from the first 48 bytes of `buf`.
    ///
    /// Returns `None` if the buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            service_tag: [buf[0], buf[1], buf[2], buf[3]],
            private_group: unpad_group(&buf[4..36]),
            group_count: decode_u32(buf, GROUP_COUNT_OFFSET),
            message_type: [
                buf[MESSAGE_TYPE_OFFSET],
                buf[MESSAGE_TYPE_OFFSET + 1],
                buf[MESSAGE_TYPE_OFFSET + 2],
                buf[MESSAGE_TYPE_OFFSET + 3],
            ],
            payload_len: decode_u32(buf, PAYLOAD_LEN_OFFSET),
        })
    }

    /// Total trailing length declared by this header.
    #[inline]
    pub fn trailing_len(&self) -> usize {
        self.payload_len as usize + GROUP_NAME_LEN * self.group_count as usize
    }

    /// Ordering class of this frame, `None` for control frames.
    #[inline]
    pub fn ordering_class(&self) -> Option<OrderingClass> {
        OrderingClass::from_tag(self.service_tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u32_little_endian_byte_order() {
        let bytes = encode_u32(0x0403_0201);
        assert_eq!(bytes, [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(decode_u32(&bytes, 0), 0x0403_0201);
    }

    #[test]
    fn test_u32_roundtrip_at_offset() {
        let mut buf = vec![0xFFu8; 3];
        buf.extend_from_slice(&encode_u32(123_456_789));
        assert_eq!(decode_u32(&buf, 3), 123_456_789);
    }

    #[test]
    fn test_pad_group_null_padded() {
        let padded = pad_group("chat").unwrap();
        assert_eq!(&padded[..4], b"chat");
        assert!(padded[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_pad_group_exact_width() {
        let name = "a".repeat(GROUP_NAME_LEN);
        let padded = pad_group(&name).unwrap();
        assert_eq!(&padded[..], name.as_bytes());
    }

    #[test]
    fn test_pad_group_too_long_rejected() {
        let name = "a".repeat(GROUP_NAME_LEN + 1);
        let result = pad_group(&name);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("exceeds"));
    }

    #[test]
    fn test_trim_trailing_nulls() {
        assert_eq!(trim_trailing_nulls(b"chat\x00\x00\x00"), b"chat");
        assert_eq!(trim_trailing_nulls(b"\x00\x00"), b"");
        assert_eq!(trim_trailing_nulls(b"no-padding"), b"no-padding");
        // Interior nulls are preserved
        assert_eq!(trim_trailing_nulls(b"a\x00b\x00"), b"a\x00b");
    }

    #[test]
    fn test_unpad_roundtrip() {
        let padded = pad_group("#svc1").unwrap();
        assert_eq!(unpad_group(&padded), "#svc1");
    }

    #[test]
    fn test_ordering_class_tags() {
        assert_eq!(OrderingClass::Unreliable.tag(), [0x81, 0x00, 0x00, 0x80]);
        assert_eq!(OrderingClass::Safe.tag(), [0xa0, 0x00, 0x00, 0x80]);
        for class in OrderingClass::ALL {
            assert_eq!(OrderingClass::from_tag(class.tag()), Some(class));
        }
    }

    #[test]
    fn test_ordering_class_rejects_control_tags() {
        assert_eq!(OrderingClass::from_tag(MEMBERSHIP_TAG), None);
        assert_eq!(OrderingClass::from_tag(JOIN_SERVICE_TAG), None);
        assert_eq!(OrderingClass::from_tag([0x00; 4]), None);
    }

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let header = Header::new(
            OrderingClass::Unreliable.tag(),
            "#svc1",
            1,
            SEND_MESSAGE_TYPE,
            17,
        );
        let bytes = header.encode().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        let decoded = Header::decode(&bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_header_field_offsets() {
        let header = Header::new([0x81, 0x00, 0x00, 0x80], "g", 2, SEND_MESSAGE_TYPE, 0x0102);
        let bytes = header.encode().unwrap();

        assert_eq!(&bytes[0..4], &[0x81, 0x00, 0x00, 0x80]);
        assert_eq!(bytes[4], b'g');
        assert_eq!(&bytes[36..40], &[2, 0, 0, 0]);
        assert_eq!(&bytes[40..44], &SEND_MESSAGE_TYPE);
        assert_eq!(&bytes[44..48], &[0x02, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn test_header_trailing_len() {
        let header = Header::new(MEMBERSHIP_TAG, "", 3, JOIN_MESSAGE_TYPE, 10);
        assert_eq!(header.trailing_len(), 10 + 3 * GROUP_NAME_LEN);
    }

    #[test]
    fn test_header_decode_too_short() {
        assert!(Header::decode(&[0u8; HEADER_SIZE - 1]).is_none());
    }
}
