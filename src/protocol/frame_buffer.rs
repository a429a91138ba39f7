//! Frame buffer for accumulating partial reads.
//!
//! TCP does not preserve message boundaries, so bytes from the daemon may
//! arrive fragmented or aggregated arbitrarily. This buffer accumulates
//! reads in a `bytes::BytesMut` and extracts every complete frame, keeping
//! any trailing partial frame for the next read.
//!
//! Frame completeness is decided from the two header length fields: the
//! trailing region is `payload_len + 32 * group_count` bytes, so a frame is
//! complete once `48 + trailing` bytes are buffered. A frame that ends
//! exactly at the buffer boundary is consumed, never left pending.
//!
//! # Example
//!
//! ```ignore
//! use spread_client::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//! for item in buffer.push(&chunk)? {
//!     println!("decoded: {:?}", item);
//! }
//! ```

use bytes::BytesMut;

use super::frame::Frame;
use super::wire_format::{
    decode_u32, unpad_group, OrderingClass, DEFAULT_MAX_FRAME_BYTES, GROUP_COUNT_OFFSET,
    GROUP_NAME_LEN, HEADER_SIZE, MEMBERSHIP_TAG, PAYLOAD_LEN_OFFSET,
};
use crate::error::{Result, SpreadError};

/// A decoded inbound item produced by the demultiplexer.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// An application message: target channel plus UTF-8 payload.
    Message {
        /// Channel the message was sent to.
        channel: String,
        /// Message text.
        text: String,
    },
    /// A membership / join-reply frame, retained for protocol bookkeeping.
    Membership(Frame),
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// Mutated only by the owning session's control flow; grows on each
/// transport read and shrinks by exactly the consumed frame lengths.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Maximum allowed trailing length per frame.
    max_frame_bytes: u32,
    /// Count of frames skipped as unrecognized or malformed.
    skipped: u64,
}

impl FrameBuffer {
    /// Create a new frame buffer with the default frame-size ceiling.
    pub fn new() -> Self {
        Self::with_max_frame(DEFAULT_MAX_FRAME_BYTES)
    }

    /// Create a new frame buffer with a custom frame-size ceiling.
    pub fn with_max_frame(max_frame_bytes: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            max_frame_bytes,
            skipped: 0,
        }
    }

    /// Push newly read bytes and extract every complete frame.
    ///
    /// Returns zero or more decoded items; partial data stays buffered for
    /// the next push.
    ///
    /// # Errors
    ///
    /// A declared trailing length above the configured ceiling is treated
    /// as a corrupt header and returned as a fatal `Protocol` error:
    /// resynchronizing on a corrupted length field could desynchronize the
    /// stream permanently.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Inbound>> {
        self.buffer.extend_from_slice(data);

        let mut items = Vec::new();
        while self.buffer.len() >= HEADER_SIZE {
            let trailing = decode_u32(&self.buffer, PAYLOAD_LEN_OFFSET) as usize
                + decode_u32(&self.buffer, GROUP_COUNT_OFFSET) as usize * GROUP_NAME_LEN;
            if trailing > self.max_frame_bytes as usize {
                return Err(SpreadError::Protocol(format!(
                    "declared frame length {} exceeds maximum {}",
                    trailing, self.max_frame_bytes
                )));
            }

            let total = HEADER_SIZE + trailing;
            if self.buffer.len() < total {
                break;
            }

            let tag = [self.buffer[0], self.buffer[1], self.buffer[2], self.buffer[3]];
            let raw = self.buffer.split_to(total).freeze();

            if OrderingClass::from_tag(tag).is_some() {
                // Group list missing entirely: no channel slot to read.
                if trailing < GROUP_NAME_LEN {
                    self.skipped += 1;
                    tracing::warn!(?tag, len = total, "skipping message frame without group slot");
                    continue;
                }
                let channel = unpad_group(&raw[HEADER_SIZE..HEADER_SIZE + GROUP_NAME_LEN]);
                let text =
                    String::from_utf8_lossy(&raw[HEADER_SIZE + GROUP_NAME_LEN..]).into_owned();
                items.push(Inbound::Message { channel, text });
            } else if tag == MEMBERSHIP_TAG {
                match Frame::parse(raw) {
                    Ok(frame) => items.push(Inbound::Membership(frame)),
                    Err(e) => {
                        self.skipped += 1;
                        tracing::warn!(?tag, error = %e, "skipping malformed membership frame");
                    }
                }
            } else {
                self.skipped += 1;
                tracing::warn!(?tag, len = total, "skipping unrecognized frame");
            }
        }

        Ok(items)
    }

    /// Count of frames skipped as unrecognized or malformed.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::{build_join_frame, build_send_frame};
    use crate::protocol::wire_format::{encode_u32, pad_group};

    /// Build a raw inbound message frame the way the daemon would.
    fn make_message_frame(class: OrderingClass, channel: &str, text: &str) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&class.tag());
        frame.extend_from_slice(&pad_group("#sender").unwrap());
        frame.extend_from_slice(&encode_u32(1));
        frame.extend_from_slice(&[0x80, 0x01, 0x00, 0x80]);
        frame.extend_from_slice(&encode_u32(text.len() as u32));
        frame.extend_from_slice(&pad_group(channel).unwrap());
        frame.extend_from_slice(text.as_bytes());
        frame
    }

    fn expect_message(item: &Inbound) -> (&str, &str) {
        match item {
            Inbound::Message { channel, text } => (channel, text),
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frame = make_message_frame(OrderingClass::Unreliable, "chat", "hello");

        let items = buffer.push(&frame).unwrap();

        assert_eq!(items.len(), 1);
        let (channel, text) = expect_message(&items[0]);
        assert_eq!(channel, "chat");
        assert_eq!(text, "hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_boundary_frame_fully_consumed() {
        // A buffer holding exactly one frame must yield it, not starve it.
        let mut buffer = FrameBuffer::new();
        let frame = make_message_frame(OrderingClass::Reliable, "chat", "exact");
        assert_eq!(frame.len(), HEADER_SIZE + GROUP_NAME_LEN + 5);

        let items = buffer.push(&frame).unwrap();
        assert_eq!(items.len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_split_at_every_byte_boundary() {
        let frame = make_message_frame(OrderingClass::Agreed, "chat", "split me");

        for split in 1..frame.len() {
            let mut buffer = FrameBuffer::new();
            let first = buffer.push(&frame[..split]).unwrap();
            assert!(first.is_empty(), "no frame should complete at split {}", split);

            let second = buffer.push(&frame[split..]).unwrap();
            assert_eq!(second.len(), 1, "exactly one frame at split {}", split);
            let (channel, text) = expect_message(&second[0]);
            assert_eq!(channel, "chat");
            assert_eq!(text, "split me");
            assert!(buffer.is_empty());
        }
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();
        let mut data = Vec::new();
        data.extend_from_slice(&make_message_frame(OrderingClass::Unreliable, "a", "first"));
        data.extend_from_slice(&make_message_frame(OrderingClass::Fifo, "b", "second"));
        data.extend_from_slice(&make_message_frame(OrderingClass::Safe, "c", "third"));

        let items = buffer.push(&data).unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(expect_message(&items[0]), ("a", "first"));
        assert_eq!(expect_message(&items[1]), ("b", "second"));
        assert_eq!(expect_message(&items[2]), ("c", "third"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_complete_frame_plus_partial_retained() {
        let mut buffer = FrameBuffer::new();
        let frame1 = make_message_frame(OrderingClass::Unreliable, "a", "whole");
        let frame2 = make_message_frame(OrderingClass::Unreliable, "b", "partial");

        let mut data = frame1.clone();
        data.extend_from_slice(&frame2[..20]);

        let items = buffer.push(&data).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(buffer.len(), 20);

        let items = buffer.push(&frame2[20..]).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(expect_message(&items[0]), ("b", "partial"));
    }

    #[test]
    fn test_all_ordering_classes_recognized() {
        for class in OrderingClass::ALL {
            let mut buffer = FrameBuffer::new();
            let items = buffer.push(&make_message_frame(class, "chat", "m")).unwrap();
            assert_eq!(items.len(), 1, "class {:?} should decode", class);
        }
    }

    #[test]
    fn test_membership_frame_retained_not_message() {
        let mut buffer = FrameBuffer::new();
        let mut frame = Vec::new();
        frame.extend_from_slice(&MEMBERSHIP_TAG);
        frame.extend_from_slice(&pad_group("chat").unwrap());
        frame.extend_from_slice(&encode_u32(2));
        frame.extend_from_slice(&[0x80, 0x00, 0x00, 0x80]);
        frame.extend_from_slice(&encode_u32(0));
        frame.extend_from_slice(&pad_group("#svc1").unwrap());
        frame.extend_from_slice(&pad_group("#other").unwrap());

        let items = buffer.push(&frame).unwrap();

        assert_eq!(items.len(), 1);
        match &items[0] {
            Inbound::Membership(frame) => {
                assert_eq!(frame.header.private_group, "chat");
                assert_eq!(frame.groups, vec!["#svc1".to_string(), "#other".to_string()]);
            }
            other => panic!("expected membership, got {:?}", other),
        }
        assert_eq!(buffer.skipped(), 0);
    }

    #[test]
    fn test_unrecognized_tag_skipped_and_counted() {
        let mut buffer = FrameBuffer::new();
        let mut unknown = make_message_frame(OrderingClass::Unreliable, "chat", "junk");
        unknown[0] = 0x42;

        let mut data = unknown;
        data.extend_from_slice(&make_message_frame(OrderingClass::Unreliable, "chat", "real"));

        let items = buffer.push(&data).unwrap();

        // Skipped frame resynchronizes to the next boundary.
        assert_eq!(items.len(), 1);
        assert_eq!(expect_message(&items[0]), ("chat", "real"));
        assert_eq!(buffer.skipped(), 1);
    }

    #[test]
    fn test_message_frame_without_group_slot_skipped() {
        // A message-class frame whose trailing region is too short to hold
        // even one group slot has no channel to read.
        let mut data = Vec::new();
        data.extend_from_slice(&OrderingClass::Unreliable.tag());
        data.extend_from_slice(&pad_group("#sender").unwrap());
        data.extend_from_slice(&encode_u32(0));
        data.extend_from_slice(&[0x80, 0x01, 0x00, 0x80]);
        data.extend_from_slice(&encode_u32(5));
        data.extend_from_slice(b"stub!");
        data.extend_from_slice(&make_message_frame(OrderingClass::Unreliable, "chat", "real"));

        let mut buffer = FrameBuffer::new();
        let items = buffer.push(&data).unwrap();

        // The malformed frame is consumed without an event; the stream
        // stays in sync for the frame behind it.
        assert_eq!(items.len(), 1);
        assert_eq!(expect_message(&items[0]), ("chat", "real"));
        assert_eq!(buffer.skipped(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_corrupt_length_is_fatal() {
        let mut buffer = FrameBuffer::with_max_frame(1024);
        let mut frame = make_message_frame(OrderingClass::Unreliable, "chat", "x");
        frame[PAYLOAD_LEN_OFFSET..PAYLOAD_LEN_OFFSET + 4]
            .copy_from_slice(&encode_u32(10_000_000));

        let result = buffer.push(&frame);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_outbound_send_frame_roundtrips() {
        let mut buffer = FrameBuffer::new();
        let frame = build_send_frame("payload bytes", "chat", "#svc1").unwrap();

        let items = buffer.push(&frame).unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(expect_message(&items[0]), ("chat", "payload bytes"));
    }

    #[test]
    fn test_join_frame_not_a_message() {
        // A join frame's tag is not a message class; the demultiplexer
        // skips it without emitting anything.
        let mut buffer = FrameBuffer::new();
        let frame = build_join_frame("chat", "#svc1").unwrap();

        let items = buffer.push(&frame).unwrap();

        assert!(items.is_empty());
        assert_eq!(buffer.skipped(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_clear_discards_partial() {
        let mut buffer = FrameBuffer::new();
        let frame = make_message_frame(OrderingClass::Unreliable, "chat", "hello");
        buffer.push(&frame[..10]).unwrap();
        assert_eq!(buffer.len(), 10);

        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let frame = make_message_frame(OrderingClass::Causal, "chat", "hi");

        let mut all = Vec::new();
        for byte in &frame {
            all.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all.len(), 1);
        assert_eq!(expect_message(&all[0]), ("chat", "hi"));
    }
}
