//! Frame struct and outbound frame builders.
//!
//! Everything the client writes to the daemon is produced here: the identity
//! frame sent on connect, the fixed null-credential frame, and the SEND/JOIN
//! frames built from session state. Inbound control frames that the session
//! retains are decoded into [`Frame`].

use bytes::Bytes;

use super::wire_format::{
    pad_group, unpad_group, Header, OrderingClass, CREDENTIAL_LEN, GROUP_NAME_LEN, HEADER_SIZE,
    IDENTITY_PREAMBLE, JOIN_MESSAGE_TYPE, JOIN_SERVICE_TAG, MAX_CLIENT_NAME_LEN,
    SEND_MESSAGE_TYPE,
};
use crate::error::{Result, SpreadError};

/// A fully decoded protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Group-name list from the trailing region, trimmed.
    pub groups: Vec<String>,
    /// Payload bytes following the group list (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Parse a complete frame from its raw bytes.
    ///
    /// `raw` must contain exactly the header plus the trailing region
    /// declared by it, as extracted by the frame buffer.
    pub fn parse(raw: Bytes) -> Result<Self> {
        let header = Header::decode(&raw)
            .ok_or_else(|| SpreadError::Protocol("frame shorter than header".to_string()))?;
        let expected = HEADER_SIZE + header.trailing_len();
        if raw.len() != expected {
            return Err(SpreadError::Protocol(format!(
                "frame length {} does not match declared length {}",
                raw.len(),
                expected
            )));
        }

        let mut groups = Vec::with_capacity(header.group_count as usize);
        let mut offset = HEADER_SIZE;
        for _ in 0..header.group_count {
            groups.push(unpad_group(&raw[offset..offset + GROUP_NAME_LEN]));
            offset += GROUP_NAME_LEN;
        }
        let payload = raw.slice(offset..);

        Ok(Self {
            header,
            groups,
            payload,
        })
    }

    /// Ordering class of this frame, `None` for control frames.
    #[inline]
    pub fn ordering_class(&self) -> Option<OrderingClass> {
        self.header.ordering_class()
    }
}

/// Build the identity frame sent immediately after the socket connects.
///
/// Layout: 4-byte preamble `04 03 00 01`, a single length byte, then the
/// raw name bytes. Names longer than 255 bytes cannot be represented and
/// are rejected.
pub fn build_identity_frame(name: &str) -> Result<Bytes> {
    let bytes = name.as_bytes();
    if bytes.len() > MAX_CLIENT_NAME_LEN {
        return Err(SpreadError::Protocol(format!(
            "client name exceeds {} bytes",
            MAX_CLIENT_NAME_LEN
        )));
    }
    let mut frame = Vec::with_capacity(IDENTITY_PREAMBLE.len() + 1 + bytes.len());
    frame.extend_from_slice(&IDENTITY_PREAMBLE);
    frame.push(bytes.len() as u8);
    frame.extend_from_slice(bytes);
    Ok(Bytes::from(frame))
}

/// Build the fixed 90-byte null-credential frame.
///
/// The daemon's null authentication method expects the literal `NULL`
/// padded out with zero bytes.
pub fn build_credential_frame() -> Bytes {
    let mut frame = [0u8; CREDENTIAL_LEN];
    frame[..4].copy_from_slice(b"NULL");
    Bytes::copy_from_slice(&frame)
}

/// Build an application SEND frame.
///
/// The frame carries the unreliable class tag, the daemon-assigned private
/// group as the source address, a single target channel in the group list,
/// and the UTF-8 payload bytes.
pub fn build_send_frame(text: &str, channel: &str, private_group: &str) -> Result<Bytes> {
    let payload = text.as_bytes();
    let header = Header::new(
        OrderingClass::Unreliable.tag(),
        private_group,
        1,
        SEND_MESSAGE_TYPE,
        payload.len() as u32,
    );

    let mut frame = Vec::with_capacity(HEADER_SIZE + GROUP_NAME_LEN + payload.len());
    frame.extend_from_slice(&header.encode()?);
    frame.extend_from_slice(&pad_group(channel)?);
    frame.extend_from_slice(payload);
    Ok(Bytes::from(frame))
}

/// Build a JOIN frame for the requested channel.
///
/// Same shape as a send frame but with the join service tag and an empty
/// payload: just the header and the padded channel name.
pub fn build_join_frame(channel: &str, private_group: &str) -> Result<Bytes> {
    let header = Header::new(JOIN_SERVICE_TAG, private_group, 1, JOIN_MESSAGE_TYPE, 0);

    let mut frame = Vec::with_capacity(HEADER_SIZE + GROUP_NAME_LEN);
    frame.extend_from_slice(&header.encode()?);
    frame.extend_from_slice(&pad_group(channel)?);
    Ok(Bytes::from(frame))
}
