//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the daemon's binary wire protocol:
//! - 48-byte header encoding/decoding, little-endian
//! - Outbound frame builders (identity, credential, SEND, JOIN)
//! - Frame buffer for accumulating partial reads

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{
    build_credential_frame, build_identity_frame, build_join_frame, build_send_frame, Frame,
};
pub use frame_buffer::{FrameBuffer, Inbound};
pub use wire_format::{
    decode_u32, encode_u32, pad_group, trim_trailing_nulls, unpad_group, Header, OrderingClass,
    CREDENTIAL_LEN, DEFAULT_MAX_FRAME_BYTES, GROUP_COUNT_OFFSET, GROUP_NAME_LEN, HEADER_SIZE,
    IDENTITY_PREAMBLE, JOIN_MESSAGE_TYPE, JOIN_SERVICE_TAG, MAX_CLIENT_NAME_LEN, MEMBERSHIP_TAG,
    MESSAGE_TYPE_OFFSET, PAYLOAD_LEN_OFFSET, SEND_MESSAGE_TYPE,
};
