//! Session state machine and pending-send queue.
//!
//! [`Session`] is the sans-I/O core of the client: it owns the state
//! machine, the daemon-assigned private group, the receive buffer and the
//! pending-send queue, but never touches a socket. Every operation returns
//! the bytes that must be written and the messages that were decoded; the
//! tokio driver in [`crate::client`] performs the actual I/O.
//!
//! State sequence:
//!
//! ```text
//! Init ──connect──► Authenticating ──reply > 5 bytes──► Authenticated
//!                                                           │ join()
//!              ▲                                            ▼
//!              └────────────── close/error ───────────── Listening
//! ```
//!
//! Sends are legal in any state: before `Authenticated` they queue in FIFO
//! order and are flushed through the normal build path once the settle
//! window elapses. `join` is gated to `Authenticated`/`Listening` and is a
//! deterministic [`SpreadError::InvalidState`] anywhere else. Only
//! `Listening` decodes inbound frames.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::error::{Result, SpreadError};
use crate::protocol::{
    build_credential_frame, build_identity_frame, build_join_frame, build_send_frame, pad_group,
    trim_trailing_nulls, Frame, FrameBuffer, Inbound,
};

/// Minimum authentication-reply length; the private group starts at byte 5.
const AUTH_REPLY_GROUP_OFFSET: usize = 5;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection attempt in flight.
    Init,
    /// Identity frame sent, exchanging authentication bytes.
    Authenticating,
    /// Daemon assigned a private group; sends are accepted.
    Authenticated,
    /// A channel was joined; inbound frames are decoded.
    Listening,
    /// Transport closed; reset to `Init` follows immediately.
    Closed,
}

/// A send requested before the session was ready.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingSend {
    channel: String,
    text: String,
}

/// Result of feeding one transport read into the session.
#[derive(Debug, Default)]
pub struct Step {
    /// Bytes to write to the transport, in order.
    pub writes: Vec<Bytes>,
    /// Application messages decoded from this read.
    pub messages: Vec<(String, String)>,
    /// The session transitioned into `Authenticated` during this step; the
    /// driver must arm the settle timer and surface the event.
    pub authenticated: bool,
}

/// One logical connection attempt to the daemon.
///
/// Recreated (via [`Session::reset`]) on every reconnect; the client name,
/// default channel and any still-pending sends persist across resets.
pub struct Session {
    state: SessionState,
    client_name: String,
    default_channel: String,
    private_group: String,
    /// True once the null credential was written this connection.
    credential_sent: bool,
    /// Accumulated authentication-reply bytes.
    auth_buf: Vec<u8>,
    /// Last membership frame from the daemon, kept for bookkeeping.
    last_membership: Option<Frame>,
    pending: VecDeque<PendingSend>,
    frames: FrameBuffer,
    max_frame_bytes: u32,
}

impl Session {
    /// Create a session in the `Init` state.
    pub fn new(client_name: &str, default_channel: &str, max_frame_bytes: u32) -> Self {
        Self {
            state: SessionState::Init,
            client_name: client_name.to_string(),
            default_channel: default_channel.to_string(),
            private_group: String::new(),
            credential_sent: false,
            auth_buf: Vec::new(),
            last_membership: None,
            pending: VecDeque::new(),
            frames: FrameBuffer::with_max_frame(max_frame_bytes),
            max_frame_bytes,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Daemon-assigned private group name, empty before authentication.
    pub fn private_group(&self) -> &str {
        &self.private_group
    }

    /// Client name supplied at construction.
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Default channel supplied at construction.
    pub fn default_channel(&self) -> &str {
        &self.default_channel
    }

    /// Last membership frame received from the daemon, if any.
    pub fn last_membership(&self) -> Option<&Frame> {
        self.last_membership.as_ref()
    }

    /// Count of inbound frames skipped as unrecognized or malformed.
    pub fn frames_skipped(&self) -> u64 {
        self.frames.skipped()
    }

    /// The transport connected: produce the identity frame.
    ///
    /// Legal only in `Init`; moves to `Authenticating`.
    pub fn on_connect(&mut self) -> Result<Bytes> {
        if self.state != SessionState::Init {
            return Err(SpreadError::InvalidState(self.state));
        }
        let frame = build_identity_frame(&self.client_name)?;
        self.state = SessionState::Authenticating;
        tracing::debug!(name = %self.client_name, "identity sent, authenticating");
        Ok(frame)
    }

    /// Feed bytes read from the transport.
    pub fn on_data(&mut self, data: &[u8]) -> Result<Step> {
        let mut step = Step::default();
        match self.state {
            SessionState::Authenticating => {
                if !self.credential_sent {
                    // The daemon's greeting is discarded; it only cues the
                    // null-credential reply.
                    self.credential_sent = true;
                    step.writes.push(build_credential_frame());
                } else {
                    self.auth_buf.extend_from_slice(data);
                    if self.auth_buf.len() > AUTH_REPLY_GROUP_OFFSET {
                        self.private_group = String::from_utf8_lossy(trim_trailing_nulls(
                            &self.auth_buf[AUTH_REPLY_GROUP_OFFSET..],
                        ))
                        .into_owned();
                        self.auth_buf.clear();
                        self.state = SessionState::Authenticated;
                        step.authenticated = true;
                        tracing::debug!(private_group = %self.private_group, "authenticated");
                    }
                }
            }
            SessionState::Listening => {
                for item in self.frames.push(data)? {
                    match item {
                        Inbound::Message { channel, text } => step.messages.push((channel, text)),
                        Inbound::Membership(frame) => self.last_membership = Some(frame),
                    }
                }
            }
            // Inbound bytes are only decoded while listening.
            SessionState::Init | SessionState::Authenticated | SessionState::Closed => {
                tracing::debug!(state = ?self.state, len = data.len(), "discarding inbound bytes");
            }
        }
        Ok(step)
    }

    /// Request a send.
    ///
    /// Legal in any state: returns the frame bytes when the session is
    /// ready, otherwise queues the request and returns `None`. The channel
    /// defaults to the configured default channel.
    pub fn send(&mut self, text: &str, channel: Option<&str>) -> Result<Option<Bytes>> {
        let channel = channel.unwrap_or(&self.default_channel).to_string();
        match self.state {
            SessionState::Authenticated | SessionState::Listening => {
                let frame = build_send_frame(text, &channel, &self.private_group)?;
                Ok(Some(frame))
            }
            _ => {
                // Channel width is checked at enqueue time; the settle
                // flush must never fail on a queued item.
                pad_group(&channel)?;
                self.pending.push_back(PendingSend {
                    channel,
                    text: text.to_string(),
                });
                tracing::debug!(state = ?self.state, queued = self.pending.len(), "send queued");
                Ok(None)
            }
        }
    }

    /// Request membership in `channel`.
    ///
    /// Legal once authenticated (and again while listening, to join a
    /// further channel); moves to `Listening`.
    pub fn join(&mut self, channel: &str) -> Result<Bytes> {
        match self.state {
            SessionState::Authenticated | SessionState::Listening => {
                let frame = build_join_frame(channel, &self.private_group)?;
                self.state = SessionState::Listening;
                tracing::debug!(channel, "join requested, listening");
                Ok(frame)
            }
            state => Err(SpreadError::InvalidState(state)),
        }
    }

    /// Flush the pending-send queue, FIFO, through the normal send path.
    ///
    /// Called when the settle window elapses. Drains only in states where
    /// sends are guaranteed to be accepted, so nothing can re-queue.
    pub fn drain_pending(&mut self) -> Result<Vec<Bytes>> {
        if !matches!(
            self.state,
            SessionState::Authenticated | SessionState::Listening
        ) {
            return Ok(Vec::new());
        }
        let mut frames = Vec::with_capacity(self.pending.len());
        while let Some(item) = self.pending.pop_front() {
            if let Some(frame) = self.send(&item.text, Some(&item.channel))? {
                frames.push(frame);
            }
        }
        Ok(frames)
    }

    /// Number of sends waiting for the session to become ready.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// The transport closed: return to `Init` for the next connect.
    ///
    /// The private group and any buffered transport bytes belong to the
    /// dead connection and are cleared; the pending queue survives so
    /// unsent messages flush after reconnecting.
    pub fn reset(&mut self) {
        self.state = SessionState::Init;
        self.private_group.clear();
        self.credential_sent = false;
        self.auth_buf.clear();
        self.last_membership = None;
        self.frames = FrameBuffer::with_max_frame(self.max_frame_bytes);
        tracing::debug!("session reset");
    }
}
