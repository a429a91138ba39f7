//! Client builder and runtime loop.
//!
//! The [`ClientBuilder`] configures a connection and [`SpreadClient`] is
//! the running handle. The client owns a single session task that:
//! 1. Connects to the daemon over TCP
//! 2. Runs the authentication handshake via the session state machine
//! 3. Reads frames and surfaces decoded messages as [`SpreadEvent`]s
//! 4. Reconnects with exponential backoff when the connection drops
//!
//! Consumer calls (`send`, `join`, `close`) travel to the task over a
//! command channel; inbound events come back over an unbounded event
//! channel the consumer drains with [`SpreadClient::recv`].
//!
//! # Example
//!
//! ```ignore
//! use spread_client::{SpreadClient, SpreadEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = SpreadClient::builder("svc1", "127.0.0.1", 4803, "chat")
//!         .connect()?;
//!
//!     while let Some(event) = client.recv().await {
//!         match event {
//!             SpreadEvent::Authenticated { .. } => client.join("chat").await?,
//!             SpreadEvent::Message { channel, text } => {
//!                 println!("[{}] {}", channel, text);
//!             }
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Sleep};

use crate::config::SpreadConfig;
use crate::error::{Result, SpreadError};
use crate::session::Session;

/// Capacity of the consumer-to-task command channel.
const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Read buffer size for the transport loop.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// An event delivered to the consumer.
///
/// Events preserve arrival order; delivery is backpressure-free (the event
/// channel is unbounded, the session task never blocks on the consumer).
#[derive(Debug)]
pub enum SpreadEvent {
    /// Transport connected; the identity frame is about to be sent.
    Connected,
    /// The daemon assigned a private group; `join` is now legal.
    Authenticated {
        /// Daemon-assigned private group name.
        private_group: String,
    },
    /// A fully decoded application message.
    Message {
        /// Channel the message was sent to.
        channel: String,
        /// Message text.
        text: String,
    },
    /// A transport or protocol error, passed through unmodified.
    Error(SpreadError),
    /// Session torn down; reconnection follows if enabled.
    Closed,
}

/// Consumer request delivered to the session task.
enum Command {
    Send {
        text: String,
        channel: Option<String>,
    },
    Join {
        channel: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

/// Builder for configuring and starting a client.
pub struct ClientBuilder {
    config: SpreadConfig,
}

impl ClientBuilder {
    /// Create a builder with default tunables.
    pub fn new(name: &str, host: &str, port: u16, default_channel: &str) -> Self {
        Self {
            config: SpreadConfig::new(name, host, port, default_channel),
        }
    }

    /// Create a builder from a loaded configuration.
    pub fn from_config(config: SpreadConfig) -> Self {
        Self { config }
    }

    /// Enable or disable automatic reconnection (default: enabled).
    pub fn reconnect(mut self, enabled: bool) -> Self {
        self.config.reconnect = enabled;
        self
    }

    /// Set the settle window between authentication and the pending-send
    /// flush (default: 10 s).
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.settle_ms = delay.as_millis() as u64;
        self
    }

    /// Set the reconnect backoff: initial delay, doubling up to `max`.
    pub fn reconnect_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.config.reconnect_initial_ms = initial.as_millis() as u64;
        self.config.reconnect_max_ms = max.as_millis() as u64;
        self
    }

    /// Set the maximum accepted trailing length per inbound frame.
    pub fn max_frame_bytes(mut self, max: u32) -> Self {
        self.config.max_frame_bytes = max;
        self
    }

    /// Validate the configuration and spawn the session task.
    ///
    /// Connection progress is reported through events; this call itself
    /// only fails on invalid configuration.
    pub fn connect(self) -> Result<SpreadClient> {
        self.config.validate()?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(self.config, command_rx, event_tx));

        Ok(SpreadClient {
            commands: command_tx,
            events: event_rx,
            task,
        })
    }
}

/// A running client handle.
pub struct SpreadClient {
    commands: mpsc::Sender<Command>,
    events: mpsc::UnboundedReceiver<SpreadEvent>,
    task: JoinHandle<()>,
}

impl SpreadClient {
    /// Create a client builder.
    pub fn builder(name: &str, host: &str, port: u16, default_channel: &str) -> ClientBuilder {
        ClientBuilder::new(name, host, port, default_channel)
    }

    /// Receive the next event.
    ///
    /// Returns `None` once the session task has ended and all events were
    /// drained.
    pub async fn recv(&mut self) -> Option<SpreadEvent> {
        self.events.recv().await
    }

    /// Send `text` to the default channel.
    ///
    /// Legal in any state: if the session is not ready yet the message is
    /// queued and flushed after the settle window.
    pub async fn send(&self, text: &str) -> Result<()> {
        self.send_command(Command::Send {
            text: text.to_string(),
            channel: None,
        })
        .await
    }

    /// Send `text` to a specific channel.
    pub async fn send_to(&self, channel: &str, text: &str) -> Result<()> {
        self.send_command(Command::Send {
            text: text.to_string(),
            channel: Some(channel.to_string()),
        })
        .await
    }

    /// Request membership in `channel`.
    ///
    /// Resolves with `Err(SpreadError::InvalidState(..))` when called
    /// before the session is authenticated.
    pub async fn join(&self, channel: &str) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_command(Command::Join {
            channel: channel.to_string(),
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| SpreadError::ConnectionClosed)?
    }

    /// Shut the session down and wait for the task to finish.
    ///
    /// Cancels any armed settle timer and pending reconnect.
    pub async fn close(self) -> Result<()> {
        let _ = self.commands.send(Command::Shutdown).await;
        self.task.await.map_err(|e| {
            SpreadError::Protocol(format!("session task panicked: {}", e))
        })
    }

    async fn send_command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SpreadError::ConnectionClosed)
    }
}

/// Why one connection's drive loop ended.
enum Exit {
    /// The transport closed or errored; reconnect may follow.
    Closed,
    /// The consumer requested shutdown.
    Shutdown,
}

/// Session task body: connect, drive, reconnect.
async fn run(
    config: SpreadConfig,
    mut commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedSender<SpreadEvent>,
) {
    let mut session = Session::new(&config.name, &config.default_channel, config.max_frame_bytes);
    let mut delay = config.reconnect_initial();

    loop {
        match TcpStream::connect((config.host.as_str(), config.port)).await {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::warn!(error = %e, "failed to set TCP_NODELAY");
                }
                delay = config.reconnect_initial();
                tracing::info!(host = %config.host, port = config.port, "connected");

                let exit = drive(
                    stream,
                    &mut session,
                    &mut commands,
                    &events,
                    config.settle_delay(),
                )
                .await;

                match exit {
                    Ok(Exit::Shutdown) => {
                        tracing::debug!("session task shutting down");
                        return;
                    }
                    Ok(Exit::Closed) => {
                        let _ = events.send(SpreadEvent::Closed);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "connection failed");
                        let _ = events.send(SpreadEvent::Error(e));
                        let _ = events.send(SpreadEvent::Closed);
                    }
                }
                session.reset();
            }
            Err(e) => {
                tracing::warn!(error = %e, "connect failed");
                let _ = events.send(SpreadEvent::Error(e.into()));
            }
        }

        if !config.reconnect {
            return;
        }
        tracing::info!(delay = ?delay, "reconnecting");
        if !wait_for_reconnect(delay, &mut session, &mut commands, &events).await {
            return;
        }
        delay = (delay * 2).min(config.reconnect_max());
    }
}

/// Sleep out the backoff delay while still servicing consumer commands.
///
/// Sends queue into the session (they flush after the next handshake);
/// joins are rejected since no connection exists. Returns `false` on
/// shutdown.
async fn wait_for_reconnect(
    delay: Duration,
    session: &mut Session,
    commands: &mut mpsc::Receiver<Command>,
    events: &mpsc::UnboundedSender<SpreadEvent>,
) -> bool {
    let deadline = time::Instant::now() + delay;
    loop {
        tokio::select! {
            _ = time::sleep_until(deadline) => return true,
            command = commands.recv() => match command {
                None | Some(Command::Shutdown) => return false,
                Some(Command::Send { text, channel }) => {
                    if let Err(e) = session.send(&text, channel.as_deref()) {
                        let _ = events.send(SpreadEvent::Error(e));
                    }
                }
                Some(Command::Join { reply, .. }) => {
                    let _ = reply.send(Err(SpreadError::InvalidState(session.state())));
                }
            },
        }
    }
}

/// Drive one connection until it closes or the consumer shuts down.
async fn drive<S>(
    stream: S,
    session: &mut Session,
    commands: &mut mpsc::Receiver<Command>,
    events: &mpsc::UnboundedSender<SpreadEvent>,
    settle_delay: Duration,
) -> Result<Exit>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    let _ = events.send(SpreadEvent::Connected);
    let identity = session.on_connect()?;
    writer.write_all(&identity).await?;

    // One-shot settle timer, armed when authentication completes.
    let mut settle: Option<Pin<Box<Sleep>>> = None;
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => {
                let n = match read {
                    Ok(0) => return Ok(Exit::Closed),
                    Ok(n) => n,
                    Err(e) => return Err(e.into()),
                };
                let step = session.on_data(&buf[..n])?;
                for frame in &step.writes {
                    writer.write_all(frame).await?;
                }
                if step.authenticated {
                    let _ = events.send(SpreadEvent::Authenticated {
                        private_group: session.private_group().to_string(),
                    });
                    settle = Some(Box::pin(time::sleep(settle_delay)));
                }
                for (channel, text) in step.messages {
                    let _ = events.send(SpreadEvent::Message { channel, text });
                }
            }

            command = commands.recv() => match command {
                None | Some(Command::Shutdown) => return Ok(Exit::Shutdown),
                Some(Command::Send { text, channel }) => {
                    match session.send(&text, channel.as_deref()) {
                        Ok(Some(frame)) => writer.write_all(&frame).await?,
                        Ok(None) => {}
                        Err(e) => {
                            // A bad channel name spoils one send, not the
                            // connection.
                            let _ = events.send(SpreadEvent::Error(e));
                        }
                    }
                }
                Some(Command::Join { channel, reply }) => {
                    match session.join(&channel) {
                        Ok(frame) => {
                            writer.write_all(&frame).await?;
                            let _ = reply.send(Ok(()));
                        }
                        Err(e) => {
                            let _ = reply.send(Err(e));
                        }
                    }
                }
            },

            _ = async { settle.as_mut().expect("settle timer armed").await },
                if settle.is_some() =>
            {
                settle = None;
                let frames = session.drain_pending()?;
                tracing::debug!(count = frames.len(), "settle window elapsed, flushing queue");
                for frame in frames {
                    writer.write_all(&frame).await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = SpreadClient::builder("svc1", "127.0.0.1", 4803, "chat");
        assert!(builder.config.reconnect);
        assert_eq!(builder.config.settle_ms, 10_000);
    }

    #[test]
    fn test_builder_configuration() {
        let builder = SpreadClient::builder("svc1", "127.0.0.1", 4803, "chat")
            .reconnect(false)
            .settle_delay(Duration::from_millis(50))
            .reconnect_backoff(Duration::from_millis(10), Duration::from_secs(1))
            .max_frame_bytes(4096);

        assert!(!builder.config.reconnect);
        assert_eq!(builder.config.settle_ms, 50);
        assert_eq!(builder.config.reconnect_initial_ms, 10);
        assert_eq!(builder.config.reconnect_max_ms, 1000);
        assert_eq!(builder.config.max_frame_bytes, 4096);
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let result = SpreadClient::builder("", "127.0.0.1", 4803, "chat").connect();
        assert!(matches!(result, Err(SpreadError::Config(_))));
    }

    #[test]
    fn test_builder_from_config() {
        let config = SpreadConfig::new("svc1", "daemon.internal", 14803, "chat");
        let builder = ClientBuilder::from_config(config);
        assert_eq!(builder.config.host, "daemon.internal");
        assert_eq!(builder.config.port, 14803);
    }
}
