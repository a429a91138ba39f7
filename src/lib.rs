//! # spread-client
//!
//! Async Rust client for the Spread group-communication daemon protocol.
//!
//! This crate speaks the daemon's binary wire protocol over TCP: it
//! authenticates with the null credential, joins multicast-style logical
//! groups ("channels"), and exchanges framed messages over the session.
//!
//! ## Architecture
//!
//! - **Protocol layer** ([`protocol`]): 48-byte little-endian header codec,
//!   outbound frame builders, and a streaming demultiplexer that tolerates
//!   arbitrary TCP fragmentation.
//! - **Session core** ([`Session`]): sans-I/O state machine
//!   (init → authenticating → authenticated → listening) with a FIFO queue
//!   for sends issued before the session is ready.
//! - **Client** ([`SpreadClient`]): tokio driver with a consumer event
//!   channel, a post-authentication settle window, and automatic reconnect
//!   with exponential backoff.
//!
//! ## Example
//!
//! ```ignore
//! use spread_client::{SpreadClient, SpreadEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = SpreadClient::builder("svc1", "127.0.0.1", 4803, "chat")
//!         .connect()?;
//!
//!     client.send("hello").await?; // queued until authenticated
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

pub mod config;
pub mod error;
pub mod protocol;
pub mod session;

mod client;

pub use client::{ClientBuilder, SpreadClient, SpreadEvent};
pub use config::SpreadConfig;
pub use error::{Result, SpreadError};
pub use session::{Session, SessionState, Step};
