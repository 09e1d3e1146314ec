//! Wirechat Network Library
//!
//! Async client for the fixed-header chat protocol.
//!
//! # Architecture
//!
//! - **Machine**: sans-IO state machine deciding the next read/write
//! - **Client**: one tokio task per connection driving the machine
//! - **Queue**: ordered outbound frames, one write in flight
//!
//! # Usage
//!
//! ```ignore
//! let endpoints = resolve("chat.example.org", 7331).await?;
//! let (sink, mut events) = tokio::sync::mpsc::unbounded_channel();
//! let client = Client::connect(endpoints, session, sink)?;
//!
//! let handle = client.handle();
//! handle.send_line("hello")?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SinkEvent::Frame(frame) => { /* handle */ }
//!         SinkEvent::Closed(reason) => break,
//!     }
//! }
//! ```

pub mod client;
pub mod error;
pub mod machine;
pub mod queue;
pub mod transport;

pub use client::{Client, ClientHandle, FrameSink, SinkEvent};
pub use error::{Error, Result};
pub use machine::{Action, CloseReason, Command, ConnectionMachine, ConnectionState, Event};
pub use queue::WriteQueue;
pub use transport::{connect_tcp, resolve, Transport};
