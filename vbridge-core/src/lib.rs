//! # vbridge-core
//!
//! Core library of the VBridge remote-desktop protocol.
//!
//! This crate contains:
//! - **Buffer**: `Buffer`, a fixed-capacity byte buffer with read/write cursors
//! - **Token**: length-prefixed blob transfer that resumes across partial I/O
//! - **Commands**: `Command` tags, `CommandSet` masks and wire `Message`s
//! - **Tycho**: the adaptive binary arithmetic coder and palette tile codec
//! - **NetIo**: the `Transport` abstraction, TCP and in-memory `Pipe` transports
//! - **Backends**: `Display`, `InputSink`, `Authenticator` and `AccessList` traits
//! - **Client / Server**: resumable protocol state machines for both ends
//! - **Error**: `VbError`, typed `thiserror`-based errors
//!
//! Every operation that may run out of input or output space returns
//! [`Step::Pending`] and keeps its progress; the caller retries after the
//! next readiness event.

pub mod backend;
pub mod buffer;
pub mod client;
pub mod command;
pub mod cursor;
pub mod error;
pub mod image;
pub mod message;
pub mod netio;
pub mod server;
pub mod step;
pub mod token;
pub mod tycho;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use backend::{
    AccessList, AuthOutcome, Authenticator, CursorImage, Display, InputSink, KeySymbol, MemoryAcl,
    Verdict,
};
pub use buffer::Buffer;
pub use client::CoreClient;
pub use command::{Command, CommandSet};
pub use error::VbError;
pub use image::{Image, ImageView, ImageViewMut};
pub use message::Message;
pub use netio::{NETIO_BUFFER, NetIo, Pipe, Transport, Wants, pipe_pair, wait_ready};
pub use server::{Backends, ClientId, ConnectionInfo, Server, ServerConfig};
pub use step::Step;
pub use token::MAX_TOKEN_SIZE;
pub use tycho::{CaptureGrid, Quality, Tycho};
