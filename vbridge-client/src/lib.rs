//! # vbridge-client: VBridge Headless Viewer
//!
//! Connects to a VBridge server, logs in with a password, requests the
//! screen and decodes a fixed number of frames before disconnecting.
//! Used to check a server end to end and to measure frame throughput.

pub mod config;
pub mod connection;
