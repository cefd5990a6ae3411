//! # vbridge-server: VBridge Display Server
//!
//! Shares a display with remote viewers over TCP. Each viewer logs in,
//! is granted an access level and receives the screen as Tycho-coded
//! tiles; the one viewer holding master may inject input.
//!
//! The display, input and credential collaborators here are stand-ins:
//! a test-pattern screen, an input sink that only logs, and password
//! logins plus an ACL taken from the TOML configuration.

pub mod backends;
pub mod config;
pub mod service;
