//! Connection to a VBridge server.
//!
//! ```text
//!   Login ──access──► Viewing ──N frames──► Stopping ──flushed──► done
//! ```
//!
//! Logs in with the configured password, asks for the screen once
//! access is granted, decodes frames until enough have arrived, then
//! sends `stop`.

use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tracing::{debug, info};
use vbridge_core::{Command, CoreClient, Transport, VbError, Wants, wait_ready};

use crate::config::ClientFileConfig;

/// What a viewing session achieved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub frames: u64,
    /// Time from the access grant to the last wanted frame.
    pub elapsed: Duration,
    pub width: u32,
    pub height: u32,
}

impl Stats {
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { self.frames as f64 / secs } else { 0.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Login,
    Viewing { since: Instant },
    Stopping,
    Done,
}

/// A viewer session on top of a [`CoreClient`].
pub struct ServerConnection<T> {
    client: CoreClient<T>,
    phase: Phase,
    wanted: u64,
    quality: Option<(u8, u8)>,
    elapsed: Duration,
}

impl ServerConnection<TcpStream> {
    /// Connect to the configured server.
    pub async fn connect(config: &ClientFileConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let addr = config.network.server.as_str();
        info!("connecting to server at {addr}");
        let stream = tokio::time::timeout(config.timeout(), TcpStream::connect(addr)).await??;
        stream.set_nodelay(true)?;
        Ok(Self::new(CoreClient::new(stream), config))
    }

    /// Poll until the session is over.
    ///
    /// Between two polls the socket is waited on for at most `interval`,
    /// and never past the moment the next write becomes due.
    pub async fn run(&mut self, interval: Duration) -> Result<Stats, VbError> {
        while !self.step()? {
            let now = Instant::now();
            let wants = match self.phase {
                Phase::Stopping => Wants { read: false, write: true },
                _ => self.client.wants(now),
            };
            let wait = self.client.next_write(now).map_or(interval, |at| interval.min(at - now));

            let ready = wait_ready(self.client.transport(), wants);
            if let Ok(Err(e)) = tokio::time::timeout(wait, ready).await {
                return Err(e.into());
            }
        }
        Ok(self.stats())
    }
}

impl<T: Transport> ServerConnection<T> {
    /// Queue the login right away; it goes out with the first poll.
    pub fn new(mut client: CoreClient<T>, config: &ClientFileConfig) -> Self {
        client.send_auth(&config.auth.name, &config.auth.password);
        Self {
            client,
            phase: Phase::Login,
            wanted: config.viewer.frames.max(1),
            quality: config.viewer.quality(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn client(&self) -> &CoreClient<T> {
        &self.client
    }

    pub fn stats(&self) -> Stats {
        let image = self.client.image();
        Stats {
            frames: self.client.frames(),
            elapsed: self.elapsed,
            width: image.width(),
            height: image.height(),
        }
    }

    pub fn step(&mut self) -> Result<bool, VbError> {
        self.step_at(Instant::now())
    }

    /// Drive the session once. Returns `true` when it is over.
    pub fn step_at(&mut self, now: Instant) -> Result<bool, VbError> {
        match self.phase {
            Phase::Done => return Ok(true),
            Phase::Stopping => return self.finish(),
            Phase::Login | Phase::Viewing { .. } => {}
        }

        self.client.poll_at(now)?;
        let name = self.client.name().to_string();

        if self.client.received(Command::Access) {
            let (level, access) = (self.client.level(), self.client.access());
            if access == 0 {
                return Err(VbError::Other(format!("access denied at level {level}")));
            }
            if self.phase == Phase::Login {
                info!(server = %name, level, access, "logged in");
                self.client.send_access();
                if let Some((min, max)) = self.quality {
                    self.client.send_quality(min, max);
                }
                self.phase = Phase::Viewing { since: now };
            }
        }

        if self.client.received(Command::Master) {
            info!(server = %name, master = self.client.is_master(), "master changed");
        }

        let Phase::Viewing { since } = self.phase else {
            return Ok(false);
        };
        if self.client.received(Command::Image) {
            let image = self.client.image();
            debug!(
                server = %name,
                frame = self.client.frames(),
                width = image.width(),
                height = image.height(),
                "frame"
            );
        }
        if self.client.frames() < self.wanted {
            return Ok(false);
        }

        self.elapsed = now.saturating_duration_since(since);
        self.client.send_stop();
        self.phase = Phase::Stopping;
        self.finish()
    }

    fn finish(&mut self) -> Result<bool, VbError> {
        if !self.client.flush()? {
            return Ok(false);
        }
        self.phase = Phase::Done;
        Ok(true)
    }
}

// ── Tests ────────────────────────────────────────────────────────
