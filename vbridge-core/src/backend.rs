//! Collaborators the server drives: display, input, authentication
//! and access control.
//!
//! The core only sees these narrow traits. Real display servers, PAM
//! stacks or certificate stores live behind them in the binaries.

use std::collections::BTreeMap;

use crate::image::ImageView;

// ── Display ──────────────────────────────────────────────────────

/// A cursor shape in `0xAARRGGBB` pixels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CursorImage {
    pub width: u16,
    pub height: u16,
    pub xhot: i16,
    pub yhot: i16,
    pub pixels: Vec<u32>,
}

impl CursorImage {
    /// Content hash used to dedupe cursor transfers. Empty shapes
    /// hash to 0, which means "hidden" on the wire.
    pub fn hash(&self) -> u32 {
        self.pixels
            .iter()
            .fold(0u32, |h, &p| h.wrapping_mul(31).wrapping_add(p))
    }
}

/// The shared screen being served.
pub trait Display {
    /// Capture the current framebuffer.
    fn grab(&mut self) -> Option<ImageView<'_>>;

    /// Current pointer position.
    fn pointer(&self) -> (i32, i32);

    /// Current cursor shape, if the display exposes one.
    fn cursor(&mut self) -> Option<CursorImage>;

    /// Ask for a mode switch to `width x height`. Returns `true` while
    /// a switch is in progress, during which frames are not grabbed.
    fn request_resize(&mut self, width: u16, height: u16) -> bool;

    /// Clipboard content newly offered by the display.
    fn take_clipboard(&mut self) -> Option<Vec<u8>>;

    fn set_clipboard(&mut self, data: &[u8]);
}

// ── Input ────────────────────────────────────────────────────────

/// Key identity as sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySymbol {
    /// A Unicode code point.
    Ucs(u32),
    /// A native keysym.
    Keysym(u32),
}

/// Where the master's input goes.
pub trait InputSink {
    /// Move the pointer to `(x, y)`, or by `(x, y)` when `relative`.
    fn pointer(&mut self, x: i32, y: i32, relative: bool);

    fn button(&mut self, button: u8, pressed: bool);

    fn key(&mut self, keycode: u8, symbol: KeySymbol, pressed: bool);

    /// Release every pressed key and button.
    fn release_all(&mut self);

    /// Whether anything is still held down.
    fn needs_release(&self) -> bool;
}

// ── Authentication ───────────────────────────────────────────────

/// Result of one authentication step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// `level` 2 is full control, 1 defers to the access list.
    Accepted { identity: String, level: u8 },
    Rejected,
    /// More token exchange needed.
    Continue,
    /// The backend is busy; ask again later with the same input.
    Pending,
}

/// A verdict plus an optional blob to send back to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub verdict: Verdict,
    pub reply: Option<Vec<u8>>,
}

pub trait Authenticator {
    /// Certificate check for the transport peer `peer`.
    fn certificate(&mut self, peer: &str) -> Verdict;

    fn password(&mut self, name: &str, pass: &[u8]) -> Verdict;

    /// One step of a token exchange with `peer`.
    fn token(&mut self, peer: &str, blob: &[u8]) -> AuthOutcome;
}

// ── Access list ──────────────────────────────────────────────────

pub trait AccessList {
    /// Access level of `identity`; 0 when unknown.
    fn level(&self, identity: &str) -> u8;

    fn set(&mut self, identity: &str, level: u8);

    /// All entries, sorted by identity.
    fn entries(&self) -> Vec<(String, u8)>;
}

/// An in-memory access list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryAcl {
    levels: BTreeMap<String, u8>,
}

impl MemoryAcl {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FromIterator<(String, u8)> for MemoryAcl {
    fn from_iter<I: IntoIterator<Item = (String, u8)>>(iter: I) -> Self {
        Self {
            levels: iter.into_iter().collect(),
        }
    }
}

impl AccessList for MemoryAcl {
    fn level(&self, identity: &str) -> u8 {
        self.levels.get(identity).copied().unwrap_or(0)
    }

    fn set(&mut self, identity: &str, level: u8) {
        self.levels.insert(identity.to_string(), level);
    }

    fn entries(&self) -> Vec<(String, u8)> {
        self.levels.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }
}

// ── Tests ────────────────────────────────────────────────────────
