//! Length-prefixed blob transfer over a byte stream.
//!
//! ```text
//! ┌──────────────┬────────────────────────┐
//! │ len: u32 BE  │ len bytes of payload   │
//! └──────────────┴────────────────────────┘
//! ```
//!
//! Both directions are resumable: progress lives entirely in the
//! buffer cursors, so callers simply repeat the same call after the
//! next readiness event.

use tracing::warn;

use crate::buffer::Buffer;
use crate::error::VbError;
use crate::step::Step;

/// Largest token either side accepts.
pub const MAX_TOKEN_SIZE: usize = 32 * 1024;

/// Receive one token from `src` into `slot`.
///
/// An empty `slot` starts a new token. `Ready(())` means `slot` holds
/// the complete blob. A length of zero or above [`MAX_TOKEN_SIZE`] is a
/// protocol error and allocates nothing.
pub fn recv(slot: &mut Option<Buffer>, src: &mut Buffer) -> Result<Step, VbError> {
    let dst = match slot {
        Some(dst) => dst,
        None => {
            if src.read_size() < 4 {
                return Ok(Step::Pending);
            }
            let size = src.get_u32().unwrap_or_default() as usize;
            if size == 0 || size > MAX_TOKEN_SIZE {
                return Err(VbError::TokenSize {
                    size,
                    max: MAX_TOKEN_SIZE,
                });
            }
            slot.insert(Buffer::with_capacity(size))
        }
    };

    dst.copy_from(src);

    if dst.write_size() > 0 {
        Ok(Step::Pending)
    } else {
        Ok(Step::Ready(()))
    }
}

/// Send the token held in `slot` into `dst`.
///
/// The length prefix is written on the first call, when nothing of the
/// source has been consumed yet. On completion `slot` is emptied.
pub fn send(dst: &mut Buffer, slot: &mut Option<Buffer>) -> Step {
    let Some(src) = slot else {
        return Step::Ready(());
    };

    if src.is_untouched() {
        if dst.write_size() < 5 {
            return Step::Pending;
        }
        // read_size fits: tokens are built from bounded payloads
        let written = dst.put_u32(src.read_size() as u32);
        debug_assert!(written);
    }

    dst.copy_from(src);

    if src.read_size() > 0 {
        return Step::Pending;
    }

    *slot = None;
    Step::Ready(())
}

/// Build a sendable token from a payload, truncated to [`MAX_TOKEN_SIZE`].
pub fn from_bytes(payload: &[u8]) -> Option<Buffer> {
    if payload.is_empty() {
        return None;
    }
    Some(Buffer::from_vec(bounded(payload).to_vec()))
}

/// The part of `payload` that fits in one token.
pub(crate) fn bounded(payload: &[u8]) -> &[u8] {
    if payload.len() > MAX_TOKEN_SIZE {
        warn!(len = payload.len(), max = MAX_TOKEN_SIZE, "token payload truncated");
        return &payload[..MAX_TOKEN_SIZE];
    }
    payload
}

// ── Tests ────────────────────────────────────────────────────────
