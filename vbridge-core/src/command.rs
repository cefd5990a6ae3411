//! Command tags and tag masks.
//!
//! Every message on the wire starts with one tag byte. The tag values
//! double as bit positions in [`CommandSet`], which both peers use for
//! "tags legal right now" and "tags pending / observed" bookkeeping.
//!
//! `Start`, `Next`, `CursorData` and `ImageData` are internal states
//! of the receive/send machines and never appear as a tag byte.

use std::fmt;

use bitflags::bitflags;

use crate::error::VbError;

// ── Command ──────────────────────────────────────────────────────

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Start = 0,
    Next = 1,
    AuthSsl = 2,
    AuthPam = 3,
    AuthGss = 4,
    Control = 5,
    Pointer = 6,
    PointerSync = 7,
    Button = 8,
    Key = 9,
    Quality = 10,
    Resize = 11,
    Access = 12,
    Master = 13,
    Clipboard = 14,
    Cursor = 15,
    CursorData = 16,
    Image = 17,
    ImageData = 18,
    Stop = 19,
}

impl Command {
    const ALL: [Command; 20] = [
        Command::Start,
        Command::Next,
        Command::AuthSsl,
        Command::AuthPam,
        Command::AuthGss,
        Command::Control,
        Command::Pointer,
        Command::PointerSync,
        Command::Button,
        Command::Key,
        Command::Quality,
        Command::Resize,
        Command::Access,
        Command::Master,
        Command::Clipboard,
        Command::Cursor,
        Command::CursorData,
        Command::Image,
        Command::ImageData,
        Command::Stop,
    ];

    /// The single-bit mask for this tag.
    pub const fn bit(self) -> CommandSet {
        CommandSet::from_bits_retain(1 << self as u32)
    }

    /// Lower-case wire name, used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Next => "next",
            Command::AuthSsl => "auth-ssl",
            Command::AuthPam => "auth-pam",
            Command::AuthGss => "auth-gss",
            Command::Control => "control",
            Command::Pointer => "pointer",
            Command::PointerSync => "pointer-sync",
            Command::Button => "button",
            Command::Key => "key",
            Command::Quality => "quality",
            Command::Resize => "resize",
            Command::Access => "access",
            Command::Master => "master",
            Command::Clipboard => "clipboard",
            Command::Cursor => "cursor",
            Command::CursorData => "cursor-data",
            Command::Image => "image",
            Command::ImageData => "image-data",
            Command::Stop => "stop",
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = VbError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Command::ALL
            .get(value as usize)
            .copied()
            .ok_or(VbError::UnknownVariant {
                type_name: "Command",
                value: value as u64,
            })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── CommandSet ───────────────────────────────────────────────────

bitflags! {
    /// A set of command tags, one bit per [`Command`] value.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CommandSet: u32 {
        const AUTH_SSL = 1 << 2;
        const AUTH_PAM = 1 << 3;
        const AUTH_GSS = 1 << 4;
        const CONTROL = 1 << 5;
        const POINTER = 1 << 6;
        const POINTER_SYNC = 1 << 7;
        const BUTTON = 1 << 8;
        const KEY = 1 << 9;
        const QUALITY = 1 << 10;
        const RESIZE = 1 << 11;
        const ACCESS = 1 << 12;
        const MASTER = 1 << 13;
        const CLIPBOARD = 1 << 14;
        const CURSOR = 1 << 15;
        const IMAGE = 1 << 17;
        const STOP = 1 << 19;

        /// Tags legal before authentication.
        const AUTH = Self::AUTH_SSL.bits() | Self::AUTH_PAM.bits() | Self::AUTH_GSS.bits();
    }
}

impl CommandSet {
    /// The lowest-valued tag in the set.
    pub fn lowest(self) -> Option<Command> {
        if self.is_empty() {
            return None;
        }
        Command::try_from(self.bits().trailing_zeros() as u8).ok()
    }

    /// Whether `command` is in the set.
    pub fn has(self, command: Command) -> bool {
        self.contains(command.bit())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_values_are_stable() {
        assert_eq!(Command::AuthPam as u8, 3);
        assert_eq!(Command::Key as u8, 9);
        assert_eq!(Command::Image as u8, 17);
        assert_eq!(Command::Stop as u8, 19);
    }

    #[test]
    fn try_from_roundtrip() {
        for v in 0u8..20 {
            let cmd = Command::try_from(v).unwrap();
            assert_eq!(cmd as u8, v);
        }
    }

    #[test]
    fn unknown_tag_is_error() {
        let err = Command::try_from(20).unwrap_err();
        assert!(matches!(
            err,
            VbError::UnknownVariant {
                type_name: "Command",
                value: 20
            }
        ));
    }

    #[test]
    fn bits_match_named_flags() {
        assert_eq!(Command::Image.bit(), CommandSet::IMAGE);
        assert_eq!(Command::AuthGss.bit(), CommandSet::AUTH_GSS);
        assert!(CommandSet::AUTH.has(Command::AuthSsl));
        assert!(!CommandSet::AUTH.has(Command::Key));
    }

    #[test]
    fn lowest_picks_smallest_tag() {
        let set = CommandSet::IMAGE | CommandSet::CONTROL | CommandSet::ACCESS;
        assert_eq!(set.lowest(), Some(Command::Control));
        assert_eq!(CommandSet::empty().lowest(), None);
    }

    #[test]
    fn display_uses_wire_name() {
        assert_eq!(Command::PointerSync.to_string(), "pointer-sync");
    }
}
