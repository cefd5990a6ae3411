//! Wire messages.
//!
//! | Tag          | Payload (big-endian)                              |
//! |--------------|---------------------------------------------------|
//! | auth-pam     | u32 len + name, u32 len + pass                    |
//! | auth-gss     | u32 len + blob                                    |
//! | access       | u8 level, u8 access                               |
//! | master       | u8 is_master                                      |
//! | pointer      | i16 x, i16 y                                      |
//! | pointer-sync | i16 dx, i16 dy                                    |
//! | button       | u8 button, u8 press                               |
//! | key          | u8 ucs, u32 symbol, u8 keycode, u8 press          |
//! | quality      | u8 min, u8 max                                    |
//! | resize       | u16 w, u16 h                                      |
//! | cursor       | u32 hash, u16 w, u16 h, i16 xhot, i16 yhot [+ px] |
//! | image        | u16 w, u16 h [+ tile stream]                      |
//! | control      | u32 len + blob                                    |
//! | clipboard    | u32 len + blob                                    |
//! | stop         | -                                                 |
//!
//! Fixed-size payloads are parsed with [`Message::parse`] once
//! [`Message::fixed_size`] bytes are available; variable payloads go
//! through [`crate::token`].

use bytes::{Buf, BufMut, BytesMut};

use crate::buffer::Buffer;
use crate::command::Command;
use crate::error::VbError;
use crate::step::Step;

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<'a> {
    /// A tag without payload (access request, image ack, stop).
    Tag(Command),
    Auth { name: &'a [u8], pass: &'a [u8] },
    /// A length-prefixed blob under `command` (auth-gss, control, clipboard).
    Data { command: Command, payload: &'a [u8] },
    Access { level: u8, access: u8 },
    Master(bool),
    Pointer { x: i16, y: i16 },
    PointerSync { dx: i16, dy: i16 },
    Button { button: u8, pressed: bool },
    Key { ucs: bool, symbol: u32, keycode: u8, pressed: bool },
    Quality { min: u8, max: u8 },
    Resize { width: u16, height: u16 },
    Cursor { hash: u32, width: u16, height: u16, xhot: i16, yhot: i16 },
    Image { width: u16, height: u16 },
}

impl Message<'_> {
    /// The tag byte this message starts with.
    pub fn command(&self) -> Command {
        match self {
            Message::Tag(c) | Message::Data { command: c, .. } => *c,
            Message::Auth { .. } => Command::AuthPam,
            Message::Access { .. } => Command::Access,
            Message::Master(_) => Command::Master,
            Message::Pointer { .. } => Command::Pointer,
            Message::PointerSync { .. } => Command::PointerSync,
            Message::Button { .. } => Command::Button,
            Message::Key { .. } => Command::Key,
            Message::Quality { .. } => Command::Quality,
            Message::Resize { .. } => Command::Resize,
            Message::Cursor { .. } => Command::Cursor,
            Message::Image { .. } => Command::Image,
        }
    }

    /// Payload size of a fixed-size tag when received from a peer.
    ///
    /// `direction_to_server` selects between the two meanings of tags
    /// used both ways with different payloads (`access`, `image`).
    pub fn fixed_size(command: Command, direction_to_server: bool) -> Option<usize> {
        Some(match command {
            Command::Access if direction_to_server => 0,
            Command::Access => 2,
            Command::Image if direction_to_server => 0,
            Command::Image => 4,
            Command::Master => 1,
            Command::Pointer | Command::PointerSync => 4,
            Command::Button | Command::Quality => 2,
            Command::Key => 7,
            Command::Resize => 4,
            Command::Cursor => 12,
            Command::Stop => 0,
            _ => return None,
        })
    }

    /// Parse the fixed payload of `command` from exactly the bytes
    /// announced by [`Message::fixed_size`].
    pub fn parse(command: Command, mut bytes: &[u8]) -> Result<Message<'static>, VbError> {
        let need = match command {
            Command::Access | Command::Image if bytes.is_empty() => 0,
            _ => Self::fixed_size(command, false)
                .ok_or(VbError::ProtocolViolation("not a fixed-size message"))?,
        };
        if bytes.len() < need {
            return Err(VbError::ProtocolViolation("short fixed-size payload"));
        }

        let msg = match command {
            Command::Access | Command::Image | Command::Stop if need == 0 => Message::Tag(command),
            Command::Access => Message::Access {
                level: bytes.get_u8(),
                access: bytes.get_u8(),
            },
            Command::Master => Message::Master(bytes.get_u8() != 0),
            Command::Pointer => Message::Pointer {
                x: bytes.get_i16(),
                y: bytes.get_i16(),
            },
            Command::PointerSync => Message::PointerSync {
                dx: bytes.get_i16(),
                dy: bytes.get_i16(),
            },
            Command::Button => Message::Button {
                button: bytes.get_u8(),
                pressed: bytes.get_u8() != 0,
            },
            Command::Key => Message::Key {
                ucs: bytes.get_u8() != 0,
                symbol: bytes.get_u32(),
                keycode: bytes.get_u8(),
                pressed: bytes.get_u8() != 0,
            },
            Command::Quality => Message::Quality {
                min: bytes.get_u8(),
                max: bytes.get_u8(),
            },
            Command::Resize => Message::Resize {
                width: bytes.get_u16(),
                height: bytes.get_u16(),
            },
            Command::Cursor => Message::Cursor {
                hash: bytes.get_u32(),
                width: bytes.get_u16(),
                height: bytes.get_u16(),
                xhot: bytes.get_i16(),
                yhot: bytes.get_i16(),
            },
            Command::Image => Message::Image {
                width: bytes.get_u16(),
                height: bytes.get_u16(),
            },
            _ => return Err(VbError::ProtocolViolation("not a fixed-size message")),
        };
        Ok(msg)
    }

    /// Take the fixed payload of `command` from `input` once all of it
    /// has arrived.
    pub fn read(input: &mut Buffer, command: Command, to_server: bool) -> Result<Step<Message<'static>>, VbError> {
        let size = Self::fixed_size(command, to_server)
            .ok_or(VbError::ProtocolViolation("not a fixed-size message"))?;
        if input.read_size() < size {
            return Ok(Step::Pending);
        }
        let msg = Self::parse(command, &input.readable()[..size])?;
        input.consume(size);
        Ok(Step::Ready(msg))
    }

    /// Append the payload, without the tag byte.
    pub fn encode_payload(&self, out: &mut impl BufMut) {
        match *self {
            Message::Tag(_) => {}
            Message::Auth { name, pass } => {
                out.put_u32(name.len() as u32);
                out.put_slice(name);
                out.put_u32(pass.len() as u32);
                out.put_slice(pass);
            }
            Message::Data { payload, .. } => {
                out.put_u32(payload.len() as u32);
                out.put_slice(payload);
            }
            Message::Access { level, access } => {
                out.put_u8(level);
                out.put_u8(access);
            }
            Message::Master(on) => out.put_u8(on as u8),
            Message::Pointer { x, y } => {
                out.put_i16(x);
                out.put_i16(y);
            }
            Message::PointerSync { dx, dy } => {
                out.put_i16(dx);
                out.put_i16(dy);
            }
            Message::Button { button, pressed } => {
                out.put_u8(button);
                out.put_u8(pressed as u8);
            }
            Message::Key {
                ucs,
                symbol,
                keycode,
                pressed,
            } => {
                out.put_u8(ucs as u8);
                out.put_u32(symbol);
                out.put_u8(keycode);
                out.put_u8(pressed as u8);
            }
            Message::Quality { min, max } => {
                out.put_u8(min);
                out.put_u8(max);
            }
            Message::Resize { width, height } | Message::Image { width, height } => {
                out.put_u16(width);
                out.put_u16(height);
            }
            Message::Cursor {
                hash,
                width,
                height,
                xhot,
                yhot,
            } => {
                out.put_u32(hash);
                out.put_u16(width);
                out.put_u16(height);
                out.put_i16(xhot);
                out.put_i16(yhot);
            }
        }
    }

    /// Tag byte followed by the payload.
    pub fn encode(&self, out: &mut impl BufMut) {
        out.put_u8(self.command() as u8);
        self.encode_payload(out);
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> BytesMut {
        let mut out = BytesMut::with_capacity(16);
        self.encode(&mut out);
        out
    }

    /// Encode only the payload into a fresh buffer.
    pub fn payload_bytes(&self) -> BytesMut {
        let mut out = BytesMut::with_capacity(12);
        self.encode_payload(&mut out);
        out
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        let msg = Message::Key {
            ucs: true,
            symbol: 0x20AC,
            keycode: 26,
            pressed: true,
        };
        assert_eq!(&msg.to_bytes()[..], &[9, 1, 0, 0, 0x20, 0xAC, 26, 1]);
    }

    #[test]
    fn auth_layout() {
        let msg = Message::Auth {
            name: b"bob",
            pass: b"pw",
        };
        assert_eq!(
            &msg.to_bytes()[..],
            &[3, 0, 0, 0, 3, b'b', b'o', b'b', 0, 0, 0, 2, b'p', b'w']
        );
    }

    #[test]
    fn pointer_sync_negative_deltas() {
        let msg = Message::PointerSync { dx: -3, dy: 300 };
        let payload = msg.payload_bytes();
        assert_eq!(&payload[..], &[0xFF, 0xFD, 0x01, 0x2C]);
        let back = Message::parse(Command::PointerSync, &payload).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn cursor_header_parse() {
        let msg = Message::Cursor {
            hash: 0xCAFEBABE,
            width: 32,
            height: 24,
            xhot: -1,
            yhot: 5,
        };
        let payload = msg.payload_bytes();
        assert_eq!(payload.len(), Message::fixed_size(Command::Cursor, false).unwrap());
        assert_eq!(Message::parse(Command::Cursor, &payload).unwrap(), msg);
    }

    #[test]
    fn acks_are_bare_tags_toward_server() {
        assert_eq!(Message::fixed_size(Command::Image, true), Some(0));
        assert_eq!(Message::fixed_size(Command::Access, true), Some(0));
        assert_eq!(Message::fixed_size(Command::Image, false), Some(4));
        assert_eq!(
            Message::parse(Command::Image, &[]).unwrap(),
            Message::Tag(Command::Image)
        );
    }

    #[test]
    fn read_waits_for_whole_payload() {
        let mut input = Buffer::with_capacity(8);
        assert!(input.put_slice(&[0x01, 0x00, 0x02]));
        assert!(Message::read(&mut input, Command::Resize, true).unwrap().is_pending());
        assert_eq!(input.read_size(), 3);
        assert!(input.put_u8(0x58));
        assert_eq!(
            Message::read(&mut input, Command::Resize, true).unwrap(),
            Step::Ready(Message::Resize {
                width: 256,
                height: 600,
            })
        );
        assert!(input.is_drained());
    }

    #[test]
    fn variable_tags_have_no_fixed_size() {
        assert_eq!(Message::fixed_size(Command::Control, false), None);
        assert!(Message::parse(Command::Clipboard, &[1, 2]).is_err());
    }
}
