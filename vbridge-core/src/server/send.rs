//! Send machine of one server connection.
//!
//! Pending tags live in `to_send`; `send_mask` says which of them may
//! go out right now. The lowest pending tag is sent first, so control
//! traffic always overtakes cursor and image updates.

use tracing::trace;

use crate::buffer::Buffer;
use crate::command::{Command, CommandSet};
use crate::error::VbError;
use crate::message::Message;
use crate::netio::Transport;
use crate::step::Step;
use crate::token;

use super::Session;
use super::conn::Conn;

/// Tags a client may receive before it asks for the screen.
const SESSION: CommandSet = CommandSet::MASTER
    .union(CommandSet::POINTER_SYNC)
    .union(CommandSet::CLIPBOARD)
    .union(CommandSet::ACCESS)
    .union(CommandSet::CONTROL);

impl<T: Transport> Conn<T> {
    /// Fill the output buffer with as much pending traffic as fits.
    pub(super) fn send_all(&mut self, session: &Session) -> Result<(), VbError> {
        loop {
            match self.send {
                Command::Start => {
                    self.send_mask = SESSION;
                    self.send = Command::Next;
                }

                Command::Next => {
                    if self.netio.output().write_size() < 1 {
                        return Ok(());
                    }

                    let mut ready = self.to_send & self.send_mask;
                    if session.capture.grid().is_empty() {
                        ready.remove(CommandSet::IMAGE);
                    }

                    match ready.lowest() {
                        Some(command) => {
                            let written = self.netio.output().put_u8(command as u8);
                            debug_assert!(written);
                            self.to_send.remove(command.bit());
                            trace!(client = %self.name(), %command, "send");
                            self.send = command;
                        }
                        None if self.recv == Command::Stop => self.send = Command::Stop,
                        None => return Ok(()),
                    }
                }

                _ => match self.send_step(session)? {
                    Step::Ready(()) => self.send = Command::Next,
                    Step::Pending => return Ok(()),
                },
            }
        }
    }

    fn send_step(&mut self, session: &Session) -> Result<Step, VbError> {
        let step = match self.send {
            Command::AuthGss => {
                let step = token::send(self.netio.output(), &mut self.gss_send);
                if step.is_ready() {
                    self.send_mask.remove(CommandSet::AUTH_GSS);
                }
                step
            }

            Command::Access => self.put(&Message::Access {
                level: self.level,
                access: self.access,
            }),

            Command::Master => self.put(&Message::Master(session.is_master(self.id))),

            Command::Pointer => {
                let (x, y) = session.grab.pointer;
                self.put(&Message::Pointer { x, y })
            }

            Command::PointerSync => {
                let (dx, dy) = self.sync;
                self.put(&Message::PointerSync { dx, dy })
            }

            Command::Cursor => {
                if self.send_cursor(session).is_pending() {
                    return Ok(Step::Pending);
                }
                if self.send == Command::CursorData {
                    return self.send_step(session);
                }
                Step::Ready(())
            }

            Command::CursorData => {
                let Some(pixels) = self.cursor_send.as_mut() else {
                    return Ok(Step::Ready(()));
                };
                self.netio.output().copy_from(pixels);
                if pixels.read_size() > 0 {
                    return Ok(Step::Pending);
                }
                self.cursor_send = None;
                Step::Ready(())
            }

            Command::Image => {
                let msg = Message::Image {
                    width: session.capture.width() as u16,
                    height: session.capture.height() as u16,
                };
                if self.put(&msg).is_pending() {
                    return Ok(Step::Pending);
                }
                self.tycho.begin_frame(&session.capture);
                self.images += 1;
                self.send = Command::ImageData;
                return self.send_step(session);
            }

            Command::ImageData => {
                if self.tycho.encode(self.netio.output()).is_pending() {
                    return Ok(Step::Pending);
                }
                // a frame counts as sent once it left the buffer
                if !self.netio.output().is_drained() {
                    return Ok(Step::Pending);
                }
                if self.images >= 2 {
                    self.send_mask.remove(CommandSet::IMAGE);
                }
                Step::Ready(())
            }

            Command::Control => token::send(self.netio.output(), &mut self.control_send),
            Command::Clipboard => token::send(self.netio.output(), &mut self.clipboard_send),

            Command::Stop => {
                if !self.netio.output().is_drained() {
                    return Ok(Step::Pending);
                }
                if self.netio.stop()?.is_pending() {
                    return Ok(Step::Pending);
                }
                return Err(VbError::Stopped);
            }

            command => return Err(VbError::IllegalCommand(command)),
        };
        Ok(step)
    }

    /// Write a fixed-size payload, or wait for room.
    fn put(&mut self, msg: &Message<'_>) -> Step {
        if self.netio.output().put_slice(&msg.payload_bytes()) {
            Step::Ready(())
        } else {
            Step::Pending
        }
    }

    /// Write the cursor header; switches to `CursorData` when this
    /// client has not seen the shape yet.
    fn send_cursor(&mut self, session: &Session) -> Step {
        let msg = match &session.grab.cursor {
            Some(cursor) => Message::Cursor {
                hash: session.grab.cursor_hash,
                width: cursor.width,
                height: cursor.height,
                xhot: cursor.xhot,
                yhot: cursor.yhot,
            },
            None => Message::Cursor {
                hash: 0,
                width: 0,
                height: 0,
                xhot: 0,
                yhot: 0,
            },
        };
        if self.put(&msg).is_pending() {
            return Step::Pending;
        }

        let Some(cursor) = &session.grab.cursor else {
            return Step::Ready(());
        };
        let hash = session.grab.cursor_hash;
        let size = cursor.width as usize * cursor.height as usize;
        if hash == 0 || size == 0 || self.cursors.contains(hash) {
            return Step::Ready(());
        }

        self.cursors.push_front(hash, ());
        let mut pixels = Buffer::with_capacity(size * 4);
        for &p in cursor.pixels.iter().chain(std::iter::repeat(&0)).take(size) {
            let written = pixels.put_u32(p);
            debug_assert!(written);
        }
        self.cursor_send = Some(pixels);
        self.send = Command::CursorData;
        Step::Ready(())
    }
}
