//! Receive machine of one server connection.
//!
//! | Phase           | Legal tags                                        |
//! |-----------------|---------------------------------------------------|
//! | unauthenticated | auth-ssl, auth-pam, auth-gss                      |
//! | authenticated   | access, control                                   |
//! | access granted  | access, control, pointer, pointer-sync, button,   |
//! |                 | key, image, quality, resize, clipboard            |
//!
//! `stop` is legal in every phase.

use tracing::{debug, info, trace, warn};

use crate::backend::{KeySymbol, Verdict};
use crate::command::{Command, CommandSet};
use crate::error::VbError;
use crate::message::Message;
use crate::netio::Transport;
use crate::step::{Flow, Step};
use crate::token;
use crate::tycho::Quality;

use super::conn::{Conn, VIEW};
use super::{Effect, Session};

/// Tags legal once the client holds access.
const VIEWER: CommandSet = CommandSet::POINTER
    .union(CommandSet::POINTER_SYNC)
    .union(CommandSet::BUTTON)
    .union(CommandSet::KEY)
    .union(CommandSet::IMAGE)
    .union(CommandSet::QUALITY)
    .union(CommandSet::RESIZE)
    .union(CommandSet::CLIPBOARD)
    .union(CommandSet::ACCESS)
    .union(CommandSet::CONTROL);

impl<T: Transport> Conn<T> {
    /// Consume everything the client sent that can be handled now.
    pub(super) fn recv_all(&mut self, session: &mut Session, effects: &mut Vec<Effect>) -> Result<(), VbError> {
        if self.recv == Command::Start {
            if self.netio.start()?.is_pending() {
                return Ok(());
            }
            info!(
                client = %self.name(),
                proto = self.netio.proto().unwrap_or_default(),
                "protocol ready"
            );
            self.legal = CommandSet::AUTH;
            self.recv = Command::Next;
        }

        loop {
            match self.recv_step(session, effects)? {
                Flow::Done => self.recv = Command::Next,
                Flow::Again => {}
                Flow::NeedInput => {
                    if !self.netio.read_some()? {
                        return Ok(());
                    }
                }
                Flow::Blocked => return Ok(()),
            }
        }
    }

    fn recv_step(&mut self, session: &mut Session, effects: &mut Vec<Effect>) -> Result<Flow, VbError> {
        match self.recv {
            Command::Next => {
                let command = if self.close {
                    Command::Stop
                } else {
                    let Some(byte) = self.netio.input().get_u8() else {
                        return Ok(Flow::NeedInput);
                    };
                    Command::try_from(byte)?
                };
                if command != Command::Stop && !self.legal.has(command) {
                    warn!(client = %self.name(), %command, "client is not compatible");
                    return Err(VbError::IllegalCommand(command));
                }
                trace!(client = %self.name(), %command, "tag");
                self.recv = command;
                Ok(Flow::Again)
            }

            Command::AuthSsl => {
                let verdict = session.auth.certificate(self.name());
                if verdict == Verdict::Pending {
                    return Ok(Flow::Blocked);
                }
                self.accept_verdict(verdict);
                self.legal.remove(CommandSet::AUTH_SSL);
                self.authenticated(session, "certificate", effects);
                Ok(Flow::Done)
            }

            Command::AuthPam => self.recv_password(session, effects),
            Command::AuthGss => self.recv_auth_token(session, effects),

            Command::Control => {
                if self.control_recv.as_ref().is_some_and(|b| b.write_size() == 0) {
                    return Ok(Flow::Blocked);
                }
                Ok(match token::recv(&mut self.control_recv, self.netio.input())? {
                    Step::Ready(()) => Flow::Done,
                    Step::Pending => Flow::NeedInput,
                })
            }

            Command::Clipboard => {
                if token::recv(&mut self.clipboard_recv, self.netio.input())?.is_pending() {
                    return Ok(Flow::NeedInput);
                }
                if let Some(data) = self.clipboard_recv.take() {
                    if session.is_master(self.id) {
                        session.touch();
                        session.display.set_clipboard(data.readable());
                    }
                }
                Ok(Flow::Done)
            }

            command @ (Command::Access
            | Command::Image
            | Command::Pointer
            | Command::PointerSync
            | Command::Button
            | Command::Key
            | Command::Quality
            | Command::Resize) => match Message::read(self.netio.input(), command, true)? {
                Step::Ready(msg) => {
                    self.apply(msg, session, effects);
                    Ok(Flow::Done)
                }
                Step::Pending => Ok(Flow::NeedInput),
            },

            Command::Stop => {
                // nothing new goes out; the send machine stops once idle
                self.netio.input().clear();
                self.send_mask = CommandSet::empty();
                Ok(Flow::Blocked)
            }

            command => Err(VbError::IllegalCommand(command)),
        }
    }

    fn apply(&mut self, msg: Message<'static>, session: &mut Session, effects: &mut Vec<Effect>) {
        match msg {
            Message::Tag(Command::Access) => {
                if self.access == 0 {
                    return;
                }
                self.legal = VIEWER;
                self.send_mask |= VIEW;
                self.to_send |= VIEW;
                session.claim_master(self.id, self.access, effects);
            }

            Message::Tag(Command::Image) => {
                self.images = self.images.saturating_sub(1);
                if self.access > 0 {
                    self.send_mask |= CommandSet::IMAGE;
                }
            }

            Message::Pointer { x, y } => {
                let old = self.pointer;
                self.pointer = (x, y);
                if !session.claim_master(self.id, self.access, effects) {
                    return;
                }
                session.touch();
                if session.injected == Some(old) {
                    let dx = x as i32 - old.0 as i32;
                    let dy = y as i32 - old.1 as i32;
                    session.input.pointer(dx, dy, true);
                } else {
                    session.input.pointer(x as i32, y as i32, false);
                    self.sync = (0, 0);
                }
                session.injected = Some(self.pointer);
            }

            Message::PointerSync { dx, dy } => {
                self.pointer = (self.pointer.0.wrapping_add(dx), self.pointer.1.wrapping_add(dy));
                self.sync = (0, 0);
            }

            Message::Button { button, pressed } => {
                if !session.claim_master(self.id, self.access, effects) {
                    return;
                }
                session.touch();
                session.input.button(button, pressed);
            }

            Message::Key {
                ucs,
                symbol,
                keycode,
                pressed,
            } => {
                if !session.claim_master(self.id, self.access, effects) {
                    return;
                }
                session.touch();
                if keycode == 0 {
                    session.input.release_all();
                    return;
                }
                let symbol = if ucs {
                    KeySymbol::Ucs(symbol)
                } else {
                    KeySymbol::Keysym(symbol)
                };
                session.input.key(keycode, symbol, pressed);
            }

            Message::Quality { min, max } => {
                if !session.is_master(self.id) {
                    return;
                }
                session.touch();
                debug!(client = %self.name(), min, max, "set quality");
                session.capture.set_quality(Quality::new(min, max));
            }

            Message::Resize { width, height } => {
                if !session.is_master(self.id) {
                    return;
                }
                session.touch();
                debug!(client = %self.name(), width, height, "set resize");
                session.resize = (width, height);
            }

            _ => {}
        }
    }

    fn recv_password(&mut self, session: &mut Session, effects: &mut Vec<Effect>) -> Result<Flow, VbError> {
        if token::recv(&mut self.pam_name, self.netio.input())?.is_pending() {
            return Ok(Flow::NeedInput);
        }
        if token::recv(&mut self.pam_pass, self.netio.input())?.is_pending() {
            return Ok(Flow::NeedInput);
        }
        let (Some(name), Some(pass)) = (&self.pam_name, &self.pam_pass) else {
            return Err(VbError::ProtocolViolation("missing credentials"));
        };
        let name = std::str::from_utf8(name.readable()).map_err(|_| VbError::MalformedCredentials)?;

        let verdict = session.auth.password(name, pass.readable());
        if verdict == Verdict::Pending {
            return Ok(Flow::Blocked);
        }

        self.pam_name = None;
        self.pam_pass = None;
        self.accept_verdict(verdict);
        self.authenticated(session, "password", effects);
        Ok(Flow::Done)
    }

    fn recv_auth_token(&mut self, session: &mut Session, effects: &mut Vec<Effect>) -> Result<Flow, VbError> {
        if token::recv(&mut self.gss_recv, self.netio.input())?.is_pending() {
            return Ok(Flow::NeedInput);
        }
        if self.gss_send.is_some() {
            return Ok(Flow::Blocked);
        }
        let Some(blob) = &self.gss_recv else {
            return Err(VbError::ProtocolViolation("missing auth token"));
        };

        let outcome = session.auth.token(self.netio.name(), blob.readable());
        if outcome.verdict == Verdict::Pending {
            return Ok(Flow::Blocked);
        }
        self.gss_recv = None;

        if let Some(reply) = outcome.reply.as_deref().and_then(token::from_bytes) {
            self.gss_send = Some(reply);
            self.send_mask |= CommandSet::AUTH_GSS;
            self.to_send |= CommandSet::AUTH_GSS;
        }

        if outcome.verdict != Verdict::Continue {
            self.accept_verdict(outcome.verdict);
            self.authenticated(session, "token", effects);
        }
        Ok(Flow::Done)
    }

    fn accept_verdict(&mut self, verdict: Verdict) {
        if let Verdict::Accepted { identity, level } = verdict {
            self.identity = Some(identity);
            self.level = level.min(2);
        }
    }

    /// Finish an authentication attempt, successful or not.
    fn authenticated(&mut self, session: &mut Session, method: &str, effects: &mut Vec<Effect>) {
        let identity = match self.identity.as_deref() {
            Some(identity) if !identity.is_empty() => identity.to_string(),
            _ => {
                self.identity = None;
                self.level = 0;
                String::new()
            }
        };

        if self.level > 0 {
            info!(client = %self.name(), identity = %identity, method, "authenticated");
            self.legal = CommandSet::ACCESS | CommandSet::CONTROL;
        } else {
            info!(client = %self.name(), method, "authentication failed");
        }

        let access = match self.level {
            1 => session.acl.level(&identity).min(2),
            level => level,
        };
        self.set_access(session, access, "acl", effects);
    }

    /// Incoming data still buffered; for tests.
    #[cfg(test)]
    pub(super) fn pending_input(&mut self) -> &mut crate::buffer::Buffer {
        self.netio.input()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::super::tests::{InputLog, test_server};
    use super::*;
    use crate::netio::pipe_pair;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn split_key_message_waits() {
        let input = Rc::new(RefCell::new(InputLog::default()));
        let mut server = test_server(Rc::clone(&input));
        let (a, mut peer) = pipe_pair("peer", 1 << 16);
        server.accept(a);
        peer.write(&Message::Auth { name: b"kim", pass: b"pass" }.to_bytes()).unwrap();
        peer.write(&[Command::Access as u8]).unwrap();
        server.poll();

        let key = Message::Key {
            ucs: false,
            symbol: 0x61,
            keycode: 38,
            pressed: true,
        }
        .to_bytes();
        peer.write(&key[..4]).unwrap();
        server.poll();
        assert!(input.borrow().events.is_empty());
        assert_eq!(server.clients[0].pending_input().read_size(), 3);

        peer.write(&key[4..]).unwrap();
        server.poll();
        assert_eq!(input.borrow().events, vec!["key 38 true".to_string()]);
    }

    #[test]
    fn release_marker_releases_everything() {
        let input = Rc::new(RefCell::new(InputLog::default()));
        let mut server = test_server(Rc::clone(&input));
        let (a, mut peer) = pipe_pair("peer", 1 << 16);
        server.accept(a);
        peer.write(&Message::Auth { name: b"kim", pass: b"pass" }.to_bytes()).unwrap();
        peer.write(&[Command::Access as u8]).unwrap();
        peer.write(&Message::Button { button: 1, pressed: true }.to_bytes()).unwrap();
        peer.write(
            &Message::Key {
                ucs: false,
                symbol: 0,
                keycode: 0,
                pressed: false,
            }
            .to_bytes(),
        )
        .unwrap();
        server.poll();
        assert_eq!(input.borrow().events, vec!["button 1 true".to_string(), "release".to_string()]);
        assert!(!input.borrow().held);
    }

    #[test]
    fn invalid_utf8_name_is_fatal() {
        let mut server = test_server(Rc::default());
        let (a, mut peer) = pipe_pair("peer", 1 << 16);
        server.accept(a);
        peer.write(&Message::Auth { name: &[0xFF, 0xFE], pass: b"pass" }.to_bytes()).unwrap();
        server.poll();
        assert!(server.is_empty());
    }
}
