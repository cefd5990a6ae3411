//! Per-connection state.

use tracing::info;

use crate::buffer::Buffer;
use crate::command::{Command, CommandSet};
use crate::cursor::RecentRing;
use crate::error::VbError;
use crate::netio::{NetIo, Transport};
use crate::tycho::Tycho;

use super::{ClientId, ConnectionInfo, Effect, Session};

/// Tags that only make sense once a client watches the screen.
pub(super) const VIEW: CommandSet = CommandSet::IMAGE
    .union(CommandSet::POINTER)
    .union(CommandSet::CURSOR);

/// One accepted client.
pub(super) struct Conn<T> {
    pub(super) id: ClientId,
    pub(super) netio: NetIo<T>,
    pub(super) tycho: Tycho,

    pub(super) identity: Option<String>,
    pub(super) level: u8,
    pub(super) access: u8,

    pub(super) recv: Command,
    pub(super) legal: CommandSet,
    pub(super) send: Command,
    pub(super) send_mask: CommandSet,
    pub(super) to_send: CommandSet,

    /// Where this client last put the pointer.
    pub(super) pointer: (i16, i16),
    /// Offset announced to the client and not yet answered.
    pub(super) sync: (i16, i16),

    pub(super) pam_name: Option<Buffer>,
    pub(super) pam_pass: Option<Buffer>,
    pub(super) gss_recv: Option<Buffer>,
    pub(super) gss_send: Option<Buffer>,
    pub(super) control_recv: Option<Buffer>,
    pub(super) control_send: Option<Buffer>,
    pub(super) clipboard_recv: Option<Buffer>,
    pub(super) clipboard_send: Option<Buffer>,

    /// Frames started and not acknowledged.
    pub(super) images: u32,
    pub(super) cursors: RecentRing<()>,
    pub(super) cursor_send: Option<Buffer>,

    /// Set by `close` from another connection.
    pub(super) close: bool,
}

impl<T: Transport> Conn<T> {
    pub(super) fn new(id: ClientId, transport: T) -> Self {
        Self {
            id,
            netio: NetIo::new(transport),
            tycho: Tycho::new(),
            identity: None,
            level: 0,
            access: 0,
            recv: Command::Start,
            legal: CommandSet::empty(),
            send: Command::Start,
            send_mask: CommandSet::empty(),
            to_send: CommandSet::empty(),
            pointer: (0, 0),
            sync: (0, 0),
            pam_name: None,
            pam_pass: None,
            gss_recv: None,
            gss_send: None,
            control_recv: None,
            control_send: None,
            clipboard_recv: None,
            clipboard_send: None,
            images: 0,
            cursors: RecentRing::default(),
            cursor_send: None,
            close: false,
        }
    }

    pub(super) fn name(&self) -> &str {
        self.netio.name()
    }

    pub(super) fn info(&self, session: &Session) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            name: self.name().to_string(),
            identity: self.identity.clone(),
            access: self.access,
            is_master: session.is_master(self.id),
        }
    }

    /// Write what the send machine produced.
    pub(super) fn flush(&mut self) -> Result<(), VbError> {
        self.netio.write_some()?;
        Ok(())
    }

    /// Set the access level and tell the client.
    ///
    /// A change revokes access from other connections of the same
    /// identity and counts as activity; anything below 2 ends mastership.
    pub(super) fn set_access(&mut self, session: &mut Session, access: u8, reason: &str, effects: &mut Vec<Effect>) {
        self.to_send |= CommandSet::ACCESS;

        if self.access == access {
            return;
        }
        self.access = access;

        if access > 0 {
            info!(client = %self.name(), access, reason, "access granted");
        } else {
            info!(client = %self.name(), reason, "access denied");
            self.send_mask.remove(VIEW);
        }

        if let Some(identity) = &self.identity {
            effects.push(Effect::Revoke {
                identity: identity.clone(),
                keep: self.id,
            });
        }

        session.touch();

        if access != 2 && session.master_stop(self.id) {
            self.to_send |= CommandSet::MASTER;
        }
    }

    /// Drop to access 0 without touching other connections.
    pub(super) fn revoke(&mut self, session: &mut Session) {
        self.to_send |= CommandSet::ACCESS;
        if self.access == 0 {
            return;
        }
        info!(client = %self.name(), "access revoked");
        self.access = 0;
        self.send_mask.remove(VIEW);
        if session.master_stop(self.id) {
            self.to_send |= CommandSet::MASTER;
        }
    }

    /// A complete control command, once the previous reply is out.
    pub(super) fn take_control(&mut self) -> Option<Vec<u8>> {
        if self.control_send.is_some() {
            return None;
        }
        if self.control_recv.as_ref()?.write_size() > 0 {
            return None;
        }
        self.control_recv.take().map(Buffer::into_vec)
    }
}
