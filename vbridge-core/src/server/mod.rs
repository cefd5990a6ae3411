//! # Server session
//!
//! One [`Server`] owns the shared screen state and every connection.
//! Each [`poll_at`](Server::poll_at) runs four phases:
//!
//! ```text
//!   ┌───────────┐   ┌──────────────┐   ┌──────────┐   ┌────────────┐
//!   │ clipboard │──►│ receive each │──►│   grab   │──►│ send each  │
//!   │ idle      │   │ connection   │   │ display  │   │ connection │
//!   └───────────┘   └──────────────┘   └──────────┘   └────────────┘
//! ```
//!
//! The capture grid is shared; every connection keeps its own codec
//! session, so delta-skip is tracked per recipient. Errors are local to
//! one connection: it is logged and dropped, the others carry on.
//!
//! ## Master arbitration
//!
//! | Event                                   | Effect                                 |
//! |-----------------------------------------|----------------------------------------|
//! | input from an access-2 client           | becomes master if the slot is free     |
//! | slot held, last input < grace ago       | input ignored                          |
//! | slot held, keys or buttons still down   | input ignored                          |
//! | key with keycode 0 from the master      | everything released                    |
//! | master loses access or disconnects      | everything released, holder cleared    |

mod conn;
mod control;
mod recv;
mod send;

use std::time::{Duration, Instant};

use futures::future;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::backend::{AccessList, Authenticator, CursorImage, Display, InputSink};
use crate::command::CommandSet;
use crate::error::VbError;
use crate::netio::{self, Transport};
use crate::token;
use crate::tycho::{CaptureGrid, Quality};

use conn::Conn;

/// Identifier of one accepted connection.
pub type ClientId = u64;

/// Minimum time between two display captures.
pub const GRAB_INTERVAL: Duration = Duration::from_millis(30);

/// Quiet period before another client may take over as master.
pub const MASTER_GRACE: Duration = Duration::from_millis(200);

// ── ServerConfig ─────────────────────────────────────────────────

/// Tunables of a [`Server`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub grab_interval: Duration,
    pub master_grace: Duration,
    /// Revoke all access after this long without authorized activity.
    pub idle_timeout: Option<Duration>,
    /// Initial palette depth bounds.
    pub quality: Quality,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grab_interval: GRAB_INTERVAL,
            master_grace: MASTER_GRACE,
            idle_timeout: None,
            quality: Quality::default(),
        }
    }
}

/// Collaborators a server drives.
pub struct Backends {
    pub display: Box<dyn Display>,
    pub input: Box<dyn InputSink>,
    pub auth: Box<dyn Authenticator>,
    pub acl: Box<dyn AccessList>,
}

/// Snapshot of one connection, for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ClientId,
    /// Transport name, usually the peer address.
    pub name: String,
    pub identity: Option<String>,
    pub access: u8,
    pub is_master: bool,
}

// ── Session ──────────────────────────────────────────────────────

/// What the last grab saw.
#[derive(Debug, Default)]
struct Grab {
    last: Option<Instant>,
    pointer: (i16, i16),
    cursor: Option<CursorImage>,
    cursor_hash: u32,
}

#[derive(Debug, Default)]
struct Master {
    holder: Option<ClientId>,
    /// Last input of the current or previous holder.
    time: Option<Instant>,
}

/// Cross-connection work a receive step asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Effect {
    /// Schedule `tags` on `client`.
    Notify(ClientId, CommandSet),
    /// Drop access of every connection of `identity` except `keep`.
    Revoke { identity: String, keep: ClientId },
}

/// Server-wide state shared by every connection.
struct Session {
    config: ServerConfig,
    display: Box<dyn Display>,
    input: Box<dyn InputSink>,
    auth: Box<dyn Authenticator>,
    acl: Box<dyn AccessList>,
    capture: CaptureGrid,
    grab: Grab,
    /// Last position injected for a client.
    injected: Option<(i16, i16)>,
    /// Mode requested by the master; `(0, 0)` for none.
    resize: (u16, u16),
    master: Master,
    /// Last authorized activity.
    activity: Option<Instant>,
    now: Instant,
}

impl Session {
    fn is_master(&self, id: ClientId) -> bool {
        self.master.holder == Some(id)
    }

    /// Take or keep the master slot for an input event from `id`.
    fn claim_master(&mut self, id: ClientId, access: u8, effects: &mut Vec<Effect>) -> bool {
        if access != 2 {
            return false;
        }

        if !self.is_master(id) {
            if let Some(time) = self.master.time {
                if self.now.saturating_duration_since(time) < self.config.master_grace {
                    return false;
                }
                if self.input.needs_release() {
                    return false;
                }
            }
            if let Some(old) = self.master.holder {
                effects.push(Effect::Notify(old, CommandSet::MASTER));
            }
            effects.push(Effect::Notify(id, CommandSet::MASTER));
            self.master.holder = Some(id);
            info!(client = id, "master acquired");
        }

        self.master.time = Some(self.now);
        true
    }

    /// Release the master slot if `id` holds it. Returns whether it did.
    fn master_stop(&mut self, id: ClientId) -> bool {
        if !self.is_master(id) {
            return false;
        }
        self.input.release_all();
        self.master.holder = None;
        info!(client = id, "master released");
        true
    }

    fn touch(&mut self) {
        self.activity = Some(self.now);
    }
}

// ── Server ───────────────────────────────────────────────────────

/// All connections plus the shared screen.
pub struct Server<T> {
    session: Session,
    clients: Vec<Conn<T>>,
    next_id: ClientId,
}

impl<T: Transport> Server<T> {
    pub fn new(config: ServerConfig, backends: Backends) -> Self {
        Self::new_at(config, backends, Instant::now())
    }

    /// A server whose clock starts at `now`.
    pub fn new_at(config: ServerConfig, backends: Backends, now: Instant) -> Self {
        let capture = CaptureGrid::new(config.quality);
        Self {
            session: Session {
                config,
                display: backends.display,
                input: backends.input,
                auth: backends.auth,
                acl: backends.acl,
                capture,
                grab: Grab::default(),
                injected: None,
                resize: (0, 0),
                master: Master::default(),
                activity: None,
                now,
            },
            clients: Vec::new(),
            next_id: 1,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.session.config
    }

    /// Take ownership of a freshly accepted transport.
    pub fn accept(&mut self, transport: T) -> ClientId {
        let id = self.next_id;
        self.next_id += 1;
        let conn = Conn::new(id, transport);
        info!(client = %conn.name(), id, "accepted");
        self.clients.push(conn);
        id
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Current master, if any.
    pub fn master(&self) -> Option<ClientId> {
        self.session.master.holder
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.clients.iter().map(|c| c.info(&self.session)).collect()
    }

    pub fn poll(&mut self) {
        self.poll_at(Instant::now());
    }

    /// Drive every connection once as of `now`.
    pub fn poll_at(&mut self, now: Instant) {
        self.session.now = now;

        self.offer_clipboard();
        self.check_idle();

        let mut i = 0;
        while i < self.clients.len() {
            match self.recv_client(i) {
                Ok(()) => i += 1,
                Err(e) => self.drop_client(i, e),
            }
        }

        if !self.clients.is_empty() {
            self.grab();
        }

        let mut i = 0;
        while i < self.clients.len() {
            match self.send_client(i) {
                Ok(()) => i += 1,
                Err(e) => self.drop_client(i, e),
            }
        }
    }

    fn recv_client(&mut self, i: usize) -> Result<(), VbError> {
        let mut effects = Vec::new();
        let result = self.clients[i].recv_all(&mut self.session, &mut effects);
        self.apply(effects);
        result?;
        self.run_control(i);
        Ok(())
    }

    fn send_client(&mut self, i: usize) -> Result<(), VbError> {
        let conn = &mut self.clients[i];
        conn.send_all(&self.session)?;
        conn.flush()
    }

    fn drop_client(&mut self, i: usize, err: VbError) {
        let conn = self.clients.remove(i);
        if err.is_orderly() {
            info!(client = %conn.name(), "closed: {err}");
        } else {
            warn!(client = %conn.name(), "closed: {err}");
        }
        self.session.master_stop(conn.id);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Notify(id, tags) => {
                    if let Some(conn) = self.clients.iter_mut().find(|c| c.id == id) {
                        conn.to_send |= tags;
                    }
                }
                Effect::Revoke { identity, keep } => {
                    for conn in self.clients.iter_mut() {
                        if conn.id != keep && conn.identity.as_deref() == Some(identity.as_str()) {
                            conn.revoke(&mut self.session);
                        }
                    }
                }
            }
        }
    }

    /// Hand new display clipboard content to the master.
    fn offer_clipboard(&mut self) {
        let Some(holder) = self.session.master.holder else {
            return;
        };
        let Some(conn) = self.clients.iter_mut().find(|c| c.id == holder) else {
            return;
        };
        if conn.clipboard_send.is_some() {
            return;
        }
        if let Some(data) = self.session.display.take_clipboard() {
            conn.clipboard_send = token::from_bytes(&data);
            if conn.clipboard_send.is_some() {
                conn.to_send |= CommandSet::CLIPBOARD;
            }
        }
    }

    /// Revoke all access after the idle timeout.
    fn check_idle(&mut self) {
        let (Some(timeout), Some(last)) = (self.session.config.idle_timeout, self.session.activity) else {
            return;
        };
        if self.session.now.saturating_duration_since(last) <= timeout {
            return;
        }
        info!(timeout = ?timeout, "idle, revoking access");
        for conn in self.clients.iter_mut() {
            if conn.access > 0 {
                conn.revoke(&mut self.session);
            }
        }
        self.session.activity = None;
    }

    /// Capture the display and schedule what changed.
    fn grab(&mut self) -> CommandSet {
        let s = &mut self.session;
        if let Some(last) = s.grab.last {
            if s.now.saturating_duration_since(last) < s.config.grab_interval {
                return CommandSet::empty();
            }
        }
        s.grab.last = Some(s.now);

        let mut tags = CommandSet::empty();

        if !s.display.request_resize(s.resize.0, s.resize.1) {
            if let Some(view) = s.display.grab() {
                let resized = view.width() != s.capture.width() || view.height() != s.capture.height();
                let changed = s.capture.set_image(view);
                if changed > 0 || resized {
                    debug!(changed, "screen changed");
                    tags |= CommandSet::IMAGE;
                }
            }
        }

        let (x, y) = s.display.pointer();
        let pointer = (x as i16, y as i16);
        if pointer != s.grab.pointer {
            s.grab.pointer = pointer;
            tags |= CommandSet::POINTER;
        }

        if let Some(cursor) = s.display.cursor() {
            let hash = cursor.hash();
            if s.grab.cursor.is_none() || hash != s.grab.cursor_hash {
                tags |= CommandSet::CURSOR;
            }
            s.grab.cursor = Some(cursor);
            s.grab.cursor_hash = hash;
        }

        for conn in self.clients.iter_mut() {
            if conn.close {
                continue;
            }
            let s = &self.session;
            if s.is_master(conn.id) && conn.sync == (0, 0) && s.injected == Some(conn.pointer) {
                conn.sync = (
                    s.grab.pointer.0.wrapping_sub(conn.pointer.0),
                    s.grab.pointer.1.wrapping_sub(conn.pointer.1),
                );
                if conn.sync != (0, 0) {
                    conn.to_send |= CommandSet::POINTER_SYNC;
                }
            }
            conn.to_send |= tags;
        }

        tags
    }
}

impl Server<TcpStream> {
    /// Wait until some connection's socket is ready for what it wants:
    /// reads while its input buffer has room, writes while output is
    /// pending. Never completes without such a connection.
    pub async fn ready(&self) {
        let waits: Vec<_> = self
            .clients
            .iter()
            .filter(|c| c.netio.wants().any())
            .map(|c| Box::pin(netio::wait_ready(c.netio.transport(), c.netio.wants())))
            .collect();
        if waits.is_empty() {
            return std::future::pending().await;
        }

        let (result, index, _) = future::select_all(waits).await;
        if let Err(e) = result {
            // the next poll reports it through the connection
            debug!(index, "readiness: {e}");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::{AuthOutcome, KeySymbol, MemoryAcl, Verdict};
    use crate::command::Command;
    use crate::image::{Image, ImageView};
    use crate::message::Message;
    use crate::netio::{Pipe, pipe_pair};
    use std::cell::RefCell;
    use std::io::ErrorKind;
    use std::rc::Rc;

    /// Events recorded by [`TestInput`].
    #[derive(Debug, Default)]
    pub(crate) struct InputLog {
        pub events: Vec<String>,
        pub held: bool,
    }

    pub(crate) struct TestInput(pub Rc<RefCell<InputLog>>);

    impl InputSink for TestInput {
        fn pointer(&mut self, x: i32, y: i32, relative: bool) {
            let kind = if relative { "rel" } else { "abs" };
            self.0.borrow_mut().events.push(format!("{kind} {x} {y}"));
        }

        fn button(&mut self, button: u8, pressed: bool) {
            let mut log = self.0.borrow_mut();
            log.held = pressed;
            log.events.push(format!("button {button} {pressed}"));
        }

        fn key(&mut self, keycode: u8, _symbol: KeySymbol, pressed: bool) {
            let mut log = self.0.borrow_mut();
            log.held = pressed;
            log.events.push(format!("key {keycode} {pressed}"));
        }

        fn release_all(&mut self) {
            let mut log = self.0.borrow_mut();
            log.held = false;
            log.events.push("release".into());
        }

        fn needs_release(&self) -> bool {
            self.0.borrow().held
        }
    }

    pub(crate) struct TestDisplay {
        pub image: Image,
        pub clipboard: Rc<RefCell<Vec<Vec<u8>>>>,
    }

    impl Display for TestDisplay {
        fn grab(&mut self) -> Option<ImageView<'_>> {
            Some(self.image.view())
        }

        fn pointer(&self) -> (i32, i32) {
            (5, 5)
        }

        fn cursor(&mut self) -> Option<CursorImage> {
            None
        }

        fn request_resize(&mut self, _width: u16, _height: u16) -> bool {
            false
        }

        fn take_clipboard(&mut self) -> Option<Vec<u8>> {
            None
        }

        fn set_clipboard(&mut self, data: &[u8]) {
            self.clipboard.borrow_mut().push(data.to_vec());
        }
    }

    /// Accepts `pass` as password for any name, at level 2.
    pub(crate) struct TestAuth;

    impl Authenticator for TestAuth {
        fn certificate(&mut self, _peer: &str) -> Verdict {
            Verdict::Rejected
        }

        fn password(&mut self, name: &str, pass: &[u8]) -> Verdict {
            if pass == b"pass" {
                Verdict::Accepted {
                    identity: name.to_string(),
                    level: 2,
                }
            } else {
                Verdict::Rejected
            }
        }

        fn token(&mut self, _peer: &str, _blob: &[u8]) -> AuthOutcome {
            AuthOutcome {
                verdict: Verdict::Rejected,
                reply: None,
            }
        }
    }

    pub(crate) fn test_server(input: Rc<RefCell<InputLog>>) -> Server<Pipe> {
        let backends = Backends {
            display: Box::new(TestDisplay {
                image: Image::from_fn(16, 8, |x, _| if x < 8 { 0xFF0000 } else { 0x0000FF }),
                clipboard: Rc::default(),
            }),
            input: Box::new(TestInput(input)),
            auth: Box::new(TestAuth),
            acl: Box::new(MemoryAcl::new()),
        };
        Server::new_at(ServerConfig::default(), backends, Instant::now())
    }

    fn drain(pipe: &mut Pipe) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => panic!("{e}"),
            }
        }
        out
    }

    #[test]
    fn input_before_auth_is_illegal() {
        let mut server = test_server(Rc::default());
        let (a, mut peer) = pipe_pair("peer", 1 << 16);
        server.accept(a);
        peer.write(&Message::Button { button: 1, pressed: true }.to_bytes()).unwrap();
        server.poll();
        assert!(server.is_empty());
    }

    #[test]
    fn failed_password_reports_no_access() {
        let mut server = test_server(Rc::default());
        let (a, mut peer) = pipe_pair("peer", 1 << 16);
        server.accept(a);
        let msg = Message::Auth { name: b"bob", pass: b"nope" };
        peer.write(&msg.to_bytes()).unwrap();
        server.poll();

        let sent = drain(&mut peer);
        assert_eq!(sent, vec![Command::Access as u8, 0, 0]);
        assert_eq!(server.connections()[0].identity, None);
    }

    #[test]
    fn password_grants_access_and_master_on_input() {
        let input = Rc::new(RefCell::new(InputLog::default()));
        let mut server = test_server(Rc::clone(&input));
        let (a, mut peer) = pipe_pair("peer", 1 << 16);
        let id = server.accept(a);

        peer.write(&Message::Auth { name: b"bob", pass: b"pass" }.to_bytes()).unwrap();
        server.poll();
        assert_eq!(drain(&mut peer), vec![Command::Access as u8, 2, 2]);

        peer.write(&[Command::Access as u8]).unwrap();
        server.poll();
        assert_eq!(server.master(), Some(id));

        peer.write(&Message::Pointer { x: 3, y: 4 }.to_bytes()).unwrap();
        server.poll();
        assert_eq!(input.borrow().events, vec!["abs 3 4".to_string()]);

        let info = &server.connections()[0];
        assert_eq!(info.identity.as_deref(), Some("bob"));
        assert!(info.is_master);
    }

    #[test]
    fn disconnect_releases_master() {
        let input = Rc::new(RefCell::new(InputLog::default()));
        let mut server = test_server(Rc::clone(&input));
        let (a, mut peer) = pipe_pair("peer", 1 << 16);
        server.accept(a);
        peer.write(&Message::Auth { name: b"bob", pass: b"pass" }.to_bytes()).unwrap();
        peer.write(&[Command::Access as u8]).unwrap();
        server.poll();
        assert!(server.master().is_some());

        drop(peer);
        server.poll();
        assert!(server.is_empty());
        assert_eq!(server.master(), None);
        assert_eq!(input.borrow().events.last().map(String::as_str), Some("release"));
    }

    #[test]
    fn idle_timeout_revokes_access() {
        let mut server = test_server(Rc::default());
        server.session.config.idle_timeout = Some(Duration::from_secs(1));
        let t0 = Instant::now();
        let (a, mut peer) = pipe_pair("peer", 1 << 16);
        server.accept(a);
        peer.write(&Message::Auth { name: b"bob", pass: b"pass" }.to_bytes()).unwrap();
        server.poll_at(t0);
        drain(&mut peer);

        server.poll_at(t0 + Duration::from_secs(2));
        assert_eq!(server.connections()[0].access, 0);
        let sent = drain(&mut peer);
        assert_eq!(&sent[..3], &[Command::Access as u8, 2, 0]);
    }
}
