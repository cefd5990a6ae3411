//! # Core client
//!
//! The viewer side of one connection: a resumable receive machine
//! that keeps the decoded screen, cursor and session flags current,
//! and a small set of senders whose messages are written straight to
//! the output buffer or, when it is full, queued in order.
//!
//! ```text
//!            ┌──────── tag not legal / unknown ──────► Err
//!   Start ─► Next ─► access | master | pointer | pointer-sync
//!             ▲      cursor ─► cursor-data
//!             │      image  ─► image-data ─► (ack)
//!             │      auth-gss | control | clipboard   (tokens)
//!             └──────────────── done ◄─────────────┘
//! ```
//!
//! A state that lacks input returns to the caller without changing
//! state. Token slots and the pointer-sync offset apply back-pressure:
//! the machine stops at that tag until the application has taken the
//! previous value.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes};
use tracing::{debug, info, trace};

use crate::backend::{CursorImage, KeySymbol};
use crate::buffer::Buffer;
use crate::command::{Command, CommandSet};
use crate::cursor::RecentRing;
use crate::error::VbError;
use crate::image::Image;
use crate::message::Message;
use crate::netio::{NetIo, Transport, Wants};
use crate::step::{Flow, Step};
use crate::token::{self, MAX_TOKEN_SIZE};
use crate::tycho::Tycho;

/// Write coalescing interval once frames are flowing.
pub const SEND_INTERVAL: Duration = Duration::from_millis(30);

/// Tags a server may send.
const SERVER_TAGS: CommandSet = CommandSet::AUTH_GSS
    .union(CommandSet::CONTROL)
    .union(CommandSet::POINTER)
    .union(CommandSet::POINTER_SYNC)
    .union(CommandSet::ACCESS)
    .union(CommandSet::MASTER)
    .union(CommandSet::CLIPBOARD)
    .union(CommandSet::CURSOR)
    .union(CommandSet::IMAGE)
    .union(CommandSet::STOP);

#[derive(Debug, Clone, Copy, Default)]
struct CursorHeader {
    hash: u32,
    width: u16,
    height: u16,
    xhot: i16,
    yhot: i16,
}

/// Client end of one connection.
pub struct CoreClient<T> {
    netio: NetIo<T>,
    tycho: Tycho,
    image: Image,
    frames: u64,

    recv: Command,
    received: CommandSet,

    level: u8,
    access: u8,
    master: bool,

    /// Server pointer position.
    pointer: (i16, i16),
    /// Last position this client sent.
    sent_pointer: (i16, i16),
    /// Offset the server asked us to warp by.
    sync: (i16, i16),

    cursor: CursorHeader,
    cursors: RecentRing<Buffer>,

    gss: Option<Buffer>,
    control: Option<Buffer>,
    clipboard: Option<Buffer>,

    egress: VecDeque<Bytes>,
    coalesce: Duration,
    send_interval: Duration,
    last_write: Option<Instant>,
}

impl<T: Transport> CoreClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_send_interval(transport, SEND_INTERVAL)
    }

    /// A client that coalesces writes to one per `interval` once the
    /// first frame arrived.
    pub fn with_send_interval(transport: T, interval: Duration) -> Self {
        Self {
            netio: NetIo::new(transport),
            tycho: Tycho::new(),
            image: Image::default(),
            frames: 0,
            recv: Command::Start,
            received: CommandSet::empty(),
            level: 0,
            access: 0,
            master: false,
            pointer: (0, 0),
            sent_pointer: (0, 0),
            sync: (0, 0),
            cursor: CursorHeader::default(),
            cursors: RecentRing::default(),
            gss: None,
            control: None,
            clipboard: None,
            egress: VecDeque::new(),
            coalesce: interval,
            send_interval: Duration::ZERO,
            last_write: None,
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        self.netio.name()
    }

    pub fn transport(&self) -> &T {
        self.netio.transport()
    }

    /// Latest decoded screen.
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Frames fully decoded so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn access(&self) -> u8 {
        self.access
    }

    pub fn is_master(&self) -> bool {
        self.master
    }

    /// Server pointer position.
    pub fn pointer(&self) -> (i16, i16) {
        self.pointer
    }

    /// Pending warp offset, if any.
    pub fn pointer_sync(&self) -> Option<(i16, i16)> {
        (self.sync != (0, 0)).then_some(self.sync)
    }

    /// Whether `command` completed during the last [`recv_all`](Self::recv_all).
    pub fn received(&self, command: Command) -> bool {
        self.received.has(command)
    }

    /// Current cursor shape; `None` while hidden or still arriving.
    pub fn cursor(&self) -> Option<CursorImage> {
        let header = self.cursor;
        if header.hash == 0 {
            return None;
        }
        let data = self.cursors.get(header.hash)?;
        if data.write_size() > 0 {
            return None;
        }
        let pixels = data
            .readable()
            .chunks_exact(4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Some(CursorImage {
            width: header.width,
            height: header.height,
            xhot: header.xhot,
            yhot: header.yhot,
            pixels,
        })
    }

    pub fn take_control(&mut self) -> Option<Vec<u8>> {
        take_complete(&mut self.control)
    }

    pub fn take_clipboard(&mut self) -> Option<Vec<u8>> {
        take_complete(&mut self.clipboard)
    }

    pub fn take_auth_token(&mut self) -> Option<Vec<u8>> {
        take_complete(&mut self.gss)
    }

    /// Bytes waiting for room in the output buffer.
    pub fn queued(&self) -> usize {
        self.egress.iter().map(Bytes::len).sum()
    }

    // ── Driving ──────────────────────────────────────────────────

    pub fn poll(&mut self) -> Result<(), VbError> {
        self.poll_at(Instant::now())
    }

    /// Receive what is available, then flush what is queued.
    pub fn poll_at(&mut self, now: Instant) -> Result<(), VbError> {
        self.recv_all()?;
        self.send_all_at(now)
    }

    /// Run the receive machine until input runs out or the
    /// application has to act.
    pub fn recv_all(&mut self) -> Result<(), VbError> {
        self.received = CommandSet::empty();

        if self.recv == Command::Start {
            if self.netio.start()?.is_pending() {
                return Ok(());
            }
            info!(
                server = %self.netio.name(),
                proto = self.netio.proto().unwrap_or_default(),
                "connected"
            );
            self.recv = Command::Next;
        }

        loop {
            match self.recv_step()? {
                Flow::Done => {
                    self.received |= completed_tag(self.recv).bit();
                    self.recv = Command::Next;
                }
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

    fn recv_step(&mut self) -> Result<Flow, VbError> {
        match self.recv {
            Command::Next => {
                let Some(byte) = self.netio.input().get_u8() else {
                    return Ok(Flow::NeedInput);
                };
                let command = Command::try_from(byte)?;
                if !SERVER_TAGS.has(command) {
                    return Err(VbError::IllegalCommand(command));
                }
                trace!(%command, "tag");
                self.recv = command;
                Ok(Flow::Again)
            }

            Command::AuthGss => recv_token(&mut self.gss, self.netio.input()),
            Command::Control => recv_token(&mut self.control, self.netio.input()),
            Command::Clipboard => recv_token(&mut self.clipboard, self.netio.input()),

            Command::PointerSync if self.sync != (0, 0) => Ok(Flow::Blocked),

            command @ (Command::Access
            | Command::Master
            | Command::Pointer
            | Command::PointerSync
            | Command::Cursor
            | Command::Image) => match Message::read(self.netio.input(), command, false)? {
                Step::Ready(msg) => self.apply(msg),
                Step::Pending => Ok(Flow::NeedInput),
            },

            Command::CursorData => {
                let Some(dst) = self.cursors.front_mut() else {
                    return Err(VbError::ProtocolViolation("cursor data without cursor"));
                };
                dst.copy_from(self.netio.input());
                if dst.write_size() > 0 {
                    return Ok(Flow::NeedInput);
                }
                Ok(Flow::Done)
            }

            Command::ImageData => match self.tycho.decode(self.netio.input(), &mut self.image.view_mut())? {
                Step::Pending => Ok(Flow::NeedInput),
                Step::Ready(()) => {
                    self.frames += 1;
                    debug!(frame = self.frames, "frame decoded");
                    self.send_interval = self.coalesce;
                    self.last_write = None;
                    self.queue(&Message::Tag(Command::Image));
                    Ok(Flow::Done)
                }
            },

            Command::Stop => {
                if self.netio.stop()?.is_pending() {
                    return Ok(Flow::Blocked);
                }
                Err(VbError::Stopped)
            }

            command => Err(VbError::IllegalCommand(command)),
        }
    }

    fn apply(&mut self, msg: Message<'static>) -> Result<Flow, VbError> {
        match msg {
            Message::Access { level, access } => {
                if (level, access) != (self.level, self.access) {
                    info!(level, access, "access changed");
                }
                self.level = level;
                self.access = access;
            }
            Message::Master(on) => {
                info!(master = on, "master changed");
                self.master = on;
            }
            Message::Pointer { x, y } => self.pointer = (x, y),
            Message::PointerSync { dx, dy } => self.sync = (dx, dy),
            Message::Cursor {
                hash,
                width,
                height,
                xhot,
                yhot,
            } => {
                self.cursor = CursorHeader {
                    hash,
                    width,
                    height,
                    xhot,
                    yhot,
                };
                if hash == 0 || width == 0 || height == 0 || self.cursors.contains(hash) {
                    return Ok(Flow::Done);
                }
                let size = width as usize * height as usize * 4;
                self.cursors.push_front(hash, Buffer::with_capacity(size));
                self.recv = Command::CursorData;
                return Ok(Flow::Again);
            }
            Message::Image { width, height } => {
                if width == 0 || height == 0 {
                    return Err(VbError::CorruptStream("empty image"));
                }
                let (w, h) = (width as u32, height as u32);
                if self.image.width() != w || self.image.height() != h {
                    debug!(width = w, height = h, "resizing image");
                    self.image.resize(w, h);
                }
                self.tycho.setup(w, h);
                self.recv = Command::ImageData;
                return Ok(Flow::Again);
            }
            _ => return Err(VbError::ProtocolViolation("unexpected message from server")),
        }
        Ok(Flow::Done)
    }

    // ── Sending ──────────────────────────────────────────────────

    /// Move queued messages into the output buffer and write, at most
    /// once per send interval.
    pub fn send_all_at(&mut self, now: Instant) -> Result<(), VbError> {
        self.fill_output();

        if self.next_write(now).is_none() {
            self.last_write = Some(now);
            self.netio.write_some()?;
        }
        Ok(())
    }

    /// Write what is queued right away, ignoring the send interval.
    /// Returns `true` once nothing is left to send.
    pub fn flush(&mut self) -> Result<bool, VbError> {
        self.fill_output();
        self.netio.write_some()?;
        Ok(self.egress.is_empty() && self.netio.output().is_drained())
    }

    /// When the send interval allows the next write, if that is still
    /// ahead of `now`.
    pub fn next_write(&self, now: Instant) -> Option<Instant> {
        let at = self.last_write? + self.send_interval;
        (at > now).then_some(at)
    }

    /// Socket directions worth waiting on as of `now`. Writes count only
    /// once the send interval allows them.
    pub fn wants(&self, now: Instant) -> Wants {
        let mut wants = self.netio.wants();
        wants.write = (wants.write || !self.egress.is_empty()) && self.next_write(now).is_none();
        wants
    }

    fn fill_output(&mut self) {
        while let Some(front) = self.egress.front_mut() {
            let n = self.netio.output().fill_from(front);
            front.advance(n);
            if !front.is_empty() {
                break;
            }
            self.egress.pop_front();
        }
    }

    fn queue(&mut self, msg: &Message<'_>) {
        let bytes = msg.to_bytes().freeze();
        if self.egress.is_empty() && self.netio.output().put_slice(&bytes) {
            return;
        }
        self.egress.push_back(bytes);
    }

    /// Password authentication; empty fields are not sent.
    pub fn send_auth(&mut self, name: &str, pass: &str) {
        if name.is_empty() || pass.is_empty() {
            return;
        }
        self.queue(&Message::Auth {
            name: name.as_bytes(),
            pass: pass.as_bytes(),
        });
    }

    /// Ask the server to check the transport certificate.
    pub fn send_auth_certificate(&mut self) {
        self.queue(&Message::Tag(Command::AuthSsl));
    }

    pub fn send_auth_token(&mut self, blob: &[u8]) {
        if blob.is_empty() || blob.len() > MAX_TOKEN_SIZE {
            return;
        }
        self.queue(&Message::Data {
            command: Command::AuthGss,
            payload: blob,
        });
    }

    /// Request the access granted by the last `access` message.
    pub fn send_access(&mut self) {
        self.queue(&Message::Tag(Command::Access));
    }

    pub fn send_quality(&mut self, min: u8, max: u8) {
        if self.access == 0 {
            return;
        }
        self.queue(&Message::Quality { min, max });
    }

    pub fn send_resize(&mut self, width: u16, height: u16) {
        if self.access == 0 {
            return;
        }
        self.queue(&Message::Resize { width, height });
    }

    /// Send an absolute position, or with `sync` the motion since the
    /// last sent position, which also consumes the pending offset.
    pub fn send_pointer(&mut self, x: i32, y: i32, sync: bool) {
        if self.access == 0 {
            return;
        }
        let (px, py) = (x as i16, y as i16);
        let msg = if sync {
            Message::PointerSync {
                dx: px.wrapping_sub(self.sent_pointer.0),
                dy: py.wrapping_sub(self.sent_pointer.1),
            }
        } else {
            Message::Pointer { x: px, y: py }
        };
        self.sync = (0, 0);
        self.sent_pointer = (px, py);
        self.queue(&msg);
    }

    pub fn send_button(&mut self, button: u8, pressed: bool) {
        if self.access == 0 {
            return;
        }
        self.queue(&Message::Button { button, pressed });
    }

    pub fn send_key(&mut self, symbol: KeySymbol, keycode: u8, pressed: bool) {
        if self.access == 0 {
            return;
        }
        let (ucs, symbol) = match symbol {
            KeySymbol::Ucs(s) => (true, s),
            KeySymbol::Keysym(s) => (false, s),
        };
        self.queue(&Message::Key {
            ucs,
            symbol,
            keycode,
            pressed,
        });
    }

    /// Release every key and button held on the server.
    pub fn send_release_all(&mut self) {
        self.send_key(KeySymbol::Keysym(0), 0, false);
    }

    pub fn send_control(&mut self, data: &[u8]) {
        self.send_data(Command::Control, data);
    }

    pub fn send_clipboard(&mut self, data: &[u8]) {
        self.send_data(Command::Clipboard, data);
    }

    fn send_data(&mut self, command: Command, data: &[u8]) {
        if self.access == 0 || data.is_empty() {
            return;
        }
        let payload = token::bounded(data);
        self.queue(&Message::Data { command, payload });
    }

    pub fn send_stop(&mut self) {
        self.queue(&Message::Tag(Command::Stop));
    }
}

/// The tag a finished receive state reports as observed.
fn completed_tag(state: Command) -> Command {
    match state {
        Command::CursorData => Command::Cursor,
        Command::ImageData => Command::Image,
        other => other,
    }
}

fn recv_token(slot: &mut Option<Buffer>, input: &mut Buffer) -> Result<Flow, VbError> {
    if slot.as_ref().is_some_and(|b| b.write_size() == 0) {
        return Ok(Flow::Blocked);
    }
    Ok(match token::recv(slot, input)? {
        Step::Ready(()) => Flow::Done,
        Step::Pending => Flow::NeedInput,
    })
}

fn take_complete(slot: &mut Option<Buffer>) -> Option<Vec<u8>> {
    if slot.as_ref()?.write_size() > 0 {
        return None;
    }
    slot.take().map(Buffer::into_vec)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netio::{Pipe, pipe_pair};
    use crate::tycho::{CaptureGrid, Quality};
    use std::io::ErrorKind;

    fn connected() -> (CoreClient<Pipe>, Pipe) {
        let (client, server) = pipe_pair("server", 1 << 20);
        (CoreClient::with_send_interval(client, Duration::ZERO), server)
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

    fn grant(client: &mut CoreClient<Pipe>, server: &mut Pipe, level: u8, access: u8) {
        server.write(&Message::Access { level, access }.to_bytes()).unwrap();
        client.poll().unwrap();
    }

    #[test]
    fn access_message_updates_state() {
        let (mut client, mut server) = connected();
        grant(&mut client, &mut server, 2, 2);
        assert_eq!((client.level(), client.access()), (2, 2));
        assert!(client.received(Command::Access));
        client.poll().unwrap();
        assert!(!client.received(Command::Access));
    }

    #[test]
    fn illegal_and_unknown_tags_are_fatal() {
        let (mut client, mut server) = connected();
        server.write(&[Command::Button as u8, 1, 1]).unwrap();
        assert!(matches!(client.poll(), Err(VbError::IllegalCommand(Command::Button))));

        let (mut client, mut server) = connected();
        server.write(&[99]).unwrap();
        assert!(matches!(client.poll(), Err(VbError::UnknownVariant { .. })));
    }

    #[test]
    fn input_needs_access() {
        let (mut client, mut server) = connected();
        client.poll().unwrap();
        client.send_button(1, true);
        client.send_pointer(10, 10, false);
        client.poll().unwrap();
        assert!(drain(&mut server).is_empty());

        grant(&mut client, &mut server, 2, 2);
        client.send_button(1, true);
        client.poll().unwrap();
        assert_eq!(drain(&mut server), vec![Command::Button as u8, 1, 1]);
    }

    #[test]
    fn messages_before_start_are_queued() {
        let (mut client, mut server) = connected();
        client.send_auth("alice", "pw");
        client.send_access();
        assert!(client.queued() > 0);
        client.poll().unwrap();
        assert_eq!(client.queued(), 0);

        let mut expect = Message::Auth {
            name: b"alice",
            pass: b"pw",
        }
        .to_bytes()
        .to_vec();
        expect.push(Command::Access as u8);
        assert_eq!(drain(&mut server), expect);
    }

    #[test]
    fn pointer_sync_applies_back_pressure() {
        let (mut client, mut server) = connected();
        grant(&mut client, &mut server, 2, 2);

        let mut bytes = Message::PointerSync { dx: 5, dy: -2 }.to_bytes().to_vec();
        bytes.extend_from_slice(&Message::PointerSync { dx: 1, dy: 1 }.to_bytes());
        bytes.extend_from_slice(&Message::Master(true).to_bytes());
        server.write(&bytes).unwrap();

        client.poll().unwrap();
        assert_eq!(client.pointer_sync(), Some((5, -2)));
        assert!(!client.is_master());

        client.send_pointer(105, 98, true);
        client.poll().unwrap();
        assert_eq!(client.pointer_sync(), Some((1, 1)));

        client.send_pointer(0, 0, false);
        client.poll().unwrap();
        assert_eq!(client.pointer_sync(), None);
        assert!(client.is_master());

        let sent = drain(&mut server);
        assert_eq!(&sent[..5], &Message::PointerSync { dx: 105, dy: 98 }.to_bytes()[..]);
    }

    #[test]
    fn control_token_waits_until_taken() {
        let (mut client, mut server) = connected();
        let mut bytes = Message::Data {
            command: Command::Control,
            payload: b"one",
        }
        .to_bytes()
        .to_vec();
        bytes.extend_from_slice(
            &Message::Data {
                command: Command::Control,
                payload: b"two",
            }
            .to_bytes(),
        );
        server.write(&bytes).unwrap();

        client.poll().unwrap();
        client.poll().unwrap();
        assert_eq!(client.take_control().as_deref(), Some(&b"one"[..]));
        assert_eq!(client.take_control(), None);
        client.poll().unwrap();
        assert_eq!(client.take_control().as_deref(), Some(&b"two"[..]));
    }

    #[test]
    fn zero_length_token_is_fatal() {
        let (mut client, mut server) = connected();
        server.write(&[Command::Clipboard as u8, 0, 0, 0, 0]).unwrap();
        assert!(matches!(client.poll(), Err(VbError::TokenSize { size: 0, .. })));
    }

    #[test]
    fn cursor_pixels_are_cached_by_hash() {
        let (mut client, mut server) = connected();
        let header = Message::Cursor {
            hash: 77,
            width: 2,
            height: 1,
            xhot: 1,
            yhot: 0,
        };
        let mut bytes = header.to_bytes().to_vec();
        bytes.extend_from_slice(&[0xFF, 0, 0, 0]);
        server.write(&bytes).unwrap();
        client.poll().unwrap();
        // second pixel still missing
        assert!(client.cursor().is_none());
        assert!(!client.received(Command::Cursor));

        server.write(&[0xFF, 0xFF, 0xFF, 0xFF]).unwrap();
        client.poll().unwrap();
        assert!(client.received(Command::Cursor));
        let cursor = client.cursor().unwrap();
        assert_eq!(cursor.pixels, vec![0xFF000000, 0xFFFFFFFF]);
        assert_eq!((cursor.xhot, cursor.yhot), (1, 0));

        // hidden, then the cached shape again without pixels
        server.write(&Message::Cursor { hash: 0, width: 0, height: 0, xhot: 0, yhot: 0 }.to_bytes()).unwrap();
        client.poll().unwrap();
        assert!(client.cursor().is_none());
        server.write(&header.to_bytes()).unwrap();
        client.poll().unwrap();
        assert_eq!(client.cursor().unwrap().pixels.len(), 2);
    }

    #[test]
    fn frame_is_decoded_and_acknowledged() {
        let source = Image::from_fn(20, 10, |x, y| if (x + y) % 3 == 0 { 0x3366CC } else { 0xFFFFFF });
        let mut grid = CaptureGrid::new(Quality::new(8, 8));
        grid.set_image(source.view());
        let mut enc = Tycho::new();
        enc.begin_frame(&grid);
        let mut stream = Buffer::with_capacity(1 << 16);
        assert!(enc.encode(&mut stream).is_ready());

        let (mut client, mut server) = connected();
        let mut bytes = Message::Image { width: 20, height: 10 }.to_bytes().to_vec();
        bytes.extend_from_slice(stream.readable());
        server.write(&bytes).unwrap();

        client.poll().unwrap();
        assert_eq!(client.frames(), 1);
        assert!(client.received(Command::Image));
        assert_eq!(client.image(), &source.reconstructed());
        assert_eq!(drain(&mut server), vec![Command::Image as u8]);
    }

    #[test]
    fn empty_image_is_corrupt() {
        let (mut client, mut server) = connected();
        server.write(&Message::Image { width: 0, height: 5 }.to_bytes()).unwrap();
        assert!(matches!(client.poll(), Err(VbError::CorruptStream(_))));
    }

    #[test]
    fn stop_ends_the_session() {
        let (mut client, mut server) = connected();
        server.write(&[Command::Stop as u8]).unwrap();
        assert!(matches!(client.poll(), Err(VbError::Stopped)));
    }

    #[test]
    fn writes_coalesce_after_first_frame() {
        let (pipe, mut server) = pipe_pair("server", 1 << 20);
        let mut client = CoreClient::with_send_interval(pipe, Duration::from_millis(30));
        let t0 = Instant::now();
        grant(&mut client, &mut server, 2, 2);

        // first frame: a 1x1 image
        let mut grid = CaptureGrid::new(Quality::new(8, 8));
        let px = Image::from_fn(1, 1, |_, _| 0);
        grid.set_image(px.view());
        let mut enc = Tycho::new();
        enc.begin_frame(&grid);
        let mut stream = Buffer::with_capacity(256);
        assert!(enc.encode(&mut stream).is_ready());
        let mut bytes = Message::Image { width: 1, height: 1 }.to_bytes().to_vec();
        bytes.extend_from_slice(stream.readable());
        server.write(&bytes).unwrap();

        client.poll_at(t0).unwrap();
        assert_eq!(drain(&mut server), vec![Command::Image as u8]);

        client.send_button(3, true);
        client.poll_at(t0 + Duration::from_millis(10)).unwrap();
        assert!(drain(&mut server).is_empty());
        client.poll_at(t0 + Duration::from_millis(31)).unwrap();
        assert_eq!(drain(&mut server), vec![Command::Button as u8, 3, 1]);
    }

    #[test]
    fn flush_writes_without_poll() {
        let (mut client, mut server) = connected();
        client.poll().unwrap();
        client.send_stop();
        assert!(drain(&mut server).is_empty());
        assert!(client.flush().unwrap());
        assert_eq!(drain(&mut server), vec![Command::Stop as u8]);
    }

    #[test]
    fn writes_are_wanted_once_the_interval_allows() {
        let (mut client, _server) = connected();
        assert_eq!(client.wants(Instant::now()), Wants { read: true, write: false });

        let t0 = Instant::now();
        client.poll_at(t0).unwrap();
        client.send_stop();
        assert!(client.wants(t0).write);

        client.send_interval = Duration::from_secs(1);
        client.last_write = Some(t0);
        assert!(!client.wants(t0).write);
        assert!(client.wants(t0).read);
        assert_eq!(client.next_write(t0), Some(t0 + Duration::from_secs(1)));

        let later = t0 + Duration::from_secs(1);
        assert_eq!(client.next_write(later), None);
        assert!(client.wants(later).write);
    }
}
