//! Stand-in collaborators for running the server without a real
//! display server, input device or credential store.
//!
//! | Collaborator   | Type          | Behaviour                                  |
//! |----------------|---------------|--------------------------------------------|
//! | `Display`      | `TestPattern` | colour bars with a block sweeping across   |
//! | `InputSink`    | `LoggingInput`| logs events, moves the shared pointer      |
//! | `Authenticator`| `StaticAuth`  | passwords from `[[auth.users]]`            |
//! | `AccessList`   | `MemoryAcl`   | the `[acl]` table                          |

use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;

use tracing::{debug, info};
use vbridge_core::{
    AuthOutcome, Authenticator, Backends, CursorImage, Display, Image, ImageView, InputSink, KeySymbol,
    MemoryAcl, Verdict,
};

use crate::config::{ServerFileConfig, UserEntry};

/// Pointer position shared by the pattern and the input sink.
pub type Pointer = Rc<Cell<(i32, i32)>>;

const BARS: [u32; 8] = [
    0xFFFFFF, 0xFFFF00, 0x00FFFF, 0x00FF00, 0xFF00FF, 0xFF0000, 0x0000FF, 0x000000,
];

const BLOCK: u32 = 24;

/// Build every collaborator from the file configuration.
pub fn build(config: &ServerFileConfig) -> Backends {
    let (width, height) = config.screen_size();
    let pointer = Pointer::new(Cell::new((width as i32 / 2, height as i32 / 2)));
    let acl: MemoryAcl = config.acl.iter().map(|(k, v)| (k.clone(), *v)).collect();
    Backends {
        display: Box::new(TestPattern::new(width, height, Rc::clone(&pointer))),
        input: Box::new(LoggingInput::new(pointer, width, height)),
        auth: Box::new(StaticAuth::new(config.auth.users.clone())),
        acl: Box::new(acl),
    }
}

// ── TestPattern ──────────────────────────────────────────────────

/// Synthetic screen: vertical colour bars with a grey block that moves
/// a few pixels on every grab.
pub struct TestPattern {
    image: Image,
    frame: u32,
    pointer: Pointer,
    cursor: CursorImage,
}

impl TestPattern {
    pub fn new(width: u32, height: u32, pointer: Pointer) -> Self {
        Self {
            image: Image::new(width, height),
            frame: 0,
            pointer,
            cursor: arrow(),
        }
    }

    fn draw(&mut self) {
        let (w, h) = (self.image.width(), self.image.height());
        let span = w.saturating_sub(BLOCK).max(1);
        let bx = (self.frame * 4) % span;
        let by = h.saturating_sub(BLOCK) / 2;
        for y in 0..h {
            for x in 0..w {
                let inside = (bx..bx + BLOCK).contains(&x) && (by..by + BLOCK).contains(&y);
                let c = if inside {
                    0x808080
                } else {
                    BARS[(x * BARS.len() as u32 / w) as usize]
                };
                self.image.set_pixel(x, y, c);
            }
        }
    }
}

impl Display for TestPattern {
    fn grab(&mut self) -> Option<ImageView<'_>> {
        self.draw();
        self.frame = self.frame.wrapping_add(1);
        Some(self.image.view())
    }

    fn pointer(&self) -> (i32, i32) {
        self.pointer.get()
    }

    fn cursor(&mut self) -> Option<CursorImage> {
        Some(self.cursor.clone())
    }

    fn request_resize(&mut self, width: u16, height: u16) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        let (width, height) = (u32::from(width).max(8), u32::from(height).max(8));
        if self.image.resize(width, height) {
            info!(width, height, "test pattern resized");
        }
        false
    }

    fn take_clipboard(&mut self) -> Option<Vec<u8>> {
        None
    }

    fn set_clipboard(&mut self, data: &[u8]) {
        info!(bytes = data.len(), "clipboard received");
    }
}

/// An 8x8 arrow: black outline, white fill, transparent elsewhere.
fn arrow() -> CursorImage {
    let pixels = (0..64)
        .map(|i| {
            let (x, y) = (i % 8, i / 8);
            if x > y {
                0x00000000
            } else if x == 0 || x == y || y == 7 {
                0xFF000000
            } else {
                0xFFFFFFFF
            }
        })
        .collect();
    CursorImage {
        width: 8,
        height: 8,
        xhot: 0,
        yhot: 0,
        pixels,
    }
}

// ── LoggingInput ─────────────────────────────────────────────────

/// Records injected input in the log and tracks what is held down.
pub struct LoggingInput {
    pointer: Pointer,
    bounds: (i32, i32),
    buttons: BTreeSet<u8>,
    keys: BTreeSet<u8>,
}

impl LoggingInput {
    pub fn new(pointer: Pointer, width: u32, height: u32) -> Self {
        Self {
            pointer,
            bounds: (width as i32 - 1, height as i32 - 1),
            buttons: BTreeSet::new(),
            keys: BTreeSet::new(),
        }
    }
}

impl InputSink for LoggingInput {
    fn pointer(&mut self, x: i32, y: i32, relative: bool) {
        let (px, py) = self.pointer.get();
        let (x, y) = if relative { (px + x, py + y) } else { (x, y) };
        let pos = (x.clamp(0, self.bounds.0), y.clamp(0, self.bounds.1));
        debug!(x = pos.0, y = pos.1, relative, "pointer");
        self.pointer.set(pos);
    }

    fn button(&mut self, button: u8, pressed: bool) {
        debug!(button, pressed, "button");
        if pressed {
            self.buttons.insert(button);
        } else {
            self.buttons.remove(&button);
        }
    }

    fn key(&mut self, keycode: u8, symbol: KeySymbol, pressed: bool) {
        debug!(keycode, ?symbol, pressed, "key");
        if pressed {
            self.keys.insert(keycode);
        } else {
            self.keys.remove(&keycode);
        }
    }

    fn release_all(&mut self) {
        if self.needs_release() {
            debug!(buttons = self.buttons.len(), keys = self.keys.len(), "release all");
        }
        self.buttons.clear();
        self.keys.clear();
    }

    fn needs_release(&self) -> bool {
        !self.buttons.is_empty() || !self.keys.is_empty()
    }
}

// ── StaticAuth ───────────────────────────────────────────────────

/// Password logins from the configuration. Certificates and tokens are
/// not supported and always rejected.
pub struct StaticAuth {
    users: Vec<UserEntry>,
}

impl StaticAuth {
    pub fn new(users: Vec<UserEntry>) -> Self {
        Self { users }
    }
}

impl Authenticator for StaticAuth {
    fn certificate(&mut self, peer: &str) -> Verdict {
        debug!(client = peer, "certificate login not configured");
        Verdict::Rejected
    }

    fn password(&mut self, name: &str, pass: &[u8]) -> Verdict {
        let found = self
            .users
            .iter()
            .find(|u| u.name == name && u.password.as_bytes() == pass);
        match found {
            Some(user) => Verdict::Accepted {
                identity: user.name.clone(),
                level: user.level.min(2),
            },
            None => Verdict::Rejected,
        }
    }

    fn token(&mut self, peer: &str, _blob: &[u8]) -> AuthOutcome {
        debug!(client = peer, "token login not configured");
        AuthOutcome {
            verdict: Verdict::Rejected,
            reply: None,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use vbridge_core::AccessList;

    fn pattern() -> TestPattern {
        TestPattern::new(64, 32, Pointer::new(Cell::new((0, 0))))
    }

    #[test]
    fn pattern_moves_between_grabs() {
        let mut display = pattern();
        let first: Vec<u32> = {
            let view = display.grab().unwrap();
            (0..64).map(|x| view.pixel(x, 16)).collect()
        };
        let second: Vec<u32> = {
            let view = display.grab().unwrap();
            (0..64).map(|x| view.pixel(x, 16)).collect()
        };
        assert_ne!(first, second);
        assert_eq!(first[0], 0x808080);
        assert_eq!(second[0], 0xFFFFFF);
        assert_eq!(first[63], 0x000000);
    }

    #[test]
    fn pattern_resizes_on_request() {
        let mut display = pattern();
        assert!(!display.request_resize(100, 50));
        let view = display.grab().unwrap();
        assert_eq!((view.width(), view.height()), (100, 50));
        assert!(!display.request_resize(0, 0));
    }

    #[test]
    fn arrow_is_visible() {
        let cursor = arrow();
        assert_eq!(cursor.pixels.len(), 64);
        assert_ne!(cursor.hash(), 0);
        assert_eq!(cursor.pixels[0], 0xFF000000);
        assert_eq!(cursor.pixels[7], 0x00000000);
    }

    #[test]
    fn input_tracks_held_keys_and_pointer() {
        let pointer = Pointer::new(Cell::new((10, 10)));
        let mut input = LoggingInput::new(Rc::clone(&pointer), 64, 32);

        input.pointer(-20, 5, true);
        assert_eq!(pointer.get(), (0, 15));
        input.pointer(100, 100, false);
        assert_eq!(pointer.get(), (63, 31));

        input.button(1, true);
        input.key(30, KeySymbol::Ucs('a' as u32), true);
        assert!(input.needs_release());
        input.button(1, false);
        assert!(input.needs_release());
        input.release_all();
        assert!(!input.needs_release());
    }

    #[test]
    fn static_auth_checks_passwords() {
        let mut auth = StaticAuth::new(vec![UserEntry {
            name: "alice".into(),
            password: "secret".into(),
            level: 5,
        }]);
        assert_eq!(
            auth.password("alice", b"secret"),
            Verdict::Accepted {
                identity: "alice".into(),
                level: 2
            }
        );
        assert_eq!(auth.password("alice", b"wrong"), Verdict::Rejected);
        assert_eq!(auth.password("bob", b"secret"), Verdict::Rejected);
        assert_eq!(auth.certificate("peer"), Verdict::Rejected);
        assert_eq!(auth.token("peer", b"blob").verdict, Verdict::Rejected);
    }

    #[test]
    fn build_uses_config() {
        let mut config = ServerFileConfig::default();
        config.acl.insert("bob".into(), 1);
        let backends = build(&config);
        assert_eq!(backends.acl.level("bob"), 1);
        assert_eq!(backends.display.pointer(), (320, 240));
    }
}
