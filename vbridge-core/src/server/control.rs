//! Text commands received over the control channel.
//!
//! | Command               | Reply                                     |
//! |-----------------------|-------------------------------------------|
//! | `version`, `info`     | `VBridge <version>`                       |
//! | `acl`                 | `name level` lines, or `empty`            |
//! | `acl <name>`          | level digit                               |
//! | `acl <name> <level>`  | none, or `invalid level`                  |
//! | `log <text>`          | none; each line goes to the server log    |
//! | `user`                | `transport identity access` lines         |
//! | `user <name>`         | access digit, or `invalid user`           |
//! | `user <name> <level>` | none, or `invalid user` / `invalid access`|
//! | `stat`, `tcp`         | `not available`, or `no master`           |
//! | `close [name]`        | none                                      |
//!
//! Only level-2 identities may run commands; anything else is dropped.

use tracing::{debug, info};

use crate::command::CommandSet;
use crate::netio::Transport;
use crate::token;

use super::{Effect, Server};

/// Cursor over the whitespace-separated words of a command.
struct Words<'a> {
    rest: &'a str,
}

impl<'a> Words<'a> {
    fn new(text: &'a str) -> Self {
        Self { rest: text }
    }

    /// The next word; empty once the text is exhausted.
    fn next_word(&mut self) -> &'a str {
        let text = self.rest.trim_start();
        let end = text.find(char::is_whitespace).unwrap_or(text.len());
        let (word, rest) = text.split_at(end);
        let mut chars = rest.chars();
        chars.next();
        self.rest = chars.as_str();
        word
    }

    fn rest(&self) -> &'a str {
        self.rest
    }
}

/// Parse a single-digit level `0..=2`.
fn parse_level(word: &str) -> Option<u8> {
    match word.as_bytes() {
        [d @ b'0'..=b'2'] => Some(d - b'0'),
        _ => None,
    }
}

/// Rows of `columns... digit`, each column padded to its widest entry
/// plus one space.
fn table<const N: usize>(rows: &[([&str; N], u8)]) -> String {
    let mut widths = [0usize; N];
    for (cols, _) in rows {
        for (w, col) in widths.iter_mut().zip(cols) {
            *w = (*w).max(col.len());
        }
    }
    let mut out = String::new();
    for (cols, digit) in rows {
        for (w, col) in widths.iter().zip(cols) {
            out.push_str(&format!("{col:<width$}", width = w + 1));
        }
        out.push_str(&format!("{digit}\n"));
    }
    out
}

impl<T: Transport> Server<T> {
    /// Run the control command connection `i` sent, if one is waiting.
    pub(super) fn run_control(&mut self, i: usize) {
        let Some(raw) = self.clients[i].take_control() else {
            return;
        };
        if self.clients[i].level != 2 {
            debug!(client = %self.clients[i].name(), "control ignored");
            return;
        }

        let bytes = raw.strip_suffix(&[0]).unwrap_or(raw.as_slice());
        let text = String::from_utf8_lossy(bytes);
        let reply = self.control(i, &text);

        let conn = &mut self.clients[i];
        if let Some(reply) = reply.as_deref().and_then(|r| token::from_bytes(r.as_bytes())) {
            conn.control_send = Some(reply);
            conn.to_send |= CommandSet::CONTROL;
        }
    }

    fn control(&mut self, i: usize, text: &str) -> Option<String> {
        let mut words = Words::new(text);
        match words.next_word() {
            "version" | "info" => Some(format!("VBridge {}", env!("CARGO_PKG_VERSION"))),
            "acl" => self.control_acl(&mut words),
            "log" => {
                let name = self.clients[i].name();
                for line in words.rest().lines().map(str::trim).filter(|l| !l.is_empty()) {
                    info!(client = %name, "{line}");
                }
                None
            }
            "user" => self.control_user(i, &mut words),
            "stat" | "tcp" => {
                if words.next_word() == "master" && self.session.master.holder.is_none() {
                    return Some("no master".into());
                }
                Some("not available".into())
            }
            "close" => {
                let name = words.next_word();
                let caller = self.clients[i].id;
                for conn in self.clients.iter_mut().filter(|c| c.id != caller) {
                    if name.is_empty() || conn.identity.as_deref() == Some(name) {
                        conn.close = true;
                    }
                }
                None
            }
            _ => None,
        }
    }

    fn control_acl(&mut self, words: &mut Words<'_>) -> Option<String> {
        let name = words.next_word();
        if name.is_empty() {
            let entries = self.session.acl.entries();
            if entries.is_empty() {
                return Some("empty".into());
            }
            let rows: Vec<_> = entries.iter().map(|(n, l)| ([n.as_str()], *l)).collect();
            return Some(table(&rows));
        }

        let level = words.next_word();
        if level.chars().count() != 1 {
            return Some(self.session.acl.level(name).to_string());
        }
        match parse_level(level) {
            Some(level) => {
                info!(identity = name, level, "acl updated");
                self.session.acl.set(name, level);
                None
            }
            None => Some("invalid level".into()),
        }
    }

    fn control_user(&mut self, i: usize, words: &mut Words<'_>) -> Option<String> {
        let name = words.next_word();
        if name.is_empty() {
            let rows: Vec<_> = self
                .clients
                .iter()
                .map(|c| ([c.name(), c.identity.as_deref().unwrap_or("")], c.access))
                .collect();
            return Some(table(&rows));
        }

        let Some(found) = self.clients.iter().find(|c| c.identity.as_deref() == Some(name)) else {
            return Some("invalid user".into());
        };

        let access = words.next_word();
        if access.chars().count() != 1 {
            return Some(found.access.to_string());
        }
        let Some(access) = parse_level(access) else {
            return Some("invalid access".into());
        };

        let reason = self.clients[i].name().to_string();
        for k in 0..self.clients.len() {
            if self.clients[k].identity.as_deref() != Some(name) {
                continue;
            }
            let mut effects: Vec<Effect> = Vec::new();
            self.clients[k].set_access(&mut self.session, access, &reason, &mut effects);
            self.apply(effects);
        }
        None
    }
}

// ── Tests ────────────────────────────────────────────────────────
