//! # Tycho tile codec
//!
//! Lossy, context-modelled image codec for screen content.
//!
//! ```text
//!  capture ──► CaptureGrid::set_image ──► shared TileGrid
//!                                             │ copy per frame
//!                                             ▼
//!            Tycho (server) ── tiles vs old ─► count | palette | index ─► bytes
//!                                                                          │
//!            Tycho (client) ◄──────────────── same models, same order ◄────┘
//!                 │
//!                 ▼
//!            ImageViewMut
//! ```
//!
//! The image is cut into 8x8 tiles. Each tile becomes a palette of at
//! most 12 luma/chroma colours plus a per-pixel index map, found by
//! quantising colours to a bit depth between the configured quality
//! bounds. Changed tiles go out coarse first and are refined in later
//! frames while they stay unchanged.
//!
//! A frame stream is one record per tile in row-major order followed by
//! a 4-byte coder trailer:
//!
//! | Field   | Width                 | Context                      |
//! |---------|-----------------------|------------------------------|
//! | count   | 4 bits                | last three counts            |
//! | palette | 8 bits x 3 x count    | previous byte of the channel |
//! | index   | 1..4 bits x 63        | left, up, up-left indices    |
//!
//! `count == 0` means the tile is unchanged for this recipient. The
//! index of pixel 0 is always 0 and is not coded.
//!
//! Both directions suspend when the buffer runs out and resume on the
//! next call with the same tile.

pub mod coder;
pub mod color;
pub mod decoder;
pub mod encoder;
pub mod model;
pub mod tile;

pub use encoder::{CaptureGrid, Quality};
pub use tile::{MAX_COLORS, TILE_SIZE, Tile, TileGrid};

use coder::Coder;
use model::Models;

/// How far the current tile's record got before the buffer ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Resume {
    /// Next up: the colour count.
    #[default]
    Count,
    /// Count coded; `k` palette bytes done.
    Palette { count: u8, k: u8 },
    /// Palette coded; index map done up to `pos`, largest index `pmax`.
    Index { count: u8, pos: u8, pmax: u8 },
}

/// One codec session. A session either encodes (server, one per
/// client) or decodes (client), never both.
#[derive(Debug, Clone)]
pub struct Tycho {
    /// Tiles being coded this frame.
    tiles: TileGrid,
    /// What the recipient already holds (encode side only).
    old: TileGrid,
    models: Models,
    coder: Coder,
    resume: Resume,
    /// Next tile of the current frame.
    cursor: usize,
    /// Tiles of the current frame carried with a palette so far.
    coded: usize,
    /// Coder start/trailer still to do.
    flush: bool,
    /// The frame size changed: repaint every tile.
    redraw: bool,
}

impl Default for Tycho {
    fn default() -> Self {
        Self::new()
    }
}

impl Tycho {
    pub fn new() -> Self {
        Self {
            tiles: TileGrid::default(),
            old: TileGrid::default(),
            models: Models::new(),
            coder: Coder::default(),
            resume: Resume::Count,
            cursor: 0,
            coded: 0,
            flush: false,
            redraw: false,
        }
    }

    /// Begin a frame of `width x height`.
    ///
    /// Models and their contexts carry over; coder and cursor restart.
    pub fn setup(&mut self, width: u32, height: u32) {
        self.coder.reset();
        self.resume = Resume::Count;
        self.cursor = 0;
        self.coded = 0;
        self.flush = true;
        self.redraw = self.tiles.resize(width, height);
    }

    pub fn width(&self) -> u32 {
        self.tiles.width()
    }

    pub fn height(&self) -> u32 {
        self.tiles.height()
    }

    /// Tiles of the current frame.
    pub fn grid(&self) -> &TileGrid {
        &self.tiles
    }

    /// Whether the current frame repaints every tile.
    pub fn redraw(&self) -> bool {
        self.redraw
    }

    /// Tiles of the current frame that were not skipped as unchanged.
    pub fn coded_tiles(&self) -> usize {
        self.coded
    }

    /// Whether the current frame has been fully coded.
    pub fn is_frame_done(&self) -> bool {
        self.cursor >= self.tiles.len() && !self.flush
    }
}

// ── Tests ────────────────────────────────────────────────────────
