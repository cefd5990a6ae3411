//! Tiles and tile grids.

/// Tile edge in pixels.
pub const TILE_SIZE: u32 = 8;

/// Pixels per tile.
pub const TILE_PIXELS: usize = (TILE_SIZE * TILE_SIZE) as usize;

/// Largest palette a tile may carry.
pub const MAX_COLORS: usize = 12;

// ── Tile ─────────────────────────────────────────────────────────

/// Coded state of one 8x8 block, kept across frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// Rolling hash of the raw pixels, low bit forced to 1; 0 = never hashed.
    pub hash: u32,
    /// Palette size: 0 = nothing coded yet, 1 = flat, 2..=12 = indexed.
    pub count: u8,
    /// Quantisation depth the palette was built at.
    pub depth: u8,
    /// Frames since the last refinement attempt.
    pub depth_step: u8,
    /// No further refinement for the current content.
    pub depth_stop: bool,
    /// `count` luma/chroma triples.
    pub colors: [u8; MAX_COLORS * 3],
    /// Palette index per pixel, meaningful when `count > 1`.
    pub index: [u8; TILE_PIXELS],
}

impl Default for Tile {
    fn default() -> Self {
        Self {
            hash: 0,
            count: 0,
            depth: 0,
            depth_step: 0,
            depth_stop: false,
            colors: [0; MAX_COLORS * 3],
            index: [0; TILE_PIXELS],
        }
    }
}

impl Tile {
    /// Whether both tiles would paint the same pixels.
    pub fn same_content(&self, other: &Tile) -> bool {
        if self.count != other.count {
            return false;
        }
        let n = self.count as usize * 3;
        if self.colors[..n] != other.colors[..n] {
            return false;
        }
        self.count <= 1 || self.index == other.index
    }

    /// Palette entry `k` as `[y, u, v]`.
    pub fn color(&self, k: usize) -> [u8; 3] {
        [self.colors[k * 3], self.colors[k * 3 + 1], self.colors[k * 3 + 2]]
    }

    /// Palette index of pixel `pos`; flat tiles always use entry 0.
    pub fn index_at(&self, pos: usize) -> usize {
        if self.count > 1 { self.index[pos] as usize } else { 0 }
    }
}

// ── TileGrid ─────────────────────────────────────────────────────

/// Row-major grid of `ceil(w/8) x ceil(h/8)` tiles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileGrid {
    width: u32,
    height: u32,
    cols: u32,
    rows: u32,
    tiles: Vec<Tile>,
}

fn tiles_for(n: u32) -> u32 {
    n.div_ceil(TILE_SIZE)
}

impl TileGrid {
    pub fn new(width: u32, height: u32) -> Self {
        let (cols, rows) = (tiles_for(width), tiles_for(height));
        Self {
            width,
            height,
            cols,
            rows,
            tiles: vec![Tile::default(); (cols * rows) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tile(&self, n: usize) -> &Tile {
        &self.tiles[n]
    }

    pub fn tile_mut(&mut self, n: usize) -> &mut Tile {
        &mut self.tiles[n]
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Pixel origin and visible size of tile `n`.
    pub fn extent(&self, n: usize) -> (u32, u32, u32, u32) {
        let (col, row) = (n as u32 % self.cols, n as u32 / self.cols);
        let w = if col != self.width / TILE_SIZE { TILE_SIZE } else { self.width % TILE_SIZE };
        let h = if row != self.height / TILE_SIZE { TILE_SIZE } else { self.height % TILE_SIZE };
        (col * TILE_SIZE, row * TILE_SIZE, w, h)
    }

    /// Change the logical size.
    ///
    /// Returns `false` when nothing changed. When the tile counts stay
    /// the same only the size is updated; otherwise a fresh grid keeps
    /// the overlapping tiles in place and zeroes the rest.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == self.width && height == self.height {
            return false;
        }

        let (cols, rows) = (tiles_for(width), tiles_for(height));
        if cols == self.cols && rows == self.rows {
            self.width = width;
            self.height = height;
            return true;
        }

        let mut grid = TileGrid::new(width, height);
        for row in 0..rows.min(self.rows) {
            for col in 0..cols.min(self.cols) {
                grid.tiles[(row * cols + col) as usize] = self.tiles[(row * self.cols + col) as usize];
            }
        }
        *self = grid;
        true
    }

    /// Become a copy of `other`, reusing the allocation.
    pub fn copy_from(&mut self, other: &TileGrid) {
        self.clone_from(other);
    }
}

// ── Tests ────────────────────────────────────────────────────────
