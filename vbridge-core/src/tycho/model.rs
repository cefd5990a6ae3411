//! Adaptive probability tables.

/// Initial counter value: even odds.
const HALF: u16 = 1 << 15;

/// Adaptation rate: counters move 1/64 of the way toward each bit.
pub const RATE_SHIFT: u32 = 6;

/// Context-indexed table of 16-bit counters, one per
/// (binary-tree node, context) pair.
///
/// `bits` is the tree depth, `mask + 1` the number of contexts.
#[derive(Debug, Clone)]
pub struct Model {
    bits: u32,
    mask: u32,
    p: Box<[u16]>,
}

impl Model {
    pub fn new(bits: u32, mask: u32) -> Self {
        let len = (1usize << bits) * (mask as usize + 1);
        Self {
            bits,
            mask,
            p: vec![HALF; len].into_boxed_slice(),
        }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// The `1 << bits` tree-node counters for `ctx`.
    pub fn nodes(&mut self, ctx: u32) -> &mut [u16] {
        let start = ((ctx & self.mask) as usize) << self.bits;
        &mut self.p[start..start + (1 << self.bits)]
    }
}

/// Move `p` toward the observed `bit`.
pub fn adapt(p: u16, bit: u32) -> u16 {
    let p = p as i32;
    let target = (bit as i32) << 16;
    (p + ((target - p) >> RATE_SHIFT)) as u16
}

// ── Model families ───────────────────────────────────────────────

/// Bits of the colour-count symbol.
pub const COUNT_BITS: u32 = 4;

/// Index symbol width keyed by the largest index seen so far in the
/// tile; always wide enough for `pmax + 1`.
pub const INDEX_BITS: [u32; 14] = [1, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4];

/// All models of one codec session plus their rolling contexts.
#[derive(Debug, Clone)]
pub struct Models {
    pub count: Model,
    pub color: [Model; 3],
    pub index: [Model; 12],
    /// Last three colour counts, 4 bits each.
    pub count_ctx: u32,
    /// Previous byte of each channel.
    pub color_ctx: [u32; 3],
}

impl Models {
    pub fn new() -> Self {
        Self {
            count: Model::new(COUNT_BITS, 0xFFF),
            color: std::array::from_fn(|_| Model::new(8, 0xFF)),
            index: std::array::from_fn(|_| Model::new(4, 0xFFF)),
            count_ctx: 0,
            color_ctx: [0; 3],
        }
    }

    /// Fold a coded colour count into the count history.
    pub fn push_count(&mut self, count: u8) {
        self.count_ctx = ((self.count_ctx << 4) | count as u32) & 0xFFF;
    }
}

impl Default for Models {
    fn default() -> Self {
        Self::new()
    }
}

/// Context for the palette index at `pos`: left, upper and upper-left
/// neighbours packed as `left | up << 4 | upleft << 8`.
pub fn index_context(index: &[u8; 64], pos: usize) -> u32 {
    let (i, j) = (pos % 8, pos / 8);
    let mut ctx = 0;
    if i > 0 {
        ctx |= index[pos - 1] as u32;
    }
    if j > 0 {
        ctx |= (index[pos - 8] as u32) << 4;
    }
    if i > 0 && j > 0 {
        ctx |= (index[pos - 9] as u32) << 8;
    }
    ctx
}
