//! Bounded byte region with independent read and write cursors.
//!
//! ```text
//!  0            read           write              capacity
//!  ├────────────┼──────────────┼──────────────────┤
//!  │  consumed  │  read_size   │   write_size     │
//! ```
//!
//! Every accessor checks the remaining size and reports a short
//! buffer through `Option` / `bool`, so callers decide whether to
//! suspend. Multi-byte scalars are big-endian on the wire.

use bytes::Buf;

/// Cursor alignment used by [`Buffer::shift`].
const ALIGN: usize = 16;

const fn align_up(n: usize) -> usize {
    (n + ALIGN - 1) & !(ALIGN - 1)
}

const fn align_down(n: usize) -> usize {
    n & !(ALIGN - 1)
}

// ── Buffer ───────────────────────────────────────────────────────

/// A contiguous region with `0 <= read <= write <= capacity`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    data: Box<[u8]>,
    read: usize,
    write: usize,
}

impl Buffer {
    /// An empty buffer able to hold `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            read: 0,
            write: 0,
        }
    }

    /// A buffer whose readable content is exactly `bytes`.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let write = bytes.len();
        Self {
            data: bytes.into_boxed_slice(),
            read: 0,
            write,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes written but not yet read.
    pub fn read_size(&self) -> usize {
        self.write - self.read
    }

    /// Free space after the write cursor.
    pub fn write_size(&self) -> usize {
        self.data.len() - self.write
    }

    /// `true` once nothing is left to read.
    pub fn is_drained(&self) -> bool {
        self.read == self.write
    }

    /// `true` while nothing has been read since the last reset.
    pub fn is_untouched(&self) -> bool {
        self.read == 0
    }

    /// Reset both cursors to the start, discarding content.
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
    }

    /// Compact the buffer.
    ///
    /// A drained buffer resets both cursors. Otherwise the unread bytes
    /// are moved to the front when the aligned block holding them is
    /// smaller than the gap in front of it.
    pub fn shift(&mut self) {
        if self.read == self.write {
            self.clear();
            return;
        }

        let src = align_down(self.read);
        let size = align_up(self.write - src);

        if size < src {
            let end = (src + size).min(self.data.len());
            self.data.copy_within(src..end, 0);
            self.read -= src;
            self.write -= src;
        }
    }

    /// Unread bytes.
    pub fn readable(&self) -> &[u8] {
        &self.data[self.read..self.write]
    }

    /// Free space after the write cursor.
    pub fn writable(&mut self) -> &mut [u8] {
        &mut self.data[self.write..]
    }

    /// Mark `n` unread bytes as consumed.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.read_size());
        self.read += n.min(self.read_size());
    }

    /// Mark `n` bytes of free space as written.
    pub fn commit(&mut self, n: usize) {
        debug_assert!(n <= self.write_size());
        self.write += n.min(self.write_size());
    }

    /// Move `min(src.read_size(), self.write_size())` bytes from `src`.
    pub fn copy_from(&mut self, src: &mut Buffer) -> usize {
        let n = src.read_size().min(self.write_size());
        self.data[self.write..self.write + n].copy_from_slice(&src.data[src.read..src.read + n]);
        self.write += n;
        src.read += n;
        n
    }

    /// Append as much of `bytes` as fits; returns the count written.
    pub fn fill_from(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.write_size());
        self.data[self.write..self.write + n].copy_from_slice(&bytes[..n]);
        self.write += n;
        n
    }

    /// Consume the remaining content into a `Vec`.
    pub fn into_vec(self) -> Vec<u8> {
        if self.read == 0 && self.write == self.data.len() {
            return self.data.into_vec();
        }
        self.data[self.read..self.write].to_vec()
    }

    // ── Scalars ──────────────────────────────────────────────────

    /// Read exactly `N` bytes, or nothing.
    pub fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        if self.read_size() < N {
            return None;
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.read..self.read + N]);
        self.read += N;
        Some(out)
    }

    pub fn get_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|b| b[0])
    }

    pub fn get_u16(&mut self) -> Option<u16> {
        self.take::<2>().map(|b| (&b[..]).get_u16())
    }

    pub fn get_i16(&mut self) -> Option<i16> {
        self.take::<2>().map(|b| (&b[..]).get_i16())
    }

    pub fn get_u32(&mut self) -> Option<u32> {
        self.take::<4>().map(|b| (&b[..]).get_u32())
    }

    /// Write all of `bytes`, or nothing.
    pub fn put_slice(&mut self, bytes: &[u8]) -> bool {
        if self.write_size() < bytes.len() {
            return false;
        }
        self.fill_from(bytes);
        true
    }

    pub fn put_u8(&mut self, v: u8) -> bool {
        self.put_slice(&[v])
    }

    pub fn put_u16(&mut self, v: u16) -> bool {
        self.put_slice(&v.to_be_bytes())
    }

    pub fn put_u32(&mut self, v: u32) -> bool {
        self.put_slice(&v.to_be_bytes())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_are_big_endian() {
        let mut buf = Buffer::with_capacity(16);
        assert!(buf.put_u8(0xAB));
        assert!(buf.put_u16(0x1234));
        assert!(buf.put_u32(0xDEADBEEF));
        assert_eq!(buf.readable(), &[0xAB, 0x12, 0x34, 0xDE, 0xAD, 0xBE, 0xEF]);

        assert_eq!(buf.get_u8(), Some(0xAB));
        assert_eq!(buf.get_u16(), Some(0x1234));
        assert_eq!(buf.get_u32(), Some(0xDEADBEEF));
        assert_eq!(buf.get_u8(), None);
    }

    #[test]
    fn short_reads_and_writes_do_not_move_cursors() {
        let mut buf = Buffer::with_capacity(3);
        assert!(!buf.put_u32(1));
        assert_eq!(buf.write_size(), 3);
        assert!(buf.put_u16(0xFFFE));
        assert_eq!(buf.get_u32(), None);
        assert_eq!(buf.read_size(), 2);
        assert_eq!(buf.get_i16(), Some(-2));
    }

    #[test]
    fn copy_is_bounded_by_both_sides() {
        let mut src = Buffer::from_vec((0u8..10).collect());
        let mut dst = Buffer::with_capacity(4);
        assert_eq!(dst.copy_from(&mut src), 4);
        assert_eq!(dst.readable(), &[0, 1, 2, 3]);
        assert_eq!(src.read_size(), 6);
        assert_eq!(dst.copy_from(&mut src), 0);
    }

    #[test]
    fn shift_resets_drained_buffer() {
        let mut buf = Buffer::with_capacity(8);
        assert!(buf.put_u32(7));
        assert_eq!(buf.get_u32(), Some(7));
        buf.shift();
        assert_eq!(buf.write_size(), 8);
        assert!(buf.is_untouched());
    }

    #[test]
    fn shift_moves_tail_when_gap_is_large() {
        let mut buf = Buffer::with_capacity(64);
        let bytes: Vec<u8> = (0u8..40).collect();
        assert!(buf.put_slice(&bytes));
        buf.consume(35);
        buf.shift();
        // aligned block [32, 48) moves to the front
        assert_eq!(buf.readable(), &[35, 36, 37, 38, 39]);
        assert_eq!(buf.write_size(), 64 - 8);
    }

    #[test]
    fn shift_keeps_layout_when_gap_is_small() {
        let mut buf = Buffer::with_capacity(64);
        assert!(buf.put_slice(&[1u8; 40]));
        buf.consume(4);
        buf.shift();
        assert_eq!(buf.read_size(), 36);
        assert_eq!(buf.write_size(), 24);
    }
}
