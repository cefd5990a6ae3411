//! Binary arithmetic coder with mid-symbol suspension.
//!
//! A `bits`-wide symbol is coded as a walk down a binary tree; each
//! node owns one adaptive counter. The interval `[lim[0], lim[1]]` is
//! renormalised one byte at a time once its top byte is settled.
//!
//! When the attached buffer runs dry (decode) or full (encode) during
//! renormalisation, the coder stores the partial walk in `k` (the bits
//! decided so far, behind a leading 1) and reports `Pending`. Calling
//! the same operation again continues the walk exactly where it
//! stopped.

use crate::buffer::Buffer;
use crate::step::Step;

use super::model::{Model, adapt};

/// Renormalise while the interval's top byte is settled.
const SETTLED: u32 = 1 << 24;

#[derive(Debug, Clone)]
pub struct Coder {
    x: u32,
    lim: [u32; 2],
    k: u32,
}

impl Default for Coder {
    fn default() -> Self {
        Self {
            x: 0,
            lim: [0, u32::MAX],
            k: 1,
        }
    }
}

impl Coder {
    /// Start a new stream.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether a symbol is half-coded.
    pub fn in_symbol(&self) -> bool {
        self.k != 1
    }

    /// Bits left to code for a `bits`-wide symbol, given `k`.
    fn remaining(&self, bits: u32) -> u32 {
        let decided = 31 - self.k.leading_zeros();
        bits.saturating_sub(decided)
    }

    fn mid(&self, p: u16) -> u32 {
        let d = self.lim[1] - self.lim[0];
        self.lim[0] + (d >> 16) * p as u32
    }

    fn narrow(&mut self, mid: u32, bit: u32) {
        if bit == 1 {
            self.lim[1] = mid;
        } else {
            self.lim[0] = mid.wrapping_add(1);
        }
    }

    fn shift_out(&mut self) {
        self.lim[0] <<= 8;
        self.lim[1] = (self.lim[1] << 8) | 0xFF;
    }

    /// Encode the low `bits` of `value` under `ctx`.
    pub fn encode(&mut self, out: &mut Buffer, model: &mut Model, value: u32, bits: u32, ctx: u32) -> Step {
        let nodes = model.nodes(ctx);

        for i in (0..self.remaining(bits)).rev() {
            while (self.lim[0] ^ self.lim[1]) < SETTLED {
                if !out.put_u8((self.lim[1] >> 24) as u8) {
                    return Step::Pending;
                }
                self.shift_out();
            }

            let node = &mut nodes[self.k as usize];
            let mid = self.mid(*node);
            let bit = (value >> i) & 1;
            self.narrow(mid, bit);
            *node = adapt(*node, bit);
            self.k = (self.k << 1) | bit;
        }

        self.k = 1;
        Step::Ready(())
    }

    /// Decode a `bits`-wide symbol under `ctx`.
    pub fn decode(&mut self, input: &mut Buffer, model: &mut Model, bits: u32, ctx: u32) -> Step<u32> {
        let nodes = model.nodes(ctx);

        for _ in 0..self.remaining(bits) {
            while (self.lim[0] ^ self.lim[1]) < SETTLED {
                let Some(byte) = input.get_u8() else {
                    return Step::Pending;
                };
                self.shift_out();
                self.x = (self.x << 8) | byte as u32;
            }

            let node = &mut nodes[self.k as usize];
            let mid = self.mid(*node);
            let bit = (self.x <= mid) as u32;
            self.narrow(mid, bit);
            *node = adapt(*node, bit);
            self.k = (self.k << 1) | bit;
        }

        let value = self.k & ((1 << bits) - 1);
        self.k = 1;
        Step::Ready(value)
    }

    /// Emit the 4-byte trailer fixing the final interval.
    pub fn finish_encode(&mut self, out: &mut Buffer) -> Step {
        if out.put_u32(self.lim[1]) {
            Step::Ready(())
        } else {
            Step::Pending
        }
    }

    /// Load the first 4 bytes of a stream.
    pub fn start_decode(&mut self, input: &mut Buffer) -> Step {
        match input.get_u32() {
            Some(x) => {
                self.x = x;
                Step::Ready(())
            }
            None => Step::Pending,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// (value, bits, ctx) triples with a skewed distribution.
    fn symbols() -> Vec<(u32, u32, u32)> {
        let mut seed = 0x1234_5678u32;
        (0..2000)
            .map(|n| {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
                let bits = [1, 4, 8][n % 3];
                let raw = seed >> 16;
                let value = if raw % 4 == 0 { raw } else { raw % 3 };
                (value & ((1 << bits) - 1), bits, (seed >> 8) & 0x3)
            })
            .collect()
    }

    fn encode_all(syms: &[(u32, u32, u32)]) -> Vec<u8> {
        let mut coder = Coder::default();
        let mut model = Model::new(8, 0xFF);
        let mut out = Buffer::with_capacity(64 * 1024);
        for &(v, bits, ctx) in syms {
            assert!(coder.encode(&mut out, &mut model, v, bits, ctx).is_ready());
        }
        assert!(coder.finish_encode(&mut out).is_ready());
        out.into_vec()
    }

    #[test]
    fn roundtrip_whole_stream() {
        let syms = symbols();
        let bytes = encode_all(&syms);
        assert!(bytes.len() < syms.len() * 5 / 8);

        let mut coder = Coder::default();
        let mut model = Model::new(8, 0xFF);
        let mut input = Buffer::from_vec(bytes);
        assert!(coder.start_decode(&mut input).is_ready());
        for &(v, bits, ctx) in &syms {
            assert_eq!(coder.decode(&mut input, &mut model, bits, ctx), Step::Ready(v));
        }
        assert_eq!(input.read_size(), 0);
    }

    #[test]
    fn decode_resumes_byte_by_byte() {
        let syms = symbols();
        let bytes = encode_all(&syms);

        let mut coder = Coder::default();
        let mut model = Model::new(8, 0xFF);
        let mut input = Buffer::with_capacity(16);
        let mut feed = bytes.iter();
        let mut started = false;
        let mut decoded = Vec::new();

        while decoded.len() < syms.len() {
            if !started {
                started = coder.start_decode(&mut input).is_ready();
            } else {
                let (_, bits, ctx) = syms[decoded.len()];
                match coder.decode(&mut input, &mut model, bits, ctx) {
                    Step::Ready(v) => {
                        decoded.push(v);
                        continue;
                    }
                    Step::Pending => assert!(input.is_drained()),
                }
            }
            if !started || input.is_drained() {
                input.shift();
                if let Some(b) = feed.next() {
                    assert!(input.put_u8(*b));
                }
            }
        }

        let expect: Vec<u32> = syms.iter().map(|s| s.0).collect();
        assert_eq!(decoded, expect);
    }

    #[test]
    fn encode_resumes_with_tiny_output() {
        let syms = symbols();
        let whole = encode_all(&syms);

        let mut coder = Coder::default();
        let mut model = Model::new(8, 0xFF);
        let mut out = Buffer::with_capacity(1);
        let mut stream = Vec::new();
        let mut n = 0;

        while n < syms.len() {
            let (v, bits, ctx) = syms[n];
            if coder.encode(&mut out, &mut model, v, bits, ctx).is_ready() {
                n += 1;
            } else {
                assert!(coder.in_symbol() || out.write_size() == 0);
                stream.extend_from_slice(out.readable());
                out.clear();
            }
        }
        loop {
            if coder.finish_encode(&mut out).is_ready() {
                stream.extend_from_slice(out.readable());
                break;
            }
            stream.extend_from_slice(out.readable());
            out = Buffer::with_capacity(4);
        }

        assert_eq!(stream, whole);
    }
}
