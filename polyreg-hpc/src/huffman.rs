//! Canonical Huffman coding of quantization codes.
//!
//! The model is a list of `(symbol, code length)` pairs; codes are assigned
//! canonically (by length, then symbol), so only the lengths are stored.
//!
//! Model: `[u32 n][(u32 symbol, u8 length) × n]`, symbols ascending.
//! Payload: `[u64 bit count][bits, MSB first, zero padded to a byte]`.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use polyreg_core::{CodecError, EntropyCoder, ReadSection};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Longest code the coder emits or accepts.
pub const MAX_CODE_LEN: u8 = 32;

#[derive(Debug, Clone, Default)]
pub struct HuffmanCoder {
    /// `(symbol, length)` ordered by symbol.
    lengths: Vec<(u32, u8)>,
    encode_table: HashMap<u32, (u32, u8)>,
    /// Number of codes of each length, index = length.
    length_counts: Vec<u32>,
    /// Symbols in canonical order.
    canonical: Vec<u32>,
}

impl HuffmanCoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn install(&mut self, mut lengths: Vec<(u32, u8)>) {
        lengths.sort_unstable();

        let mut canonical: Vec<(u8, u32)> = lengths.iter().map(|&(s, l)| (l, s)).collect();
        canonical.sort_unstable();

        let mut length_counts = vec![0u32; MAX_CODE_LEN as usize + 1];
        for &(_, len) in &lengths {
            length_counts[len as usize] += 1;
        }

        let mut encode_table = HashMap::with_capacity(lengths.len());
        let mut code = 0u32;
        let mut prev_len = canonical.first().map(|&(l, _)| l).unwrap_or(0);
        for &(len, sym) in &canonical {
            code <<= len - prev_len;
            encode_table.insert(sym, (code, len));
            code = code.wrapping_add(1);
            prev_len = len;
        }

        self.canonical = canonical.into_iter().map(|(_, s)| s).collect();
        self.length_counts = length_counts;
        self.encode_table = encode_table;
        self.lengths = lengths;
    }

    fn decode_symbol(&self, bits: &mut BitReader<'_>) -> Result<u32, CodecError> {
        let mut code = 0u64;
        let mut first = 0u64;
        let mut index = 0u64;
        for len in 1..=MAX_CODE_LEN as usize {
            code |= bits.read_bit()? as u64;
            let count = self.length_counts.get(len).copied().unwrap_or(0) as u64;
            if code < first + count {
                let pos = (index + code - first) as usize;
                return self
                    .canonical
                    .get(pos)
                    .copied()
                    .ok_or_else(|| CodecError::CorruptStream("huffman code out of table".into()));
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }
        Err(CodecError::CorruptStream("invalid huffman code".into()))
    }
}

/// Code lengths of a Huffman tree over `freqs` (symbol, count), all counts > 0.
fn tree_lengths(freqs: &[(u32, u64)]) -> Vec<u8> {
    let n = freqs.len();
    if n == 1 {
        return vec![1];
    }
    // Arena: leaves 0..n, then internal nodes in creation order.
    let mut parent = vec![usize::MAX; 2 * n - 1];
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = freqs
        .iter()
        .enumerate()
        .map(|(i, &(_, f))| Reverse((f, i)))
        .collect();
    let mut next = n;
    while let (Some(Reverse((fa, a))), Some(Reverse((fb, b)))) = (heap.pop(), heap.pop()) {
        parent[a] = next;
        parent[b] = next;
        heap.push(Reverse((fa + fb, next)));
        next += 1;
    }

    let mut depth = vec![0u8; 2 * n - 1];
    for node in (0..next - 1).rev() {
        depth[node] = depth[parent[node]].saturating_add(1);
    }
    depth.truncate(n);
    depth
}

/// Tree code lengths, flattening skewed distributions until every code is at
/// most [`MAX_CODE_LEN`] bits.
fn limited_lengths(freqs: &mut [(u32, u64)]) -> Vec<u8> {
    loop {
        let lengths = tree_lengths(freqs);
        if lengths.iter().all(|&l| l <= MAX_CODE_LEN) {
            return lengths;
        }
        for f in freqs.iter_mut() {
            f.1 = (f.1 + 1) / 2;
        }
    }
}

impl EntropyCoder for HuffmanCoder {
    fn preprocess_encode(&mut self, codes: &[i32], state_count: usize) -> Result<(), CodecError> {
        let mut counts: HashMap<u32, u64> = HashMap::new();
        for &c in codes {
            if c < 0 || c as usize >= state_count {
                return Err(CodecError::CorruptStream(format!(
                    "code {} outside 0..{}",
                    c, state_count
                )));
            }
            *counts.entry(c as u32).or_insert(0) += 1;
        }
        let mut freqs: Vec<(u32, u64)> = counts.into_iter().collect();
        freqs.sort_unstable();

        if freqs.is_empty() {
            self.install(Vec::new());
            return Ok(());
        }

        let lengths = limited_lengths(&mut freqs);
        self.install(freqs.iter().map(|&(s, _)| s).zip(lengths).collect());
        Ok(())
    }

    fn save(&self, out: &mut Vec<u8>) {
        let _ = out.write_u32::<LittleEndian>(self.lengths.len() as u32);
        for &(sym, len) in &self.lengths {
            let _ = out.write_u32::<LittleEndian>(sym);
            let _ = out.write_u8(len);
        }
    }

    fn encode(&self, codes: &[i32], out: &mut Vec<u8>) -> Result<(), CodecError> {
        let mut writer = BitWriter::default();
        for &c in codes {
            let (code, len) = u32::try_from(c)
                .ok()
                .and_then(|s| self.encode_table.get(&s))
                .copied()
                .ok_or_else(|| CodecError::CorruptStream(format!("code {} not in model", c)))?;
            writer.write(code, len);
        }
        let bit_count = writer.bit_count();
        let bytes = writer.finish();
        out.write_u64::<LittleEndian>(bit_count)?;
        out.extend_from_slice(&bytes);
        Ok(())
    }

    fn postprocess_encode(&mut self) {
        self.install(Vec::new());
    }

    fn load(&mut self, input: &mut &[u8]) -> Result<(), CodecError> {
        let n = input.read_u32::<LittleEndian>().section("huffman table")? as usize;
        if n > input.len() / 5 {
            return Err(CodecError::Truncated("huffman table"));
        }
        let mut lengths = Vec::with_capacity(n);
        // Kraft sum in units of 2^-MAX_CODE_LEN.
        let mut kraft = 0u64;
        for _ in 0..n {
            let sym = input.read_u32::<LittleEndian>().section("huffman table")?;
            let len = input.read_u8().section("huffman table")?;
            if len == 0 || len > MAX_CODE_LEN || sym > i32::MAX as u32 {
                return Err(CodecError::CorruptStream(format!(
                    "huffman entry symbol {} length {}",
                    sym, len
                )));
            }
            kraft += 1u64 << (MAX_CODE_LEN - len);
            lengths.push((sym, len));
        }
        if kraft > 1u64 << MAX_CODE_LEN {
            return Err(CodecError::CorruptStream("huffman lengths oversubscribed".into()));
        }
        self.install(lengths);
        Ok(())
    }

    fn decode(&self, input: &mut &[u8], count: usize) -> Result<Vec<i32>, CodecError> {
        let bit_count = input.read_u64::<LittleEndian>().section("huffman payload")?;
        let byte_count = bit_count.div_ceil(8);
        if byte_count > input.len() as u64 {
            return Err(CodecError::Truncated("huffman payload"));
        }
        let (payload, rest) = input.split_at(byte_count as usize);

        let mut out = Vec::with_capacity(count.min(bit_count as usize));
        if count > 0 {
            if self.canonical.is_empty() {
                return Err(CodecError::CorruptStream(
                    "payload expected but huffman table is empty".into(),
                ));
            }
            let mut bits = BitReader::new(payload, bit_count);
            for _ in 0..count {
                out.push(self.decode_symbol(&mut bits)? as i32);
            }
        }
        *input = rest;
        Ok(out)
    }

    fn postprocess_decode(&mut self) {
        self.install(Vec::new());
    }
}

/// MSB-first bit packer.
#[derive(Debug, Default)]
struct BitWriter {
    data: Vec<u8>,
    bit_buf: u64,
    pending: u32,
    total: u64,
}

impl BitWriter {
    fn write(&mut self, code: u32, len: u8) {
        self.bit_buf = (self.bit_buf << len) | code as u64;
        self.pending += len as u32;
        self.total += len as u64;
        while self.pending >= 8 {
            self.pending -= 8;
            self.data.push((self.bit_buf >> self.pending) as u8);
        }
        self.bit_buf &= (1u64 << self.pending) - 1;
    }

    fn bit_count(&self) -> u64 {
        self.total
    }

    fn finish(mut self) -> Vec<u8> {
        if self.pending > 0 {
            self.data.push((self.bit_buf << (8 - self.pending)) as u8);
        }
        self.data
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: u64,
    limit: u64,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8], limit: u64) -> Self {
        Self { data, pos: 0, limit }
    }

    #[inline]
    fn read_bit(&mut self) -> Result<u8, CodecError> {
        if self.pos >= self.limit {
            return Err(CodecError::CorruptStream("huffman payload exhausted".into()));
        }
        let byte = self.data[(self.pos / 8) as usize];
        let bit = (byte >> (7 - (self.pos % 8))) & 1;
        self.pos += 1;
        Ok(bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(codes: &[i32], state_count: usize) -> (Vec<i32>, usize) {
        let mut enc = HuffmanCoder::new();
        enc.preprocess_encode(codes, state_count).unwrap();
        let mut buf = Vec::new();
        enc.save(&mut buf);
        enc.encode(codes, &mut buf).unwrap();
        enc.postprocess_encode();
        let len = buf.len();

        let mut dec = HuffmanCoder::new();
        let mut input = buf.as_slice();
        dec.load(&mut input).unwrap();
        let out = dec.decode(&mut input, codes.len()).unwrap();
        dec.postprocess_decode();
        assert!(input.is_empty());
        (out, len)
    }

    #[test]
    fn test_skewed_stream() {
        let mut codes = vec![32768; 1000];
        codes.extend([32767, 32769, 32769, 0, 65535, 32770]);
        let (out, len) = roundtrip(&codes, 4 * 32768);
        assert_eq!(out, codes);
        // ~1 bit per dominant symbol.
        assert!(len < 200, "encoded to {} bytes", len);
    }

    #[test]
    fn test_single_symbol() {
        let codes = vec![7; 20];
        let (out, len) = roundtrip(&codes, 16);
        assert_eq!(out, codes);
        // table 4 + 5, bit count 8, 20 bits -> 3 bytes
        assert_eq!(len, 4 + 5 + 8 + 3);
    }

    #[test]
    fn test_empty_stream() {
        let (out, len) = roundtrip(&[], 16);
        assert!(out.is_empty());
        assert_eq!(len, 4 + 8);
    }

    #[test]
    fn test_code_lengths_are_canonical_prefix_free() {
        let freqs: Vec<(u32, u64)> = (0..10).map(|s| (s, 1u64 << s)).collect();
        let lengths = tree_lengths(&freqs);
        // Exponential weights give a maximally deep tree.
        assert_eq!(lengths[9], 1);
        assert_eq!(lengths[0], 9);
        let kraft: f64 = lengths.iter().map(|&l| 0.5f64.powi(l as i32)).sum();
        assert!((kraft - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_long_codes_are_flattened() {
        // Fibonacci weights over 50 symbols need ~49-bit codes.
        let mut freqs = Vec::new();
        let (mut a, mut b) = (1u64, 1u64);
        for sym in 0..50u32 {
            freqs.push((sym, a));
            let c = a + b;
            a = b;
            b = c;
        }
        assert!(tree_lengths(&freqs).iter().any(|&l| l > MAX_CODE_LEN));

        let lengths = limited_lengths(&mut freqs);
        assert!(lengths.iter().all(|&l| l <= MAX_CODE_LEN));
        let kraft: f64 = lengths.iter().map(|&l| 0.5f64.powi(l as i32)).sum();
        assert!(kraft <= 1.0 + 1e-12);

        let mut coder = HuffmanCoder::new();
        coder.install(freqs.iter().map(|&(s, _)| s).zip(lengths).collect());
        let codes: Vec<i32> = (0..50).rev().collect();
        let mut buf = Vec::new();
        coder.encode(&codes, &mut buf).unwrap();
        let mut input = buf.as_slice();
        assert_eq!(coder.decode(&mut input, codes.len()).unwrap(), codes);
    }

    #[test]
    fn test_rejects_codes_outside_range() {
        let mut coder = HuffmanCoder::new();
        assert!(coder.preprocess_encode(&[1, 2, 16], 16).is_err());
        assert!(coder.preprocess_encode(&[-1], 16).is_err());
        coder.preprocess_encode(&[1, 2], 16).unwrap();
        let mut out = Vec::new();
        assert!(coder.encode(&[3], &mut out).is_err());
    }

    #[test]
    fn test_truncated_payload() {
        let codes: Vec<i32> = (0..100).map(|i| i % 13).collect();
        let mut enc = HuffmanCoder::new();
        enc.preprocess_encode(&codes, 13).unwrap();
        let mut buf = Vec::new();
        enc.save(&mut buf);
        enc.encode(&codes, &mut buf).unwrap();

        let mut dec = HuffmanCoder::new();
        let mut input = &buf[..buf.len() - 2];
        dec.load(&mut input).unwrap();
        assert!(matches!(
            dec.decode(&mut input, codes.len()),
            Err(CodecError::Truncated("huffman payload"))
        ));

        // Asking for more codes than were written runs out of bits.
        let mut input = buf.as_slice();
        dec.load(&mut input).unwrap();
        assert!(dec.decode(&mut input, codes.len() + 50).is_err());
    }

    #[test]
    fn test_rejects_oversubscribed_table() {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(3).unwrap();
        for sym in 0..3u32 {
            buf.write_u32::<LittleEndian>(sym).unwrap();
            buf.write_u8(1).unwrap();
        }
        let mut input = buf.as_slice();
        assert!(HuffmanCoder::new().load(&mut input).is_err());
    }
}
