// lzw.rs
//
// Copyright (c) 2020-2026  Douglas Lau
//
//! Lempel-Ziv-Welch compression for GIF
use crate::palette::bit_log;

/// Code Bits
#[derive(Clone, Copy, Debug, PartialEq)]
struct Bits(u8);

impl From<u8> for Bits {
    fn from(bits: u8) -> Self {
        Bits(bits.min(Self::MAX.0))
    }
}

impl From<Bits> for u8 {
    fn from(bits: Bits) -> Self {
        bits.0
    }
}

impl Bits {
    /// Maximum code bits allowed for GIF
    const MAX: Self = Bits(12);

    /// Get the number of entries
    const fn entries(self) -> usize {
        1 << self.0
    }

    /// Get the bits needed to write a code
    fn of(code: Code) -> Self {
        Bits::from(bit_log(code.into()))
    }
}

/// Code type
type Code = u16;

/// Maximum symbol values (one byte each)
const MAX_SYMBOLS: usize = 256;

/// Number of bytes in a full data sub-block
const SUB_BLOCK_LEN: usize = 255;

/// Code dictionary
///
/// Each prefix code has a row of `stride` entries, one per symbol, holding
/// the code for that prefix followed by the symbol.  Zero marks an empty
/// entry; no inserted code can be that small.
#[derive(Debug)]
pub(crate) struct CodeTable {
    /// Table of codes
    codes: Vec<Code>,
    /// Row length (number of distinct symbols)
    stride: usize,
    /// Next available code
    next_code: Code,
}

/// Packer for codes into data sub-blocks
struct Packer<'a> {
    /// Output buffer
    buf: &'a mut Vec<u8>,
    /// Position of current sub-block length byte
    start: usize,
    /// Current code
    code: u32,
    /// Number of bits in current code
    n_bits: u8,
}

/// LZW Data Compressor
pub(crate) struct Compressor<'a> {
    /// Code dictionary
    table: &'a mut CodeTable,
    /// Minimum code bits
    min_code_bits: u8,
}

/// Get the worst-case size of compressed image data, in bytes.
///
/// This includes the minimum code size, sub-block lengths and terminator.
pub(crate) fn max_image_data(pixels: usize) -> usize {
    // every pixel a code, plus clear codes and end code
    let codes = pixels + pixels / 2048 + 4;
    let data = codes * usize::from(Bits::MAX.0) / 8 + 1;
    1 + data + data / SUB_BLOCK_LEN + 2
}

impl CodeTable {
    /// Number of code entries needed for any frame
    pub const LEN: usize = Bits::MAX.entries() * MAX_SYMBOLS;

    /// Create a code table from a buffer of `LEN` entries
    pub fn new(codes: Vec<Code>) -> Self {
        debug_assert_eq!(codes.len(), Self::LEN);
        CodeTable {
            codes,
            stride: MAX_SYMBOLS,
            next_code: 0,
        }
    }

    /// Take the code buffer back
    pub fn into_codes(self) -> Vec<Code> {
        self.codes
    }

    /// Reset the dictionary
    fn reset(&mut self, end_code: Code) {
        self.codes[..Bits::MAX.entries() * self.stride].fill(0);
        self.next_code = end_code + 1;
    }

    /// Search for a prefix followed by a symbol
    fn search(&self, prefix: Code, symbol: u8) -> Option<Code> {
        let code = self.codes[self.index(prefix, symbol)];
        (code != 0).then_some(code)
    }

    /// Insert the next code, returning false if the table is full
    fn insert(&mut self, prefix: Code, symbol: u8) -> bool {
        if usize::from(self.next_code) >= Bits::MAX.entries() {
            return false;
        }
        let i = self.index(prefix, symbol);
        self.codes[i] = self.next_code;
        self.next_code += 1;
        true
    }

    /// Get the index of a table entry
    fn index(&self, prefix: Code, symbol: u8) -> usize {
        debug_assert!(usize::from(symbol) < self.stride);
        usize::from(prefix) * self.stride + usize::from(symbol)
    }
}

impl<'a> Packer<'a> {
    /// Create a packer, starting a sub-block
    fn new(buf: &'a mut Vec<u8>) -> Self {
        let start = buf.len();
        buf.push(0);
        Packer {
            buf,
            start,
            code: 0,
            n_bits: 0,
        }
    }

    /// Pack a code
    fn pack(&mut self, code: Code, bits: Bits) {
        self.code |= u32::from(code) << self.n_bits;
        self.n_bits += u8::from(bits);
        while self.n_bits >= 8 {
            self.push_byte(self.code as u8);
            self.code >>= 8;
            self.n_bits -= 8;
        }
    }

    /// Push one byte, starting a new sub-block when needed
    fn push_byte(&mut self, byte: u8) {
        if self.buf.len() - self.start > SUB_BLOCK_LEN {
            self.buf[self.start] = SUB_BLOCK_LEN as u8;
            self.start = self.buf.len();
            self.buf.push(0);
        }
        self.buf.push(byte);
    }

    /// Flush remaining bits and terminate the sub-blocks
    fn finish(mut self) {
        if self.n_bits > 0 {
            self.push_byte(self.code as u8);
        }
        let len = self.buf.len() - self.start - 1;
        self.buf[self.start] = len as u8;
        if len > 0 {
            self.buf.push(0);
        }
    }
}

impl<'a> Compressor<'a> {
    /// Create a new compressor.
    ///
    /// * `table` Code dictionary.
    /// * `min_code_bits` Minimum code bits (2 to 8).
    /// * `n_symbols` Number of distinct symbols, at most `2^min_code_bits`.
    pub fn new(
        table: &'a mut CodeTable,
        min_code_bits: u8,
        n_symbols: usize,
    ) -> Self {
        debug_assert!((2..=8).contains(&min_code_bits));
        debug_assert!(n_symbols <= 1 << min_code_bits);
        table.stride = n_symbols.max(1);
        Compressor {
            table,
            min_code_bits,
        }
    }

    /// Get the clear code
    fn clear_code(&self) -> Code {
        1 << self.min_code_bits
    }

    /// Get the end code
    fn end_code(&self) -> Code {
        self.clear_code() + 1
    }

    /// Get the bits for the next code written
    fn code_bits(&self) -> Bits {
        Bits::of(self.table.next_code - 1)
    }

    /// Compress symbols into image data sub-blocks
    pub fn compress<I>(&mut self, symbols: I, buffer: &mut Vec<u8>)
    where
        I: IntoIterator<Item = u8>,
    {
        let end_code = self.end_code();
        buffer.push(self.min_code_bits);
        let mut packer = Packer::new(buffer);
        self.table.reset(end_code);
        packer.pack(self.clear_code(), self.code_bits());
        let mut symbols = symbols.into_iter();
        let mut prefix = match symbols.next() {
            Some(symbol) => Code::from(symbol),
            None => {
                packer.pack(end_code, self.code_bits());
                packer.finish();
                return;
            }
        };
        for symbol in symbols {
            if let Some(code) = self.table.search(prefix, symbol) {
                prefix = code;
                continue;
            }
            let bits = self.code_bits();
            packer.pack(prefix, bits);
            if !self.table.insert(prefix, symbol) {
                trace!("code table full, clearing");
                packer.pack(self.clear_code(), bits);
                self.table.reset(end_code);
            }
            prefix = Code::from(symbol);
        }
        packer.pack(prefix, self.code_bits());
        packer.pack(end_code, Bits::of(self.table.next_code));
        packer.finish();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn table() -> CodeTable {
        CodeTable::new(vec![0; CodeTable::LEN])
    }

    /// Decode image data, returning symbols and number of clear codes
    fn decode(data: &[u8]) -> (Vec<u8>, usize) {
        let min = data[0];
        let mut bytes = vec![];
        let mut i = 1;
        loop {
            let n = usize::from(data[i]);
            i += 1;
            if n == 0 {
                break;
            }
            bytes.extend_from_slice(&data[i..i + n]);
            i += n;
        }
        assert_eq!(i, data.len());
        let clear = 1u16 << min;
        let end = clear + 1;
        let mut dict: Vec<Vec<u8>> = vec![];
        let mut width = min + 1;
        let (mut acc, mut n, mut pos) = (0u32, 0u8, 0);
        let mut prev: Option<Vec<u8>> = None;
        let mut out = vec![];
        let mut clears = 0;
        loop {
            while n < width {
                acc |= u32::from(bytes[pos]) << n;
                pos += 1;
                n += 8;
            }
            let code = (acc & ((1 << width) - 1)) as u16;
            acc >>= width;
            n -= width;
            if code == clear {
                dict = (0..clear).map(|c| vec![c as u8]).collect();
                dict.push(vec![]);
                dict.push(vec![]);
                width = min + 1;
                prev = None;
                clears += 1;
                continue;
            }
            if code == end {
                break;
            }
            let entry = match dict.get(usize::from(code)) {
                Some(e) => e.clone(),
                None => {
                    let mut e = prev.clone().unwrap();
                    e.push(e[0]);
                    e
                }
            };
            if let Some(mut p) = prev {
                p.push(entry[0]);
                if dict.len() < 4096 {
                    dict.push(p);
                }
            }
            out.extend_from_slice(&entry);
            if dict.len() == 1 << width && width < 12 {
                width += 1;
            }
            prev = Some(entry);
        }
        assert_eq!(pos, bytes.len());
        (out, clears)
    }

    /// Pseudo-random symbols
    fn noise(len: usize, n_symbols: u32) -> Vec<u8> {
        let mut seed = 0x1234_5678u32;
        (0..len)
            .map(|_| {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                ((seed >> 16) % n_symbols) as u8
            })
            .collect()
    }

    #[test]
    fn bits() {
        assert_eq!(Bits::of(5), Bits(3));
        assert_eq!(Bits::of(4095), Bits(12));
        assert_eq!(Bits::of(4096), Bits(12));
        assert_eq!(Bits::MAX.entries(), 4096);
    }

    #[test]
    fn two_symbols() {
        let mut table = table();
        let mut buf = vec![];
        Compressor::new(&mut table, 2, 3).compress([1, 2], &mut buf);
        // codes 4, 1, 2, 5 at 3 bits each
        assert_eq!(buf, [2, 2, 0x8C, 0x0A, 0]);
        assert_eq!(decode(&buf), (vec![1, 2], 1));
    }

    #[test]
    fn single_symbol() {
        let mut table = table();
        let mut buf = vec![];
        Compressor::new(&mut table, 2, 1).compress([0], &mut buf);
        // codes 4, 0, 5 at 3 bits each
        assert_eq!(buf, [2, 2, 0x44, 0x01, 0]);
        assert_eq!(decode(&buf).0, [0]);
    }

    #[test]
    fn runs() {
        let mut table = table();
        let mut buf = vec![];
        let symbols = [3u8; 1000];
        Compressor::new(&mut table, 2, 4).compress(symbols, &mut buf);
        assert!(buf.len() < 100);
        assert_eq!(decode(&buf).0, symbols);
    }

    #[test]
    fn sub_blocks() {
        let mut table = table();
        let mut buf = vec![];
        let symbols = noise(2000, 16);
        Compressor::new(&mut table, 4, 16)
            .compress(symbols.iter().copied(), &mut buf);
        assert!(buf.len() > 2 * SUB_BLOCK_LEN);
        assert_eq!(buf[1], SUB_BLOCK_LEN as u8);
        assert_eq!(buf[1 + 256], SUB_BLOCK_LEN as u8);
        assert_eq!(decode(&buf).0, symbols);
        assert!(buf.len() <= max_image_data(symbols.len()));
    }

    #[test]
    fn table_reset() {
        let mut table = table();
        let mut buf = vec![];
        let symbols = noise(40_000, 256);
        Compressor::new(&mut table, 8, 256)
            .compress(symbols.iter().copied(), &mut buf);
        let (out, clears) = decode(&buf);
        assert_eq!(out, symbols);
        assert!(clears > 2);
        assert!(buf.len() <= max_image_data(symbols.len()));
    }

    #[test]
    fn reuse_table() {
        let mut table = table();
        let mut first = vec![];
        let symbols = noise(5000, 200);
        Compressor::new(&mut table, 8, 200)
            .compress(symbols.iter().copied(), &mut first);
        let mut second = vec![];
        Compressor::new(&mut table, 8, 200)
            .compress(symbols.iter().copied(), &mut second);
        assert_eq!(first, second);
        let mut small = vec![];
        Compressor::new(&mut table, 2, 3).compress([1, 2], &mut small);
        assert_eq!(small, [2, 2, 0x8C, 0x0A, 0]);
    }
}
