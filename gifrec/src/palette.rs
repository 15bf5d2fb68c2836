// palette.rs
//
// Copyright (c) 2026  Douglas Lau
//
//! Per-frame color tables
use crate::block::CHANNELS;
use crate::config::PixelOrder;
use crate::cook::ChannelBits;

/// Maximum number of color table entries
const MAX_ENTRIES: usize = 256;

/// Local color table for one frame.
///
/// Entry 0 is reserved for transparent (or unchanged) pixels; the colors
/// used by a frame follow in ascending order of their cooked values.
#[derive(Clone)]
pub(crate) struct ColorTable {
    /// RGB entries
    entries: [[u8; CHANNELS]; MAX_ENTRIES],
    /// Number of entries in use, including entry 0
    slots: usize,
    /// Transparent pixels are present
    has_transparency: bool,
}

/// Get the number of bits needed to store a value
pub(crate) fn bit_log(i: u32) -> u8 {
    (u32::BITS - i.leading_zeros()) as u8
}

/// Expand a channel value to 8 bits by bit replication
fn expand(v: u32, bits: u8) -> u8 {
    if bits == 0 {
        return 0;
    }
    let mut c = (v << (8 - bits)) as u8;
    let mut s = bits;
    while s < 8 {
        c |= c >> s;
        s *= 2;
    }
    c
}

impl Default for ColorTable {
    fn default() -> Self {
        ColorTable {
            entries: [[0; CHANNELS]; MAX_ENTRIES],
            slots: 1,
            has_transparency: false,
        }
    }
}

impl ColorTable {
    /// Build a color table from the values marked in `used`.
    ///
    /// `tlb` receives the table index of every used value.
    pub fn build(
        &mut self,
        tlb: &mut [u8],
        used: &[u8],
        bits: ChannelBits,
        order: PixelOrder,
    ) {
        let (fb, sb) = (bits.first, bits.second);
        let transparent = bits.transparent() as usize;
        self.entries = [[0; CHANNELS]; MAX_ENTRIES];
        self.slots = 1;
        for (value, _) in
            used[..transparent].iter().enumerate().filter(|(_, u)| **u != 0)
        {
            let v = value as u32;
            let first = expand(v & ((1 << fb) - 1), fb);
            let second = expand((v >> fb) & ((1 << sb) - 1), sb);
            let third = expand(v >> (fb + sb), bits.third);
            let slot = self.slots;
            debug_assert!(slot < MAX_ENTRIES);
            tlb[value] = slot as u8;
            self.entries[slot] = match order {
                PixelOrder::Rgba => [first, second, third],
                PixelOrder::Bgra => [third, second, first],
            };
            self.slots += 1;
        }
        tlb[transparent] = 0;
        self.has_transparency = used[transparent] != 0;
    }

    /// Get the number of entries in use, including entry 0
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Check whether any pixels are transparent
    pub fn has_transparency(&self) -> bool {
        self.has_transparency
    }

    /// Get the bits needed for a table index (2 to 8)
    pub fn table_bits(&self) -> u8 {
        bit_log(self.slots as u32 - 1).max(2)
    }

    /// Get the number of entries written, a power of two
    pub fn table_size(&self) -> usize {
        1 << self.table_bits()
    }

    /// Get an entry
    #[cfg(test)]
    pub fn entry(&self, i: usize) -> [u8; CHANNELS] {
        self.entries[i]
    }

    pub(crate) fn format(&self, buf: &mut Vec<u8>) {
        for entry in &self.entries[..self.table_size()] {
            buf.extend_from_slice(entry);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cook::USED_LEN;

    #[test]
    fn bit_logs() {
        assert_eq!(bit_log(0), 0);
        assert_eq!(bit_log(1), 1);
        assert_eq!(bit_log(2), 2);
        assert_eq!(bit_log(3), 2);
        assert_eq!(bit_log(4), 3);
        assert_eq!(bit_log(255), 8);
        assert_eq!(bit_log(4095), 12);
    }

    #[test]
    fn expand_bits() {
        assert_eq!(expand(0, 0), 0);
        assert_eq!(expand(1, 1), 0xFF);
        assert_eq!(expand(0b10, 2), 0b1010_1010);
        assert_eq!(expand(0b101, 3), 0b1011_0110);
        assert_eq!(expand(31, 5), 0xFF);
        assert_eq!(expand(0b10000, 5), 0b1000_0100);
        assert_eq!(expand(63, 6), 0xFF);
        assert_eq!(expand(0, 6), 0);
    }

    #[test]
    fn red_blue() {
        let bits = ChannelBits::with_depth(16, PixelOrder::Rgba);
        let mut used = vec![0; USED_LEN];
        used[31] = 1;
        used[31 << 11] = 1;
        let mut tlb = vec![0; USED_LEN];
        let mut table = ColorTable::default();
        table.build(&mut tlb, &used, bits, PixelOrder::Rgba);
        assert_eq!(table.slots(), 3);
        assert!(!table.has_transparency());
        assert_eq!(table.table_bits(), 2);
        assert_eq!(tlb[31], 1);
        assert_eq!(tlb[31 << 11], 2);
        let mut buf = vec![];
        table.format(&mut buf);
        assert_eq!(buf, [0, 0, 0, 0xFF, 0, 0, 0, 0, 0xFF, 0, 0, 0]);
        assert_eq!(buf.len(), table.table_size() * CHANNELS);
    }

    #[test]
    fn bgra_swap() {
        let bits = ChannelBits::with_depth(16, PixelOrder::Bgra);
        let mut used = vec![0; USED_LEN];
        // byte 0 is blue
        used[31] = 1;
        let mut tlb = vec![0; USED_LEN];
        let mut table = ColorTable::default();
        table.build(&mut tlb, &used, bits, PixelOrder::Bgra);
        assert_eq!(table.entry(1), [0, 0, 0xFF]);
    }

    #[test]
    fn transparent_only() {
        let bits = ChannelBits::with_depth(8, PixelOrder::Rgba);
        let mut used = vec![0; USED_LEN];
        used[1 << 8] = 1;
        let mut tlb = vec![7; USED_LEN];
        let mut table = ColorTable::default();
        table.build(&mut tlb, &used, bits, PixelOrder::Rgba);
        assert_eq!(table.slots(), 1);
        assert!(table.has_transparency());
        assert_eq!(tlb[1 << 8], 0);
        assert_eq!(table.table_bits(), 2);
        assert_eq!(table.table_size(), 4);
    }

    #[test]
    fn full_table() {
        let bits = ChannelBits::with_depth(8, PixelOrder::Rgba);
        let mut used = vec![0; USED_LEN];
        used[..255].fill(1);
        let mut tlb = vec![0; USED_LEN];
        let mut table = ColorTable::default();
        table.build(&mut tlb, &used, bits, PixelOrder::Rgba);
        assert_eq!(table.slots(), 256);
        assert_eq!(table.table_bits(), 8);
        assert_eq!(tlb[254], 255);
        assert_eq!(table.entry(255), [0xDB, 0xFF, 0xFF]);
    }
}
