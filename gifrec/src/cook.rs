// cook.rs
//
// Copyright (c) 2026  Douglas Lau
//
//! Color quantization with ordered dithering
use crate::config::PixelOrder;
use crate::error::{Error, Result};

/// Maximum bit depth of a cooked frame
pub(crate) const MAX_DEPTH: u8 = 16;

/// Size of the used-value map: every 16-bit value plus transparent
pub(crate) const USED_LEN: usize = (1 << MAX_DEPTH) + 1;

/// Red bits for each total depth
const RED_BITS: [u8; 17] = [0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4, 5, 5, 5];

/// Green bits for each total depth
const GREEN_BITS: [u8; 17] =
    [0, 1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4, 5, 5, 5, 6];

/// Blue bits for each total depth
const BLUE_BITS: [u8; 17] = [0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4, 5, 5];

/// Ordered dither thresholds (4x4 Bayer matrix, scaled to 16 bits)
#[rustfmt::skip]
const DITHER: [u32; 16] = [
    0 << 12, 8 << 12, 2 << 12, 10 << 12,
    12 << 12, 4 << 12, 14 << 12, 6 << 12,
    3 << 12, 11 << 12, 1 << 12, 9 << 12,
    15 << 12, 7 << 12, 13 << 12, 5 << 12,
];

/// Bits allocated to each channel, in source byte order
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ChannelBits {
    /// Bits for byte 0 of each pixel
    pub first: u8,
    /// Bits for byte 1 (green)
    pub second: u8,
    /// Bits for byte 2 of each pixel
    pub third: u8,
}

/// View of a raw RGBA8 / BGRA8 frame
pub(crate) struct Pixels<'a> {
    /// Raw pixel bytes
    buf: &'a [u8],
    /// Width in pixels
    width: usize,
    /// Height in pixels
    height: usize,
    /// Bytes between row starts
    stride: usize,
    /// Rows are stored bottom-up
    flipped: bool,
}

/// One channel quantizer
struct Channel {
    /// Output bits
    bits: u8,
    /// Scale from 8 bits to 16 bits, leaving room for dither
    mul: u32,
}

/// Frame of quantized pixel values
#[derive(Debug, Default)]
pub(crate) struct CookedFrame {
    /// Quantized value of each pixel
    pub pixels: Vec<u32>,
    /// Total bit depth
    pub depth: u8,
    /// Number of distinct opaque values
    pub count: usize,
    /// Bits for each channel
    pub bits: ChannelBits,
    /// Source byte order
    pub order: PixelOrder,
}

impl ChannelBits {
    /// Split a total depth between channels
    pub fn with_depth(depth: u8, order: PixelOrder) -> Self {
        let d = usize::from(depth.min(MAX_DEPTH));
        let (first, third) = match order {
            PixelOrder::Rgba => (RED_BITS[d], BLUE_BITS[d]),
            PixelOrder::Bgra => (BLUE_BITS[d], RED_BITS[d]),
        };
        ChannelBits {
            first,
            second: GREEN_BITS[d],
            third,
        }
    }

    /// Get the total number of bits
    pub fn total(self) -> u8 {
        self.first + self.second + self.third
    }

    /// Get the value reserved for transparent pixels
    pub fn transparent(self) -> u32 {
        1 << self.total()
    }
}

impl<'a> Pixels<'a> {
    /// Create a view of a raw frame.
    ///
    /// A `pitch` of zero means rows are tightly packed; a negative pitch
    /// means the rows are stored bottom-up.
    pub fn new(
        buf: &'a [u8],
        width: usize,
        height: usize,
        pitch: isize,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions);
        }
        let row = width * 4;
        let stride = match pitch {
            0 => row,
            _ => pitch.unsigned_abs(),
        };
        if stride < row {
            return Err(Error::InvalidPitch);
        }
        let needed = stride
            .checked_mul(height - 1)
            .and_then(|n| n.checked_add(row))
            .ok_or(Error::PixelBufferTooSmall)?;
        if buf.len() < needed {
            return Err(Error::PixelBufferTooSmall);
        }
        Ok(Pixels {
            buf,
            width,
            height,
            stride,
            flipped: pitch < 0,
        })
    }

    /// Get the number of pixels
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Get one row of pixel bytes
    fn row(&self, y: usize) -> &'a [u8] {
        let y = if self.flipped { self.height - 1 - y } else { y };
        let start = y * self.stride;
        &self.buf[start..start + self.width * 4]
    }
}

impl Channel {
    /// Create a channel quantizer
    fn new(bits: u8) -> Self {
        let diff = (1u32 << (8 - bits)) - 1;
        let mul = ((255.0f32 - diff as f32) / 255.0 * 257.0) as u32;
        Channel { bits, mul }
    }

    /// Quantize one value to 16 bits, with dither threshold
    fn quantize(&self, v: u8, threshold: u32) -> u32 {
        (u32::from(v) * self.mul + (threshold >> self.bits)).min(0xFFFF)
    }
}

impl CookedFrame {
    /// Check whether pixel values are comparable with another frame
    pub fn same_palette(&self, other: &Self) -> bool {
        self.bits == other.bits && self.order == other.order
    }

    /// Quantize all pixels at one bit depth.
    fn quantize(
        &mut self,
        src: &Pixels,
        bits: ChannelBits,
        alpha_threshold: u8,
    ) {
        let (rb, gb, bb) = (bits.first, bits.second, bits.third);
        let first = Channel::new(rb);
        let second = Channel::new(gb);
        let third = Channel::new(bb);
        let gmask = ((1 << gb) - 1) << rb;
        let bmask = ((1 << bb) - 1) << (rb + gb);
        let transparent = bits.transparent();
        for (y, cooked) in self.pixels.chunks_exact_mut(src.width).enumerate()
        {
            let kernel = &DITHER[(y & 3) * 4..][..4];
            let row = src.row(y);
            for (x, (c, p)) in
                cooked.iter_mut().zip(row.chunks_exact(4)).enumerate()
            {
                if p[3] < alpha_threshold {
                    *c = transparent;
                    continue;
                }
                let k = kernel[x & 3];
                let r = first.quantize(p[0], k) >> (16 - rb);
                let g = (second.quantize(p[1], k) >> (16 - rb - gb)) & gmask;
                let b =
                    (third.quantize(p[2], k) >> (16 - rb - gb - bb)) & bmask;
                *c = r | g | b;
            }
        }
    }

    /// Mark used values and count the opaque ones
    fn mark_used(&self, used: &mut [u8]) -> usize {
        let transparent = self.bits.transparent() as usize;
        used[..=transparent].fill(0);
        for &c in &self.pixels {
            used[c as usize] = 1;
        }
        used[..transparent].iter().filter(|u| **u != 0).count()
    }
}

/// Cook a frame, searching for the highest depth with fewer than 256
/// colors.
///
/// * `frame` Cooked frame buffer (`src.len()` pixels).
/// * `used` Map of used values (at least `USED_LEN` entries).
/// * `src` Raw frame.
/// * `depth` Starting bit depth.
/// * `alpha_threshold` Pixels with lower alpha become transparent.
/// * `order` Source byte order.
pub(crate) fn cook(
    frame: &mut CookedFrame,
    used: &mut [u8],
    src: &Pixels,
    depth: u8,
    alpha_threshold: u8,
    order: PixelOrder,
) {
    debug_assert_eq!(frame.pixels.len(), src.len());
    debug_assert!(used.len() >= USED_LEN);
    let mut depth = depth.min(MAX_DEPTH);
    loop {
        let bits = ChannelBits::with_depth(depth, order);
        frame.quantize(src, bits, alpha_threshold);
        frame.bits = bits;
        frame.count = frame.mark_used(used);
        if frame.count < 256 || depth == 0 {
            break;
        }
        trace!("depth {depth}: {} colors, retrying", frame.count);
        depth -= 1;
    }
    frame.depth = depth;
    frame.order = order;
}

/// Get the starting depth for a frame, given the previous frame.
///
/// A previous frame with few colors allows probing a higher depth, but
/// never above `max_depth`.
pub(crate) fn start_depth(max_depth: u8, previous: &CookedFrame) -> u8 {
    let boost = 160 / previous.count.max(1);
    let depth = usize::from(previous.depth) + boost;
    max_depth.min(depth.min(usize::from(MAX_DEPTH)) as u8)
}

#[cfg(test)]
mod test {
    use super::*;

    fn cook_rgba(
        rgba: &[u8],
        width: usize,
        depth: u8,
        alpha_threshold: u8,
    ) -> CookedFrame {
        let height = rgba.len() / 4 / width;
        let src = Pixels::new(rgba, width, height, 0).unwrap();
        let mut frame = CookedFrame {
            pixels: vec![0; src.len()],
            ..Default::default()
        };
        let mut used = vec![0; USED_LEN];
        cook(
            &mut frame,
            &mut used,
            &src,
            depth,
            alpha_threshold,
            PixelOrder::Rgba,
        );
        frame
    }

    #[test]
    fn channel_bits() {
        let bits = ChannelBits::with_depth(16, PixelOrder::Rgba);
        assert_eq!((bits.first, bits.second, bits.third), (5, 6, 5));
        let bits = ChannelBits::with_depth(15, PixelOrder::Rgba);
        assert_eq!((bits.first, bits.second, bits.third), (5, 5, 5));
        let bits = ChannelBits::with_depth(8, PixelOrder::Rgba);
        assert_eq!((bits.first, bits.second, bits.third), (3, 3, 2));
        let bits = ChannelBits::with_depth(8, PixelOrder::Bgra);
        assert_eq!((bits.first, bits.second, bits.third), (2, 3, 3));
        let bits = ChannelBits::with_depth(1, PixelOrder::Rgba);
        assert_eq!((bits.first, bits.second, bits.third), (0, 1, 0));
        for depth in 0..=MAX_DEPTH {
            let bits = ChannelBits::with_depth(depth, PixelOrder::Rgba);
            assert_eq!(bits.total(), depth);
        }
    }

    #[test]
    fn pixels_view() {
        let buf = [0u8; 32];
        assert!(Pixels::new(&buf, 2, 4, 0).is_ok());
        assert!(Pixels::new(&buf, 2, 4, -8).is_ok());
        assert!(matches!(
            Pixels::new(&buf, 0, 4, 0),
            Err(Error::InvalidDimensions)
        ));
        assert!(matches!(
            Pixels::new(&buf, 2, 4, 4),
            Err(Error::InvalidPitch)
        ));
        assert!(matches!(
            Pixels::new(&buf, 2, 4, 12),
            Err(Error::PixelBufferTooSmall)
        ));
        let buf: Vec<u8> = (0..16).collect();
        let src = Pixels::new(&buf, 1, 4, -4).unwrap();
        assert_eq!(src.row(0), &[12, 13, 14, 15]);
        assert_eq!(src.row(3), &[0, 1, 2, 3]);
    }

    #[test]
    fn red_blue() {
        let frame = cook_rgba(&[255, 0, 0, 255, 0, 0, 255, 255], 2, 16, 0);
        assert_eq!(frame.depth, 16);
        assert_eq!(frame.count, 2);
        assert_eq!(frame.pixels, [31, 31 << 11]);
    }

    #[test]
    fn white_black() {
        let frame = cook_rgba(&[255; 4], 1, 16, 0);
        assert_eq!(frame.pixels, [0xFFFF]);
        let frame = cook_rgba(&[0, 0, 0, 255], 1, 16, 0);
        assert_eq!(frame.pixels, [0]);
    }

    #[test]
    fn transparent() {
        let frame = cook_rgba(&[10, 20, 30, 127, 10, 20, 30, 128], 2, 16, 128);
        assert_eq!(frame.pixels[0], 1 << 16);
        assert_ne!(frame.pixels[1], 1 << 16);
        assert_eq!(frame.count, 1);
        // threshold of zero ignores alpha
        let frame = cook_rgba(&[10, 20, 30, 0], 1, 16, 0);
        assert_ne!(frame.pixels[0], 1 << 16);
    }

    #[test]
    fn dither_pattern() {
        // mid gray lands between two levels, so dithering mixes them
        let gray = [0x84; 16 * 4];
        let frame = cook_rgba(&gray, 4, 4, 0);
        assert_eq!(frame.bits.second, 2);
        assert_eq!(frame.count, 2);
    }

    #[test]
    fn depth_search() {
        // 4096 distinct colors can not fit at full depth
        let mut rgba = Vec::new();
        for i in 0..4096u32 {
            rgba.push(((i & 15) * 16) as u8);
            rgba.push((((i >> 4) & 15) * 16) as u8);
            rgba.push(((i >> 8) * 16) as u8);
            rgba.push(255);
        }
        let frame = cook_rgba(&rgba, 64, 16, 0);
        assert!(frame.depth < 16);
        assert!(frame.count < 256);
        let bits = ChannelBits::with_depth(frame.depth, PixelOrder::Rgba);
        assert_eq!(frame.bits, bits);
    }

    #[test]
    fn starting_depth() {
        let mut previous = CookedFrame::default();
        assert_eq!(start_depth(16, &previous), 16);
        assert_eq!(start_depth(5, &previous), 5);
        previous.depth = 9;
        previous.count = 200;
        assert_eq!(start_depth(16, &previous), 9);
        previous.count = 40;
        assert_eq!(start_depth(16, &previous), 13);
        assert_eq!(start_depth(10, &previous), 10);
        previous.count = 1;
        assert_eq!(start_depth(16, &previous), 16);
    }
}
