// encode.rs
//
// Copyright (c) 2019-2026  Douglas Lau
//
use crate::block::{
    DisposalMethod, GraphicControl, ImageDesc, Preamble, CHANNELS,
};
use crate::chain::{Memory, Output, Sink};
use crate::config::{self, PixelOrder};
use crate::cook::{self, CookedFrame, Pixels, MAX_DEPTH, USED_LEN};
use crate::error::{Error, Result};
use crate::lzw::{self, CodeTable, Compressor};
use crate::memory::{self, Allocator, Heap};
use crate::palette::ColorTable;
use pix::{rgb::SRgba8, Raster};
use std::io::Write;
use std::mem;

/// Get the worst-case size of one frame block
fn max_frame_block(pixels: usize) -> usize {
    GraphicControl::SIZE
        + ImageDesc::SIZE
        + 256 * CHANNELS
        + lzw::max_image_data(pixels)
}

/// Methods shared by all encoder types, which wrap a `handle`
macro_rules! handle_methods {
    () => {
        /// Set the alpha threshold for this encoder only.
        ///
        /// See [set_alpha_threshold](fn.set_alpha_threshold.html).
        pub fn with_alpha_threshold(mut self, threshold: u8) -> Self {
            if let Some(options) = self.handle.options_mut() {
                options.alpha_threshold = Some(threshold);
            }
            self
        }

        /// Set the pixel byte order for this encoder only.
        pub fn with_pixel_order(mut self, order: PixelOrder) -> Self {
            if let Some(options) = self.handle.options_mut() {
                options.pixel_order = Some(order);
            }
            self
        }

        /// Get the frame width
        pub fn width(&self) -> u16 {
            self.handle.width
        }

        /// Get the frame height
        pub fn height(&self) -> u16 {
            self.handle.height
        }

        /// Get the number of frames encoded
        pub fn frames(&self) -> usize {
            self.handle.frames
        }

        /// Check whether the encoder can accept more frames
        pub fn is_active(&self) -> bool {
            self.handle.is_active()
        }

        /// Encode one frame from a raster, which must match the frame size.
        pub fn frame_raster(
            &mut self,
            raster: &Raster<SRgba8>,
            delay_cs: u16,
            max_depth: u8,
        ) -> Result<()> {
            self.handle.frame_raster(raster, delay_cs, max_depth)
        }
    };
}

/// Settings which take precedence over process-wide config
#[derive(Clone, Copy, Debug, Default)]
struct Options {
    /// Alpha threshold
    alpha_threshold: Option<u8>,
    /// Pixel byte order
    pixel_order: Option<PixelOrder>,
}

/// Scratch buffers retained between frames
#[derive(Default)]
struct Core {
    /// Frame width
    width: u16,
    /// Frame height
    height: u16,
    /// Previous and current cooked frames
    frames: [CookedFrame; 2],
    /// Index of current frame
    current: usize,
    /// Map of used cooked values
    used: Vec<u8>,
    /// Translation from cooked values to color table indices
    tlb: Vec<u8>,
    /// LZW code table entries
    codes: Vec<u16>,
    /// Local color table
    table: ColorTable,
    /// Option overrides
    options: Options,
}

/// Active encoding session
struct Session<O: Output, A: Allocator> {
    /// Scratch buffers
    core: Core,
    /// Destination for blocks
    out: O,
    /// Allocator for all buffers
    alloc: A,
}

/// Encoder state
enum State<O: Output, A: Allocator> {
    /// Accepting frames
    Active(Box<Session<O, A>>),
    /// Finished, or torn down by an error
    Terminated,
}

/// Encoder handle, generic over output
struct Handle<O: Output, A: Allocator> {
    /// Frame width
    width: u16,
    /// Frame height
    height: u16,
    /// Number of frames encoded
    frames: usize,
    /// Current state
    state: State<O, A>,
}

/// Encoded GIF animation
///
/// Holds the complete file, from the `GIF89a` signature to the trailer.
#[derive(Debug, PartialEq, Eq)]
pub struct Gif {
    /// File bytes
    data: Vec<u8>,
}

/// Animated GIF encoder, producing a [Gif] in memory
///
/// Frames are quantized to at most 255 colors each, with ordered
/// dithering.  When consecutive frames share a color depth, unchanged
/// pixels are encoded as transparent, which compresses very well.
///
/// ## Example
/// ```
/// use gifrec::Encoder;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut enc = Encoder::begin(2, 1)?;
/// let red_blue = [255, 0, 0, 255, 0, 0, 255, 255];
/// enc.frame(&red_blue, 0, 10, 16)?;
/// enc.frame(&red_blue, 0, 10, 16)?;
/// let gif = enc.end()?;
/// assert!(gif.as_bytes().starts_with(b"GIF89a"));
/// assert_eq!(gif.as_bytes().last(), Some(&0x3B));
/// # Ok(())
/// # }
/// ```
///
/// [Gif]: struct.Gif.html
pub struct Encoder<A: Allocator = Heap> {
    /// Encoder handle
    handle: Handle<Memory, A>,
}

/// Animated GIF encoder, streaming to a writer
///
/// Each frame is written as soon as the next one arrives, so memory use
/// does not grow with the length of the animation.
///
/// ## Example
/// ```
/// use gifrec::SinkEncoder;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut enc = SinkEncoder::begin_to_sink(1, 1, Vec::new())?;
/// enc.frame(&[0, 128, 255, 255], 0, 25, 16)?;
/// let buf = enc.end()?;
/// assert_eq!(&buf[..6], b"GIF89a");
/// # Ok(())
/// # }
/// ```
pub struct SinkEncoder<W: Write, A: Allocator = Heap> {
    /// Encoder handle
    handle: Handle<Sink<W>, A>,
}

impl Core {
    /// Create scratch buffers for a frame size
    fn new<A: Allocator>(
        alloc: &mut A,
        width: u16,
        height: u16,
    ) -> Result<Self> {
        let mut core = Core {
            width,
            height,
            ..Default::default()
        };
        if let Err(e) = core.allocate(alloc) {
            core.release(alloc);
            return Err(e);
        }
        Ok(core)
    }

    /// Get the number of pixels in a frame
    fn len(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }

    /// Allocate all buffers
    fn allocate<A: Allocator>(&mut self, alloc: &mut A) -> Result<()> {
        let len = self.len();
        for frame in &mut self.frames {
            frame.pixels = memory::filled(alloc, len, 0)?;
        }
        self.used = memory::filled(alloc, USED_LEN, 0)?;
        self.tlb = memory::filled(alloc, USED_LEN, 0)?;
        self.codes = memory::filled(alloc, CodeTable::LEN, 0)?;
        Ok(())
    }

    /// Release all buffers
    fn release<A: Allocator>(&mut self, alloc: &mut A) {
        for frame in &mut self.frames {
            memory::release(alloc, mem::take(&mut frame.pixels));
        }
        memory::release(alloc, mem::take(&mut self.used));
        memory::release(alloc, mem::take(&mut self.tlb));
        memory::release(alloc, mem::take(&mut self.codes));
    }

    /// Encode one frame into a block.
    ///
    /// * `n_frames` Number of frames already encoded.
    fn frame<O: Output, A: Allocator>(
        &mut self,
        alloc: &mut A,
        out: &mut O,
        src: &Pixels,
        n_frames: usize,
        delay_cs: u16,
        max_depth: u8,
    ) -> Result<()> {
        let alpha_threshold = self
            .options
            .alpha_threshold
            .unwrap_or_else(config::alpha_threshold);
        let order =
            self.options.pixel_order.unwrap_or_else(config::pixel_order);
        let max_depth = max_depth.clamp(1, MAX_DEPTH);
        let (first, second) = self.frames.split_at_mut(1);
        let (previous, current) = if self.current == 0 {
            (&second[0], &mut first[0])
        } else {
            (&first[0], &mut second[0])
        };
        let depth = cook::start_depth(max_depth, previous);
        cook::cook(current, &mut self.used, src, depth, alpha_threshold, order);
        self.table.build(&mut self.tlb, &self.used, current.bits, order);
        let has_transparency = self.table.has_transparency();
        let compatible = n_frames > 0
            && current.same_palette(previous)
            && !has_transparency;
        let size = max_frame_block(src.len());
        let mut block = memory::with_capacity(alloc, size)?;
        GraphicControl::new(DisposalMethod::Keep, delay_cs, Some(0))
            .format(&mut block);
        ImageDesc::new(self.width, self.height, self.table.table_bits())
            .format(&mut block);
        self.table.format(&mut block);
        let tlb = &self.tlb;
        let symbols = current.pixels.iter().zip(&previous.pixels).map(
            |(&c, &p)| {
                if compatible && c == p {
                    0
                } else {
                    tlb[c as usize]
                }
            },
        );
        let mut codes = CodeTable::new(mem::take(&mut self.codes));
        Compressor::new(&mut codes, self.table.table_bits(), self.table.slots())
            .compress(symbols, &mut block);
        self.codes = codes.into_codes();
        if let Err(e) = memory::shrink(alloc, &mut block) {
            memory::release(alloc, block);
            return Err(e);
        }
        debug!(
            "frame {n_frames}: depth {}, {} colors, {} bytes{}",
            current.depth,
            current.count,
            block.len(),
            if compatible { ", delta" } else { "" },
        );
        if has_transparency && n_frames > 0 {
            if let Some(last) = out.last_mut() {
                let method = DisposalMethod::Background;
                GraphicControl::patch_disposal(last, method);
            }
        }
        out.push(alloc, block)?;
        self.current ^= 1;
        Ok(())
    }
}

impl<O: Output, A: Allocator> Session<O, A> {
    /// Begin a session, writing the preamble
    fn begin(width: u16, height: u16, out: O, mut alloc: A) -> Result<Self> {
        let core = Core::new(&mut alloc, width, height)?;
        let mut session = Session { core, out, alloc };
        if let Err(e) = session.write_preamble() {
            session.release();
            return Err(e);
        }
        Ok(session)
    }

    /// Write the preamble block
    fn write_preamble(&mut self) -> Result<()> {
        let mut block =
            memory::with_capacity(&mut self.alloc, Preamble::SIZE)?;
        Preamble::with_screen_size(self.core.width, self.core.height)
            .format(&mut block);
        self.out.push(&mut self.alloc, block)?;
        self.out.commit(&mut self.alloc)
    }

    /// Encode one frame
    fn frame(
        &mut self,
        src: &Pixels,
        n_frames: usize,
        delay_cs: u16,
        max_depth: u8,
    ) -> Result<()> {
        self.core.frame(
            &mut self.alloc,
            &mut self.out,
            src,
            n_frames,
            delay_cs,
            max_depth,
        )
    }

    /// Release scratch buffers and output
    fn release(&mut self) {
        self.core.release(&mut self.alloc);
        self.out.release(&mut self.alloc);
    }

    /// Finish the animation
    fn end(self: Box<Self>) -> Result<O::Finished> {
        let Session {
            mut core,
            out,
            mut alloc,
        } = *self;
        core.release(&mut alloc);
        out.finish(&mut alloc)
    }
}

impl<O: Output, A: Allocator> Handle<O, A> {
    /// Begin encoding
    fn begin(width: u16, height: u16, out: O, alloc: A) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions);
        }
        let session = Session::begin(width, height, out, alloc)?;
        debug!("begin {width}x{height}");
        Ok(Handle {
            width,
            height,
            frames: 0,
            state: State::Active(Box::new(session)),
        })
    }

    /// Get the option overrides, if active
    fn options_mut(&mut self) -> Option<&mut Options> {
        match &mut self.state {
            State::Active(session) => Some(&mut session.core.options),
            State::Terminated => None,
        }
    }

    /// Check whether the handle is still active
    fn is_active(&self) -> bool {
        matches!(self.state, State::Active(_))
    }

    /// Encode one frame
    fn frame(
        &mut self,
        pixels: &[u8],
        pitch: isize,
        delay_cs: u16,
        max_depth: u8,
    ) -> Result<()> {
        let State::Active(session) = &mut self.state else {
            return Err(Error::Terminated);
        };
        let width = usize::from(self.width);
        let height = usize::from(self.height);
        let n_frames = self.frames;
        let res = Pixels::new(pixels, width, height, pitch).and_then(|src| {
            session.frame(&src, n_frames, delay_cs, max_depth)
        });
        self.check(res)
    }

    /// Encode one frame from a raster
    fn frame_raster(
        &mut self,
        raster: &Raster<SRgba8>,
        delay_cs: u16,
        max_depth: u8,
    ) -> Result<()> {
        if !self.is_active() {
            return Err(Error::Terminated);
        }
        let width = u16::try_from(raster.width());
        let height = u16::try_from(raster.height());
        match (width, height) {
            (Ok(w), Ok(h)) if w == self.width && h == self.height => {
                self.frame(raster.as_u8_slice(), 0, delay_cs, max_depth)
            }
            (Err(e), _) | (_, Err(e)) => self.check(Err(e.into())),
            _ => self.check(Err(Error::InvalidDimensions)),
        }
    }

    /// Check the result of a frame, tearing down on error
    fn check(&mut self, res: Result<()>) -> Result<()> {
        match res {
            Ok(()) => {
                self.frames += 1;
                Ok(())
            }
            Err(e) => {
                warn!("encoder torn down after {} frames: {e}", self.frames);
                self.terminate();
                Err(e)
            }
        }
    }

    /// Release everything, entering the terminated state
    fn terminate(&mut self) {
        if let State::Active(mut session) =
            mem::replace(&mut self.state, State::Terminated)
        {
            session.release();
        }
    }

    /// Finish encoding
    fn end(&mut self) -> Result<O::Finished> {
        match mem::replace(&mut self.state, State::Terminated) {
            State::Active(session) => {
                let res = session.end();
                match &res {
                    Ok(_) => debug!("end: {} frames", self.frames),
                    Err(e) => warn!("end failed: {e}"),
                }
                res
            }
            State::Terminated => Err(Error::Terminated),
        }
    }
}

impl<O: Output, A: Allocator> Drop for Handle<O, A> {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl Gif {
    /// Get the file bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get the file length, in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the file is empty (never true for a finished encoder)
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Convert into a `Vec` of file bytes
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Release the file bytes to the allocator which produced them
    pub fn release<A: Allocator>(self, alloc: &mut A) {
        memory::release(alloc, self.data);
    }
}

impl AsRef<[u8]> for Gif {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Encoder<Heap> {
    /// Begin encoding an animation, using the global heap.
    ///
    /// * `width` Frame width, in pixels.
    /// * `height` Frame height, in pixels.
    pub fn begin(width: u16, height: u16) -> Result<Self> {
        Self::begin_with(width, height, Heap)
    }
}

impl<A: Allocator> Encoder<A> {
    /// Begin encoding an animation, using an allocator.
    ///
    /// Scratch buffers for two frames and the LZW code table are allocated
    /// here, and the file header is written.
    pub fn begin_with(width: u16, height: u16, alloc: A) -> Result<Self> {
        let handle = Handle::begin(width, height, Memory::default(), alloc)?;
        Ok(Encoder { handle })
    }

    handle_methods!();

    /// Encode one frame.
    ///
    /// * `pixels` RGBA8 (or BGRA8) pixel bytes.
    /// * `pitch` Bytes between rows; 0 for tightly packed rows, or negative
    ///           for rows stored bottom-up.
    /// * `delay_cs` Display time, in centiseconds.
    /// * `max_depth` Maximum color bit depth, clamped to 1-16.
    ///
    /// Any error tears down the encoder; later calls return
    /// `Error::Terminated`.
    pub fn frame(
        &mut self,
        pixels: &[u8],
        pitch: isize,
        delay_cs: u16,
        max_depth: u8,
    ) -> Result<()> {
        self.handle.frame(pixels, pitch, delay_cs, max_depth)
    }

    /// Finish the animation.
    ///
    /// All scratch memory is released, whether or not this succeeds.
    pub fn end(mut self) -> Result<Gif> {
        self.handle.end().map(|data| Gif { data })
    }
}

impl<W: Write> SinkEncoder<W, Heap> {
    /// Begin encoding an animation to a writer, using the global heap.
    pub fn begin_to_sink(width: u16, height: u16, writer: W) -> Result<Self> {
        Self::begin_to_sink_with(width, height, writer, Heap)
    }
}

impl<W: Write, A: Allocator> SinkEncoder<W, A> {
    /// Begin encoding an animation to a writer, using an allocator.
    ///
    /// The file header is written immediately.
    pub fn begin_to_sink_with(
        width: u16,
        height: u16,
        writer: W,
        alloc: A,
    ) -> Result<Self> {
        let handle = Handle::begin(width, height, Sink::new(writer), alloc)?;
        Ok(SinkEncoder { handle })
    }

    handle_methods!();

    /// Encode one frame.
    ///
    /// The previous frame is written to the sink; this one is held back in
    /// case the next frame needs to change its disposal method.
    pub fn frame(
        &mut self,
        pixels: &[u8],
        pitch: isize,
        delay_cs: u16,
        max_depth: u8,
    ) -> Result<()> {
        self.handle.frame(pixels, pitch, delay_cs, max_depth)
    }

    /// Finish the animation, returning the writer.
    pub fn end(mut self) -> Result<W> {
        self.handle.end()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::memory::Budget;

    #[test]
    fn zero_size() {
        assert!(matches!(
            Encoder::begin(0, 5),
            Err(Error::InvalidDimensions)
        ));
        assert!(matches!(
            Encoder::begin(5, 0),
            Err(Error::InvalidDimensions)
        ));
    }

    #[test]
    fn empty() {
        let enc = Encoder::begin(3, 2).unwrap();
        assert_eq!(enc.width(), 3);
        assert_eq!(enc.height(), 2);
        assert_eq!(enc.frames(), 0);
        let gif = enc.end().unwrap();
        assert_eq!(gif.len(), Preamble::SIZE + 1);
        assert_eq!(gif.as_bytes()[6..8], [3, 0]);
    }

    #[test]
    fn red_blue() {
        let mut enc = Encoder::begin(2, 1).unwrap();
        enc.frame(&[255, 0, 0, 255, 0, 0, 255, 255], 8, 10, 16)
            .unwrap();
        assert_eq!(enc.frames(), 1);
        let gif = enc.end().unwrap();
        #[rustfmt::skip]
        let frame = [
            0x21, 0xF9, 0x04, 0x05, 0x0A, 0x00, 0x00, 0x00,
            0x2C, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x81,
            0x00, 0x00, 0x00, 0xFF, 0x00, 0x00,
            0x00, 0x00, 0xFF, 0x00, 0x00, 0x00,
            0x02, 0x02, 0x8C, 0x0A, 0x00,
            0x3B,
        ];
        assert_eq!(&gif.as_bytes()[Preamble::SIZE..], &frame[..]);
    }

    #[test]
    fn block_bound() {
        let pixels = 4000;
        let bound = max_frame_block(pixels);
        assert!(bound > 768 + pixels * 12 / 8);
    }

    #[test]
    fn retro_patch() {
        let mut enc = Encoder::begin(1, 1).unwrap().with_alpha_threshold(128);
        enc.frame(&[10, 20, 30, 255], 0, 5, 16).unwrap();
        enc.frame(&[10, 20, 30, 0], 0, 5, 16).unwrap();
        let gif = enc.end().unwrap().into_vec();
        // first frame disposal patched to background
        assert_eq!(gif[Preamble::SIZE + 3], 0x09);
    }

    #[test]
    fn terminated() {
        let mut enc = Encoder::begin(2, 2).unwrap();
        assert!(matches!(
            enc.frame(&[0; 15], 0, 0, 8),
            Err(Error::PixelBufferTooSmall)
        ));
        assert!(!enc.is_active());
        assert!(matches!(
            enc.frame(&[0; 16], 0, 0, 8),
            Err(Error::Terminated)
        ));
        assert!(matches!(enc.end(), Err(Error::Terminated)));
    }

    #[test]
    fn budget_release() {
        let mut budget = Budget::unlimited();
        let mut enc = Encoder::begin_with(4, 4, &mut budget).unwrap();
        enc.frame(&[0x80; 64], 0, 0, 16).unwrap();
        drop(enc);
        assert_eq!(budget.used(), 0);
        let mut enc = Encoder::begin_with(4, 4, &mut budget).unwrap();
        enc.frame(&[0x80; 64], 0, 0, 16).unwrap();
        let gif = enc.end().unwrap();
        assert_eq!(budget.used(), gif.len());
        gif.release(&mut budget);
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn budget_begin() {
        let mut budget = Budget::new(1 << 16);
        assert!(matches!(
            Encoder::begin_with(4, 4, &mut budget),
            Err(Error::OutOfMemory)
        ));
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn raster() {
        let mut raster = Raster::<SRgba8>::with_clear(2, 1);
        *raster.pixel_mut(0, 0) = SRgba8::new(255, 0, 0, 255);
        *raster.pixel_mut(1, 0) = SRgba8::new(0, 0, 255, 255);
        let mut enc = Encoder::begin(2, 1).unwrap();
        enc.frame_raster(&raster, 10, 16).unwrap();
        let from_raster = enc.end().unwrap();
        let mut enc = Encoder::begin(2, 1).unwrap();
        enc.frame(&[255, 0, 0, 255, 0, 0, 255, 255], 0, 10, 16)
            .unwrap();
        assert_eq!(from_raster, enc.end().unwrap());
        let mut enc = Encoder::begin(1, 2).unwrap();
        assert!(matches!(
            enc.frame_raster(&raster, 10, 16),
            Err(Error::InvalidDimensions)
        ));
    }

    #[test]
    fn sink_methods() {
        let mut raster = Raster::<SRgba8>::with_clear(2, 1);
        *raster.pixel_mut(0, 0) = SRgba8::new(255, 0, 0, 255);
        *raster.pixel_mut(1, 0) = SRgba8::new(0, 0, 255, 0);
        let mut enc = SinkEncoder::begin_to_sink(2, 1, Vec::new())
            .unwrap()
            .with_alpha_threshold(128)
            .with_pixel_order(PixelOrder::Rgba);
        assert_eq!((enc.width(), enc.height()), (2, 1));
        assert!(enc.is_active());
        enc.frame_raster(&raster, 10, 16).unwrap();
        assert_eq!(enc.frames(), 1);
        let streamed = enc.end().unwrap();
        let mut enc = Encoder::begin(2, 1).unwrap().with_alpha_threshold(128);
        enc.frame_raster(&raster, 10, 16).unwrap();
        assert_eq!(streamed, enc.end().unwrap().as_bytes());
        let mut enc = SinkEncoder::begin_to_sink(1, 1, Vec::new()).unwrap();
        assert!(enc.frame_raster(&raster, 10, 16).is_err());
        assert!(!enc.is_active());
        let enc =
            enc.with_alpha_threshold(1).with_pixel_order(PixelOrder::Bgra);
        assert_eq!(enc.frames(), 0);
        assert!(matches!(enc.end(), Err(Error::Terminated)));
    }
}
