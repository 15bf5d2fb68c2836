// block.rs
//
// Copyright (c) 2019-2026  Douglas Lau
//
//! GIF file blocks written by the encoder

/// Number of channels in a color table entry
pub(crate) const CHANNELS: usize = 3;

/// Extension introducer
const EXTENSION: u8 = b'!';

/// Image separator
const IMAGE_SEPARATOR: u8 = b',';

/// GIF trailer
const TRAILER: u8 = b';';

/// Graphic control extension label
const GRAPHIC_CONTROL: u8 = 0xF9;

/// Application extension label
const APPLICATION: u8 = 0xFF;

/// Disposal method for a frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum DisposalMethod {
    /// Leave the frame in place
    #[default]
    Keep,
    /// Clear the frame area to the background
    Background,
}

impl From<DisposalMethod> for u8 {
    fn from(d: DisposalMethod) -> Self {
        match d {
            DisposalMethod::Keep => 1,
            DisposalMethod::Background => 2,
        }
    }
}

/// Blocks at the start of the file, before any frames.
///
/// This is the GIF89a header, a logical screen with no global color table,
/// and a NETSCAPE2.0 extension to loop forever.
#[derive(Debug)]
pub(crate) struct Preamble {
    width: u16,
    height: u16,
}

impl Preamble {
    /// Color resolution flags for 8 bits per primary color
    const COLOR_RESOLUTION: u8 = 0b0111_0000;

    /// Application identifier and authentication code
    const NETSCAPE: &'static [u8; 11] = b"NETSCAPE2.0";

    /// Formatted size, in bytes
    pub const SIZE: usize = 32;

    /// Create a preamble for a looping animation
    pub fn with_screen_size(width: u16, height: u16) -> Self {
        Preamble { width, height }
    }

    pub fn format(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(b"GIF89a");
        buf.extend_from_slice(&self.width.to_le_bytes());
        buf.extend_from_slice(&self.height.to_le_bytes());
        buf.push(Self::COLOR_RESOLUTION);
        buf.push(0); // background color index
        buf.push(0); // pixel aspect ratio
        buf.push(EXTENSION);
        buf.push(APPLICATION);
        buf.push(Self::NETSCAPE.len() as u8);
        buf.extend_from_slice(Self::NETSCAPE);
        // loop count sub-block; zero means forever
        buf.extend_from_slice(&[3, 1, 0, 0]);
        buf.push(0);
    }
}

/// Graphic control extension, which starts every frame block
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct GraphicControl {
    disposal: DisposalMethod,
    delay_cs: u16,
    transparent: Option<u8>,
}

impl GraphicControl {
    const DISPOSAL_METHOD: u8 = 0b0001_1100;
    const TRANSPARENT_COLOR: u8 = 0b0000_0001;

    /// Offset of flags byte within a formatted block
    const FLAGS_OFFSET: usize = 3;

    /// Formatted size, in bytes
    pub const SIZE: usize = 8;

    /// Create a graphic control
    pub fn new(
        disposal: DisposalMethod,
        delay_cs: u16,
        transparent: Option<u8>,
    ) -> Self {
        GraphicControl {
            disposal,
            delay_cs,
            transparent,
        }
    }

    fn flags(&self) -> u8 {
        let d: u8 = self.disposal.into();
        let t = match self.transparent {
            Some(_) => Self::TRANSPARENT_COLOR,
            None => 0,
        };
        (d << 2) | t
    }

    pub fn format(&self, buf: &mut Vec<u8>) {
        buf.push(EXTENSION);
        buf.push(GRAPHIC_CONTROL);
        buf.push(4); // block size
        buf.push(self.flags());
        buf.extend_from_slice(&self.delay_cs.to_le_bytes());
        buf.push(self.transparent.unwrap_or_default());
        buf.push(0); // block terminator
    }

    /// Change the disposal method of a block which starts with a formatted
    /// graphic control extension.
    pub fn patch_disposal(block: &mut [u8], method: DisposalMethod) {
        debug_assert_eq!(block[0], EXTENSION);
        debug_assert_eq!(block[1], GRAPHIC_CONTROL);
        let d: u8 = method.into();
        let flags = &mut block[Self::FLAGS_OFFSET];
        *flags = (*flags & !Self::DISPOSAL_METHOD) | (d << 2);
    }
}

/// Image descriptor for a full-screen frame with a local color table
#[derive(Debug)]
pub(crate) struct ImageDesc {
    width: u16,
    height: u16,
    table_bits: u8,
}

impl ImageDesc {
    const COLOR_TABLE_PRESENT: u8 = 0b1000_0000;
    const COLOR_TABLE_SIZE: u8 = 0b0000_0111;

    /// Formatted size, in bytes
    pub const SIZE: usize = 10;

    /// Create an image descriptor.
    ///
    /// * `table_bits` Bits per color table index (1 to 8).
    pub fn new(width: u16, height: u16, table_bits: u8) -> Self {
        debug_assert!((1..=8).contains(&table_bits));
        ImageDesc {
            width,
            height,
            table_bits,
        }
    }

    fn flags(&self) -> u8 {
        let size = (self.table_bits - 1) & Self::COLOR_TABLE_SIZE;
        Self::COLOR_TABLE_PRESENT | size
    }

    pub fn format(&self, buf: &mut Vec<u8>) {
        buf.push(IMAGE_SEPARATOR);
        buf.extend_from_slice(&[0, 0, 0, 0]); // left, top
        buf.extend_from_slice(&self.width.to_le_bytes());
        buf.extend_from_slice(&self.height.to_le_bytes());
        buf.push(self.flags());
    }
}

/// Trailer at the end of the file
#[derive(Debug, Default)]
pub(crate) struct Trailer;

impl Trailer {
    /// Formatted size, in bytes
    pub const SIZE: usize = 1;

    pub fn format(&self, buf: &mut Vec<u8>) {
        buf.push(TRAILER);
    }
}
