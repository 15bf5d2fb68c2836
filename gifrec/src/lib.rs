// lib.rs      gifrec crate.
//
// Copyright (c) 2019-2026  Douglas Lau
//
//! An incremental encoder for animated GIF files.
//!
//! Raw RGBA8 or BGRA8 frames are quantized with ordered dithering, at the
//! highest color depth which fits in one local color table.  Pixels which
//! did not change from the previous frame become transparent when
//! possible, so mostly-static animations compress well.
//!
//! The whole file can be built in memory with an [Encoder], or streamed
//! to a writer with a [SinkEncoder].  All buffers are requested through an
//! [Allocator], which can put a hard limit on memory use.
//!
//! [Allocator]: trait.Allocator.html
//! [Encoder]: struct.Encoder.html
//! [SinkEncoder]: struct.SinkEncoder.html
#![forbid(unsafe_code)]

#[macro_use]
extern crate log;

mod block;
mod chain;
mod config;
mod cook;
mod encode;
mod error;
mod lzw;
mod memory;
mod palette;

pub use crate::config::{
    alpha_threshold, pixel_order, set_alpha_threshold, set_pixel_order,
    PixelOrder,
};
pub use crate::encode::{Encoder, Gif, SinkEncoder};
pub use crate::error::{Error, Result};
pub use crate::memory::{Allocator, Budget, Heap};
