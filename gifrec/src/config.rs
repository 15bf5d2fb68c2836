// config.rs
//
// Copyright (c) 2026  Douglas Lau
//
//! Process-wide encoder settings
//!
//! These values are read at the start of every `frame` call, unless the
//! encoder was built with its own overrides.
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Alpha threshold for transparency (0 disables)
static ALPHA_THRESHOLD: AtomicU8 = AtomicU8::new(0);

/// Pixel byte order flag (`true` for BGRA)
static BGRA: AtomicBool = AtomicBool::new(false);

/// Byte order of source pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PixelOrder {
    /// Red, green, blue, alpha
    #[default]
    Rgba,
    /// Blue, green, red, alpha
    Bgra,
}

/// Set the alpha threshold.
///
/// GIF only supports 1-bit transparency.  Pixels with alpha less than the
/// threshold become fully transparent; all others are fully opaque.  A
/// threshold of 0 ignores the alpha channel, which is the initial setting.
pub fn set_alpha_threshold(threshold: u8) {
    ALPHA_THRESHOLD.store(threshold, Ordering::Relaxed);
}

/// Get the alpha threshold.
pub fn alpha_threshold() -> u8 {
    ALPHA_THRESHOLD.load(Ordering::Relaxed)
}

/// Set the pixel byte order.
pub fn set_pixel_order(order: PixelOrder) {
    BGRA.store(order == PixelOrder::Bgra, Ordering::Relaxed);
}

/// Get the pixel byte order.
pub fn pixel_order() -> PixelOrder {
    if BGRA.load(Ordering::Relaxed) {
        PixelOrder::Bgra
    } else {
        PixelOrder::Rgba
    }
}
