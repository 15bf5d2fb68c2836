#![no_main]
use gifrec::{Budget, Encoder, PixelOrder};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 6 {
        return;
    }
    let width = u16::from(data[0] % 32);
    let height = u16::from(data[1] % 32);
    let depth = data[2];
    let threshold = data[3];
    let order = if data[4] & 1 == 0 {
        PixelOrder::Rgba
    } else {
        PixelOrder::Bgra
    };
    let pitch = isize::from(data[5] as i8);
    let pixels = &data[6..];
    let mut budget = Budget::new(8 << 20);
    if let Ok(enc) = Encoder::begin_with(width, height, &mut budget) {
        let mut enc =
            enc.with_alpha_threshold(threshold).with_pixel_order(order);
        for chunk in pixels.chunks(1024) {
            if enc.frame(chunk, pitch, 1, depth).is_err() {
                break;
            }
        }
        if let Ok(gif) = enc.end() {
            gif.release(&mut budget);
        }
    }
    assert_eq!(budget.used(), 0);
});
