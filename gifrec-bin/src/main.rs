// main.rs      gifrec command
//
// Copyright (c) 2019-2026  Douglas Lau
//
#![forbid(unsafe_code)]

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use gifrec::{Encoder, PixelOrder, SinkEncoder};
use pix::{rgb::SRgba8, Raster};
use std::error::Error;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::str::FromStr;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Crate version
const VERSION: &str = std::env!("CARGO_PKG_VERSION");

/// Demo animation width
const DEMO_WIDTH: u16 = 160;

/// Demo animation height
const DEMO_HEIGHT: u16 = 120;

/// Demo square size
const DEMO_SQUARE: i32 = 24;

/// Encoder writing to memory or streaming to a file
enum Recorder {
    Memory(Encoder, BufWriter<File>),
    Stream(SinkEncoder<BufWriter<File>>),
}

/// Main entry point
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::builder().format_timestamp(None).init();
    let mut out = StandardStream::stdout(ColorChoice::Always);
    match create_app().get_matches().subcommand() {
        ("encode", Some(matches)) => encode(&mut out, matches)?,
        ("demo", Some(matches)) => demo(&mut out, matches)?,
        _ => unreachable!(),
    }
    out.reset()?;
    Ok(())
}

/// Create clap App
fn create_app() -> App<'static, 'static> {
    App::new("gifrec")
        .version(VERSION)
        .setting(AppSettings::GlobalVersion)
        .about("Animated GIF recorder")
        .setting(AppSettings::ArgRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("encode")
                .about("Encode raw RGBA frames into a GIF")
                .arg(
                    Arg::with_name("frames")
                        .required(true)
                        .min_values(1)
                        .help("raw frame file(s)"),
                )
                .arg(
                    Arg::with_name("width")
                        .short("W")
                        .long("width")
                        .takes_value(true)
                        .required(true)
                        .help("frame width"),
                )
                .arg(
                    Arg::with_name("height")
                        .short("H")
                        .long("height")
                        .takes_value(true)
                        .required(true)
                        .help("frame height"),
                )
                .arg(delay_arg())
                .arg(
                    Arg::with_name("depth")
                        .short("b")
                        .long("depth")
                        .takes_value(true)
                        .default_value("16")
                        .help("maximum color depth (1-16)"),
                )
                .arg(
                    Arg::with_name("alpha")
                        .short("a")
                        .long("alpha")
                        .takes_value(true)
                        .default_value("0")
                        .help("alpha threshold (0 for opaque)"),
                )
                .arg(
                    Arg::with_name("bgra")
                        .long("bgra")
                        .help("frames are in BGRA byte order"),
                )
                .arg(
                    Arg::with_name("flip")
                        .long("flip")
                        .help("frame rows are stored bottom-up"),
                )
                .arg(stream_arg())
                .arg(output_arg().required(true)),
        )
        .subcommand(
            SubCommand::with_name("demo")
                .about("Record a demo animation")
                .arg(
                    Arg::with_name("count")
                        .short("n")
                        .long("count")
                        .takes_value(true)
                        .default_value("60")
                        .help("number of frames"),
                )
                .arg(delay_arg())
                .arg(stream_arg())
                .arg(output_arg().default_value("demo.gif")),
        )
}

/// Create frame delay arg
fn delay_arg() -> Arg<'static, 'static> {
    Arg::with_name("delay")
        .short("d")
        .long("delay")
        .takes_value(true)
        .default_value("4")
        .help("frame delay (centiseconds)")
}

/// Create stream arg
fn stream_arg() -> Arg<'static, 'static> {
    Arg::with_name("stream")
        .long("stream")
        .help("write blocks as they are encoded")
}

/// Create output file arg
fn output_arg() -> Arg<'static, 'static> {
    Arg::with_name("output")
        .short("o")
        .long("output")
        .takes_value(true)
        .help("output file")
}

/// Parse a numeric arg value
fn parse<T>(matches: &ArgMatches, name: &str) -> Result<T, Box<dyn Error>>
where
    T: FromStr,
    T::Err: Error + 'static,
{
    match matches.value_of(name) {
        Some(v) => Ok(v.parse()?),
        None => Err(format!("missing {}", name).into()),
    }
}

impl Recorder {
    /// Create a recorder for an output file
    fn new(
        matches: &ArgMatches,
        width: u16,
        height: u16,
    ) -> Result<Self, Box<dyn Error>> {
        let path = matches.value_of_os("output").ok_or("missing output")?;
        let writer = BufWriter::new(File::create(path)?);
        if matches.is_present("stream") {
            Ok(Recorder::Stream(SinkEncoder::begin_to_sink(
                width, height, writer,
            )?))
        } else {
            Ok(Recorder::Memory(Encoder::begin(width, height)?, writer))
        }
    }

    /// Set alpha threshold and pixel order
    fn with_options(self, threshold: u8, order: PixelOrder) -> Self {
        match self {
            Recorder::Memory(enc, writer) => Recorder::Memory(
                enc.with_alpha_threshold(threshold).with_pixel_order(order),
                writer,
            ),
            Recorder::Stream(enc) => Recorder::Stream(
                enc.with_alpha_threshold(threshold).with_pixel_order(order),
            ),
        }
    }

    /// Encode one frame of raw pixels
    fn frame(
        &mut self,
        pixels: &[u8],
        pitch: isize,
        delay_cs: u16,
        max_depth: u8,
    ) -> gifrec::Result<()> {
        match self {
            Recorder::Memory(enc, _) => {
                enc.frame(pixels, pitch, delay_cs, max_depth)
            }
            Recorder::Stream(enc) => {
                enc.frame(pixels, pitch, delay_cs, max_depth)
            }
        }
    }

    /// Encode one frame from a raster
    fn frame_raster(
        &mut self,
        raster: &Raster<SRgba8>,
        delay_cs: u16,
    ) -> gifrec::Result<()> {
        match self {
            Recorder::Memory(enc, _) => enc.frame_raster(raster, delay_cs, 16),
            Recorder::Stream(enc) => enc.frame_raster(raster, delay_cs, 16),
        }
    }

    /// Finish the animation
    fn end(self) -> Result<(), Box<dyn Error>> {
        let mut writer = match self {
            Recorder::Memory(enc, mut writer) => {
                let gif = enc.end()?;
                writer.write_all(gif.as_bytes())?;
                writer
            }
            Recorder::Stream(enc) => enc.end()?,
        };
        writer.flush()?;
        Ok(())
    }
}

/// Handle encode subcommand
fn encode(
    out: &mut StandardStream,
    matches: &ArgMatches,
) -> Result<(), Box<dyn Error>> {
    let width: u16 = parse(matches, "width")?;
    let height: u16 = parse(matches, "height")?;
    let delay: u16 = parse(matches, "delay")?;
    let depth: u8 = parse(matches, "depth")?;
    let threshold: u8 = parse(matches, "alpha")?;
    let order = if matches.is_present("bgra") {
        PixelOrder::Bgra
    } else {
        PixelOrder::Rgba
    };
    let pitch = if matches.is_present("flip") {
        -isize::try_from(usize::from(width) * 4)?
    } else {
        0
    };
    let mut rec =
        Recorder::new(matches, width, height)?.with_options(threshold, order);
    let paths = matches.values_of_os("frames").ok_or("missing frames")?;
    for (number, path) in paths.enumerate() {
        let pixels = fs::read(path)?;
        rec.frame(&pixels, pitch, delay, depth)?;
        show_frame(out, number, path, pixels.len())?;
    }
    rec.end()?;
    show_output(out, matches)
}

/// Handle demo subcommand
fn demo(
    out: &mut StandardStream,
    matches: &ArgMatches,
) -> Result<(), Box<dyn Error>> {
    let count: usize = parse(matches, "count")?;
    let delay: u16 = parse(matches, "delay")?;
    let mut rec = Recorder::new(matches, DEMO_WIDTH, DEMO_HEIGHT)?;
    let mut raster = Raster::<SRgba8>::with_clear(
        DEMO_WIDTH.into(),
        DEMO_HEIGHT.into(),
    );
    for number in 0..count {
        render_demo(&mut raster, number);
        rec.frame_raster(&raster, delay)?;
        let name = format!("demo #{}", number);
        let len = raster.as_u8_slice().len();
        show_frame(out, number, OsStr::new(&name), len)?;
    }
    rec.end()?;
    show_output(out, matches)
}

/// Render one frame of the demo: a square bouncing over a gradient
fn render_demo(raster: &mut Raster<SRgba8>, number: usize) {
    let w = i32::from(DEMO_WIDTH);
    let h = i32::from(DEMO_HEIGHT);
    let n = number as i32;
    let sx = bounce(n * 3, w - DEMO_SQUARE);
    let sy = bounce(n * 2, h - DEMO_SQUARE);
    for y in 0..h {
        for x in 0..w {
            let inside = (sx..sx + DEMO_SQUARE).contains(&x)
                && (sy..sy + DEMO_SQUARE).contains(&y);
            let clr = if inside {
                SRgba8::new(255, 224, 32, 255)
            } else {
                let r = (x * 255 / w) as u8;
                let g = (y * 255 / h) as u8;
                SRgba8::new(r, g, 128, 255)
            };
            *raster.pixel_mut(x, y) = clr;
        }
    }
}

/// Bounce a position between 0 and a limit
fn bounce(pos: i32, limit: i32) -> i32 {
    let pos = pos % (limit * 2);
    if pos < limit {
        pos
    } else {
        limit * 2 - pos
    }
}

/// Show status for one frame
fn show_frame(
    out: &mut StandardStream,
    number: usize,
    path: &OsStr,
    len: usize,
) -> Result<(), Box<dyn Error>> {
    let mut dflt = ColorSpec::new();
    dflt.set_fg(Some(Color::White));
    let mut bold = ColorSpec::new();
    bold.set_fg(Some(Color::White))
        .set_intense(true)
        .set_bold(true);
    out.set_color(&bold)?;
    write!(out, "{:>4}", number)?;
    out.set_color(&dflt)?;
    writeln!(out, " {:?} ({} bytes)", path, len)?;
    Ok(())
}

/// Show the output file and its size
fn show_output(
    out: &mut StandardStream,
    matches: &ArgMatches,
) -> Result<(), Box<dyn Error>> {
    let mut magenta = ColorSpec::new();
    magenta.set_fg(Some(Color::Magenta));
    let mut yellow = ColorSpec::new();
    yellow.set_fg(Some(Color::Yellow)).set_intense(true);
    let path = matches.value_of_os("output").ok_or("missing output")?;
    let len = fs::metadata(path)?.len();
    out.set_color(&magenta)?;
    write!(out, "{:?}", path)?;
    out.set_color(&yellow)?;
    writeln!(out, " {} bytes", len)?;
    Ok(())
}
