use std::path::PathBuf;

use clap::{builder::ValueParser, value_parser, Arg, ArgAction, Command};
use wavefilter_core::{DEFAULT_LEFT_NAME, DEFAULT_RIGHT_NAME};

/// Upper bound for `--chunk-frames`; larger chunks only cost memory.
pub const MAX_CHUNK_FRAMES: usize = 1 << 20;

/// Parse the number of frames decoded per chunk.
///
/// Accepts plain decimal integers with optional `_` digit separators, such as
/// `"4096"` or `"16_384"`. The value must lie in `1..=MAX_CHUNK_FRAMES`.
pub fn parse_chunk_frames(value: &str) -> Result<usize, String> {
    let input = value.trim();
    if input.is_empty() {
        return Err("chunk size cannot be empty".into());
    }

    let invalid = || format!("invalid chunk size '{value}'");
    if input.starts_with('_') || input.ends_with('_') {
        return Err(invalid());
    }

    let digits: String = input.chars().filter(|&c| c != '_').collect();
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let frames = digits
        .parse::<usize>()
        .map_err(|_| format!("chunk size '{value}' is too large"))?;
    if frames == 0 {
        return Err("chunk size must be greater than zero".into());
    }
    if frames > MAX_CHUNK_FRAMES {
        return Err(format!(
            "chunk size must not exceed {MAX_CHUNK_FRAMES} frames"
        ));
    }

    Ok(frames)
}

pub fn build_cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Split a PCM WAV file into two 8-bit mono files")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("OUTPUT_DIR")
                .help("Directory where the two outputs will be written")
                .default_value(".")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("chunk-frames")
                .long("chunk-frames")
                .value_name("FRAMES")
                .help("Frames decoded per chunk")
                .default_value("1000")
                .value_parser(ValueParser::new(parse_chunk_frames)),
        )
        .arg(
            Arg::new("queue-capacity")
                .long("queue-capacity")
                .value_name("CHUNKS")
                .help("Chunks buffered between stages before producers block (0 = unbounded)")
                .default_value("10")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("left")
                .long("left")
                .value_name("NAME")
                .help("File name of the first output")
                .default_value(DEFAULT_LEFT_NAME),
        )
        .arg(
            Arg::new("right")
                .long("right")
                .value_name("NAME")
                .help("File name of the second output")
                .default_value(DEFAULT_RIGHT_NAME),
        )
        .arg(
            Arg::new("overwrite")
                .long("overwrite")
                .help("Allow overwriting existing files in the output directory")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("file_path")
                .value_name("FILE_PATH")
                .help("Path to the input WAV file")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
}
