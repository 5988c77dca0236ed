//! Minimal RIFF/WAVE linear PCM codec.
//!
//! [`WavReader`] validates the canonical 44-byte header and decodes the data
//! chunk into normalised floats. [`WavWriter`] emits 8-bit mono streams and
//! patches the size fields in place once the stream is complete.

use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Take, Write};

use log::{info, warn};

use crate::chunk::Chunk;
use crate::error::PipelineError;

pub const RIFF_TAG: [u8; 4] = *b"RIFF";
pub const WAVE_TAG: [u8; 4] = *b"WAVE";
pub const FMT_TAG: [u8; 4] = *b"fmt ";
pub const DATA_TAG: [u8; 4] = *b"data";

/// Size of the linear PCM `fmt ` payload.
pub const FMT_CHUNK_SIZE: u32 = 16;
pub const PCM_FORMAT_CODE: u16 = 1;

/// Length of the header written by [`WavWriter`].
pub const HEADER_LEN: u64 = 44;
const RIFF_SIZE_OFFSET: u64 = 4;
const DATA_SIZE_OFFSET: u64 = 40;
/// Bytes counted by the RIFF size field besides the sample data.
const RIFF_OVERHEAD: u64 = HEADER_LEN - 8;
/// Size written before the real totals are known.
const PLACEHOLDER_SIZE: u32 = u32::MAX;

/// Sample rate stamped into every output stream.
pub const OUTPUT_SAMPLE_RATE: u32 = 44_100;

const SUPPORTED_BIT_DEPTHS: [u16; 4] = [8, 16, 24, 32];

/// Layout of the PCM samples in a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub channels: u16,
    pub sample_rate: u32,
    /// Bytes per second, `frame_size * sample_rate`.
    pub byte_rate: u32,
    /// Bytes per multi-channel frame, `channels * bit_depth / 8`.
    pub frame_size: u16,
    pub bit_depth: u16,
}

impl FormatDescriptor {
    /// Descriptor with the derived fields filled in consistently.
    pub fn pcm(channels: u16, sample_rate: u32, bit_depth: u16) -> Self {
        let frame_size = channels * (bit_depth / 8);
        Self {
            channels,
            sample_rate,
            byte_rate: u32::from(frame_size) * sample_rate,
            frame_size,
            bit_depth,
        }
    }

    /// Format of the streams produced by [`WavWriter`].
    pub fn output() -> Self {
        Self::pcm(1, OUTPUT_SAMPLE_RATE, 8)
    }

    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bit_depth / 8)
    }

    /// Check the supported ranges and the cross-field invariants.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.channels != 1 && self.channels != 2 {
            return Err(PipelineError::format(format!(
                "unsupported channel count {} (only mono and stereo are handled)",
                self.channels
            )));
        }

        if !SUPPORTED_BIT_DEPTHS.contains(&self.bit_depth) {
            return Err(PipelineError::format(format!(
                "unsupported bit depth {} (expected 8, 16, 24 or 32)",
                self.bit_depth
            )));
        }

        let expected_frame_size = u32::from(self.channels) * u32::from(self.bit_depth) / 8;
        if u32::from(self.frame_size) != expected_frame_size {
            return Err(PipelineError::format(format!(
                "expected frame size to be {expected_frame_size}, found {}",
                self.frame_size
            )));
        }

        let expected_byte_rate = u64::from(self.frame_size) * u64::from(self.sample_rate);
        if u64::from(self.byte_rate) != expected_byte_rate {
            return Err(PipelineError::format(format!(
                "expected byte rate to be {expected_byte_rate}, found {}",
                self.byte_rate
            )));
        }

        Ok(())
    }

    fn parse(payload: &[u8; FMT_CHUNK_SIZE as usize]) -> Result<Self, PipelineError> {
        let code = u16::from_le_bytes([payload[0], payload[1]]);
        if code != PCM_FORMAT_CODE {
            return Err(PipelineError::format(format!(
                "unsupported encoding {code} (only linear PCM is handled)"
            )));
        }

        let format = Self {
            channels: u16::from_le_bytes([payload[2], payload[3]]),
            sample_rate: u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]),
            byte_rate: u32::from_le_bytes([payload[8], payload[9], payload[10], payload[11]]),
            frame_size: u16::from_le_bytes([payload[12], payload[13]]),
            bit_depth: u16::from_le_bytes([payload[14], payload[15]]),
        };
        format.validate()?;
        Ok(format)
    }

    fn to_bytes(self) -> [u8; FMT_CHUNK_SIZE as usize] {
        let mut payload = [0u8; FMT_CHUNK_SIZE as usize];
        payload[0..2].copy_from_slice(&PCM_FORMAT_CODE.to_le_bytes());
        payload[2..4].copy_from_slice(&self.channels.to_le_bytes());
        payload[4..8].copy_from_slice(&self.sample_rate.to_le_bytes());
        payload[8..12].copy_from_slice(&self.byte_rate.to_le_bytes());
        payload[12..14].copy_from_slice(&self.frame_size.to_le_bytes());
        payload[14..16].copy_from_slice(&self.bit_depth.to_le_bytes());
        payload
    }
}

/// Parsed header of a PCM container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WavHeader {
    pub format: FormatDescriptor,
    pub riff_size: u32,
    pub data_size: u32,
}

/// Read and validate the header, leaving `reader` at the first data byte.
pub fn read_header<R: Read>(reader: &mut R) -> Result<WavHeader, PipelineError> {
    expect_tag(reader, RIFF_TAG)?;
    let riff_size = read_u32(reader, "'RIFF' size")?;
    expect_tag(reader, WAVE_TAG)?;
    expect_tag(reader, FMT_TAG)?;

    let fmt_size = read_u32(reader, "'fmt ' size")?;
    if fmt_size != FMT_CHUNK_SIZE {
        return Err(PipelineError::format(format!(
            "expected 'fmt ' chunk of size {FMT_CHUNK_SIZE}, found {fmt_size}"
        )));
    }
    let mut payload = [0u8; FMT_CHUNK_SIZE as usize];
    read_field(reader, &mut payload, "'fmt ' payload")?;
    let format = FormatDescriptor::parse(&payload)?;

    expect_tag(reader, DATA_TAG)?;
    let data_size = read_u32(reader, "'data' size")?;

    Ok(WavHeader {
        format,
        riff_size,
        data_size,
    })
}

fn expect_tag<R: Read>(reader: &mut R, expected: [u8; 4]) -> Result<(), PipelineError> {
    let label = String::from_utf8_lossy(&expected).into_owned();
    let mut found = [0u8; 4];
    read_field(reader, &mut found, &format!("'{label}' tag"))?;
    if found != expected {
        return Err(PipelineError::format(format!(
            "failed to detect '{label}', found '{}'",
            found.escape_ascii()
        )));
    }
    Ok(())
}

fn read_u32<R: Read>(reader: &mut R, what: &str) -> Result<u32, PipelineError> {
    let mut bytes = [0u8; 4];
    read_field(reader, &mut bytes, what)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_field<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<(), PipelineError> {
    reader.read_exact(buf).map_err(|err| {
        if err.kind() == ErrorKind::UnexpectedEof {
            PipelineError::format(format!("truncated stream while reading {what}"))
        } else {
            PipelineError::Io(err)
        }
    })
}

/// Decode one little-endian sample of 1 to 4 bytes.
///
/// The raw value is the unsigned byte image and the result is
/// `1.0 - raw / (max / 2)`, which inverts the sign: `0x00` maps to `1.0` and
/// an all-ones sample to `-1.0`. Output is not clamped.
pub fn decode_sample(bytes: &[u8]) -> f32 {
    let (raw, max) = bytes
        .iter()
        .rev()
        .fold((0u64, 0u64), |(raw, max), &byte| {
            ((raw << 8) | u64::from(byte), (max << 8) | 0xff)
        });
    (1.0 - raw as f64 / (max as f64 / 2.0)) as f32
}

/// Decode a whole number of frames into interleaved samples.
pub fn decode_samples(format: &FormatDescriptor, bytes: &[u8]) -> Result<Vec<f32>, PipelineError> {
    let frame_size = usize::from(format.frame_size);
    if frame_size == 0 || bytes.len() % frame_size != 0 {
        return Err(PipelineError::format(format!(
            "misaligned read: expected a multiple of {frame_size} bytes, found {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(format.bytes_per_sample())
        .map(decode_sample)
        .collect())
}

/// Encode a normalised sample as a signed 8-bit value, truncating toward zero.
pub fn encode_sample(sample: f32) -> i8 {
    (sample * 127.0) as i8
}

/// Streaming decoder for the data chunk of a PCM container.
#[derive(Debug)]
pub struct WavReader<R> {
    inner: Take<R>,
    header: WavHeader,
    buffer: Vec<u8>,
}

impl<R: Read> WavReader<R> {
    /// Parse the header. Reads are bounded by the declared data size.
    pub fn open(mut reader: R) -> Result<Self, PipelineError> {
        let header = read_header(&mut reader)?;
        let format = header.format;
        info!(
            "channels: {} sample rate: {} byte rate: {} frame size: {} bit depth: {} data size: {}",
            format.channels,
            format.sample_rate,
            format.byte_rate,
            format.frame_size,
            format.bit_depth,
            header.data_size
        );

        Ok(Self {
            inner: reader.take(u64::from(header.data_size)),
            header,
            buffer: Vec::new(),
        })
    }

    pub fn header(&self) -> &WavHeader {
        &self.header
    }

    pub fn format(&self) -> &FormatDescriptor {
        &self.header.format
    }

    /// Decode up to `frames` frames. `Ok(None)` marks the end of the data.
    pub fn read_chunk(&mut self, frames: usize) -> Result<Option<Chunk>, PipelineError> {
        let remaining = usize::try_from(self.inner.limit()).unwrap_or(usize::MAX);
        let wanted = frames
            .saturating_mul(usize::from(self.header.format.frame_size))
            .min(remaining);
        self.buffer.resize(wanted, 0);

        let filled = read_full(&mut self.inner, &mut self.buffer)?;
        if filled == 0 {
            return Ok(None);
        }

        let samples = decode_samples(&self.header.format, &self.buffer[..filled])?;
        Ok(Some(Chunk::from(samples)))
    }
}

/// Fill `buf` until it is full or the reader is exhausted.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Blanket trait for sinks that can patch earlier bytes.
pub trait SeekWrite: Write + Seek {}

impl<T: Write + Seek> SeekWrite for T {}

/// Byte sink for a [`WavWriter`].
pub enum PcmSink {
    /// Header sizes are patched when the writer is finalised.
    Seekable(Box<dyn SeekWrite + Send>),
    /// Header sizes keep their placeholder values.
    Stream(Box<dyn Write + Send>),
}

impl PcmSink {
    pub fn seekable<W: Write + Seek + Send + 'static>(sink: W) -> Self {
        Self::Seekable(Box::new(sink))
    }

    pub fn stream<W: Write + Send + 'static>(sink: W) -> Self {
        Self::Stream(Box::new(sink))
    }

    pub fn is_seekable(&self) -> bool {
        matches!(self, Self::Seekable(_))
    }
}

impl Write for PcmSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Seekable(sink) => sink.write(buf),
            Self::Stream(sink) => sink.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Seekable(sink) => sink.flush(),
            Self::Stream(sink) => sink.flush(),
        }
    }
}

/// Writer for 8-bit mono PCM containers.
pub struct WavWriter {
    sink: PcmSink,
    data_bytes: u64,
    finalized: bool,
    scratch: Vec<u8>,
}

impl WavWriter {
    /// Write a header with placeholder sizes.
    pub fn create(mut sink: PcmSink) -> Result<Self, PipelineError> {
        write_header(&mut sink, &FormatDescriptor::output())?;
        Ok(Self {
            sink,
            data_bytes: 0,
            finalized: false,
            scratch: Vec::new(),
        })
    }

    /// Encode `samples` with [`encode_sample`] and append them.
    pub fn write_samples(&mut self, samples: &[f32]) -> Result<usize, PipelineError> {
        self.scratch.clear();
        self.scratch
            .extend(samples.iter().map(|&sample| encode_sample(sample) as u8));
        self.sink.write_all(&self.scratch)?;
        self.data_bytes += self.scratch.len() as u64;
        Ok(self.scratch.len())
    }

    /// Sample bytes written so far.
    pub fn data_bytes(&self) -> u64 {
        self.data_bytes
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Patch the size fields with the real totals and flush.
    ///
    /// Returns `false` when the sink cannot seek; the header then keeps its
    /// placeholder sizes. Calling this again is a no-op.
    pub fn finalize(&mut self) -> Result<bool, PipelineError> {
        if self.finalized {
            return Ok(self.sink.is_seekable());
        }
        self.finalized = true;

        let sink = match &mut self.sink {
            PcmSink::Seekable(sink) => sink,
            PcmSink::Stream(sink) => {
                sink.flush()?;
                warn!("output is not seekable, leaving placeholder header sizes");
                return Ok(false);
            }
        };

        let riff_size = clamp_size(self.data_bytes + RIFF_OVERHEAD);
        let data_size = clamp_size(self.data_bytes);

        sink.seek(SeekFrom::Start(RIFF_SIZE_OFFSET))?;
        sink.write_all(&riff_size.to_le_bytes())?;
        sink.seek(SeekFrom::Start(DATA_SIZE_OFFSET))?;
        sink.write_all(&data_size.to_le_bytes())?;
        sink.seek(SeekFrom::End(0))?;
        sink.flush()?;

        Ok(true)
    }
}

fn clamp_size(size: u64) -> u32 {
    u32::try_from(size).unwrap_or_else(|_| {
        warn!("stream of {size} bytes does not fit a RIFF size field");
        u32::MAX
    })
}

fn write_header<W: Write>(sink: &mut W, format: &FormatDescriptor) -> io::Result<()> {
    sink.write_all(&RIFF_TAG)?;
    sink.write_all(&PLACEHOLDER_SIZE.to_le_bytes())?;
    sink.write_all(&WAVE_TAG)?;
    sink.write_all(&FMT_TAG)?;
    sink.write_all(&FMT_CHUNK_SIZE.to_le_bytes())?;
    sink.write_all(&format.to_bytes())?;
    sink.write_all(&DATA_TAG)?;
    sink.write_all(&PLACEHOLDER_SIZE.to_le_bytes())?;
    Ok(())
}
