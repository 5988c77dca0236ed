use std::error::Error;
use std::fs::{self, File};
use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex};

use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tempfile::tempdir;
use wavefilter_core::units::{Reader, Splitter, Writer};
use wavefilter_core::wav::read_header;
use wavefilter_core::{
    run, run_units, run_with_progress, split_bytes, split_stream, BoundedQueue, ChunkQueue,
    Config, FormatDescriptor, PcmSink, PipelineError, ProgressEvent, StreamOptions, UnitReport,
    WorkUnit,
};

/// Build a PCM container around `data`.
///
/// Fixtures are synthesised at runtime so the repository carries no binary
/// test assets.
fn wav_bytes(channels: u16, sample_rate: u32, bit_depth: u16, data: &[u8]) -> Vec<u8> {
    let frame_size = channels * (bit_depth / 8);
    let byte_rate = sample_rate * u32::from(frame_size);
    let data_len = data.len() as u32;

    let mut bytes = Vec::with_capacity(44 + data.len());
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes()); // PCM header size
    bytes.extend_from_slice(&1u16.to_le_bytes()); // audio format = PCM
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&frame_size.to_le_bytes());
    bytes.extend_from_slice(&bit_depth.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.extend_from_slice(data);
    bytes
}

/// Stereo 16-bit tone: a sine on the left channel, silence on the right.
fn write_stereo_tone<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    frames: usize,
) -> Result<(), Box<dyn Error>> {
    let mut data = Vec::with_capacity(frames * 4);
    for n in 0..frames {
        let theta = (n as f32 / sample_rate as f32) * 2.0 * std::f32::consts::PI * 440.0;
        let sample = (theta.sin() * i16::MAX as f32) as i16;
        data.extend_from_slice(&sample.to_le_bytes());
        data.extend_from_slice(&0i16.to_le_bytes());
    }

    let mut file = File::create(path)?;
    file.write_all(&wav_bytes(2, sample_rate, 16, &data))?;
    Ok(())
}

fn options(chunk_frames: usize, queue_capacity: usize) -> StreamOptions {
    StreamOptions {
        chunk_frames: NonZeroUsize::new(chunk_frames).expect("non-zero"),
        queue_capacity,
    }
}

#[test]
fn stages_split_five_mono_samples() -> Result<(), Box<dyn Error>> {
    let source = wav_bytes(1, 44_100, 8, &[0x00, 0x40, 0x80, 0xC0, 0xFF]);

    // Reader alone: a single chunk with all five samples.
    let read_queue: Arc<ChunkQueue> = Arc::new(BoundedQueue::unbounded());
    let mut reader = Reader::new(
        io::Cursor::new(source.clone()),
        Arc::clone(&read_queue),
        NonZeroUsize::new(1000).expect("non-zero"),
    )?;
    while reader.run()? {}
    let chunk = read_queue.pop().expect("one chunk");
    assert_eq!(chunk.len(), 5);
    assert_eq!(chunk.samples()[0], 1.0);
    assert_eq!(chunk.samples()[4], -1.0);
    assert!(read_queue.pop().is_none());

    // Splitter alone: the first odd chunk hands its leftover to the left.
    let from: Arc<ChunkQueue> = Arc::new(BoundedQueue::unbounded());
    let left: Arc<ChunkQueue> = Arc::new(BoundedQueue::unbounded());
    let right: Arc<ChunkQueue> = Arc::new(BoundedQueue::unbounded());
    from.push(chunk)?;
    from.finish();
    let mut splitter = Splitter::new(from, Arc::clone(&left), Arc::clone(&right));
    while splitter.run()? {}
    assert_eq!(left.pop().map(|c| c.len()), Some(3));
    assert_eq!(right.pop().map(|c| c.len()), Some(2));

    // Whole pipeline: both headers carry the number of bytes actually written.
    let (report, left_bytes, right_bytes) = split_bytes(source, StreamOptions::default())?;
    assert_eq!(report.format, FormatDescriptor::pcm(1, 44_100, 8));
    assert_eq!(report.samples_read, 5);
    assert_eq!(report.chunks_split, 1);
    assert_eq!((report.left_bytes, report.right_bytes), (3, 2));

    assert_eq!(&left_bytes[44..], &[0x7F, 0x00, 0x81]);
    assert_eq!(&right_bytes[44..], &[0x3F, 0xC0]);
    assert_eq!(read_header(&mut left_bytes.as_slice())?.data_size, 3);
    assert_eq!(read_header(&mut right_bytes.as_slice())?.data_size, 2);
    Ok(())
}

#[test]
fn small_chunks_and_queues_keep_every_sample() -> Result<(), Box<dyn Error>> {
    let data: Vec<u8> = (0..=255u8).cycle().take(10_001).collect();
    let source = wav_bytes(1, 8_000, 8, &data);

    let (report, left, right) = split_bytes(source, options(7, 1))?;
    assert_eq!(report.samples_read, 10_001);
    assert_eq!(report.chunks_split, 1_429);
    assert_eq!(report.left_bytes + report.right_bytes, 10_001);
    // 1428 chunks of 7 samples and a final chunk of 5: 1429 odd chunks, the
    // left output absorbs one more leftover than the right.
    assert_eq!(report.left_bytes, report.right_bytes + 1);
    assert_eq!(left.len() as u64, 44 + report.left_bytes);
    assert_eq!(right.len() as u64, 44 + report.right_bytes);
    Ok(())
}

#[test]
fn oversized_chunk_frames_read_only_the_available_data() -> Result<(), Box<dyn Error>> {
    let source = wav_bytes(1, 8_000, 8, &[0x00, 0x40, 0x80, 0xC0, 0xFF]);

    let (report, left, right) = split_bytes(source, options(usize::MAX / 2, 4))?;
    assert_eq!(report.samples_read, 5);
    assert_eq!(report.chunks_split, 1);
    assert_eq!(&left[44..], &[0x7F, 0x00, 0x81]);
    assert_eq!(&right[44..], &[0x3F, 0xC0]);
    Ok(())
}

#[test]
fn run_writes_channel_files_readable_by_symphonia() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("tone.wav");
    write_stereo_tone(&input_path, 8_000, 2_500)?;

    let output_dir = tempdir()?;
    let config = Config::builder(&input_path, output_dir.path())
        .chunk_frames(256)
        .queue_capacity(2)
        .build()?;
    let left_path = config.left_path();
    let right_path = config.right_path();

    let report = run(config)?;
    assert_eq!(report.format, FormatDescriptor::pcm(2, 8_000, 16));
    assert_eq!(report.samples_read, 5_000);
    assert_eq!(report.left_bytes, 2_500);
    assert_eq!(report.right_bytes, 2_500);

    for path in [&left_path, &right_path] {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        hint.with_extension("wav");
        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let track = probed.format.default_track().expect("default track");
        assert_eq!(track.codec_params.sample_rate, Some(44_100));
        assert_eq!(track.codec_params.channels.map(|c| c.count()), Some(1));
        assert_eq!(track.codec_params.n_frames, Some(2_500));
    }

    // The right channel is digital silence, which decodes to 1.0.
    let right = fs::read(&right_path)?;
    assert!(right[44..].iter().all(|&byte| byte == 0x7F));

    output_dir.close()?;
    work_dir.close()?;
    Ok(())
}

#[test]
fn run_reports_progress_events_in_order() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("tone.wav");
    write_stereo_tone(&input_path, 8_000, 1_000)?;

    let output_dir = tempdir()?;
    let config = Config::builder(&input_path, output_dir.path())
        .chunk_frames(300)
        .build()?;

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    run_with_progress(config, move |event| sink.lock().unwrap().push(event))?;

    let events = events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            ProgressEvent::Start { total_bytes: 4_000 },
            ProgressEvent::Advance { bytes_read: 1_200 },
            ProgressEvent::Advance { bytes_read: 2_400 },
            ProgressEvent::Advance { bytes_read: 3_600 },
            ProgressEvent::Advance { bytes_read: 4_000 },
            ProgressEvent::Finish,
        ]
    );
    Ok(())
}

#[test]
fn run_rejects_container_without_wave_tag() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("broken.wav");
    let mut bytes = wav_bytes(1, 8_000, 8, &[0; 16]);
    bytes[8..12].copy_from_slice(b"WAVX");
    fs::write(&input_path, bytes)?;

    let output_dir = tempdir()?;
    let config = Config::new(&input_path, output_dir.path())?;
    let left_path = config.left_path();

    match run(config) {
        Err(PipelineError::Format { message, .. }) => assert!(message.contains("WAVE")),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!left_path.exists(), "no output before the header is valid");
    Ok(())
}

#[test]
fn run_refuses_to_overwrite_without_permission() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("tone.wav");
    write_stereo_tone(&input_path, 8_000, 100)?;

    let output_dir = tempdir()?;
    fs::write(output_dir.path().join("left.wav"), b"keep me")?;

    let config = Config::new(&input_path, output_dir.path())?;
    match run(config) {
        Err(PipelineError::OutputExists(path)) => assert!(path.ends_with("left.wav")),
        other => panic!("unexpected result: {other:?}"),
    }

    let config = Config::builder(&input_path, output_dir.path())
        .overwrite(true)
        .build()?;
    let report = run(config)?;
    assert_eq!(report.left_bytes, 100);
    Ok(())
}

#[test]
fn failed_right_output_leaves_no_left_file_behind() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("tone.wav");
    write_stereo_tone(&input_path, 8_000, 100)?;

    let output_dir = tempdir()?;
    let config = Config::builder(&input_path, output_dir.path())
        .right_name("no-such-dir/right.wav")
        .build()?;
    match run(config) {
        Err(PipelineError::Io(_)) => {}
        other => panic!("unexpected result: {other:?}"),
    }

    assert!(!output_dir.path().join("left.wav").exists());
    assert!(fs::read_dir(output_dir.path())?.next().is_none());
    Ok(())
}

#[test]
fn run_detects_missing_output_directory() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("tone.wav");
    write_stereo_tone(&input_path, 8_000, 100)?;

    let output_dir = tempdir()?;
    let output_path = output_dir.path().to_path_buf();
    let config = Config::new(&input_path, &output_path)?;
    let configured_dir = config.output_dir.clone();

    // Remove the directory after configuration has been created to simulate external deletion.
    drop(output_dir);
    assert!(!output_path.exists());

    match run(config) {
        Err(PipelineError::MissingOutputDirectory(path)) => assert_eq!(path, configured_dir),
        other => panic!("unexpected result: {other:?}"),
    }
    Ok(())
}

#[test]
fn config_rejects_zero_chunk_frames() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("tone.wav");
    write_stereo_tone(&input_path, 8_000, 10)?;

    let err = Config::builder(&input_path, work_dir.path())
        .chunk_frames(0)
        .build()
        .expect_err("zero frames per chunk");
    assert!(matches!(err, PipelineError::InvalidChunkSize));
    Ok(())
}

#[derive(Clone, Default)]
struct SharedStream(Arc<Mutex<Vec<u8>>>);

impl Write for SharedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn unseekable_outputs_keep_placeholder_sizes() -> Result<(), Box<dyn Error>> {
    let left = SharedStream::default();
    let right = SharedStream::default();
    let source = wav_bytes(2, 8_000, 8, &[0x00, 0xFF, 0x00, 0xFF]);

    let report = split_stream(
        io::Cursor::new(source),
        PcmSink::stream(left.clone()),
        PcmSink::stream(right.clone()),
        StreamOptions::default(),
        None,
    )?;
    assert_eq!((report.left_bytes, report.right_bytes), (2, 2));

    let left = left.0.lock().unwrap().clone();
    let header = read_header(&mut left.as_slice())?;
    assert_eq!(header.data_size, u32::MAX);
    assert_eq!(&left[44..], &[0x7F, 0x7F]);
    Ok(())
}

struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn failing_writer_stops_the_whole_pipeline() -> Result<(), Box<dyn Error>> {
    let data: Vec<u8> = vec![0x10; 50_000];
    let source = wav_bytes(1, 8_000, 8, &data);

    let read_queue: Arc<ChunkQueue> = Arc::new(BoundedQueue::new(1));
    let left_queue: Arc<ChunkQueue> = Arc::new(BoundedQueue::new(1));
    let right_queue: Arc<ChunkQueue> = Arc::new(BoundedQueue::new(1));
    let right = SharedStream::default();

    // The left sink fails only after its header, so the unit is constructed.
    struct HeaderOnly(usize);
    impl Write for HeaderOnly {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.0 >= 44 {
                return FailingWriter.write(buf);
            }
            let accepted = buf.len().min(44 - self.0);
            self.0 += accepted;
            Ok(accepted)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let units: Vec<Box<dyn WorkUnit>> = vec![
        Box::new(Reader::new(
            io::Cursor::new(source),
            Arc::clone(&read_queue),
            NonZeroUsize::new(100).expect("non-zero"),
        )?),
        Box::new(Splitter::new(
            read_queue,
            Arc::clone(&left_queue),
            Arc::clone(&right_queue),
        )),
        Box::new(Writer::new(
            "left-writer",
            PcmSink::stream(HeaderOnly(0)),
            left_queue,
        )?),
        Box::new(Writer::new(
            "right-writer",
            PcmSink::stream(right),
            right_queue,
        )?),
    ];

    match run_units(units) {
        Err(PipelineError::Io(err)) => assert_eq!(err.to_string(), "disk full"),
        other => panic!("unexpected result: {other:?}"),
    }
    Ok(())
}

#[test]
fn reports_follow_unit_order() -> Result<(), Box<dyn Error>> {
    let source = wav_bytes(1, 8_000, 8, &[0x00; 9]);
    let read_queue: Arc<ChunkQueue> = Arc::new(BoundedQueue::new(2));
    let left_queue: Arc<ChunkQueue> = Arc::new(BoundedQueue::new(2));
    let right_queue: Arc<ChunkQueue> = Arc::new(BoundedQueue::new(2));

    let units: Vec<Box<dyn WorkUnit>> = vec![
        Box::new(Reader::new(
            io::Cursor::new(source),
            Arc::clone(&read_queue),
            NonZeroUsize::new(3).expect("non-zero"),
        )?),
        Box::new(Splitter::new(
            read_queue,
            Arc::clone(&left_queue),
            Arc::clone(&right_queue),
        )),
        Box::new(Writer::new(
            "left-writer",
            PcmSink::stream(SharedStream::default()),
            left_queue,
        )?),
        Box::new(Writer::new(
            "right-writer",
            PcmSink::stream(SharedStream::default()),
            right_queue,
        )?),
    ];

    let reports = run_units(units)?;
    // Three chunks of three samples: leftovers go left, right, left.
    assert_eq!(
        reports,
        vec![
            UnitReport::new("reader", 9),
            UnitReport::new("splitter", 3),
            UnitReport::new("left-writer", 5),
            UnitReport::new("right-writer", 4),
        ]
    );
    Ok(())
}
