//! Audio file decoding and WAV encoding
//!
//! Songs arrive as mp3 (anything Symphonia can probe is accepted); drum
//! tracks, detector renders and exports are written as 16-bit PCM WAV with
//! hound. Samples outside full scale are saturated when encoded.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::track::AudioTrack;
use crate::types::Sample;

/// Audio file errors
#[derive(Error, Debug)]
pub enum AudioFileError {
    /// File not found or couldn't be opened
    #[error("Failed to open audio file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Container or codec Symphonia can't handle
    #[error("Unsupported audio format in {path:?}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    /// Decoding produced no samples at all
    #[error("Audio file {0:?} contains no decodable audio")]
    Empty(PathBuf),

    #[error("Failed to write WAV file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    /// Scratch file for a render couldn't be created
    #[error("Failed to create temporary render: {0}")]
    TempFile(#[source] std::io::Error),
}

/// Decode an audio file into an [`AudioTrack`] at its native rate and channel count
pub fn decode<P: AsRef<Path>>(path: P) -> Result<AudioTrack, AudioFileError> {
    let path = path.as_ref();
    let unsupported = |reason: String| AudioFileError::UnsupportedFormat {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|source| AudioFileError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Create a hint with the file extension
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| unsupported(e.to_string()))?;
    let mut format = probed.format;

    // Find the first audio track
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| unsupported("No audio track found".to_string()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| unsupported(e.to_string()))?;

    let mut samples: Vec<Sample> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<Sample>> = None;
    let mut buf_frames: u64 = 0;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                log::warn!("decode: error reading packet from {:?}: {}", path, e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("decode: skipping corrupt packet in {:?}: {}", path, e);
                continue;
            }
            Err(e) => return Err(unsupported(e.to_string())),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        // (Re)allocate when a packet is larger than anything seen so far
        let capacity = decoded.capacity() as u64;
        if sample_buf.is_none() || capacity > buf_frames {
            sample_buf = Some(SampleBuffer::new(capacity, spec));
            buf_frames = capacity;
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    if samples.is_empty() || sample_rate == 0 || channels == 0 {
        return Err(AudioFileError::Empty(path.to_path_buf()));
    }

    // Drop a trailing partial frame, if any
    samples.truncate(samples.len() - samples.len() % channels as usize);

    log::debug!(
        "decode: {:?} -> {} frames, {} channels, {}Hz",
        path,
        samples.len() / channels as usize,
        channels,
        sample_rate
    );

    Ok(AudioTrack::from_interleaved(samples, sample_rate, channels))
}

/// Write a track as a 16-bit PCM WAV file
pub fn write_wav<P: AsRef<Path>>(track: &AudioTrack, path: P) -> Result<(), AudioFileError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| AudioFileError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    encode_wav(track, BufWriter::new(file)).map_err(|source| AudioFileError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn encode_wav<W>(track: &AudioTrack, writer: W) -> Result<(), hound::Error>
where
    W: std::io::Write + std::io::Seek,
{
    let spec = hound::WavSpec {
        channels: track.channels(),
        sample_rate: track.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::new(writer, spec)?;
    for &sample in track.samples() {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * 32767.0) as i16)?;
    }
    writer.finalize()
}

/// Write a track to a temporary WAV file that lives until dropped
///
/// Used wherever a file-only consumer (the beat detector, an external
/// synthesis engine) has to see an in-memory track.
pub fn render_temp_wav(
    track: &AudioTrack,
    prefix: &str,
) -> Result<tempfile::NamedTempFile, AudioFileError> {
    let temp_file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".wav")
        .tempfile()
        .map_err(AudioFileError::TempFile)?;

    let handle = temp_file.reopen().map_err(AudioFileError::TempFile)?;
    encode_wav(track, BufWriter::new(handle)).map_err(|source| AudioFileError::Write {
        path: temp_file.path().to_path_buf(),
        source,
    })?;

    Ok(temp_file)
}

/// Delete a temporary render, logging instead of failing
pub fn release_temp_file(file: tempfile::NamedTempFile) {
    let path = file.path().to_path_buf();
    if let Err(e) = file.close() {
        log::warn!("Failed to remove temporary file {:?}: {}", path, e);
    }
}
