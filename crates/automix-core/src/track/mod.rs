//! In-memory audio tracks
//!
//! [`AudioTrack`] is the value passed between pipeline stages. It holds
//! interleaved samples with a fixed sample rate and channel count and is
//! addressed in milliseconds, the unit every beat timestamp uses.
//!
//! Editing operations never touch `self`; they build and return a new track.
//! Millisecond positions are converted to frames by flooring and clamped to
//! the track, so out-of-range positions behave like slicing past the end.

use crate::tempo::{resample_channels, TempoError};
use crate::types::{amplitude_to_db, db_to_amplitude, Sample};

/// A decoded or synthesized piece of audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    /// Interleaved samples [c0, c1, ..., c0, c1, ...]
    samples: Vec<Sample>,
    sample_rate: u32,
    channels: u16,
}

impl AudioTrack {
    /// Create a track from interleaved samples
    pub fn from_interleaved(samples: Vec<Sample>, sample_rate: u32, channels: u16) -> Self {
        assert!(channels > 0, "Track must have at least one channel");
        assert!(sample_rate > 0, "Track sample rate must be non-zero");
        assert!(
            samples.len() % channels as usize == 0,
            "Interleaved buffer length must be a multiple of the channel count"
        );
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Create a single-channel track
    pub fn from_mono(samples: Vec<Sample>, sample_rate: u32) -> Self {
        Self::from_interleaved(samples, sample_rate, 1)
    }

    /// Create a track from planar channel data (all channels the same length)
    pub fn from_planar(planar: &[Vec<Sample>], sample_rate: u32) -> Self {
        assert!(!planar.is_empty(), "Track must have at least one channel");
        let frames = planar[0].len();
        assert!(
            planar.iter().all(|ch| ch.len() == frames),
            "Channel lengths must match"
        );
        let mut samples = Vec::with_capacity(frames * planar.len());
        for frame in 0..frames {
            for channel in planar {
                samples.push(channel[frame]);
            }
        }
        Self::from_interleaved(samples, sample_rate, planar.len() as u16)
    }

    /// Create a track of digital silence
    pub fn silent(duration_ms: f64, sample_rate: u32, channels: u16) -> Self {
        let frames = ms_to_frames(duration_ms, sample_rate);
        Self::from_interleaved(
            vec![0.0; frames * channels as usize],
            sample_rate,
            channels,
        )
    }

    /// Empty track sharing this track's format
    fn empty_like(&self) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Interleaved sample data
    #[inline]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of frames (one sample per channel)
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in milliseconds
    pub fn duration_ms(&self) -> f64 {
        self.frames() as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.duration_ms() / 1000.0
    }

    /// Frame index for a millisecond position, clamped to `0..=frames()`
    pub fn frame_at_ms(&self, ms: f64) -> usize {
        ms_to_frames(ms, self.sample_rate).min(self.frames())
    }

    /// Copy of the frames in `start..end` (clamped)
    pub fn slice_frames(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.frames());
        let start = start.min(end);
        let ch = self.channels as usize;
        Self {
            samples: self.samples[start * ch..end * ch].to_vec(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Copy of the span `[start_ms, end_ms)`
    pub fn slice_ms(&self, start_ms: f64, end_ms: f64) -> Self {
        self.slice_frames(self.frame_at_ms(start_ms), self.frame_at_ms(end_ms))
    }

    /// Everything before `end_ms`
    pub fn head_ms(&self, end_ms: f64) -> Self {
        self.slice_frames(0, self.frame_at_ms(end_ms))
    }

    /// Everything from `start_ms` on
    pub fn tail_ms(&self, start_ms: f64) -> Self {
        self.slice_frames(self.frame_at_ms(start_ms), self.frames())
    }

    /// This track followed by `other`
    ///
    /// Both tracks must share sample rate and channel count.
    pub fn concat(&self, other: &AudioTrack) -> Self {
        assert_eq!(
            (self.sample_rate, self.channels),
            (other.sample_rate, other.channels),
            "Concatenated tracks must share a format"
        );
        let mut samples = Vec::with_capacity(self.samples.len() + other.samples.len());
        samples.extend_from_slice(&self.samples);
        samples.extend_from_slice(&other.samples);
        Self {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Insert `duration_ms` of silence at `at_ms`
    pub fn insert_silence(&self, at_ms: f64, duration_ms: f64) -> Self {
        let gap = AudioTrack::silent(duration_ms, self.sample_rate, self.channels);
        self.head_ms(at_ms).concat(&gap).concat(&self.tail_ms(at_ms))
    }

    /// Remove the span `[start_ms, end_ms)`
    pub fn remove_span(&self, start_ms: f64, end_ms: f64) -> Self {
        let start = self.frame_at_ms(start_ms);
        let end = self.frame_at_ms(end_ms).max(start);
        self.slice_frames(0, start)
            .concat(&self.slice_frames(end, self.frames()))
    }

    /// This track played `count` times back to back
    ///
    /// `None` when the result would not fit in memory.
    pub fn repeated(&self, count: usize) -> Option<Self> {
        let len = self.samples.len().checked_mul(count)?;
        if len > isize::MAX as usize / std::mem::size_of::<Sample>() {
            return None;
        }
        let mut out = self.empty_like();
        out.samples = self.samples.repeat(count);
        Some(out)
    }

    /// Relabel the sample rate without touching the samples
    ///
    /// Playback speed and pitch change together; used by tempo normalization.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        assert!(sample_rate > 0, "Track sample rate must be non-zero");
        self.sample_rate = sample_rate;
        self
    }

    /// Apply a constant gain in decibels
    pub fn apply_gain(&self, gain_db: f64) -> Self {
        let factor = db_to_amplitude(gain_db) as Sample;
        let mut out = self.clone();
        for sample in &mut out.samples {
            *sample *= factor;
        }
        out
    }

    /// Root-mean-square level over all samples
    pub fn rms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / self.samples.len() as f64).sqrt()
    }

    /// Loudness relative to full scale (negative infinity for silence)
    pub fn dbfs(&self) -> f64 {
        amplitude_to_db(self.rms())
    }

    /// Peak absolute sample value
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.abs()).fold(0.0, Sample::max)
    }

    /// Gain this track so its loudness equals `target_dbfs`
    ///
    /// Silent tracks have no defined loudness and are returned unchanged.
    pub fn normalized(&self, target_dbfs: f64) -> Self {
        let current = self.dbfs();
        if !current.is_finite() {
            return self.clone();
        }
        self.apply_gain(target_dbfs - current)
    }

    /// Linear-amplitude ramp from unity to `to_gain_db` over
    /// `[start_ms, start_ms + duration_ms)`; the final gain holds afterwards
    pub fn fade(&self, to_gain_db: f64, start_ms: f64, duration_ms: f64) -> Self {
        let start = self.frame_at_ms(start_ms);
        let end = self.frame_at_ms(start_ms + duration_ms).max(start);
        let to = db_to_amplitude(to_gain_db);
        let span = (end - start) as f64;
        let ch = self.channels as usize;

        let mut out = self.clone();
        for (frame, chunk) in out.samples.chunks_exact_mut(ch).enumerate().skip(start) {
            let factor = if frame < end {
                1.0 + (to - 1.0) * (frame - start) as f64 / span
            } else {
                to
            };
            for sample in chunk {
                *sample *= factor as Sample;
            }
        }
        out
    }

    /// Additive mix of `other` onto this track
    ///
    /// The result keeps this track's length and format: `other` is conformed
    /// first, a shorter `other` leaves the remainder untouched (as if padded
    /// with silence) and a longer one is cut off. There is no limiting.
    pub fn overlay(&self, other: &AudioTrack) -> Result<Self, TempoError> {
        let other = other.conform(self.sample_rate, self.channels)?;
        let mut out = self.clone();
        for (dst, src) in out.samples.iter_mut().zip(other.samples.iter()) {
            *dst += *src;
        }
        Ok(out)
    }

    /// Average of all channels per frame
    pub fn to_mono(&self) -> Vec<Sample> {
        let ch = self.channels as usize;
        if ch == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(ch)
            .map(|frame| frame.iter().sum::<Sample>() / ch as Sample)
            .collect()
    }

    /// Split into one vector per channel
    pub fn to_planar(&self) -> Vec<Vec<Sample>> {
        let ch = self.channels as usize;
        let mut planar = vec![Vec::with_capacity(self.frames()); ch];
        for frame in self.samples.chunks_exact(ch) {
            for (channel, &sample) in planar.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }
        planar
    }

    /// Remap channels (mono downmix, mono upmix, or wrap-around for others)
    pub fn with_channels(&self, channels: u16) -> Self {
        assert!(channels > 0, "Track must have at least one channel");
        if channels == self.channels {
            return self.clone();
        }
        let src = self.channels as usize;
        let dst = channels as usize;
        let samples = if dst == 1 {
            self.to_mono()
        } else {
            let mut samples = Vec::with_capacity(self.frames() * dst);
            for frame in self.samples.chunks_exact(src) {
                for c in 0..dst {
                    samples.push(frame[c % src]);
                }
            }
            samples
        };
        Self {
            samples,
            sample_rate: self.sample_rate,
            channels,
        }
    }

    /// Resample to `sample_rate`, keeping duration and pitch
    pub fn resampled(&self, sample_rate: u32) -> Result<Self, TempoError> {
        if sample_rate == self.sample_rate {
            return Ok(self.clone());
        }
        let ratio = sample_rate as f64 / self.sample_rate as f64;
        let planar = resample_channels(&self.to_planar(), ratio)?;
        Ok(Self::from_planar(&planar, sample_rate))
    }

    /// Convert to the given format (resampling and remapping channels)
    pub fn conform(&self, sample_rate: u32, channels: u16) -> Result<Self, TempoError> {
        self.with_channels(channels).resampled(sample_rate)
    }
}

/// Frames covered by a millisecond duration at `sample_rate` (floored, never negative)
fn ms_to_frames(ms: f64, sample_rate: u32) -> usize {
    if ms > 0.0 && ms.is_finite() {
        (ms * sample_rate as f64 / 1000.0).floor() as usize
    } else {
        0
    }
}
