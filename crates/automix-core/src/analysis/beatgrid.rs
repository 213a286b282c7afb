//! Beat tracking on an onset envelope
//!
//! Turns the onset-strength envelope into beat positions:
//!
//! 1. Normalize the envelope to a peak of 1.0
//! 2. Pick onsets (local maxima above an adaptive median threshold)
//! 3. Estimate the beat period from the envelope autocorrelation within the
//!    configured tempo range
//! 4. Keep onsets at least ~one period apart, preferring the stronger one
//!    when two fall closer than that
//!
//! The resulting [`BeatGrid`] carries the beat timestamps in milliseconds
//! and a tempo computed as the median of the instantaneous inter-beat tempos.

use crate::config::BpmConfig;
use crate::types::{Sample, ANALYSIS_HOP, ANALYSIS_SAMPLE_RATE};

/// Frames on each side of an onset used for the median threshold
const MEDIAN_RADIUS: usize = 8;

/// Onsets must clear the local median by this much (normalized envelope)
const MEDIAN_OFFSET: Sample = 0.05;

/// Absolute floor for onsets (normalized envelope)
const MIN_ONSET_STRENGTH: Sample = 0.1;

/// Beats closer than this fraction of the period are treated as one beat
const MIN_GAP_FRACTION: f64 = 0.7;

/// Candidate periods must reach this share of the strongest autocorrelation
const PERIOD_PEAK_SHARE: f64 = 0.7;

/// Detected beats of one track
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BeatGrid {
    beats_ms: Vec<f64>,
    bpm: f64,
}

impl BeatGrid {
    /// Build a grid from ordered beat timestamps
    ///
    /// The tempo is the median of `60000 / Δt` over consecutive beats, or 0
    /// when fewer than two beats exist.
    pub fn from_beats(beats_ms: Vec<f64>) -> Self {
        let bpm = median_bpm(&beats_ms);
        if bpm == 0.0 {
            log::info!("No beats found ({} detected)", beats_ms.len());
        }
        Self { beats_ms, bpm }
    }

    /// All beat timestamps in milliseconds
    pub fn beats(&self) -> &[f64] {
        &self.beats_ms
    }

    pub fn len(&self) -> usize {
        self.beats_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats_ms.is_empty()
    }

    /// Median tempo, 0 when undefined
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Whether a tempo could be measured
    pub fn has_tempo(&self) -> bool {
        self.bpm > 0.0
    }

    /// Timestamp of the n-th beat (1-indexed, `0` means the first beat)
    ///
    /// `None` when the track ends before `n` beats.
    pub fn beat_timestamp(&self, n: usize) -> Option<f64> {
        self.beats_ms.get(n.saturating_sub(1)).copied()
    }
}

fn median_bpm(beats_ms: &[f64]) -> f64 {
    if beats_ms.len() < 2 {
        return 0.0;
    }
    let mut bpms: Vec<f64> = beats_ms
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&diff| diff > 0.0)
        .map(|diff| 60000.0 / diff)
        .collect();
    if bpms.is_empty() {
        return 0.0;
    }
    bpms.sort_by(|a, b| a.total_cmp(b));
    let mid = bpms.len() / 2;
    if bpms.len() % 2 == 0 {
        (bpms[mid - 1] + bpms[mid]) / 2.0
    } else {
        bpms[mid]
    }
}

/// Milliseconds covered by one envelope frame
pub fn frame_duration_ms() -> f64 {
    ANALYSIS_HOP as f64 * 1000.0 / ANALYSIS_SAMPLE_RATE as f64
}

/// Track beats on an onset envelope
pub fn track_beats(envelope: &[Sample], bpm_config: &BpmConfig) -> BeatGrid {
    let Some(envelope) = normalized(envelope) else {
        return BeatGrid::from_beats(Vec::new());
    };

    let onsets = pick_onsets(&envelope);
    if onsets.len() < 2 {
        let beats = onsets.iter().map(|o| o.position * frame_duration_ms()).collect();
        return BeatGrid::from_beats(beats);
    }

    let frames_per_minute = 60000.0 / frame_duration_ms();
    let min_lag = (frames_per_minute / bpm_config.max_tempo as f64).floor().max(1.0) as usize;
    let max_lag = (frames_per_minute / bpm_config.min_tempo as f64).ceil() as usize;

    let min_gap = match estimate_period(&envelope, min_lag, max_lag) {
        Some(period) => {
            log::debug!(
                "track_beats: period {:.2} frames ({:.1} BPM)",
                period,
                frames_per_minute / period
            );
            (period * MIN_GAP_FRACTION).max(min_lag as f64)
        }
        None => min_lag as f64,
    };

    let beats = select_beats(&onsets, min_gap)
        .into_iter()
        .map(|frame| frame * frame_duration_ms())
        .collect();
    BeatGrid::from_beats(beats)
}

/// Scale to a peak of 1.0, `None` for an all-zero envelope
fn normalized(envelope: &[Sample]) -> Option<Vec<Sample>> {
    let max = envelope.iter().cloned().fold(0.0, Sample::max);
    if max <= 0.0 || !max.is_finite() {
        return None;
    }
    Some(envelope.iter().map(|&v| v / max).collect())
}

/// An onset candidate: sub-frame position and strength
#[derive(Debug, Clone, Copy)]
struct Onset {
    position: f64,
    strength: Sample,
}

fn pick_onsets(envelope: &[Sample]) -> Vec<Onset> {
    let mut onsets = Vec::new();
    let mut neighborhood = Vec::with_capacity(2 * MEDIAN_RADIUS + 1);

    for t in 0..envelope.len() {
        let value = envelope[t];
        let prev = if t > 0 { envelope[t - 1] } else { 0.0 };
        let next = envelope.get(t + 1).copied().unwrap_or(0.0);
        if value <= prev || value < next || value < MIN_ONSET_STRENGTH {
            continue;
        }

        let lo = t.saturating_sub(MEDIAN_RADIUS);
        let hi = (t + MEDIAN_RADIUS + 1).min(envelope.len());
        neighborhood.clear();
        neighborhood.extend_from_slice(&envelope[lo..hi]);
        neighborhood.sort_by(|a, b| a.total_cmp(b));
        let median = neighborhood[neighborhood.len() / 2];
        if value < median + MEDIAN_OFFSET {
            continue;
        }

        // Parabolic interpolation of the peak between neighbouring frames
        let curvature = prev - 2.0 * value + next;
        let shift = if curvature < 0.0 {
            (0.5 * (prev - next) / curvature).clamp(-0.5, 0.5)
        } else {
            0.0
        };
        onsets.push(Onset {
            position: t as f64 + shift as f64,
            strength: value,
        });
    }
    onsets
}

/// Beat period in (fractional) frames from the envelope autocorrelation
///
/// Picks the shortest lag whose smoothed autocorrelation is a local maximum
/// close to the strongest one, so a 120 BPM pulse is not mistaken for its
/// 60 BPM multiple.
fn estimate_period(envelope: &[Sample], min_lag: usize, max_lag: usize) -> Option<f64> {
    let n = envelope.len();
    let max_lag = max_lag.min(n.saturating_sub(2));
    if min_lag < 2 || min_lag >= max_lag {
        return None;
    }

    // Unbiased autocorrelation with one lag of margin for smoothing
    let acf: Vec<f64> = (0..=max_lag + 1)
        .map(|lag| {
            if lag < min_lag - 1 || lag >= n {
                return 0.0;
            }
            let sum: f64 = envelope[..n - lag]
                .iter()
                .zip(&envelope[lag..])
                .map(|(&a, &b)| a as f64 * b as f64)
                .sum();
            sum / (n - lag) as f64
        })
        .collect();

    let smoothed = |lag: usize| acf[lag - 1] + acf[lag] + acf[lag + 1];
    let strongest = (min_lag..=max_lag)
        .map(smoothed)
        .fold(0.0, f64::max);
    if strongest <= 0.0 {
        return None;
    }

    let lag = (min_lag..=max_lag).find(|&lag| {
        let value = smoothed(lag);
        let left = if lag > min_lag { smoothed(lag - 1) } else { 0.0 };
        let right = if lag < max_lag { smoothed(lag + 1) } else { 0.0 };
        value >= PERIOD_PEAK_SHARE * strongest && value >= left && value >= right
    })?;

    // Centroid of the raw autocorrelation around the chosen lag
    let weights = [acf[lag - 1], acf[lag], acf[lag + 1]];
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Some(lag as f64);
    }
    Some(lag as f64 + (weights[2] - weights[0]) / total)
}

/// Greedy beat selection: a beat must follow the previous one by `min_gap`
/// frames; a stronger onset inside the gap replaces the previous beat
fn select_beats(onsets: &[Onset], min_gap: f64) -> Vec<f64> {
    let mut beats: Vec<Onset> = Vec::new();
    for &onset in onsets {
        match beats.last_mut() {
            Some(last) if onset.position - last.position < min_gap => {
                if onset.strength > last.strength {
                    *last = onset;
                }
            }
            _ => beats.push(onset),
        }
    }
    beats.into_iter().map(|b| b.position).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Envelope with unit spikes every `period` frames from `first`
    fn pulse_envelope(frames: usize, first: f64, period: f64) -> Vec<Sample> {
        let mut envelope = vec![0.0; frames];
        let mut position = first;
        while (position as usize) < frames {
            envelope[position.round() as usize] = 1.0;
            position += period;
        }
        envelope
    }

    #[test]
    fn test_median_bpm() {
        let grid = BeatGrid::from_beats(vec![0.0, 500.0, 1000.0, 1500.0]);
        assert!((grid.bpm() - 120.0).abs() < 1e-9);

        // One false detection does not move the median
        let grid = BeatGrid::from_beats(vec![0.0, 500.0, 1000.0, 1100.0, 1600.0, 2100.0]);
        assert!((grid.bpm() - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_too_few_beats_have_no_tempo() {
        assert_eq!(BeatGrid::from_beats(vec![]).bpm(), 0.0);
        let single = BeatGrid::from_beats(vec![250.0]);
        assert_eq!(single.bpm(), 0.0);
        assert!(!single.has_tempo());
    }

    #[test]
    fn test_beat_timestamp_indexing() {
        let grid = BeatGrid::from_beats(vec![100.0, 600.0, 1100.0]);
        assert_eq!(grid.beat_timestamp(0), Some(100.0));
        assert_eq!(grid.beat_timestamp(1), Some(100.0));
        assert_eq!(grid.beat_timestamp(3), Some(1100.0));
        assert_eq!(grid.beat_timestamp(4), None);
    }

    #[test]
    fn test_track_beats_on_pulses() {
        // 120 BPM is 43.07 frames per beat
        let period = 60000.0 / 120.0 / frame_duration_ms();
        let envelope = pulse_envelope(2000, 10.0, period);
        let grid = track_beats(&envelope, &BpmConfig::default());

        assert!(grid.len() >= 45);
        assert!((grid.bpm() - 120.0).abs() < 3.0, "bpm {}", grid.bpm());
        let first = grid.beat_timestamp(1).unwrap();
        assert!((first - 10.0 * frame_duration_ms()).abs() < frame_duration_ms());
    }

    #[test]
    fn test_weak_offbeats_are_dropped() {
        let period = 60000.0 / 100.0 / frame_duration_ms();
        let mut envelope = pulse_envelope(3000, 5.0, period);
        // Quiet extra onsets halfway between beats
        let mut position = 5.0 + period / 2.0;
        while (position as usize) < envelope.len() {
            envelope[position.round() as usize] = 0.3;
            position += period;
        }

        let grid = track_beats(&envelope, &BpmConfig::default());
        assert!((grid.bpm() - 100.0).abs() < 3.0, "bpm {}", grid.bpm());
    }

    #[test]
    fn test_flat_envelope_has_no_beats() {
        let grid = track_beats(&vec![0.0; 500], &BpmConfig::default());
        assert!(grid.is_empty());
        assert_eq!(grid.bpm(), 0.0);
    }
}
