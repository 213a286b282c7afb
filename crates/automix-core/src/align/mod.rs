//! Beat alignment of the second song and the drum track
//!
//! Walks the reference grid every [`BEAT_STRIDE`] beats and splices each
//! follower track so its beat lands on the reference beat:
//!
//! - the drum track was synthesized on an exact grid at the reference tempo,
//!   so its beat `k` sits analytically at `k * 60000 / bpm` plus whatever
//!   delay has been spliced in so far;
//! - the second song is re-detected in its current state at every sampled
//!   beat, so its measured beat already reflects earlier splices.
//!
//! A correction is the delay to add: positive inserts silence before the
//! beat, negative cuts material ending at the beat. Running offsets live in
//! an explicit [`AlignmentState`] folded across the walk, and each step reads
//! the offsets as they stood before it.
//!
//! Sampled beat `k` (zero-based) is looked up as grid beat `k + 1`, the same
//! beat the analytic drum time `k * interval` refers to.

use crate::analysis::{BeatEstimator, BeatGrid, BeatSource};
use crate::error::{require_tempo, Result};
use crate::track::AudioTrack;
use crate::types::BEAT_STRIDE;

/// Splice `correction_ms` into `track` at `time_ms`
///
/// `correction >= 0` inserts that much silence at `time_ms`;
/// `correction < 0` removes `[time_ms, time_ms + |correction|)`.
pub fn align_song(track: &AudioTrack, time_ms: f64, correction_ms: f64) -> AudioTrack {
    if correction_ms < 0.0 {
        track.remove_span(time_ms, time_ms - correction_ms)
    } else if correction_ms > 0.0 {
        track.insert_silence(time_ms, correction_ms)
    } else {
        track.clone()
    }
}

/// One splice applied to a track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Splice {
    /// Where [`align_song`] is applied
    pub at_ms: f64,
    /// Signed amount passed to [`align_song`]
    pub correction_ms: f64,
}

impl Splice {
    /// Splice that moves a beat at `beat_ms` by `correction_ms`
    ///
    /// Delays insert silence right at the beat. Advances remove the span
    /// ending at the beat, limited to the material before it.
    pub fn before_beat(beat_ms: f64, correction_ms: f64) -> Self {
        if correction_ms >= 0.0 {
            Self {
                at_ms: beat_ms,
                correction_ms,
            }
        } else {
            let span = (-correction_ms).min(beat_ms.max(0.0));
            Self {
                at_ms: beat_ms - span,
                correction_ms: -span,
            }
        }
    }

    pub fn apply(&self, track: &AudioTrack) -> AudioTrack {
        align_song(track, self.at_ms, self.correction_ms)
    }
}

/// Cumulative corrections so far; positive means the track was delayed
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AlignmentState {
    pub second_offset_ms: f64,
    pub drum_offset_ms: f64,
}

/// Splices decided at one sampled beat
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentStep {
    pub beat_index: usize,
    pub second: Option<Splice>,
    pub drums: Option<Splice>,
}

impl AlignmentState {
    /// Decide the corrections for sampled beat `beat_index`
    ///
    /// `reference_ms` and `second_ms` are the detected beat times (`None`
    /// when the track ran out of beats); a missing observation skips that
    /// track's correction. Returns the state after this beat.
    pub fn step(
        self,
        beat_index: usize,
        beat_interval_ms: f64,
        reference_ms: Option<f64>,
        second_ms: Option<f64>,
    ) -> (Self, AlignmentStep) {
        let mut next = self;
        let grid_ms = beat_index as f64 * beat_interval_ms;

        // Analytic drum beat: grid position plus the delay spliced in so far
        let drums = reference_ms.map(|reference| {
            let drum_ms = grid_ms + self.drum_offset_ms;
            let correction = reference - grid_ms - self.drum_offset_ms;
            let splice = Splice::before_beat(drum_ms, correction);
            next.drum_offset_ms += splice.correction_ms;
            splice
        });

        // The second song is re-detected after its earlier splices, so the
        // measurement already carries `second_offset_ms`. Correct it against
        // the drum beat as placed at this step.
        let target_ms = grid_ms + next.drum_offset_ms;
        let second = second_ms.map(|measured| {
            let splice = Splice::before_beat(measured, target_ms - measured);
            next.second_offset_ms += splice.correction_ms;
            splice
        });

        (
            next,
            AlignmentStep {
                beat_index,
                second,
                drums,
            },
        )
    }
}

/// Aligned follower tracks and the corrections that produced them
#[derive(Debug, Clone)]
pub struct Alignment {
    pub second: AudioTrack,
    pub drums: AudioTrack,
    pub state: AlignmentState,
    pub steps: Vec<AlignmentStep>,
}

/// Number of reference beats covered by `reference`
pub fn number_of_beats(bpm: f64, reference: &AudioTrack) -> usize {
    (bpm * reference.duration_seconds() / 60.0).floor().max(0.0) as usize
}

/// Align `second` and `drums` to the reference grid
///
/// `reference_grid` is the detected grid of the reference song's file and
/// `reference` the (possibly truncated) reference track, which bounds the
/// walk. Fails with [`MixError::NoTempo`](crate::MixError::NoTempo) when the
/// reference has no tempo.
pub fn align<E: BeatEstimator + ?Sized>(
    estimator: &E,
    reference: &AudioTrack,
    reference_grid: &BeatGrid,
    second: AudioTrack,
    drums: AudioTrack,
) -> Result<Alignment> {
    let bpm = require_tempo(reference_grid.bpm(), "the reference song")?;
    let beat_interval_ms = 60000.0 / bpm;
    let beats = number_of_beats(bpm, reference);

    log::info!(
        "align: {} reference beats at {:.2} BPM, correcting every {}",
        beats,
        bpm,
        BEAT_STRIDE
    );

    let mut alignment = Alignment {
        second,
        drums,
        state: AlignmentState::default(),
        steps: Vec::with_capacity(beats / BEAT_STRIDE + 1),
    };

    for beat_index in (0..beats).step_by(BEAT_STRIDE) {
        // Beat indices are zero-based, grid lookups one-based
        let reference_ms = reference_grid.beat_timestamp(beat_index + 1);
        let second_ms = estimator
            .beat_grid(BeatSource::Track(&alignment.second))?
            .beat_timestamp(beat_index + 1);

        let (state, step) =
            alignment
                .state
                .step(beat_index, beat_interval_ms, reference_ms, second_ms);

        if let Some(splice) = step.drums {
            alignment.drums = splice.apply(&alignment.drums);
        }
        if let Some(splice) = step.second {
            alignment.second = splice.apply(&alignment.second);
        }

        log::debug!(
            "align: beat {} ref {:?} second {:?} -> second {:+.1}ms (total {:+.1}), drums {:+.1}ms (total {:+.1})",
            beat_index,
            reference_ms,
            second_ms,
            step.second.map_or(0.0, |s| s.correction_ms),
            state.second_offset_ms,
            step.drums.map_or(0.0, |s| s.correction_ms),
            state.drum_offset_ms
        );
        if reference_ms.is_none() || second_ms.is_none() {
            log::debug!("align: beat {} unavailable, correction skipped", beat_index);
        }

        alignment.state = state;
        alignment.steps.push(step);
    }

    log::info!(
        "align: done, second offset {:+.1}ms, drum offset {:+.1}ms",
        alignment.state.second_offset_ms,
        alignment.state.drum_offset_ms
    );
    Ok(alignment)
}
