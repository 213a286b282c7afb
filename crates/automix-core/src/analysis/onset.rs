//! Spectral-difference onset detection
//!
//! Audio is fed one hop at a time. Each hop slides a Hann-windowed analysis
//! frame forward and yields one onset-strength value: the half-wave
//! rectified increase in spectral energy over the previous frame, summed
//! across bins.
//!
//! ```text
//! odf[t] = Σ_k sqrt(max(|X_t[k]|² - |X_{t-1}[k]|², 0))
//! ```
//!
//! Frame `t` is centred on sample `t * hop`, so the envelope can be mapped
//! back to time without a latency correction.

use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{FftError, RealFftPlanner, RealToComplex};

use crate::types::{Sample, ANALYSIS_HOP, ANALYSIS_WINDOW};

/// Streaming onset-strength detector
pub struct OnsetDetector {
    fft: Arc<dyn RealToComplex<Sample>>,
    window: Vec<Sample>,
    /// Most recent `window.len()` input samples
    history: Vec<Sample>,
    frame: Vec<Sample>,
    spectrum: Vec<Complex<Sample>>,
    scratch: Vec<Complex<Sample>>,
    /// Squared magnitudes of the previous frame
    previous: Vec<Sample>,
    hop: usize,
}

impl OnsetDetector {
    /// Create a detector with the given window and hop sizes (in samples)
    pub fn new(window_size: usize, hop: usize) -> Self {
        assert!(hop > 0 && hop <= window_size, "Hop must be in 1..=window");

        let mut planner = RealFftPlanner::<Sample>::new();
        let fft = planner.plan_fft_forward(window_size);

        // Periodic Hann window
        let window = (0..window_size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / window_size as f32;
                0.5 * (1.0 - phase.cos())
            })
            .collect();

        let spectrum = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();
        let bins = spectrum.len();

        Self {
            fft,
            window,
            history: vec![0.0; window_size],
            frame: vec![0.0; window_size],
            spectrum,
            scratch,
            previous: vec![0.0; bins],
            hop,
        }
    }

    #[inline]
    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Push one hop of mono samples and return its onset strength
    ///
    /// A short final hop is zero-padded.
    pub fn process(&mut self, hop_samples: &[Sample]) -> Result<Sample, FftError> {
        let hop = self.hop;
        let n = self.history.len();
        let take = hop_samples.len().min(hop);

        self.history.copy_within(hop.., 0);
        self.history[n - hop..n - hop + take].copy_from_slice(&hop_samples[..take]);
        self.history[n - hop + take..].fill(0.0);

        for ((dst, &src), &w) in self.frame.iter_mut().zip(&self.history).zip(&self.window) {
            *dst = src * w;
        }
        self.fft
            .process_with_scratch(&mut self.frame, &mut self.spectrum, &mut self.scratch)?;

        let mut flux = 0.0;
        for (bin, old) in self.spectrum.iter().zip(self.previous.iter_mut()) {
            let energy = bin.norm_sqr();
            let rise = energy - *old;
            if rise > 0.0 {
                flux += rise.sqrt();
            }
            *old = energy;
        }
        Ok(flux)
    }
}

/// Onset-strength envelope of a whole mono signal
///
/// One value per hop; the detector is flushed so the envelope covers the
/// final samples too.
pub fn onset_envelope(samples: &[Sample]) -> Result<Vec<Sample>, FftError> {
    let mut detector = OnsetDetector::new(ANALYSIS_WINDOW, ANALYSIS_HOP);
    // Prime the first half window so frame 0 is centred on sample 0
    let lead = ANALYSIS_WINDOW / 2;
    let mut primed = vec![0.0; lead];
    primed.extend_from_slice(samples);

    let flush_hops = ANALYSIS_WINDOW / ANALYSIS_HOP;
    let mut envelope = Vec::with_capacity(primed.len() / ANALYSIS_HOP + flush_hops);
    let mut chunks = primed.chunks(ANALYSIS_HOP);

    // The first hops only fill the window up to its centre
    for chunk in chunks.by_ref().take(lead / ANALYSIS_HOP) {
        detector.process(chunk)?;
    }
    for chunk in chunks {
        envelope.push(detector.process(chunk)?);
    }
    for _ in 0..flush_hops {
        envelope.push(detector.process(&[])?);
    }
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_has_no_onsets() {
        let envelope = onset_envelope(&vec![0.0; 44100]).unwrap();
        assert!(!envelope.is_empty());
        assert!(envelope.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_click_peaks_near_its_position() {
        let mut samples = vec![0.0; 44100];
        let click_at = 22050;
        for i in 0..441 {
            samples[click_at + i] = 0.8 * (-(i as f32) / 60.0).exp();
        }

        let envelope = onset_envelope(&samples).unwrap();
        let (peak, _) = envelope
            .iter()
            .enumerate()
            .fold((0, 0.0), |best, (i, &v)| if v > best.1 { (i, v) } else { best });

        let peak_sample = peak * ANALYSIS_HOP;
        assert!(
            (peak_sample as i64 - click_at as i64).unsigned_abs() <= ANALYSIS_HOP as u64,
            "peak at sample {} for click at {}",
            peak_sample,
            click_at
        );
    }

    #[test]
    fn test_steady_tone_settles() {
        let samples: Vec<Sample> = (0..44100)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin() * 0.5)
            .collect();
        let envelope = onset_envelope(&samples).unwrap();
        // Onset at the start, nothing in the steady middle
        let start_peak = envelope[..4].iter().cloned().fold(0.0, Sample::max);
        let middle = envelope[40..60].iter().cloned().fold(0.0, Sample::max);
        assert!(middle < start_peak * 0.1);
    }
}
