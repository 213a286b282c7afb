//! Terminal beat pulse shown while the remix plays
//!
//! One frame per beat of the remix, scheduled against the start instant so
//! the pulse never drifts from playback. The presentation lasts as long as
//! playback does; Ctrl-C stops both.

use std::io::Write;
use std::time::Duration;

use tokio::time::Instant;

use automix_core::AudioTrack;

use crate::playback::{Ending, Playback};

/// Beats per bar for the downbeat marker
const BEATS_PER_BAR: usize = 4;

/// Play `track` while pulsing on `beats` (milliseconds from the start)
pub async fn run(track: AudioTrack, beats: Vec<f64>) -> anyhow::Result<()> {
    log::info!(
        "present: {:.1}s remix, {} beats",
        track.duration_seconds(),
        beats.len()
    );
    let stop = async {
        tokio::select! {
            _ = pulse(&beats) => {}
            _ = interrupted() => {}
        }
    };
    let ending = Playback::start(track).run_until(stop).await;
    println!();

    match ending? {
        Ending::Finished => log::info!("present: remix finished"),
        Ending::Stopped => log::info!("present: interrupted"),
    }
    Ok(())
}

/// Resolves on Ctrl-C; never resolves if the signal can't be watched
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("present: failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Print one frame per beat, then hold the last frame
async fn pulse(beats: &[f64]) {
    let start = Instant::now();
    let mut stdout = std::io::stdout();
    for (index, &beat_ms) in beats.iter().enumerate() {
        tokio::time::sleep_until(start + Duration::from_secs_f64(beat_ms.max(0.0) / 1000.0)).await;
        let frame = pulse_frame(index, beats.len(), beat_ms);
        if write!(stdout, "\r{}", frame).and_then(|_| stdout.flush()).is_err() {
            log::debug!("pulse: stdout closed");
        }
    }
    std::future::pending::<()>().await;
}

/// One line of the pulse: a bar accent, the beat counter and the time
fn pulse_frame(index: usize, total: usize, beat_ms: f64) -> String {
    let position = index % BEATS_PER_BAR;
    let marks: String = (0..BEATS_PER_BAR)
        .map(|i| if i == position { '●' } else { '·' })
        .collect();
    format!(
        "{} beat {:>4}/{:<4} {:>7.2}s",
        marks,
        index + 1,
        total,
        beat_ms / 1000.0
    )
}
