//! Remix playback through the default cpal output device
//!
//! The stream lives on a blocking task (cpal streams are not `Send` on every
//! platform) that plays until the track ends or the watch channel flips to
//! `true`.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use automix_core::tempo::TempoError;
use automix_core::AudioTrack;

/// How often the blocking task checks for cancellation and end of track
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("No default audio output device")]
    NoDevice,

    #[error("Failed to query device configs: {0}")]
    Configs(#[from] cpal::SupportedStreamConfigsError),

    #[error("Audio device offers no f32 output config")]
    NoF32Config,

    #[error("Failed to build audio stream: {0}")]
    StreamBuild(#[from] cpal::BuildStreamError),

    #[error("Failed to start audio stream: {0}")]
    StreamPlay(#[from] cpal::PlayStreamError),

    #[error("Failed to convert remix to the device format: {0}")]
    Conform(#[from] TempoError),
}

/// How a playback run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    /// The whole track played
    Finished,
    /// Cancelled before the end
    Stopped,
}

/// A running playback task and its cancellation switch
pub struct Playback {
    cancel: watch::Sender<bool>,
    task: JoinHandle<Result<(), PlaybackError>>,
}

impl Playback {
    /// Play `track` on the default output device
    pub fn start(track: AudioTrack) -> Self {
        Self::spawn(move |cancelled| play_blocking(track, cancelled))
    }

    /// Run `player` on a blocking task; it should return once the receiver
    /// reads `true` or its sender is gone
    pub fn spawn<F>(player: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Result<(), PlaybackError> + Send + 'static,
    {
        let (cancel, cancelled) = watch::channel(false);
        let task = tokio::task::spawn_blocking(move || player(cancelled));
        Self { cancel, task }
    }

    /// Wait until playback ends on its own or `stop` resolves, whichever
    /// comes first. A resolved `stop` cancels playback and waits for it.
    pub async fn run_until<S: Future<Output = ()>>(mut self, stop: S) -> anyhow::Result<Ending> {
        tokio::select! {
            joined = &mut self.task => {
                joined.context("Playback task panicked")??;
                Ok(Ending::Finished)
            }
            _ = stop => {
                // Fails only when the task already finished and dropped its receiver
                let _ = self.cancel.send(true);
                self.task.await.context("Playback task panicked")??;
                Ok(Ending::Stopped)
            }
        }
    }
}

/// Pick an f32 output config for `target_rate`
///
/// Stereo configs come first. The target rate is used when the config
/// covers it, otherwise the config's highest rate.
fn choose_output_config(
    configs: &[SupportedStreamConfigRange],
    target_rate: u32,
) -> Result<SupportedStreamConfig, PlaybackError> {
    let covers = |c: &SupportedStreamConfigRange| {
        target_rate >= c.min_sample_rate().0 && target_rate <= c.max_sample_rate().0
    };
    let f32_configs = || configs.iter().filter(|c| c.sample_format() == SampleFormat::F32);

    let best = f32_configs()
        .filter(|c| c.channels() >= 2)
        .find(|&c| covers(c))
        .or_else(|| f32_configs().find(|&c| covers(c)))
        .or_else(|| f32_configs().find(|c| c.channels() >= 2))
        .or_else(|| f32_configs().next())
        .ok_or(PlaybackError::NoF32Config)?;

    let sample_rate = if covers(best) {
        cpal::SampleRate(target_rate)
    } else {
        let fallback = best.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz (remix will be resampled)",
            target_rate,
            fallback.0
        );
        fallback
    };
    Ok(best.clone().with_sample_rate(sample_rate))
}

fn play_blocking(track: AudioTrack, cancelled: watch::Receiver<bool>) -> Result<(), PlaybackError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(PlaybackError::NoDevice)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    let supported: Vec<_> = device.supported_output_configs()?.collect();
    let config: cpal::StreamConfig = choose_output_config(&supported, track.sample_rate())?.config();

    log::info!(
        "play: {} ({} channels, {}Hz)",
        device_name,
        config.channels,
        config.sample_rate.0
    );

    let conformed = track.conform(config.sample_rate.0, config.channels)?;
    let samples: Arc<[f32]> = conformed.samples().into();
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let stream = {
        let position = Arc::clone(&position);
        let finished = Arc::clone(&finished);
        device.build_output_stream(
            &config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let start = position.load(Ordering::Relaxed);
                let end = (start + data.len()).min(samples.len());
                let written = end - start;
                data[..written].copy_from_slice(&samples[start..end]);
                // Silence past the end of the remix
                data[written..].fill(0.0);
                position.store(end, Ordering::Relaxed);
                if end == samples.len() {
                    finished.store(true, Ordering::Relaxed);
                }
            },
            move |err| {
                log::error!("Output stream error: {}", err);
            },
            None,
        )?
    };
    stream.play()?;

    loop {
        if finished.load(Ordering::Relaxed) {
            log::info!("play: reached end of remix");
            break;
        }
        // A dropped sender counts as cancellation
        if *cancelled.borrow() || cancelled.has_changed().is_err() {
            log::info!(
                "play: stopped at {:.1}s",
                position.load(Ordering::Relaxed) as f64
                    / (config.sample_rate.0 as f64 * config.channels as f64)
            );
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    Ok(())
}
