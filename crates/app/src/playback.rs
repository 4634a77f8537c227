use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use season_lights_core::{AudioClip, AudioOutput, LightsError, Result, StopToken, TrackRef};

/// Extra time allowed past a clip's nominal length before giving up on the
/// stream reporting completion.
const DRAIN_GRACE: Duration = Duration::from_secs(2);
const WAIT_STEP: Duration = Duration::from_millis(10);

/// Plays clips on the default output device, loading tracks as WAV files.
#[derive(Debug, Default)]
pub struct CpalOutput;

impl AudioOutput for CpalOutput {
    fn load(&self, track: &TrackRef) -> Result<AudioClip> {
        load_wav(track.path())
    }

    fn play(&self, clip: &AudioClip, fade_in: Duration, stop: &StopToken) -> Result<()> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| LightsError::Playback("no default output device".into()))?;
        let config = cpal::StreamConfig {
            channels: clip.channels(),
            sample_rate: cpal::SampleRate(clip.sample_rate()),
            buffer_size: cpal::BufferSize::Default,
        };

        let samples = clip.shared_samples();
        let fade_len = fade_samples(fade_in, clip.sample_rate(), clip.channels());
        let finished = Arc::new(AtomicBool::new(false));
        let done = Arc::clone(&finished);
        let mut position = 0usize;

        let stream = device
            .build_output_stream(
                &config,
                move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for slot in out.iter_mut() {
                        match samples.get(position) {
                            Some(sample) => {
                                *slot = sample * fade_gain(position, fade_len);
                                position += 1;
                            }
                            None => {
                                *slot = 0.0;
                                done.store(true, Ordering::Release);
                            }
                        }
                    }
                },
                |err| tracing::warn!(error = %err, "audio stream error"),
                None,
            )
            .map_err(|err| LightsError::Playback(format!("cannot open audio stream: {err}")))?;
        stream
            .play()
            .map_err(|err| LightsError::Playback(format!("cannot start audio stream: {err}")))?;

        let deadline = Instant::now() + clip.duration() + DRAIN_GRACE;
        while !finished.load(Ordering::Acquire) && !stop.is_stopped() {
            if Instant::now() >= deadline {
                tracing::warn!("audio stream never finished the clip, moving on");
                break;
            }
            thread::sleep(WAIT_STEP);
        }
        drop(stream);
        Ok(())
    }
}

fn fade_samples(fade_in: Duration, sample_rate: u32, channels: u16) -> usize {
    (fade_in.as_secs_f64() * f64::from(sample_rate) * f64::from(channels)) as usize
}

fn fade_gain(position: usize, fade_len: usize) -> f32 {
    if position >= fade_len {
        1.0
    } else {
        position as f32 / fade_len as f32
    }
}

/// Decodes a WAV file into interleaved `f32` samples in `[-1, 1]`.
pub fn load_wav(path: &Path) -> Result<AudioClip> {
    let playback_err =
        |err: hound::Error| LightsError::Playback(format!("{}: {err}", path.display()));

    let mut reader = hound::WavReader::open(path).map_err(playback_err)?;
    let spec = reader.spec();
    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(playback_err)?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 * scale))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(playback_err)?
        }
    };
    tracing::debug!(
        path = %path.display(),
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        samples = samples.len(),
        "loaded track"
    );
    Ok(AudioClip::new(samples, spec.sample_rate, spec.channels))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn temp_wav(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("season-lights-{}-{name}.wav", std::process::id()))
    }

    #[test]
    fn loads_integer_wav_as_normalised_floats() {
        let path = temp_wav("int16");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for value in [0i16, i16::MAX, i16::MIN, 16_384] {
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();

        let clip = load_wav(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(clip.sample_rate(), 8_000);
        assert_eq!(clip.channels(), 2);
        let samples = clip.samples();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0], 0.0);
        assert!((samples[1] - 1.0).abs() < 1e-3);
        assert_eq!(samples[2], -1.0);
        assert!((samples[3] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn missing_file_is_a_playback_error() {
        let err = load_wav(Path::new("/definitely/not/here.wav")).unwrap_err();
        assert!(matches!(err, LightsError::Playback(_)));
        assert!(format!("{err}").contains("here.wav"));
    }

    #[test]
    fn fade_ramps_linearly() {
        let len = fade_samples(Duration::from_secs(2), 10, 2);
        assert_eq!(len, 40);
        assert_eq!(fade_gain(0, len), 0.0);
        assert_eq!(fade_gain(20, len), 0.5);
        assert_eq!(fade_gain(40, len), 1.0);
        assert_eq!(fade_gain(5, 0), 1.0);
    }
}
