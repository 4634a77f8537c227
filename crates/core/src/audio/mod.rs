use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::scene::TrackRef;
use crate::{LightsError, Result};

/// Decoded audio, interleaved `f32` samples.
#[derive(Debug, Clone)]
pub struct AudioClip {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels: channels.max(1),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn shared_samples(&self) -> Arc<[f32]> {
        self.samples.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Length of one pass through the clip.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = self.samples.len() / usize::from(self.channels);
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate))
    }
}

/// Cooperative cancellation flag shared between the control thread and one
/// playback task.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Platform playback primitive.
///
/// `play` blocks for one pass through the clip. Implementations must return
/// early once `stop` is set; that is the only way a pass gets cut short.
pub trait AudioOutput: Send + Sync + 'static {
    fn load(&self, track: &TrackRef) -> Result<AudioClip>;
    fn play(&self, clip: &AudioClip, fade_in: Duration, stop: &StopToken) -> Result<()>;
}

/// What the scene state machine needs from an audio player.
pub trait LoopPlayer {
    /// Replaces whatever is playing with a loop of `track`.
    fn start(&mut self, track: &TrackRef) -> Result<()>;
    /// Stops the current loop, waiting a bounded time for it to finish.
    fn stop(&mut self);
}

impl<P: LoopPlayer + ?Sized> LoopPlayer for Box<P> {
    fn start(&mut self, track: &TrackRef) -> Result<()> {
        (**self).start(track)
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

/// Player used when audio is disabled.
#[derive(Debug, Default)]
pub struct SilentPlayer;

impl LoopPlayer for SilentPlayer {
    fn start(&mut self, track: &TrackRef) -> Result<()> {
        tracing::debug!(%track, "audio disabled, not playing track");
        Ok(())
    }

    fn stop(&mut self) {}
}

struct LoopTask {
    track: TrackRef,
    stop: StopToken,
    done: mpsc::Receiver<()>,
    handle: JoinHandle<()>,
}

/// Owns at most one background thread that loops a track until stopped.
pub struct AudioLoopManager {
    output: Arc<dyn AudioOutput>,
    current: Option<LoopTask>,
    stop_timeout: Duration,
    fade_in: Duration,
    live_tasks: Arc<AtomicUsize>,
}

impl AudioLoopManager {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self {
            output,
            current: None,
            stop_timeout: Duration::from_secs(1),
            fade_in: Duration::ZERO,
            live_tasks: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Upper bound on waiting for a task to wind down.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Volume ramp applied to the first pass after each `start`.
    pub fn with_fade_in(mut self, fade_in: Duration) -> Self {
        self.fade_in = fade_in;
        self
    }

    /// Track of the running loop, if any.
    pub fn current_track(&self) -> Option<&TrackRef> {
        self.current
            .as_ref()
            .filter(|task| !task.handle.is_finished())
            .map(|task| &task.track)
    }

    pub fn is_running(&self) -> bool {
        self.current_track().is_some()
    }

    /// Number of loop threads that have not exited yet. Only exceeds one when
    /// a stuck backend outlived its stop timeout.
    pub fn live_tasks(&self) -> usize {
        self.live_tasks.load(Ordering::Acquire)
    }

    fn spawn(&self, track: &TrackRef) -> Result<LoopTask> {
        let stop = StopToken::new();
        let (done_tx, done) = mpsc::channel();
        let output = Arc::clone(&self.output);
        let live = Arc::clone(&self.live_tasks);
        let task_track = track.clone();
        let task_stop = stop.clone();
        let fade_in = self.fade_in;

        live.fetch_add(1, Ordering::AcqRel);
        let spawned = thread::Builder::new()
            .name("audio-loop".into())
            .spawn(move || {
                let _done = done_tx;
                let _live = LiveGuard(live);
                play_until_stopped(output.as_ref(), &task_track, fade_in, &task_stop);
            });

        match spawned {
            Ok(handle) => Ok(LoopTask {
                track: track.clone(),
                stop,
                done,
                handle,
            }),
            Err(err) => {
                self.live_tasks.fetch_sub(1, Ordering::AcqRel);
                Err(LightsError::Playback(format!(
                    "failed to spawn audio thread: {err}"
                )))
            }
        }
    }

    fn finish(&self, task: LoopTask) {
        task.stop.stop();
        match task.done.recv_timeout(self.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if task.handle.join().is_err() {
                    tracing::warn!(track = %task.track, "audio loop thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    track = %task.track,
                    timeout_ms = self.stop_timeout.as_millis() as u64,
                    "audio loop did not stop in time, detaching it"
                );
            }
        }
    }
}

impl LoopPlayer for AudioLoopManager {
    fn start(&mut self, track: &TrackRef) -> Result<()> {
        self.stop();
        let task = self.spawn(track)?;
        tracing::info!(%track, "audio loop started");
        self.current = Some(task);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.current.take() {
            tracing::debug!(track = %task.track, "stopping audio loop");
            self.finish(task);
        }
    }
}

impl Drop for AudioLoopManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AudioLoopManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioLoopManager")
            .field("current", &self.current.as_ref().map(|task| &task.track))
            .field("stop_timeout", &self.stop_timeout)
            .field("fade_in", &self.fade_in)
            .field("live_tasks", &self.live_tasks())
            .finish()
    }
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Body of a loop thread. Errors end the loop; the scene carries on silently.
fn play_until_stopped(
    output: &dyn AudioOutput,
    track: &TrackRef,
    fade_in: Duration,
    stop: &StopToken,
) {
    let clip = match output.load(track) {
        Ok(clip) => clip,
        Err(err) => {
            tracing::warn!(%track, error = %err, "could not load audio track");
            return;
        }
    };
    if clip.is_empty() {
        tracing::warn!(%track, "audio track has no samples");
        return;
    }

    let mut fade = fade_in;
    let mut passes = 0u64;
    while !stop.is_stopped() {
        if let Err(err) = output.play(&clip, fade, stop) {
            tracing::warn!(%track, error = %err, "audio playback failed");
            return;
        }
        fade = Duration::ZERO;
        passes += 1;
    }
    tracing::debug!(%track, passes, "audio loop finished");
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::time::Instant;

    use super::*;

    /// Backend that "plays" by sleeping, and records what it was asked to do.
    #[derive(Default)]
    pub(crate) struct FakeOutput {
        pub(crate) pass_len: Duration,
        pub(crate) ignore_stop: bool,
        pub(crate) fail_load: bool,
        pub(crate) loads: Mutex<Vec<TrackRef>>,
        pub(crate) fades: Mutex<Vec<(TrackRef, Duration)>>,
        pub(crate) playing: AtomicUsize,
        pub(crate) max_playing: AtomicUsize,
    }

    impl FakeOutput {
        pub(crate) fn with_pass(pass_len: Duration) -> Self {
            Self {
                pass_len,
                ..Self::default()
            }
        }

        pub(crate) fn load_count(&self) -> usize {
            self.loads.lock().unwrap().len()
        }
    }

    impl AudioOutput for FakeOutput {
        fn load(&self, track: &TrackRef) -> Result<AudioClip> {
            self.loads.lock().unwrap().push(track.clone());
            if self.fail_load {
                return Err(LightsError::Playback(format!("{track} not found")));
            }
            Ok(AudioClip::new(vec![0.0; 64], 8_000, 1))
        }

        fn play(&self, _clip: &AudioClip, fade_in: Duration, stop: &StopToken) -> Result<()> {
            let now = self.playing.fetch_add(1, Ordering::AcqRel) + 1;
            self.max_playing.fetch_max(now, Ordering::AcqRel);
            let track = self.loads.lock().unwrap().last().cloned();
            if let Some(track) = track {
                self.fades.lock().unwrap().push((track, fade_in));
            }

            let started = Instant::now();
            while started.elapsed() < self.pass_len {
                if stop.is_stopped() && !self.ignore_stop {
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }
            self.playing.fetch_sub(1, Ordering::AcqRel);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::testing::FakeOutput;
    use super::*;

    fn track(name: &str) -> TrackRef {
        TrackRef::new(name)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn clip_duration_accounts_for_channels() {
        let clip = AudioClip::new(vec![0.0; 48_000], 24_000, 2);
        assert_eq!(clip.duration(), Duration::from_secs(1));
    }

    #[test]
    fn starting_twice_leaves_only_the_second_loop() {
        let output = Arc::new(FakeOutput::with_pass(Duration::from_millis(5)));
        let mut manager = AudioLoopManager::new(output.clone());

        manager.start(&track("a.wav")).unwrap();
        manager.start(&track("b.wav")).unwrap();

        assert_eq!(manager.current_track(), Some(&track("b.wav")));
        assert_eq!(manager.live_tasks(), 1);
        assert!(wait_until(|| output.load_count() == 2));
        assert!(output.max_playing.load(Ordering::Acquire) <= 1);

        manager.stop();
        assert_eq!(manager.live_tasks(), 0);
        assert!(!manager.is_running());
    }

    #[test]
    fn loops_until_stopped() {
        let output = Arc::new(FakeOutput::with_pass(Duration::from_millis(2)));
        let mut manager = AudioLoopManager::new(output.clone());
        manager.start(&track("loop.wav")).unwrap();

        assert!(wait_until(|| output.fades.lock().unwrap().len() >= 3));
        manager.stop();
        let passes = output.fades.lock().unwrap().len();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(output.fades.lock().unwrap().len(), passes);
        assert_eq!(output.load_count(), 1);
    }

    #[test]
    fn fades_in_on_first_pass_only() {
        let output = Arc::new(FakeOutput::with_pass(Duration::from_millis(2)));
        let mut manager =
            AudioLoopManager::new(output.clone()).with_fade_in(Duration::from_secs(2));
        manager.start(&track("fade.wav")).unwrap();

        assert!(wait_until(|| output.fades.lock().unwrap().len() >= 2));
        manager.stop();
        let fades = output.fades.lock().unwrap();
        assert_eq!(fades[0].1, Duration::from_secs(2));
        assert!(fades[1..].iter().all(|(_, fade)| fade.is_zero()));
    }

    #[test]
    fn random_start_stop_sequences_keep_one_task() {
        let output = Arc::new(FakeOutput::with_pass(Duration::from_millis(3)));
        let mut manager = AudioLoopManager::new(output.clone());
        let names = ["a.wav", "b.wav", "c.wav"];
        for step in 0..24 {
            if step % 5 == 4 {
                manager.stop();
                assert_eq!(manager.live_tasks(), 0);
            } else {
                manager.start(&track(names[step % names.len()])).unwrap();
                assert_eq!(manager.live_tasks(), 1);
            }
        }
        manager.stop();
        assert!(output.max_playing.load(Ordering::Acquire) <= 1);
    }

    #[test]
    fn stop_is_bounded_when_backend_hangs() {
        let output = Arc::new(FakeOutput {
            pass_len: Duration::from_millis(400),
            ignore_stop: true,
            ..FakeOutput::default()
        });
        let mut manager =
            AudioLoopManager::new(output.clone()).with_stop_timeout(Duration::from_millis(20));
        manager.start(&track("stuck.wav")).unwrap();
        assert!(wait_until(|| output.fades.lock().unwrap().len() == 1));

        let started = Instant::now();
        manager.stop();
        assert!(started.elapsed() < Duration::from_millis(300));
        assert!(!manager.is_running());
    }

    #[test]
    fn load_failure_leaves_scene_silent() {
        let output = Arc::new(FakeOutput {
            fail_load: true,
            ..FakeOutput::default()
        });
        let mut manager = AudioLoopManager::new(output.clone());
        manager.start(&track("missing.wav")).unwrap();

        assert!(wait_until(|| !manager.is_running()));
        assert!(output.fades.lock().unwrap().is_empty());
        assert!(wait_until(|| manager.live_tasks() == 0));
    }

    #[test]
    fn drop_stops_the_loop() {
        let output = Arc::new(FakeOutput::with_pass(Duration::from_millis(2)));
        let live = {
            let mut manager = AudioLoopManager::new(output.clone());
            manager.start(&track("a.wav")).unwrap();
            manager.live_tasks.clone()
        };
        assert_eq!(live.load(Ordering::Acquire), 0);
    }
}
