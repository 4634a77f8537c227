use std::time::{Duration, Instant};

use crate::audio::LoopPlayer;
use crate::config::{ButtonAction, TimingConfig};
use crate::input::InputEvent;
use crate::render::{ColorSynthesizer, RenderedColor};
use crate::scene::{SceneCatalog, SceneDefinition};
use crate::timeline::{Announcement, AnnouncementTracker};
use crate::Result;

/// Mutable scene bookkeeping, owned by the state machine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneState {
    pub active_index: Option<usize>,
    /// Runs while any scene is active; drives shimmer and breathing.
    pub t_global: f64,
    /// Seconds since the current scene was activated.
    pub t_local: f64,
    pub last_switch_time: Option<Instant>,
}

/// Result of a switch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    Switched,
    /// The requested scene is already showing.
    AlreadyActive,
    /// Too soon after the previous switch.
    Debounced,
}

/// What handling one input event led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Switch(SwitchOutcome),
    Quit,
}

/// Single-active-scene controller: which scene is showing, for how long, and
/// which audio loop goes with it.
#[derive(Debug)]
pub struct SceneStateMachine<P> {
    catalog: SceneCatalog,
    state: SceneState,
    announcements: AnnouncementTracker,
    debounce: Duration,
    button_action: ButtonAction,
    player: P,
}

impl<P: LoopPlayer> SceneStateMachine<P> {
    pub fn new(catalog: SceneCatalog, timing: &TimingConfig, player: P) -> Self {
        Self {
            catalog,
            state: SceneState::default(),
            announcements: AnnouncementTracker::new(timing),
            debounce: timing.debounce(),
            button_action: ButtonAction::default(),
            player,
        }
    }

    pub fn with_button_action(mut self, action: ButtonAction) -> Self {
        self.button_action = action;
        self
    }

    pub fn catalog(&self) -> &SceneCatalog {
        &self.catalog
    }

    pub fn state(&self) -> &SceneState {
        &self.state
    }

    pub fn active_index(&self) -> Option<usize> {
        self.state.active_index
    }

    pub fn is_idle(&self) -> bool {
        self.state.active_index.is_none()
    }

    /// Last countdown value reported for this activation.
    pub fn last_announcement(&self) -> Option<i32> {
        self.announcements.last_remaining()
    }

    pub fn active_scene(&self) -> Option<&SceneDefinition> {
        self.state
            .active_index
            .and_then(|index| self.catalog.get(index))
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    /// Activates scene `index` unless it is already active or the previous
    /// switch was less than the debounce window ago. Out-of-range indices are
    /// an error whatever the current state.
    pub fn select(&mut self, index: usize, now: Instant) -> Result<SwitchOutcome> {
        let scene = self.catalog.scene(index)?;
        let (name, track) = (scene.name.clone(), scene.track.clone());

        if self.state.active_index == Some(index) {
            tracing::debug!(scene = index, "scene already active");
            return Ok(SwitchOutcome::AlreadyActive);
        }
        let too_soon = self
            .state
            .last_switch_time
            .is_some_and(|last| now.saturating_duration_since(last) < self.debounce);
        if too_soon {
            tracing::debug!(scene = index, "switch ignored, too soon after the previous one");
            return Ok(SwitchOutcome::Debounced);
        }

        self.state.active_index = Some(index);
        self.state.t_local = 0.0;
        self.state.last_switch_time = Some(now);
        self.announcements.reset();

        tracing::info!(scene = index, %name, %track, "switched scene");
        if let Err(err) = self.player.start(&track) {
            tracing::warn!(scene = index, error = %err, "scene is running without audio");
        }
        Ok(SwitchOutcome::Switched)
    }

    /// Advances to the next scene in catalog order; from idle, selects the
    /// first scene.
    pub fn cycle_next(&mut self, now: Instant) -> Result<SwitchOutcome> {
        let next = self
            .state
            .active_index
            .map_or(0, |index| self.catalog.next_index(index));
        self.select(next, now)
    }

    /// Advances both clocks by `dt` seconds while a scene is active and
    /// returns the countdown notice due, if any.
    pub fn tick(&mut self, dt: f64) -> Option<Announcement> {
        let index = self.state.active_index?;
        self.state.t_global += dt;
        self.state.t_local += dt;

        let announcement = self.announcements.observe(self.state.t_local);
        if let Some(announcement) = announcement {
            tracing::info!(scene = index, "{announcement}");
        }
        announcement
    }

    pub fn handle(&mut self, event: InputEvent, now: Instant) -> Result<Handled> {
        let outcome = match event {
            InputEvent::Quit => return Ok(Handled::Quit),
            InputEvent::Select(index) => self.select(index, now)?,
            InputEvent::SensorActivated(slot) => self.select(slot, now)?,
            InputEvent::ButtonPressed => match self.button_action {
                ButtonAction::FirstScene => self.select(0, now)?,
                ButtonAction::CycleNext => self.cycle_next(now)?,
            },
        };
        Ok(Handled::Switch(outcome))
    }

    /// Color for the current moment, or `None` while idle.
    pub fn render(&self, synth: &ColorSynthesizer) -> Option<RenderedColor> {
        let scene = self.active_scene()?;
        Some(synth.render(scene, self.state.t_global, self.state.t_local))
    }

    /// Stops the audio loop. Safe to call more than once.
    pub fn shutdown(&mut self) {
        self.player.stop();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingPlayer;
    use super::*;
    use crate::render::SHIMMER_AMPLITUDE;
    use crate::scene::TrackRef;
    use crate::LightsError;

    fn machine() -> SceneStateMachine<RecordingPlayer> {
        SceneStateMachine::new(
            SceneCatalog::seasons(),
            &TimingConfig::default(),
            RecordingPlayer::default(),
        )
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn idle_ticks_do_nothing() {
        let mut machine = machine();
        assert_eq!(machine.tick(0.05), None);
        assert_eq!(machine.state(), &SceneState::default());
        assert!(machine.render(&ColorSynthesizer::default()).is_none());
    }

    #[test]
    fn first_selection_activates_scene_and_audio() {
        let mut machine = machine();
        let now = Instant::now();
        assert_eq!(machine.select(2, now).unwrap(), SwitchOutcome::Switched);
        assert_eq!(machine.active_index(), Some(2));
        assert_eq!(machine.state().last_switch_time, Some(now));
        assert_eq!(
            machine.player().started,
            vec![TrackRef::new("music_autumn.wav")]
        );
    }

    #[test]
    fn switch_within_debounce_window_is_rejected() {
        let mut machine = machine();
        let t0 = Instant::now();
        machine.select(0, t0).unwrap();
        machine.tick(0.3);

        let outcome = machine.select(1, t0 + ms(300)).unwrap();
        assert_eq!(outcome, SwitchOutcome::Debounced);
        assert_eq!(machine.active_index(), Some(0));
        assert!((machine.state().t_local - 0.3).abs() < 1e-9);
        assert_eq!(machine.player().started.len(), 1);

        assert_eq!(
            machine.select(1, t0 + ms(500)).unwrap(),
            SwitchOutcome::Switched
        );
        assert_eq!(machine.state().t_local, 0.0);
    }

    #[test]
    fn reselecting_active_scene_never_restarts_it() {
        let mut machine = machine();
        let t0 = Instant::now();
        machine.select(1, t0).unwrap();
        machine.tick(5.0);

        for later in [ms(100), ms(600), ms(60_000)] {
            assert_eq!(
                machine.select(1, t0 + later).unwrap(),
                SwitchOutcome::AlreadyActive
            );
        }
        assert_eq!(machine.state().t_local, 5.0);
        assert_eq!(machine.player().started.len(), 1);
        assert_eq!(machine.state().last_switch_time, Some(t0));
    }

    #[test]
    fn out_of_range_index_is_a_contract_violation() {
        let mut machine = machine();
        let err = machine.select(4, Instant::now()).unwrap_err();
        assert!(matches!(err, LightsError::SceneOutOfRange { index: 4, len: 4 }));
        assert!(err.is_fatal());
        assert!(machine.is_idle());
        assert!(machine.player().started.is_empty());
    }

    #[test]
    fn cycling_four_times_returns_to_the_start() {
        let mut machine = machine();
        let t0 = Instant::now();
        machine.select(1, t0).unwrap();

        let mut seen = Vec::new();
        for step in 1..=4u64 {
            let outcome = machine.cycle_next(t0 + ms(500 * step)).unwrap();
            assert_eq!(outcome, SwitchOutcome::Switched);
            seen.push(machine.active_index().unwrap());
        }
        assert_eq!(seen, [2, 3, 0, 1]);
    }

    #[test]
    fn cycle_from_idle_selects_first_scene() {
        let mut machine = machine();
        machine.cycle_next(Instant::now()).unwrap();
        assert_eq!(machine.active_index(), Some(0));
    }

    #[test]
    fn midway_through_transition_shows_midpoint_color() {
        let mut machine = machine();
        let synth = ColorSynthesizer::default();
        machine.select(0, Instant::now()).unwrap();
        machine.tick(17.5);

        assert_eq!(synth.color_progress(machine.state().t_local), 0.5);
        let out = machine.render(&synth).unwrap();
        // spring fades (0,255,0) -> (255,0,190)
        let midpoint = [127.5, 127.5, 95.0];
        for (got, mid) in out.color.channels().iter().zip(midpoint) {
            assert!((f64::from(*got) - mid).abs() <= SHIMMER_AMPLITUDE + 1.0);
        }
    }

    #[test]
    fn announcements_count_down_once_per_activation() {
        let mut machine = machine();
        let t0 = Instant::now();
        machine.select(0, t0).unwrap();

        let run = |machine: &mut SceneStateMachine<RecordingPlayer>| {
            (0..600).filter_map(|_| machine.tick(0.05)).collect::<Vec<_>>()
        };
        let mut expected: Vec<_> = (1..=10).rev().map(Announcement::ChangingIn).collect();
        expected.push(Announcement::Changed);

        assert_eq!(run(&mut machine), expected);
        assert_eq!(machine.last_announcement(), Some(0));

        machine.select(3, t0 + ms(1_000)).unwrap();
        assert_eq!(machine.last_announcement(), None);
        assert_eq!(run(&mut machine), expected);
    }

    #[test]
    fn global_clock_survives_switches() {
        let mut machine = machine();
        let t0 = Instant::now();
        machine.select(0, t0).unwrap();
        machine.tick(3.0);
        machine.select(1, t0 + ms(3_000)).unwrap();
        machine.tick(1.0);

        assert_eq!(machine.state().t_global, 4.0);
        assert_eq!(machine.state().t_local, 1.0);
    }

    #[test]
    fn events_map_onto_scenes() {
        let mut machine = machine();
        let t0 = Instant::now();

        let handled = machine.handle(InputEvent::SensorActivated(2), t0).unwrap();
        assert_eq!(handled, Handled::Switch(SwitchOutcome::Switched));
        assert_eq!(machine.active_index(), Some(2));

        machine.handle(InputEvent::ButtonPressed, t0 + ms(600)).unwrap();
        assert_eq!(machine.active_index(), Some(0));

        machine.handle(InputEvent::Select(3), t0 + ms(1_200)).unwrap();
        assert_eq!(machine.active_index(), Some(3));

        assert_eq!(
            machine.handle(InputEvent::Quit, t0 + ms(1_300)).unwrap(),
            Handled::Quit
        );
    }

    #[test]
    fn button_can_cycle_instead() {
        let mut machine = machine().with_button_action(ButtonAction::CycleNext);
        let t0 = Instant::now();
        machine.select(3, t0).unwrap();
        machine.handle(InputEvent::ButtonPressed, t0 + ms(500)).unwrap();
        assert_eq!(machine.active_index(), Some(0));
        machine.handle(InputEvent::ButtonPressed, t0 + ms(1_000)).unwrap();
        assert_eq!(machine.active_index(), Some(1));
    }

    #[test]
    fn audio_failure_keeps_scene_active() {
        let player = RecordingPlayer {
            fail: true,
            ..RecordingPlayer::default()
        };
        let mut machine =
            SceneStateMachine::new(SceneCatalog::seasons(), &TimingConfig::default(), player);
        assert_eq!(
            machine.select(1, Instant::now()).unwrap(),
            SwitchOutcome::Switched
        );
        machine.tick(3.0);
        assert!(machine.render(&ColorSynthesizer::default()).is_some());
    }

    #[test]
    fn shutdown_stops_audio() {
        let mut machine = machine();
        machine.select(0, Instant::now()).unwrap();
        machine.shutdown();
        assert_eq!(machine.player().stops, 1);
    }
}
