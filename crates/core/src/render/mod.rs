//! Color synthesis: turns a scene and its two clocks into the values written
//! to the fixture.
//!
//! Everything here is a pure function of its inputs so the control loop can
//! be replayed deterministically in tests.

use crate::config::TimingConfig;
use crate::scene::{Rgb, SceneDefinition};

/// Peak deviation of the shimmer added to each color channel.
pub const SHIMMER_AMPLITUDE: f64 = 10.0;
/// Shimmer period divisors for red, green and blue.
const SHIMMER_DIVISORS: [f64; 3] = [2.0, 3.0, 4.0];
/// Divisor of the master-intensity breathing wave.
const BREATH_DIVISOR: f64 = 1.5;

/// Output of one synthesis step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderedColor {
    pub color: Rgb,
    pub intensity: u8,
}

/// Computes the scene color for a given moment.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorSynthesizer {
    transition_start: f64,
    transition_len: f64,
    fade_in: f64,
}

impl Default for ColorSynthesizer {
    fn default() -> Self {
        Self::new(&TimingConfig::default())
    }
}

impl ColorSynthesizer {
    pub fn new(timing: &TimingConfig) -> Self {
        Self {
            transition_start: timing.transition_start_secs,
            transition_len: timing.transition_secs,
            fade_in: timing.fade_in_secs,
        }
    }

    /// Progress of the start→end color fade, in `[0, 1]`.
    pub fn color_progress(&self, t_local: f64) -> f64 {
        unit_clamp((t_local - self.transition_start) / self.transition_len)
    }

    /// Scene brightness ramp after activation, in `[0, 1]`.
    pub fn fade_in(&self, t_local: f64) -> f64 {
        if self.fade_in <= 0.0 {
            return if t_local >= 0.0 { 1.0 } else { 0.0 };
        }
        unit_clamp(t_local / self.fade_in)
    }

    /// Renders `scene` at global time `t_global`, `t_local` seconds after it
    /// was activated.
    pub fn render(
        &self,
        scene: &SceneDefinition,
        t_global: f64,
        t_local: f64,
    ) -> RenderedColor {
        let progress = self.color_progress(t_local);
        let fade = self.fade_in(t_local);

        let start = scene.start_color.channels();
        let end = scene.end_color.channels();
        let mut out = [0u8; 3];
        for (i, slot) in out.iter_mut().enumerate() {
            let base = lerp(start[i], end[i], progress);
            let shimmer = SHIMMER_AMPLITUDE * (t_global / SHIMMER_DIVISORS[i]).sin();
            let shimmered = clamp_channel(base + shimmer);
            *slot = to_channel(shimmered * fade);
        }

        let breath = (127.0 * (t_global / BREATH_DIVISOR).sin() + 128.0).round();
        let intensity = to_channel(clamp_channel(breath) * fade);

        RenderedColor {
            color: Rgb::new(out[0], out[1], out[2]),
            intensity,
        }
    }
}

fn lerp(a: u8, b: u8, t: f64) -> f64 {
    let a = f64::from(a);
    a + (f64::from(b) - a) * t
}

/// Clamps into `[0, 1]`, mapping NaN to 0.
fn unit_clamp(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Clamps into `[0, 255]`, mapping NaN to 0.
fn clamp_channel(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 255.0)
    }
}

fn to_channel(value: f64) -> u8 {
    clamp_channel(value) as u8
}
