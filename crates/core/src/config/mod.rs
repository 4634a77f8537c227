use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::input::SENSOR_SLOTS;
use crate::scene::{default_scenes, SceneCatalog, SceneDefinition};
use crate::{LightsError, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub timing: TimingConfig,
    pub lighting: LightingConfig,
    pub sensor: SensorConfig,
    pub audio_dir: PathBuf,
    pub button_action: ButtonAction,
    pub scenes: Vec<SceneDefinition>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            lighting: LightingConfig::default(),
            sensor: SensorConfig::default(),
            audio_dir: PathBuf::from("."),
            button_action: ButtonAction::default(),
            scenes: default_scenes(),
        }
    }
}

impl AppConfig {
    /// Reads and validates a JSON configuration file. Missing fields take
    /// their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scenes.is_empty() {
            return Err(LightsError::Config("`scenes` must not be empty".into()));
        }
        // Sensor slots select scenes by index, so every slot needs a scene.
        if self.sensor.port.is_some() && self.scenes.len() <= SENSOR_SLOTS {
            return Err(LightsError::Config(format!(
                "the sensor board needs at least {} scenes, found {}",
                SENSOR_SLOTS + 1,
                self.scenes.len()
            )));
        }
        self.timing.validate()
    }

    /// Builds the scene catalog with tracks resolved against `audio_dir`.
    pub fn catalog(&self) -> Result<SceneCatalog> {
        Ok(SceneCatalog::new(self.scenes.clone())?.with_track_base(&self.audio_dir))
    }
}

/// Timing constants of the control loop and scene choreography.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Control loop period.
    pub tick_ms: u64,
    /// Minimum time between accepted scene switches.
    pub debounce_ms: u64,
    /// Seconds after activation at which the start→end color fade begins.
    pub transition_start_secs: f64,
    /// Length of the start→end color fade.
    pub transition_secs: f64,
    /// Length of the black→color (and audio volume) ramp after activation.
    pub fade_in_secs: f64,
    /// How many seconds before the transition completes announcements begin.
    pub warning_secs: u32,
    /// Upper bound on waiting for an audio task to finish.
    pub audio_stop_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            debounce_ms: 500,
            transition_start_secs: 15.0,
            transition_secs: 5.0,
            fade_in_secs: 2.0,
            warning_secs: 10,
            audio_stop_timeout_ms: 1000,
        }
    }
}

impl TimingConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn fade_in(&self) -> Duration {
        Duration::from_secs_f64(self.fade_in_secs.max(0.0))
    }

    pub fn audio_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.audio_stop_timeout_ms)
    }

    /// Seconds after activation at which the end color is fully reached.
    pub fn transition_end_secs(&self) -> f64 {
        self.transition_start_secs + self.transition_secs
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_ms == 0 {
            return Err(LightsError::Config("`tick_ms` must be positive".into()));
        }
        if !(self.transition_secs.is_finite() && self.transition_secs > 0.0) {
            return Err(LightsError::Config(
                "`transition_secs` must be a positive number".into(),
            ));
        }
        if !(self.transition_start_secs.is_finite() && self.transition_start_secs >= 0.0) {
            return Err(LightsError::Config(
                "`transition_start_secs` must not be negative".into(),
            ));
        }
        if !(self.fade_in_secs.is_finite() && self.fade_in_secs >= 0.0) {
            return Err(LightsError::Config(
                "`fade_in_secs` must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// DMX serial link settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub port: String,
    pub baud: u32,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            port: default_dmx_port().to_string(),
            baud: 250_000,
        }
    }
}

/// Button/light-sensor board serial link settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// `None` runs without the sensor board.
    pub port: Option<String>,
    pub baud: u32,
    /// Lines arriving this soon after connecting are warm-up noise.
    pub warmup_ms: u64,
    /// Pause after opening the port so the board can reset.
    pub settle_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: 9600,
            warmup_ms: 1000,
            settle_ms: 2000,
        }
    }
}

impl SensorConfig {
    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// What the hardware button does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ButtonAction {
    /// Always select the first scene.
    #[default]
    FirstScene,
    /// Advance to the next scene in catalog order.
    CycleNext,
}

fn default_dmx_port() -> &'static str {
    if cfg!(windows) {
        "COM6"
    } else {
        "/dev/ttyUSB0"
    }
}
