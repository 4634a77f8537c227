//! Core library for the Season Lights installation.
//!
//! The crate holds everything with timing, state-machine or concurrency
//! concerns: the scene catalog and state machine, color synthesis, DMX
//! framing, the background audio loop and the fixed-period control loop that
//! ties them together. Hardware access sits behind the [`DmxPort`],
//! [`AudioOutput`] and [`EventSource`] traits so the application crate can
//! plug in real devices and tests can plug in fakes.

pub mod audio;
pub mod config;
pub mod dmx;
pub mod error;
pub mod input;
pub mod render;
pub mod runtime;
pub mod scene;
pub mod state;
pub mod timeline;

pub use audio::{AudioClip, AudioLoopManager, AudioOutput, LoopPlayer, SilentPlayer, StopToken};
pub use config::{AppConfig, ButtonAction, LightingConfig, SensorConfig, TimingConfig};
pub use dmx::{ControlFrame, DmxPort, FrameTransmitter};
pub use error::{LightsError, Result};
pub use input::{
    ChannelSource, EventSource, InputEvent, MergedSource, QuitFlag, SensorLineDecoder,
};
pub use render::{ColorSynthesizer, RenderedColor};
pub use runtime::{ControlLoop, StopReason};
pub use scene::{Rgb, SceneCatalog, SceneDefinition, TrackRef};
pub use state::{Handled, SceneState, SceneStateMachine, SwitchOutcome};
pub use timeline::{Announcement, AnnouncementTracker, TickScheduler};
