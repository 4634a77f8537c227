use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{LightsError, Result};

/// An 8-bit RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn channels(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

/// Opaque reference to an audio track. The core never looks inside it; the
/// audio backend resolves it to samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackRef(PathBuf);

impl TrackRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Resolves relative references against `base`.
    pub fn resolve(&self, base: &Path) -> TrackRef {
        if self.0.is_absolute() {
            self.clone()
        } else {
            TrackRef(base.join(&self.0))
        }
    }
}

impl std::fmt::Display for TrackRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// One lighting + audio preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDefinition {
    pub name: String,
    pub start_color: Rgb,
    pub end_color: Rgb,
    pub track: TrackRef,
}

impl SceneDefinition {
    pub fn new(
        name: impl Into<String>,
        start_color: Rgb,
        end_color: Rgb,
        track: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            start_color,
            end_color,
            track: TrackRef::new(track),
        }
    }
}

/// Ordered, immutable table of scenes. Index order is the cycling order.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneCatalog {
    scenes: Vec<SceneDefinition>,
}

impl SceneCatalog {
    /// Builds a catalog, rejecting an empty scene list.
    pub fn new(scenes: Vec<SceneDefinition>) -> Result<Self> {
        if scenes.is_empty() {
            return Err(LightsError::Config(
                "scene catalog must contain at least one scene".into(),
            ));
        }
        Ok(Self { scenes })
    }

    /// The four seasonal scenes the installation ships with.
    pub fn seasons() -> Self {
        Self {
            scenes: default_scenes(),
        }
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SceneDefinition> {
        self.scenes.get(index)
    }

    /// Like [`SceneCatalog::get`] but treats a miss as a contract violation.
    pub fn scene(&self, index: usize) -> Result<&SceneDefinition> {
        self.scenes.get(index).ok_or(LightsError::SceneOutOfRange {
            index,
            len: self.scenes.len(),
        })
    }

    /// Index that follows `index` in cycling order.
    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.scenes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SceneDefinition> {
        self.scenes.iter()
    }

    /// Rewrites every track reference relative to `base`.
    pub fn with_track_base(mut self, base: &Path) -> Self {
        for scene in &mut self.scenes {
            scene.track = scene.track.resolve(base);
        }
        self
    }
}

impl Default for SceneCatalog {
    fn default() -> Self {
        Self::seasons()
    }
}

pub(crate) fn default_scenes() -> Vec<SceneDefinition> {
    vec![
        SceneDefinition::new(
            "spring",
            Rgb::new(0, 255, 0),
            Rgb::new(255, 0, 190),
            "music_spring.wav",
        ),
        SceneDefinition::new(
            "summer",
            Rgb::new(0, 255, 0),
            Rgb::new(50, 50, 255),
            "music_summer.wav",
        ),
        SceneDefinition::new(
            "autumn",
            Rgb::new(40, 196, 40),
            Rgb::new(255, 70, 0),
            "music_autumn.wav",
        ),
        SceneDefinition::new(
            "winter",
            Rgb::new(200, 225, 255),
            Rgb::new(40, 255, 100),
            "music_winter.wav",
        ),
    ]
}
