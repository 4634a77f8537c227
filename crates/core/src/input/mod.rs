//! Input events and the sensor board's line protocol.
//!
//! Hardware specifics (terminal keys, serial reads) live in the application
//! crate; this module owns everything that can be decided without hardware.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{LightsError, Result};

/// Sensor slots reported by the board, `Sensor 1` to `Sensor 3`.
pub const SENSOR_SLOTS: usize = 3;

const BUTTON_LINE: &str = "Button Pressed";

/// A discrete request coming from the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Keyboard selection of a scene index.
    Select(usize),
    /// A light sensor went bright; the slot doubles as the scene index.
    SensorActivated(usize),
    ButtonPressed,
    Quit,
}

/// Something the control loop can poll once per tick without blocking.
pub trait EventSource {
    fn poll(&mut self, now: Instant) -> Result<Vec<InputEvent>>;
}

impl<S: EventSource + ?Sized> EventSource for Box<S> {
    fn poll(&mut self, now: Instant) -> Result<Vec<InputEvent>> {
        (**self).poll(now)
    }
}

/// Parses one trimmed line of the sensor protocol.
pub fn parse_sensor_line(line: &str) -> Result<InputEvent> {
    let line = line.trim();
    if line == BUTTON_LINE {
        return Ok(InputEvent::ButtonPressed);
    }
    let slot = line
        .strip_prefix("Sensor ")
        .and_then(|rest| rest.strip_suffix(" Bright"))
        .and_then(|digits| digits.parse::<usize>().ok())
        .filter(|slot| (1..=SENSOR_SLOTS).contains(slot));
    slot.map(InputEvent::SensorActivated)
        .ok_or_else(|| LightsError::Parse(line.to_string()))
}

/// Turns raw lines from the sensor link into events, dropping anything that
/// arrives during the board's warm-up or does not parse.
#[derive(Debug, Clone)]
pub struct SensorLineDecoder {
    connected_at: Instant,
    warmup: Duration,
    discarded: u64,
}

impl SensorLineDecoder {
    pub fn new(connected_at: Instant, warmup: Duration) -> Self {
        Self {
            connected_at,
            warmup,
            discarded: 0,
        }
    }

    /// Lines dropped so far, for diagnostics.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn in_warmup(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.connected_at) < self.warmup
    }

    pub fn decode(&mut self, raw: &[u8], now: Instant) -> Option<InputEvent> {
        if self.in_warmup(now) {
            self.discarded += 1;
            tracing::trace!("discarding sensor line during warm-up");
            return None;
        }
        let text = match std::str::from_utf8(raw) {
            Ok(text) => text,
            Err(_) => {
                self.discarded += 1;
                tracing::debug!(bytes = raw.len(), "discarding non-UTF-8 sensor line");
                return None;
            }
        };
        if text.trim().is_empty() {
            return None;
        }
        match parse_sensor_line(text) {
            Ok(event) => Some(event),
            Err(err) => {
                self.discarded += 1;
                tracing::debug!(error = %err, "discarding sensor line");
                None
            }
        }
    }
}

/// Maps a pressed character to an event: digits `1..=len` select scenes.
pub fn key_event(key: char, catalog_len: usize) -> Option<InputEvent> {
    let digit = key.to_digit(10)? as usize;
    (1..=catalog_len)
        .contains(&digit)
        .then(|| InputEvent::Select(digit - 1))
}

/// Drops repeats of the same event within one poll so a held key does not
/// flood the state machine. Order of first occurrence is kept.
pub fn coalesce(events: Vec<InputEvent>) -> Vec<InputEvent> {
    let mut out: Vec<InputEvent> = Vec::with_capacity(events.len());
    for event in events {
        if !out.contains(&event) {
            out.push(event);
        }
    }
    out
}

/// Event source fed by another thread through a channel.
#[derive(Debug)]
pub struct ChannelSource {
    rx: Receiver<InputEvent>,
    disconnected: bool,
}

impl ChannelSource {
    pub fn new(rx: Receiver<InputEvent>) -> Self {
        Self {
            rx,
            disconnected: false,
        }
    }
}

impl EventSource for ChannelSource {
    fn poll(&mut self, _now: Instant) -> Result<Vec<InputEvent>> {
        let mut events = Vec::new();
        if self.disconnected {
            return Ok(events);
        }
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!("input channel closed, no more events from it");
                    self.disconnected = true;
                    break;
                }
            }
        }
        Ok(events)
    }
}

/// Shared flag raised from outside the control loop, e.g. by a signal
/// handler, and reported as [`InputEvent::Quit`].
#[derive(Debug, Clone, Default)]
pub struct QuitFlag {
    raised: Arc<AtomicBool>,
}

impl QuitFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

impl EventSource for QuitFlag {
    fn poll(&mut self, _now: Instant) -> Result<Vec<InputEvent>> {
        Ok(if self.is_raised() {
            vec![InputEvent::Quit]
        } else {
            Vec::new()
        })
    }
}

/// Polls several sources in order and merges their events.
#[derive(Default)]
pub struct MergedSource {
    sources: Vec<Box<dyn EventSource>>,
}

impl MergedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: impl EventSource + 'static) {
        self.sources.push(Box::new(source));
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl EventSource for MergedSource {
    fn poll(&mut self, now: Instant) -> Result<Vec<InputEvent>> {
        let mut events = Vec::new();
        for source in &mut self.sources {
            events.extend(source.poll(now)?);
        }
        Ok(coalesce(events))
    }
}

impl std::fmt::Debug for MergedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergedSource")
            .field("sources", &self.sources.len())
            .finish()
    }
}
