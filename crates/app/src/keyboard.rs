use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use season_lights_core::input::{coalesce, key_event};
use season_lights_core::{EventSource, InputEvent, Result};

/// Keyboard input from the controlling terminal, read without blocking.
///
/// The terminal is in raw mode while this exists, so Ctrl-C arrives as a key
/// and goes through the normal quit path.
pub struct KeyboardSource {
    catalog_len: usize,
}

impl KeyboardSource {
    pub fn new(catalog_len: usize) -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self { catalog_len })
    }

    fn translate(&self, key: KeyEvent) -> Option<InputEvent> {
        if key.kind == KeyEventKind::Release {
            return None;
        }
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => Some(InputEvent::Quit),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(InputEvent::Quit)
            }
            KeyCode::Char(c) => key_event(c, self.catalog_len),
            _ => None,
        }
    }
}

impl EventSource for KeyboardSource {
    fn poll(&mut self, _now: Instant) -> Result<Vec<InputEvent>> {
        let mut events = Vec::new();
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                events.extend(self.translate(key));
            }
        }
        Ok(coalesce(events))
    }
}

impl Drop for KeyboardSource {
    fn drop(&mut self) {
        if let Err(err) = terminal::disable_raw_mode() {
            tracing::warn!(error = %err, "failed to restore terminal mode");
        }
    }
}
