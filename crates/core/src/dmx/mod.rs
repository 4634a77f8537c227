//! DMX512 framing over a serial adapter.
//!
//! A DMX packet is a break (line held low), a mark-after-break (line high),
//! then the start code and up to 512 channel slots at 250 kbaud 8N2.

use std::thread;
use std::time::Duration;

use crate::render::RenderedColor;
use crate::{LightsError, Result};

/// Number of data slots in a DMX universe.
pub const DMX_CHANNELS: usize = 512;
/// Full frame length: start code plus every data slot.
pub const FRAME_LEN: usize = DMX_CHANNELS + 1;
/// Start code for dimmer data.
pub const NULL_START_CODE: u8 = 0x00;

/// Minimum break and mark-after-break lengths used by the installation.
pub const DEFAULT_BREAK: Duration = Duration::from_millis(1);
pub const DEFAULT_MARK_AFTER_BREAK: Duration = Duration::from_millis(1);

/// One complete DMX frame.
///
/// The fixture is patched at address 1 with five channels: red, green, blue,
/// master dimmer and an unused slot that is always 0.
#[derive(Clone, PartialEq, Eq)]
pub struct ControlFrame {
    bytes: [u8; FRAME_LEN],
}

impl ControlFrame {
    /// An all-zero frame (every fixture dark).
    pub fn blackout() -> Self {
        Self {
            bytes: [0; FRAME_LEN],
        }
    }

    /// Encodes a rendered color into a fresh frame.
    pub fn encode(rendered: &RenderedColor) -> Self {
        let mut frame = Self::blackout();
        frame.bytes[0] = NULL_START_CODE;
        frame.bytes[1..6].copy_from_slice(&[
            rendered.color.r,
            rendered.color.g,
            rendered.color.b,
            rendered.intensity,
            0,
        ]);
        frame
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Default for ControlFrame {
    fn default() -> Self {
        Self::blackout()
    }
}

impl std::fmt::Debug for ControlFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlFrame")
            .field("start_code", &self.bytes[0])
            .field("fixture", &&self.bytes[1..6])
            .finish()
    }
}

/// Serial line able to signal a DMX break.
pub trait DmxPort {
    fn set_break(&mut self) -> Result<()>;
    fn clear_break(&mut self) -> Result<()>;
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<P: DmxPort + ?Sized> DmxPort for Box<P> {
    fn set_break(&mut self) -> Result<()> {
        (**self).set_break()
    }

    fn clear_break(&mut self) -> Result<()> {
        (**self).clear_break()
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_all(bytes)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Sends frames with the DMX reset sequence in front of each one.
#[derive(Debug)]
pub struct FrameTransmitter<P> {
    port: P,
    break_len: Duration,
    mark_len: Duration,
    frames_sent: u64,
}

impl<P: DmxPort> FrameTransmitter<P> {
    pub fn new(port: P) -> Self {
        Self::with_timing(port, DEFAULT_BREAK, DEFAULT_MARK_AFTER_BREAK)
    }

    pub fn with_timing(port: P, break_len: Duration, mark_len: Duration) -> Self {
        Self {
            port,
            break_len,
            mark_len,
            frames_sent: 0,
        }
    }

    /// Break, mark-after-break, then the full frame. Any transport failure is
    /// reported as [`LightsError::Transport`].
    pub fn send(&mut self, frame: &ControlFrame) -> Result<()> {
        self.port.set_break().map_err(into_transport)?;
        pause(self.break_len);
        self.port.clear_break().map_err(into_transport)?;
        pause(self.mark_len);
        self.port.write_all(frame.as_bytes()).map_err(into_transport)?;
        self.port.flush().map_err(into_transport)?;
        self.frames_sent += 1;
        tracing::trace!(frames = self.frames_sent, "sent DMX frame");
        Ok(())
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn port(&self) -> &P {
        &self.port
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

fn into_transport(err: LightsError) -> LightsError {
    match err {
        LightsError::Transport(_) => err,
        other => LightsError::Transport(other.to_string()),
    }
}
