use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use season_lights_core::{InputEvent, LightsError, Result, SensorLineDecoder};

/// Background thread that turns sensor-board lines into events.
///
/// The thread owns the port; joining it closes the port.
pub struct SensorReader {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SensorReader {
    pub fn spawn<R>(port: R, warmup: Duration, events: Sender<InputEvent>) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("sensor-reader".into())
            .spawn(move || read_lines(port, warmup, &events, &thread_stop))
            .map_err(|err| LightsError::msg(format!("failed to spawn sensor reader: {err}")))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stops the thread and waits for it, which closes the port.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("sensor reader thread panicked");
            }
            tracing::debug!("sensor port closed");
        }
    }
}

impl Drop for SensorReader {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn read_lines<R: Read>(port: R, warmup: Duration, events: &Sender<InputEvent>, stop: &AtomicBool) {
    let mut decoder = SensorLineDecoder::new(Instant::now(), warmup);
    let mut reader = BufReader::new(port);
    let mut line = Vec::new();

    while !stop.load(Ordering::Acquire) {
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => {
                tracing::warn!("sensor link closed by the device");
                break;
            }
            Ok(_) => {
                if line.last() != Some(&b'\n') {
                    continue;
                }
                if let Some(event) = decoder.decode(&line, Instant::now()) {
                    tracing::info!(?event, "sensor board event");
                    if events.send(event).is_err() {
                        break;
                    }
                }
                line.clear();
            }
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {}
            Err(err) => {
                tracing::warn!(error = %err, "sensor link read failed, ignoring the board");
                break;
            }
        }
    }
    tracing::debug!(discarded = decoder.discarded(), "sensor reader finished");
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn forwards_parsed_lines() {
        let input = b"Sensor 2 Bright\r\nnoise\nButton Pressed\n".to_vec();
        let (tx, rx) = mpsc::channel();
        let reader = SensorReader::spawn(Cursor::new(input), Duration::ZERO, tx).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first, InputEvent::SensorActivated(2));
        assert_eq!(second, InputEvent::ButtonPressed);
        reader.shutdown();
    }

    #[test]
    fn drops_lines_during_warmup() {
        let input = b"Button Pressed\n".to_vec();
        let (tx, rx) = mpsc::channel();
        let reader = SensorReader::spawn(Cursor::new(input), Duration::from_secs(60), tx).unwrap();

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        reader.shutdown();
    }
}
