use std::io::Write;
use std::time::Duration;

use season_lights_core::{DmxPort, LightingConfig, LightsError, Result, SensorConfig};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

/// Read timeout on the sensor link; bounds how long the reader thread takes
/// to notice a stop request.
pub const SENSOR_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// DMX512 line on a USB-serial adapter (250 kbaud 8N2).
pub struct SerialDmx {
    name: String,
    port: Box<dyn SerialPort>,
}

impl SerialDmx {
    pub fn open(config: &LightingConfig) -> Result<Self> {
        let port = serialport::new(config.port.as_str(), config.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::Two)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|err| {
                LightsError::Transport(format!("cannot open DMX port {}: {err}", config.port))
            })?;
        tracing::info!(port = %config.port, baud = config.baud, "DMX port open");
        Ok(Self {
            name: config.port.clone(),
            port,
        })
    }
}

impl DmxPort for SerialDmx {
    fn set_break(&mut self) -> Result<()> {
        self.port
            .set_break()
            .map_err(|err| LightsError::Transport(format!("{}: {err}", self.name)))
    }

    fn clear_break(&mut self) -> Result<()> {
        self.port
            .clear_break()
            .map_err(|err| LightsError::Transport(format!("{}: {err}", self.name)))
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        Ok(self.port.write_all(bytes)?)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.port.flush()?)
    }
}

impl Drop for SerialDmx {
    fn drop(&mut self) {
        tracing::debug!(port = %self.name, "closing DMX port");
    }
}

/// Opens the button/sensor board link.
pub fn open_sensor(path: &str, config: &SensorConfig) -> Result<Box<dyn SerialPort>> {
    let port = serialport::new(path, config.baud)
        .timeout(SENSOR_READ_TIMEOUT)
        .open()
        .map_err(|err| LightsError::Transport(format!("cannot open sensor port {path}: {err}")))?;
    tracing::info!(port = path, baud = config.baud, "sensor port open");
    Ok(port)
}
