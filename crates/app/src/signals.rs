use season_lights_core::{LightsError, QuitFlag, Result};

/// Installs a handler for SIGINT, SIGTERM and SIGHUP (console close events
/// on Windows) that raises the returned flag.
///
/// The control loop polls the flag like any other input, so a `kill` or a
/// service stop goes through the same shutdown path as the quit key.
pub fn install_quit_handler() -> Result<QuitFlag> {
    let flag = QuitFlag::new();
    let handler_flag = flag.clone();
    ctrlc::set_handler(move || {
        if !handler_flag.is_raised() {
            tracing::info!("termination signal received, shutting down");
        }
        handler_flag.raise();
    })
    .map_err(|err| LightsError::msg(format!("failed to install signal handler: {err}")))?;
    Ok(flag)
}
