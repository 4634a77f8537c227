use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};

use clap::{Parser, Subcommand};
use season_lights_core::{
    AppConfig, AudioLoopManager, ChannelSource, ColorSynthesizer, ControlLoop, FrameTransmitter,
    LoopPlayer, MergedSource, SceneStateMachine, SilentPlayer, TickScheduler,
};
use tracing_subscriber::EnvFilter;

mod keyboard;
mod logging;
mod playback;
mod sensor;
mod serial;
mod signals;

use keyboard::KeyboardSource;
use playback::CpalOutput;
use sensor::SensorReader;
use serial::SerialDmx;

fn main() -> season_lights_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            dmx_port,
            sensor_port,
            no_audio,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(port) = dmx_port {
                config.lighting.port = port;
            }
            if sensor_port.is_some() {
                config.sensor.port = sensor_port;
            }
            run_installation(&config, !no_audio)
        }
        Commands::InitConfig { output } => write_default_config(&output),
    }
}

fn load_config(path: Option<&Path>) -> season_lights_core::Result<AppConfig> {
    match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading configuration");
            AppConfig::load(path)
        }
        None => Ok(AppConfig::default()),
    }
}

fn run_installation(config: &AppConfig, audio: bool) -> season_lights_core::Result<()> {
    config.validate()?;
    let catalog = config.catalog()?;
    tracing::info!(
        scenes = catalog.len(),
        dmx_port = %config.lighting.port,
        sensor_port = ?config.sensor.port,
        audio,
        "starting installation"
    );

    let quit = signals::install_quit_handler()?;
    let dmx = SerialDmx::open(&config.lighting)?;

    let mut source = MergedSource::new();
    source.push(quit);
    source.push(KeyboardSource::new(catalog.len())?);

    let sensor = match &config.sensor.port {
        Some(path) => {
            let port = serial::open_sensor(path, &config.sensor)?;
            // The board resets when the port opens.
            std::thread::sleep(config.sensor.settle());
            let (tx, rx) = mpsc::channel();
            source.push(ChannelSource::new(rx));
            Some(SensorReader::spawn(port, config.sensor.warmup(), tx)?)
        }
        None => {
            tracing::info!("no sensor port configured, keyboard input only");
            None
        }
    };

    let player: Box<dyn LoopPlayer> = if audio {
        Box::new(
            AudioLoopManager::new(Arc::new(CpalOutput))
                .with_stop_timeout(config.timing.audio_stop_timeout())
                .with_fade_in(config.timing.fade_in()),
        )
    } else {
        Box::new(SilentPlayer)
    };
    let machine = SceneStateMachine::new(catalog, &config.timing, player)
        .with_button_action(config.button_action);

    let mut control = ControlLoop::new(
        source,
        machine,
        ColorSynthesizer::new(&config.timing),
        FrameTransmitter::new(dmx),
        TickScheduler::new(config.timing.tick()),
    );
    tracing::info!("waiting for a key, the button or a light sensor");
    let result = control.run();

    // Restores the terminal and closes the DMX port.
    drop(control);
    if let Some(sensor) = sensor {
        sensor.shutdown();
    }

    let reason = result?;
    tracing::info!(?reason, "installation stopped");
    Ok(())
}

fn write_default_config(output: &PathBuf) -> season_lights_core::Result<()> {
    tracing::info!(?output, "writing default configuration");
    let json = AppConfig::default().to_json_pretty()?;
    std::fs::write(output, json)?;
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(logging::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Scene controller for the Season Lights installation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the lights, audio and sensors until Esc is pressed.
    Run {
        /// JSON configuration file; defaults are used when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Serial device of the DMX adapter.
        #[arg(long)]
        dmx_port: Option<String>,
        /// Serial device of the button/sensor board.
        #[arg(long)]
        sensor_port: Option<String>,
        /// Run the scenes without audio.
        #[arg(long)]
        no_audio: bool,
    },
    /// Write the default configuration as JSON.
    InitConfig {
        /// Where to write the configuration file.
        output: PathBuf,
    },
}
