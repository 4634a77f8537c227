use std::time::Instant;

use crate::audio::LoopPlayer;
use crate::dmx::{ControlFrame, DmxPort, FrameTransmitter};
use crate::input::EventSource;
use crate::render::ColorSynthesizer;
use crate::state::{Handled, SceneStateMachine};
use crate::timeline::TickScheduler;
use crate::{LightsError, Result};

/// Why the control loop returned without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Quit,
}

/// Fixed-period driver: input, state, color, frame, in that order.
#[derive(Debug)]
pub struct ControlLoop<S, P, D> {
    source: S,
    machine: SceneStateMachine<P>,
    synth: ColorSynthesizer,
    transmitter: FrameTransmitter<D>,
    scheduler: TickScheduler,
    ticks: u64,
}

impl<S, P, D> ControlLoop<S, P, D>
where
    S: EventSource,
    P: LoopPlayer,
    D: DmxPort,
{
    pub fn new(
        source: S,
        machine: SceneStateMachine<P>,
        synth: ColorSynthesizer,
        transmitter: FrameTransmitter<D>,
        scheduler: TickScheduler,
    ) -> Self {
        Self {
            source,
            machine,
            synth,
            transmitter,
            scheduler,
            ticks: 0,
        }
    }

    pub fn machine(&self) -> &SceneStateMachine<P> {
        &self.machine
    }

    pub fn transmitter(&self) -> &FrameTransmitter<D> {
        &self.transmitter
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Runs until a quit request or a fatal error. The audio loop is stopped
    /// on every way out; the serial ports close when `self` is dropped.
    pub fn run(&mut self) -> Result<StopReason> {
        tracing::info!(
            period_ms = self.scheduler.period().as_millis() as u64,
            scenes = self.machine.catalog().len(),
            "control loop running"
        );
        let result = self.run_until_stopped();
        self.machine.shutdown();
        match &result {
            Ok(reason) => tracing::info!(?reason, ticks = self.ticks, "control loop stopped"),
            Err(err) => tracing::error!(error = %err, ticks = self.ticks, "control loop failed"),
        }
        result
    }

    fn run_until_stopped(&mut self) -> Result<StopReason> {
        loop {
            if let Some(reason) = self.step(Instant::now())? {
                return Ok(reason);
            }
            self.scheduler.wait();
        }
    }

    /// One tick. Scene switches requested by this tick's events are applied
    /// before the frame is rendered.
    pub fn step(&mut self, now: Instant) -> Result<Option<StopReason>> {
        self.ticks += 1;
        let events = self.source.poll(now).or_else(|err| absorb(err, Vec::new()))?;
        for event in events {
            let handled = self.machine.handle(event, now).map(Some);
            if handled.or_else(|err| absorb(err, None))? == Some(Handled::Quit) {
                tracing::info!("quit requested");
                return Ok(Some(StopReason::Quit));
            }
        }

        if let Some(rendered) = self.machine.render(&self.synth) {
            let frame = ControlFrame::encode(&rendered);
            self.transmitter.send(&frame)?;
        }

        self.machine.tick(self.scheduler.period_secs());
        Ok(None)
    }
}

/// Logs a recoverable error and carries on with `fallback`; fatal errors pass
/// through and end the loop.
fn absorb<T>(err: LightsError, fallback: T) -> Result<T> {
    if err.is_fatal() {
        return Err(err);
    }
    tracing::warn!(error = %err, "ignoring recoverable input error");
    Ok(fallback)
}
