//! Ties an input source to a recorder and runs until asked to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::input::{InputError, InputSource};
use crate::recorder::capture::CaptureProvider;
use crate::recorder::types::ActionLog;
use crate::recorder::{EventRecorder, RecorderError};

pub trait StopSignal {
    fn stop_requested(&self) -> bool;
}

impl StopSignal for AtomicBool {
    fn stop_requested(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

impl<T: StopSignal + ?Sized> StopSignal for Arc<T> {
    fn stop_requested(&self) -> bool {
        (**self).stop_requested()
    }
}

impl<T: StopSignal + ?Sized> StopSignal for &T {
    fn stop_requested(&self) -> bool {
        (**self).stop_requested()
    }
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Recorder(#[from] RecorderError),
}

/// Drain `recorder` until `stop` fires, waking at least every `poll_interval`.
/// The recorder is stopped before returning.
pub fn record_until_stopped<C, S>(
    recorder: &mut EventRecorder<C>,
    stop: &S,
    poll_interval: Duration,
) -> Result<(), RecorderError>
where
    C: CaptureProvider,
    S: StopSignal + ?Sized,
{
    while !stop.stop_requested() {
        recorder.pump(poll_interval);
    }
    recorder.stop()
}

/// Full recording session: start the recorder, attach `source`, record until
/// `stop` fires, then detach the source and return the frozen log.
pub fn record_session<C, S>(
    source: &mut dyn InputSource,
    mut recorder: EventRecorder<C>,
    stop: &S,
    poll_interval: Duration,
) -> Result<ActionLog, RecordError>
where
    C: CaptureProvider,
    S: StopSignal + ?Sized,
{
    recorder.start()?;
    source.start(recorder.sink())?;
    info!("recording, press Ctrl-C to stop");

    let result = record_until_stopped(&mut recorder, stop, poll_interval);
    source.stop();
    result?;

    let log = recorder.finish()?;
    info!(
        actions = log.len(),
        gates = log.validated_count(),
        "recording finished"
    );
    Ok(log)
}
