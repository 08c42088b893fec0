//! Recording pipeline: input event → timestamp delta → (press: screenshot) → action.
//!
//! The recorder is the only consumer of its event queue, so appends are
//! serialized by construction. Events are stamped where they are observed,
//! which keeps screenshot latency on this thread out of the recorded deltas.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::capture::CaptureProvider;
use super::input_event::{EventKind, EventSink, InputEvent};
use super::session::RecordingSession;
use super::state::{RecorderState, RecorderStateError, SessionState};
use super::storage::ScreenshotStore;
use super::types::{Action, ActionKind, ActionLog, Region, Validation};
use crate::config::RecorderConfig;

/// Upper bound on events handled per `pump` so the caller gets to re-check
/// its stop signal during a burst of pointer moves.
const MAX_BATCH: usize = 256;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error(transparent)]
    State(#[from] RecorderStateError),
}

pub struct EventRecorder<C> {
    state: RecorderState,
    session: RecordingSession,
    capture: C,
    validation_area: (u32, u32),
    sink: EventSink,
    rx: Receiver<InputEvent>,
    started_at: Option<Instant>,
    last_event: Option<Instant>,
}

impl<C: CaptureProvider> EventRecorder<C> {
    pub fn new(capture: C, config: &RecorderConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            state: RecorderState::new(),
            session: RecordingSession::new(ScreenshotStore::new(&config.screenshot_dir)),
            capture,
            validation_area: config.validation_area,
            sink: EventSink::new(tx),
            rx,
            started_at: None,
            last_event: None,
        }
    }

    /// Handle for event sources. Any number of clones may feed the recorder
    /// from any thread; they share one stamping lock.
    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state.current_state()
    }

    pub fn actions(&self) -> &[Action] {
        self.session.actions()
    }

    pub fn start(&mut self) -> Result<(), RecorderError> {
        self.start_at(Instant::now())
    }

    /// Start recording with `at` as the reference for the first delta.
    pub fn start_at(&mut self, at: Instant) -> Result<(), RecorderError> {
        self.state.start()?;
        self.started_at = Some(at);
        self.last_event = Some(at);
        info!(session = self.session.id(), "recording started");
        Ok(())
    }

    /// Wait up to `timeout` for events and handle every one that is queued.
    /// Returns how many actions were appended.
    pub fn pump(&mut self, timeout: Duration) -> usize {
        let first = match self.rx.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return 0,
        };

        let queued: Vec<InputEvent> = self.rx.try_iter().take(MAX_BATCH - 1).collect();
        let mut appended = usize::from(self.handle(first));
        for event in queued {
            appended += usize::from(self.handle(event));
        }
        appended
    }

    /// Append one event. Events seen while not recording, or stamped before
    /// recording started, are dropped and `false` is returned.
    pub fn handle(&mut self, event: InputEvent) -> bool {
        if !self.state.is_recording() {
            return false;
        }
        let Some(started_at) = self.started_at else {
            return false;
        };
        if event.at < started_at {
            return false;
        }

        let last = self.last_event.unwrap_or(started_at);
        let time_delta = event.at.saturating_duration_since(last);
        self.last_event = Some(last.max(event.at));

        let kind = match event.kind {
            EventKind::Move { x, y } => ActionKind::Move { position: (x, y) },
            EventKind::Button {
                x,
                y,
                button,
                pressed: true,
            } => ActionKind::ButtonPress {
                position: (x, y),
                button,
                validation: self.capture_validation(x, y),
            },
            EventKind::Button {
                x,
                y,
                button,
                pressed: false,
            } => ActionKind::ButtonRelease {
                position: (x, y),
                button,
            },
            EventKind::Scroll { x, y, dx, dy } => ActionKind::Scroll {
                position: (x, y),
                delta: (dx, dy),
            },
            EventKind::Key { key, pressed: true } => ActionKind::KeyPress { key },
            EventKind::Key {
                key,
                pressed: false,
            } => ActionKind::KeyRelease { key },
        };

        debug!(
            kind = kind.name(),
            delta_ms = time_delta.as_millis() as u64,
            "recorded action"
        );
        self.session.add_action(Action::new(time_delta, kind));
        true
    }

    /// Screenshot of the validation area anchored at the press. A failure
    /// only costs the gate for this press, never the action itself.
    fn capture_validation(&self, x: i32, y: i32) -> Option<Validation> {
        let requested = Region::anchored_at(x, y, self.validation_area);
        let region = match self.capture.screen_bounds() {
            Some(bounds) => requested.clip_to(&bounds),
            None => Some(requested),
        };
        let Some(region) = region else {
            warn!(region = %requested, "press is off screen, recording it without validation");
            return None;
        };

        let image = match self.capture.capture(region) {
            Ok(image) => image,
            Err(err) => {
                warn!(error = %err, region = %region, "could not capture validation screenshot");
                return None;
            }
        };

        match self.session.store().save(&image) {
            Ok(screenshot) => {
                info!(path = %screenshot.display(), "captured validation screenshot");
                Some(Validation { screenshot, region })
            }
            Err(err) => {
                warn!(error = %err, "could not save validation screenshot");
                None
            }
        }
    }

    /// Stop recording. Events stamped before this call are still appended in
    /// order; later ones are dropped. Stopping twice is a no-op.
    pub fn stop(&mut self) -> Result<(), RecorderError> {
        if self.state.current_state() == SessionState::Stopped {
            return Ok(());
        }

        let stop_at = Instant::now();
        let pending: Vec<InputEvent> = self.rx.try_iter().collect();
        for event in pending.into_iter().filter(|event| event.at <= stop_at) {
            self.handle(event);
        }

        self.state.stop()?;
        info!(
            session = self.session.id(),
            actions = self.session.len(),
            "recording stopped"
        );
        Ok(())
    }

    /// Stop if needed and hand out the frozen log.
    pub fn finish(mut self) -> Result<ActionLog, RecorderError> {
        self.stop()?;
        Ok(self.session.into_log())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::types::{Button, Key};
    use crate::testing::ScriptedCapture;
    use image::{DynamicImage, GrayImage, Luma};
    use tempfile::{tempdir, TempDir};

    fn shot() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 100, Luma([77])))
    }

    fn config(dir: &TempDir) -> RecorderConfig {
        RecorderConfig {
            screenshot_dir: dir.path().join("screenshots"),
            ..RecorderConfig::default()
        }
    }

    fn event(start: Instant, offset_ms: u64, kind: EventKind) -> InputEvent {
        InputEvent::at(start + Duration::from_millis(offset_ms), kind)
    }

    #[test]
    fn events_before_start_are_dropped() {
        let dir = tempdir().unwrap();
        let capture = ScriptedCapture::always(shot());
        let mut recorder = EventRecorder::new(&capture, &config(&dir));

        recorder.sink().on_move(1, 1);
        assert_eq!(recorder.pump(Duration::from_millis(10)), 0);
        assert!(recorder.actions().is_empty());
    }

    #[test]
    fn one_action_per_event_while_recording() {
        let dir = tempdir().unwrap();
        let capture = ScriptedCapture::always(shot());
        let mut recorder = EventRecorder::new(&capture, &config(&dir));
        let start = Instant::now();
        recorder.start_at(start).unwrap();

        let sink = recorder.sink();
        sink.send(event(start, 10, EventKind::Move { x: 5, y: 5 })).unwrap();
        sink.send(event(start, 20, EventKind::Scroll { x: 5, y: 5, dx: 0, dy: 2 }))
            .unwrap();
        sink.send(event(start, 30, EventKind::Key { key: Key(12), pressed: true }))
            .unwrap();
        sink.send(event(start, 45, EventKind::Key { key: Key(12), pressed: false }))
            .unwrap();

        assert_eq!(recorder.pump(Duration::from_millis(10)), 4);
        let names: Vec<&str> = recorder.actions().iter().map(|a| a.kind.name()).collect();
        assert_eq!(names, vec!["move", "scroll", "key_press", "key_release"]);
    }

    #[test]
    fn deltas_sum_to_recording_span() {
        let dir = tempdir().unwrap();
        let capture = ScriptedCapture::always(shot());
        let mut recorder = EventRecorder::new(&capture, &config(&dir));
        let start = Instant::now();
        recorder.start_at(start).unwrap();

        let sink = recorder.sink();
        for offset in [15, 40, 40, 110] {
            sink.send(event(start, offset, EventKind::Move { x: 0, y: 0 }))
                .unwrap();
        }
        recorder.pump(Duration::from_millis(10));

        let deltas: Vec<Duration> = recorder.actions().iter().map(|a| a.time_delta).collect();
        assert_eq!(
            deltas,
            vec![
                Duration::from_millis(15),
                Duration::from_millis(25),
                Duration::ZERO,
                Duration::from_millis(70),
            ]
        );
        let log = recorder.finish().unwrap();
        assert_eq!(log.total_duration(), Duration::from_millis(110));
    }

    #[test]
    fn live_deltas_track_wall_clock() {
        let dir = tempdir().unwrap();
        let capture = ScriptedCapture::always(shot());
        let mut recorder = EventRecorder::new(&capture, &config(&dir));
        let start = Instant::now();
        recorder.start_at(start).unwrap();

        let sink = recorder.sink();
        for i in 0..3 {
            std::thread::sleep(Duration::from_millis(20));
            sink.on_move(i, i);
        }
        let span = start.elapsed();
        recorder.pump(Duration::from_millis(10));

        let total = recorder.finish().unwrap().total_duration();
        assert!(total >= Duration::from_millis(60));
        assert!(total <= span);
    }

    #[test]
    fn press_attaches_screenshot_of_anchored_region() {
        let dir = tempdir().unwrap();
        let capture = ScriptedCapture::always(shot());
        let mut recorder = EventRecorder::new(&capture, &config(&dir));
        recorder.start().unwrap();

        recorder.sink().on_button(300, 400, Button::Left, true);
        recorder.sink().on_button(300, 400, Button::Left, false);
        recorder.pump(Duration::from_millis(50));

        let actions = recorder.actions();
        assert_eq!(actions.len(), 2);
        let validation = actions[0].validation().expect("press has a validation");
        assert_eq!(validation.region, Region::new(300, 400, 200, 100));
        assert!(validation.screenshot.exists());
        assert!(validation.screenshot.starts_with(dir.path().join("screenshots")));
        assert!(actions[1].validation().is_none());
        assert_eq!(capture.calls(), 1);
    }

    #[test]
    fn press_region_is_clipped_to_screen() {
        let dir = tempdir().unwrap();
        let capture =
            ScriptedCapture::always(shot()).with_screen_bounds(Region::new(0, 0, 1280, 800));
        let mut recorder = EventRecorder::new(&capture, &config(&dir));
        recorder.start().unwrap();

        recorder.sink().on_button(1200, 760, Button::Right, true);
        recorder.pump(Duration::from_millis(50));

        let validation = recorder.actions()[0].validation().expect("validation");
        assert_eq!(validation.region, Region::new(1200, 760, 80, 40));
    }

    #[test]
    fn capture_failure_records_press_without_validation() {
        let dir = tempdir().unwrap();
        let capture = ScriptedCapture::failing("permission denied");
        let mut recorder = EventRecorder::new(&capture, &config(&dir));
        recorder.start().unwrap();

        recorder.sink().on_button(10, 10, Button::Left, true);
        recorder.pump(Duration::from_millis(50));

        let actions = recorder.actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind.name(), "button_press");
        assert!(actions[0].validation().is_none());
        assert!(!dir.path().join("screenshots").exists());
    }

    #[test]
    fn stop_keeps_queued_events_and_drops_later_ones() {
        let dir = tempdir().unwrap();
        let capture = ScriptedCapture::always(shot());
        let mut recorder = EventRecorder::new(&capture, &config(&dir));
        let start = Instant::now();
        recorder.start_at(start).unwrap();

        let sink = recorder.sink();
        sink.on_move(1, 1);
        sink.on_move(2, 2);
        sink.send(InputEvent::at(
            Instant::now() + Duration::from_secs(3600),
            EventKind::Move { x: 9, y: 9 },
        ))
        .unwrap();

        recorder.stop().unwrap();
        recorder.stop().unwrap();
        sink.on_move(3, 3);
        assert_eq!(recorder.pump(Duration::from_millis(10)), 0);

        let log = recorder.finish().unwrap();
        let positions: Vec<ActionKind> = log.iter().map(|a| a.kind.clone()).collect();
        assert_eq!(
            positions,
            vec![
                ActionKind::Move { position: (1, 1) },
                ActionKind::Move { position: (2, 2) },
            ]
        );
    }

    #[test]
    fn stop_before_start_is_an_error() {
        let dir = tempdir().unwrap();
        let capture = ScriptedCapture::always(shot());
        let mut recorder = EventRecorder::new(&capture, &config(&dir));
        assert!(recorder.stop().is_err());
    }

    #[test]
    fn concurrent_sources_arrive_in_stamp_order() {
        let dir = tempdir().unwrap();
        let capture = ScriptedCapture::always(shot());
        let mut recorder = EventRecorder::new(&capture, &config(&dir));
        let start = Instant::now();
        recorder.start_at(start).unwrap();

        let pointer = recorder.sink();
        let keyboard = recorder.sink();
        let pointer_thread = std::thread::spawn(move || {
            for i in 0..200 {
                pointer.on_move(i, i);
            }
        });
        let keyboard_thread = std::thread::spawn(move || {
            for i in 0..100 {
                keyboard.on_key(Key(i), i % 2 == 0);
            }
        });
        pointer_thread.join().unwrap();
        keyboard_thread.join().unwrap();

        let queued: Vec<InputEvent> = recorder.rx.try_iter().collect();
        assert!(queued.windows(2).all(|w| w[0].at <= w[1].at));
        for event in queued {
            assert!(recorder.handle(event));
        }

        let log = recorder.finish().unwrap();
        assert_eq!(log.len(), 300);
        let span: Duration = log.iter().map(|a| a.time_delta).sum();
        assert!(span <= start.elapsed());
        let moves: Vec<i32> = log
            .iter()
            .filter_map(|a| match a.kind {
                ActionKind::Move { position: (x, _) } => Some(x),
                _ => None,
            })
            .collect();
        assert_eq!(moves, (0..200).collect::<Vec<_>>());
    }
}
