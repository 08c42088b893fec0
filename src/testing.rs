//! Deterministic stand-ins for the platform seams.
//!
//! A [`VirtualClock`] advances only when something sleeps on it, a
//! [`ScriptedCapture`] plays back a fixed list of frames, and a
//! [`RecordingSimulator`] remembers every dispatched operation. All three can
//! share a [`Journal`] so a test can assert how sleeps, captures and
//! dispatches interleaved.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use image::DynamicImage;

use crate::clock::Clock;
use crate::input::{InputError, InputSimulator};
use crate::recorder::capture::{CaptureError, CaptureProvider};
use crate::recorder::types::{Button, Key, Region};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One operation posted to an [`InputSimulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    MoveTo(i32, i32),
    Press(Button),
    Release(Button),
    Scroll(i32, i32),
    KeyDown(Key),
    KeyUp(Key),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    Sleep(Duration),
    Capture(Region),
    Dispatch(Dispatched),
}

/// Shared, append-only record of what the doubles observed.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<JournalEntry>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, entry: JournalEntry) {
        lock(&self.0).push(entry);
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        lock(&self.0).clone()
    }
}

/// Clock whose time moves only when [`Clock::sleep`] is called.
#[derive(Debug)]
pub struct VirtualClock {
    base: Instant,
    offset: Mutex<Duration>,
    journal: Option<Journal>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Virtual time slept so far.
    pub fn elapsed(&self) -> Duration {
        *lock(&self.offset)
    }

    pub fn advance(&self, duration: Duration) {
        *lock(&self.offset) += duration;
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        if let Some(journal) = &self.journal {
            journal.push(JournalEntry::Sleep(duration));
        }
    }
}

#[derive(Debug, Clone)]
pub enum Frame {
    Image(DynamicImage),
    Error(String),
}

/// Capture provider that returns `frames` in order and then keeps repeating
/// the last one.
#[derive(Debug)]
pub struct ScriptedCapture {
    frames: Vec<Frame>,
    calls: AtomicUsize,
    bounds: Option<Region>,
    journal: Option<Journal>,
}

impl ScriptedCapture {
    pub fn new(frames: Vec<Frame>) -> Self {
        assert!(!frames.is_empty(), "a script needs at least one frame");
        Self {
            frames,
            calls: AtomicUsize::new(0),
            bounds: None,
            journal: None,
        }
    }

    pub fn always(image: DynamicImage) -> Self {
        Self::new(vec![Frame::Image(image)])
    }

    pub fn failing(reason: &str) -> Self {
        Self::new(vec![Frame::Error(reason.to_string())])
    }

    /// `first` for the first `polls` captures, `then` forever after.
    pub fn switching(first: DynamicImage, polls: usize, then: DynamicImage) -> Self {
        let mut frames = vec![Frame::Image(first); polls];
        frames.push(Frame::Image(then));
        Self::new(frames)
    }

    pub fn with_screen_bounds(mut self, bounds: Region) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CaptureProvider for ScriptedCapture {
    fn capture(&self, region: Region) -> Result<DynamicImage, CaptureError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(journal) = &self.journal {
            journal.push(JournalEntry::Capture(region));
        }
        let frame = &self.frames[call.min(self.frames.len() - 1)];
        match frame {
            Frame::Image(image) => Ok(image.clone()),
            Frame::Error(reason) => Err(CaptureError::Backend(reason.clone())),
        }
    }

    fn screen_bounds(&self) -> Option<Region> {
        self.bounds
    }
}

/// Input simulator that records instead of posting. Can be told to fail on
/// the n-th operation (0-based).
#[derive(Debug, Default)]
pub struct RecordingSimulator {
    dispatched: Mutex<Vec<Dispatched>>,
    fail_at: Option<usize>,
    journal: Option<Journal>,
}

impl RecordingSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(index: usize) -> Self {
        Self {
            fail_at: Some(index),
            ..Self::default()
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn dispatched(&self) -> Vec<Dispatched> {
        lock(&self.dispatched).clone()
    }

    fn record(&self, operation: &'static str, op: Dispatched) -> Result<(), InputError> {
        let mut dispatched = lock(&self.dispatched);
        if self.fail_at == Some(dispatched.len()) {
            return Err(InputError::InjectionFailed {
                operation,
                reason: "scripted failure".to_string(),
            });
        }
        dispatched.push(op);
        if let Some(journal) = &self.journal {
            journal.push(JournalEntry::Dispatch(op));
        }
        Ok(())
    }
}

impl InputSimulator for RecordingSimulator {
    fn move_to(&self, x: i32, y: i32) -> Result<(), InputError> {
        self.record("move", Dispatched::MoveTo(x, y))
    }

    fn press(&self, button: Button) -> Result<(), InputError> {
        self.record("button press", Dispatched::Press(button))
    }

    fn release(&self, button: Button) -> Result<(), InputError> {
        self.record("button release", Dispatched::Release(button))
    }

    fn scroll(&self, dx: i32, dy: i32) -> Result<(), InputError> {
        self.record("scroll", Dispatched::Scroll(dx, dy))
    }

    fn key_down(&self, key: Key) -> Result<(), InputError> {
        self.record("key down", Dispatched::KeyDown(key))
    }

    fn key_up(&self, key: Key) -> Result<(), InputError> {
        self.record("key up", Dispatched::KeyUp(key))
    }
}
