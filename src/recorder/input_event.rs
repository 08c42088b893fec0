//! Typed input notifications and the sender side of the recorder queue.
//!
//! Platform listeners run on their own threads and hold an [`EventSink`].
//! Each handler stamps the event with the monotonic clock when it is
//! observed and pushes it onto a FIFO channel that the recorder drains as its
//! only consumer. Stamping and enqueueing happen under one lock shared by all
//! clones of a sink, so queue order is stamp order.

use std::sync::mpsc::{SendError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use super::types::{Button, Key};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Move {
        x: i32,
        y: i32,
    },
    Button {
        x: i32,
        y: i32,
        button: Button,
        pressed: bool,
    },
    Scroll {
        x: i32,
        y: i32,
        dx: i32,
        dy: i32,
    },
    Key {
        key: Key,
        pressed: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub at: Instant,
    pub kind: EventKind,
}

impl InputEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            at: Instant::now(),
            kind,
        }
    }

    pub fn at(at: Instant, kind: EventKind) -> Self {
        Self { at, kind }
    }
}

/// Cloneable handle that event sources use to feed the recorder.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Arc<Mutex<Sender<InputEvent>>>,
}

impl EventSink {
    pub(crate) fn new(tx: Sender<InputEvent>) -> Self {
        Self {
            tx: Arc::new(Mutex::new(tx)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Sender<InputEvent>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push an already stamped event. The caller is responsible for stamps
    /// not going backwards. Fails once the recorder is gone.
    pub fn send(&self, event: InputEvent) -> Result<(), SendError<InputEvent>> {
        self.lock().send(event)
    }

    pub fn on_move(&self, x: i32, y: i32) {
        self.emit(EventKind::Move { x, y });
    }

    pub fn on_button(&self, x: i32, y: i32, button: Button, pressed: bool) {
        self.emit(EventKind::Button {
            x,
            y,
            button,
            pressed,
        });
    }

    pub fn on_scroll(&self, x: i32, y: i32, dx: i32, dy: i32) {
        self.emit(EventKind::Scroll { x, y, dx, dy });
    }

    pub fn on_key(&self, key: Key, pressed: bool) {
        self.emit(EventKind::Key { key, pressed });
    }

    fn emit(&self, kind: EventKind) {
        let tx = self.lock();
        // Receiver dropped means recording is over; late events are discarded.
        let _ = tx.send(InputEvent::new(kind));
    }
}
