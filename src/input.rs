//! Seams to the operating system's input layer: a source that reports what
//! the operator does, and a simulator that replays it.

use thiserror::Error;

use crate::recorder::input_event::EventSink;
use crate::recorder::types::{Button, Key};

#[derive(Debug, Error)]
pub enum InputError {
    #[error("input listener failed to start: {0}")]
    ListenerFailed(String),
    #[error("failed to post {operation}: {reason}")]
    InjectionFailed {
        operation: &'static str,
        reason: String,
    },
}

/// Delivers input notifications asynchronously into an [`EventSink`].
pub trait InputSource {
    fn start(&mut self, sink: EventSink) -> Result<(), InputError>;

    /// Stop delivering events. Calling it twice is harmless.
    fn stop(&mut self);
}

/// Posts synthetic input, addressed by the identifiers the source reported.
pub trait InputSimulator {
    fn move_to(&self, x: i32, y: i32) -> Result<(), InputError>;
    fn press(&self, button: Button) -> Result<(), InputError>;
    fn release(&self, button: Button) -> Result<(), InputError>;
    fn scroll(&self, dx: i32, dy: i32) -> Result<(), InputError>;
    fn key_down(&self, key: Key) -> Result<(), InputError>;
    fn key_up(&self, key: Key) -> Result<(), InputError>;
}

impl<T: InputSimulator + ?Sized> InputSimulator for &T {
    fn move_to(&self, x: i32, y: i32) -> Result<(), InputError> {
        (**self).move_to(x, y)
    }

    fn press(&self, button: Button) -> Result<(), InputError> {
        (**self).press(button)
    }

    fn release(&self, button: Button) -> Result<(), InputError> {
        (**self).release(button)
    }

    fn scroll(&self, dx: i32, dy: i32) -> Result<(), InputError> {
        (**self).scroll(dx, dy)
    }

    fn key_down(&self, key: Key) -> Result<(), InputError> {
        (**self).key_down(key)
    }

    fn key_up(&self, key: Key) -> Result<(), InputError> {
        (**self).key_up(key)
    }
}

impl<T: InputSimulator + ?Sized> InputSimulator for Box<T> {
    fn move_to(&self, x: i32, y: i32) -> Result<(), InputError> {
        (**self).move_to(x, y)
    }

    fn press(&self, button: Button) -> Result<(), InputError> {
        (**self).press(button)
    }

    fn release(&self, button: Button) -> Result<(), InputError> {
        (**self).release(button)
    }

    fn scroll(&self, dx: i32, dy: i32) -> Result<(), InputError> {
        (**self).scroll(dx, dy)
    }

    fn key_down(&self, key: Key) -> Result<(), InputError> {
        (**self).key_down(key)
    }

    fn key_up(&self, key: Key) -> Result<(), InputError> {
        (**self).key_up(key)
    }
}
