//! CoreGraphics backend.
//!
//! The listener is a passive `CGEventTap` running its own CFRunLoop thread;
//! it stamps and forwards every event it sees and never modifies them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use core_foundation::runloop::{
    kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop, CFRunLoopRunResult,
};
use core_graphics::display::CGDisplay;
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType,
    CGMouseButton, EventField, ScrollEventUnit,
};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::{CGPoint, CGRect, CGSize};
use core_graphics::window::{
    create_image, kCGNullWindowID, kCGWindowImageNominalResolution,
    kCGWindowListOptionOnScreenOnly,
};
use image::DynamicImage;
use tracing::{debug, warn};

use super::{bgra_to_rgba, PlatformError};
use crate::input::{InputError, InputSimulator, InputSource};
use crate::recorder::capture::{CaptureError, CaptureProvider};
use crate::recorder::input_event::EventSink;
use crate::recorder::types::{Button, Key, Region};

const SETUP_TIMEOUT: Duration = Duration::from_secs(5);
const RUN_LOOP_SLICE: Duration = Duration::from_millis(100);

pub struct EventTapSource {
    running: Arc<AtomicBool>,
    run_loop: Arc<Mutex<Option<CFRunLoop>>>,
    handle: Option<JoinHandle<()>>,
}

impl EventTapSource {
    pub fn new() -> Result<Self, PlatformError> {
        Ok(Self {
            running: Arc::new(AtomicBool::new(false)),
            run_loop: Arc::new(Mutex::new(None)),
            handle: None,
        })
    }

    fn run_event_loop(
        running: Arc<AtomicBool>,
        sink: EventSink,
        setup_tx: Sender<Result<(), String>>,
        run_loop_holder: Arc<Mutex<Option<CFRunLoop>>>,
    ) {
        let events_of_interest = vec![
            CGEventType::MouseMoved,
            CGEventType::LeftMouseDragged,
            CGEventType::RightMouseDragged,
            CGEventType::OtherMouseDragged,
            CGEventType::LeftMouseDown,
            CGEventType::LeftMouseUp,
            CGEventType::RightMouseDown,
            CGEventType::RightMouseUp,
            CGEventType::OtherMouseDown,
            CGEventType::OtherMouseUp,
            CGEventType::ScrollWheel,
            CGEventType::KeyDown,
            CGEventType::KeyUp,
        ];

        let tap_result = CGEventTap::new(
            CGEventTapLocation::HID,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::ListenOnly,
            events_of_interest,
            move |_proxy, event_type, event| {
                forward(&sink, event_type, event);
                None
            },
        );

        let tap = match tap_result {
            Ok(tap) => tap,
            Err(()) => {
                let _ = setup_tx.send(Err(
                    "failed to create event tap, check accessibility permissions".to_string(),
                ));
                return;
            }
        };

        let loop_source = match tap.mach_port.create_runloop_source(0) {
            Ok(source) => source,
            Err(()) => {
                let _ = setup_tx.send(Err("failed to create run loop source".to_string()));
                return;
            }
        };

        let current_run_loop = CFRunLoop::get_current();
        if let Ok(mut holder) = run_loop_holder.lock() {
            *holder = Some(current_run_loop.clone());
        }

        unsafe {
            current_run_loop.add_source(&loop_source, kCFRunLoopCommonModes);
        }
        tap.enable();
        let _ = setup_tx.send(Ok(()));

        // Sources are added to the common modes pseudo-mode but the loop has
        // to run in the default mode.
        while running.load(Ordering::SeqCst) {
            let result =
                unsafe { CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, RUN_LOOP_SLICE, true) };
            if result == CFRunLoopRunResult::Stopped {
                break;
            }
        }

        unsafe {
            current_run_loop.remove_source(&loop_source, kCFRunLoopCommonModes);
        }
    }
}

fn forward(sink: &EventSink, event_type: CGEventType, event: &CGEvent) {
    let location = event.location();
    let (x, y) = (location.x as i32, location.y as i32);

    match event_type {
        CGEventType::MouseMoved
        | CGEventType::LeftMouseDragged
        | CGEventType::RightMouseDragged
        | CGEventType::OtherMouseDragged => sink.on_move(x, y),
        CGEventType::LeftMouseDown => sink.on_button(x, y, Button::Left, true),
        CGEventType::LeftMouseUp => sink.on_button(x, y, Button::Left, false),
        CGEventType::RightMouseDown => sink.on_button(x, y, Button::Right, true),
        CGEventType::RightMouseUp => sink.on_button(x, y, Button::Right, false),
        CGEventType::OtherMouseDown => sink.on_button(x, y, other_button(event), true),
        CGEventType::OtherMouseUp => sink.on_button(x, y, other_button(event), false),
        CGEventType::ScrollWheel => {
            let dy = event.get_integer_value_field(EventField::SCROLL_WHEEL_EVENT_DELTA_AXIS_1);
            let dx = event.get_integer_value_field(EventField::SCROLL_WHEEL_EVENT_DELTA_AXIS_2);
            sink.on_scroll(x, y, dx as i32, dy as i32);
        }
        CGEventType::KeyDown | CGEventType::KeyUp => {
            let code = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
            sink.on_key(Key(code as u32), matches!(event_type, CGEventType::KeyDown));
        }
        _ => {}
    }
}

fn other_button(event: &CGEvent) -> Button {
    match event.get_integer_value_field(EventField::MOUSE_EVENT_BUTTON_NUMBER) {
        2 => Button::Middle,
        n => Button::Other(n.clamp(0, u8::MAX as i64) as u8),
    }
}

impl InputSource for EventTapSource {
    fn start(&mut self, sink: EventSink) -> Result<(), InputError> {
        if self.handle.is_some() {
            return Ok(());
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let run_loop = Arc::clone(&self.run_loop);
        let (setup_tx, setup_rx) = mpsc::channel::<Result<(), String>>();

        let handle = thread::spawn(move || {
            Self::run_event_loop(running, sink, setup_tx, run_loop);
        });

        match setup_rx.recv_timeout(SETUP_TIMEOUT) {
            Ok(Ok(())) => {
                self.handle = Some(handle);
                debug!("event tap installed");
                Ok(())
            }
            Ok(Err(reason)) => {
                self.running.store(false, Ordering::SeqCst);
                Err(InputError::ListenerFailed(reason))
            }
            Err(_) => {
                self.stop();
                Err(InputError::ListenerFailed(
                    "timeout waiting for event tap setup".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Ok(holder) = self.run_loop.lock() {
            if let Some(run_loop) = holder.as_ref() {
                run_loop.stop();
            }
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("event tap thread panicked");
            }
        }
    }
}

impl Drop for EventTapSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Captures in logical points so a reference taken on one run compares
/// pixel for pixel with a capture taken on the next.
pub struct CoreGraphicsCapture;

impl CoreGraphicsCapture {
    pub fn new() -> Result<Self, PlatformError> {
        Ok(Self)
    }
}

impl CaptureProvider for CoreGraphicsCapture {
    fn capture(&self, region: Region) -> Result<DynamicImage, CaptureError> {
        if region.is_empty() {
            return Err(CaptureError::InvalidRegion(region));
        }

        let rect = CGRect::new(
            &CGPoint::new(region.x as f64, region.y as f64),
            &CGSize::new(region.width as f64, region.height as f64),
        );
        let image = create_image(
            rect,
            kCGWindowListOptionOnScreenOnly,
            kCGNullWindowID,
            kCGWindowImageNominalResolution,
        )
        .ok_or_else(|| {
            CaptureError::Backend("CGWindowListCreateImage returned null".to_string())
        })?;

        let data = image.data();
        let rgba = bgra_to_rgba(
            data.bytes(),
            image.width(),
            image.height(),
            image.bytes_per_row(),
            image.bits_per_pixel() / 8,
        )?;
        Ok(DynamicImage::ImageRgba8(rgba))
    }

    fn screen_bounds(&self) -> Option<Region> {
        let bounds = CGDisplay::main().bounds();
        let region = Region::new(
            bounds.origin.x as i32,
            bounds.origin.y as i32,
            bounds.size.width as u32,
            bounds.size.height as u32,
        );
        (!region.is_empty()).then_some(region)
    }
}

/// Posts events at the HID level, as if they came from real hardware.
pub struct CoreGraphicsSimulator {
    held: Mutex<Option<Button>>,
}

impl CoreGraphicsSimulator {
    pub fn new() -> Result<Self, PlatformError> {
        Ok(Self {
            held: Mutex::new(None),
        })
    }

    fn source(operation: &'static str) -> Result<CGEventSource, InputError> {
        CGEventSource::new(CGEventSourceStateID::HIDSystemState).map_err(|()| {
            InputError::InjectionFailed {
                operation,
                reason: "could not create event source".to_string(),
            }
        })
    }

    fn cursor(operation: &'static str) -> Result<CGPoint, InputError> {
        let event = CGEvent::new(Self::source(operation)?).map_err(|()| {
            InputError::InjectionFailed {
                operation,
                reason: "could not read cursor position".to_string(),
            }
        })?;
        Ok(event.location())
    }

    fn post(operation: &'static str, event: Result<CGEvent, ()>) -> Result<(), InputError> {
        let event = event.map_err(|()| InputError::InjectionFailed {
            operation,
            reason: "could not create event".to_string(),
        })?;
        event.post(CGEventTapLocation::HID);
        Ok(())
    }

    fn button(&self, button: Button, pressed: bool) -> Result<(), InputError> {
        let operation = if pressed { "button press" } else { "button release" };
        let (event_type, cg_button) = match (button, pressed) {
            (Button::Left, true) => (CGEventType::LeftMouseDown, CGMouseButton::Left),
            (Button::Left, false) => (CGEventType::LeftMouseUp, CGMouseButton::Left),
            (Button::Right, true) => (CGEventType::RightMouseDown, CGMouseButton::Right),
            (Button::Right, false) => (CGEventType::RightMouseUp, CGMouseButton::Right),
            (Button::Middle | Button::Other(_), true) => {
                (CGEventType::OtherMouseDown, CGMouseButton::Center)
            }
            (Button::Middle | Button::Other(_), false) => {
                (CGEventType::OtherMouseUp, CGMouseButton::Center)
            }
        };

        let position = Self::cursor(operation)?;
        let event =
            CGEvent::new_mouse_event(Self::source(operation)?, event_type, position, cg_button);
        if let (Ok(event), Button::Other(number)) = (&event, button) {
            event.set_integer_value_field(EventField::MOUSE_EVENT_BUTTON_NUMBER, number as i64);
        }
        Self::post(operation, event)?;

        if let Ok(mut held) = self.held.lock() {
            *held = pressed.then_some(button);
        }
        Ok(())
    }

    fn key(&self, key: Key, pressed: bool) -> Result<(), InputError> {
        let operation = if pressed { "key down" } else { "key up" };
        let code = u16::try_from(key.0).map_err(|_| InputError::InjectionFailed {
            operation,
            reason: format!("key code {} out of range", key.0),
        })?;
        Self::post(
            operation,
            CGEvent::new_keyboard_event(Self::source(operation)?, code, pressed),
        )
    }
}

impl InputSimulator for CoreGraphicsSimulator {
    fn move_to(&self, x: i32, y: i32) -> Result<(), InputError> {
        let held = self.held.lock().map(|held| *held).unwrap_or(None);
        let (event_type, cg_button) = match held {
            Some(Button::Left) => (CGEventType::LeftMouseDragged, CGMouseButton::Left),
            Some(Button::Right) => (CGEventType::RightMouseDragged, CGMouseButton::Right),
            Some(_) => (CGEventType::OtherMouseDragged, CGMouseButton::Center),
            None => (CGEventType::MouseMoved, CGMouseButton::Left),
        };
        Self::post(
            "move",
            CGEvent::new_mouse_event(
                Self::source("move")?,
                event_type,
                CGPoint::new(x as f64, y as f64),
                cg_button,
            ),
        )
    }

    fn press(&self, button: Button) -> Result<(), InputError> {
        self.button(button, true)
    }

    fn release(&self, button: Button) -> Result<(), InputError> {
        self.button(button, false)
    }

    fn scroll(&self, dx: i32, dy: i32) -> Result<(), InputError> {
        let source = Self::source("scroll")?;
        Self::post(
            "scroll",
            CGEvent::new_scroll_event(source, ScrollEventUnit::LINE, 2, dy, dx, 0),
        )
    }

    fn key_down(&self, key: Key) -> Result<(), InputError> {
        self.key(key, true)
    }

    fn key_up(&self, key: Key) -> Result<(), InputError> {
        self.key(key, false)
    }
}
