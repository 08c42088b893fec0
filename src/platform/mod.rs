//! Operating system backend: global input listening, synthetic input and
//! screen capture. Only macOS (CoreGraphics) is implemented; elsewhere every
//! constructor returns [`PlatformError::Unsupported`].

use image::RgbaImage;
use thiserror::Error;

use crate::recorder::capture::CaptureError;

#[cfg(target_os = "macos")]
mod macos;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("{0} is only available on macOS")]
    Unsupported(&'static str),
}

/// Repack a BGRA screen buffer with row padding into a tight RGBA image.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub(crate) fn bgra_to_rgba(
    bytes: &[u8],
    width: usize,
    height: usize,
    bytes_per_row: usize,
    bytes_per_pixel: usize,
) -> Result<RgbaImage, CaptureError> {
    if width == 0 || height == 0 {
        return Err(CaptureError::Backend("empty screen image".to_string()));
    }
    if bytes_per_pixel < 4 {
        return Err(CaptureError::Backend("unsupported pixel format".to_string()));
    }
    if bytes_per_row < width * bytes_per_pixel
        || bytes.len() < bytes_per_row.saturating_mul(height)
    {
        return Err(CaptureError::Backend("screen image buffer too small".to_string()));
    }

    let mut out = vec![0u8; width * height * 4];
    for (row, dst) in out.chunks_exact_mut(width * 4).enumerate() {
        let src = &bytes[row * bytes_per_row..row * bytes_per_row + width * bytes_per_pixel];
        for (px, dst) in src.chunks_exact(bytes_per_pixel).zip(dst.chunks_exact_mut(4)) {
            dst.copy_from_slice(&[px[2], px[1], px[0], px[3]]);
        }
    }

    RgbaImage::from_raw(width as u32, height as u32, out)
        .ok_or_else(|| CaptureError::Backend("failed to build image buffer".to_string()))
}

#[cfg(target_os = "macos")]
mod imp {
    pub use super::macos::{CoreGraphicsCapture, CoreGraphicsSimulator, EventTapSource};
}

#[cfg(not(target_os = "macos"))]
mod imp {
    use image::DynamicImage;

    use super::PlatformError;
    use crate::input::{InputError, InputSimulator, InputSource};
    use crate::recorder::capture::{CaptureError, CaptureProvider};
    use crate::recorder::input_event::EventSink;
    use crate::recorder::types::{Button, Key, Region};

    /// Never constructed off macOS.
    enum Never {}

    pub struct EventTapSource(Never);

    impl EventTapSource {
        pub fn new() -> Result<Self, PlatformError> {
            Err(PlatformError::Unsupported("global input listening"))
        }
    }

    impl InputSource for EventTapSource {
        fn start(&mut self, _sink: EventSink) -> Result<(), InputError> {
            match self.0 {}
        }

        fn stop(&mut self) {
            match self.0 {}
        }
    }

    pub struct CoreGraphicsCapture(Never);

    impl CoreGraphicsCapture {
        pub fn new() -> Result<Self, PlatformError> {
            Err(PlatformError::Unsupported("screen capture"))
        }
    }

    impl CaptureProvider for CoreGraphicsCapture {
        fn capture(&self, _region: Region) -> Result<DynamicImage, CaptureError> {
            match self.0 {}
        }
    }

    pub struct CoreGraphicsSimulator(Never);

    impl CoreGraphicsSimulator {
        pub fn new() -> Result<Self, PlatformError> {
            Err(PlatformError::Unsupported("input simulation"))
        }
    }

    impl InputSimulator for CoreGraphicsSimulator {
        fn move_to(&self, _x: i32, _y: i32) -> Result<(), InputError> {
            match self.0 {}
        }

        fn press(&self, _button: Button) -> Result<(), InputError> {
            match self.0 {}
        }

        fn release(&self, _button: Button) -> Result<(), InputError> {
            match self.0 {}
        }

        fn scroll(&self, _dx: i32, _dy: i32) -> Result<(), InputError> {
            match self.0 {}
        }

        fn key_down(&self, _key: Key) -> Result<(), InputError> {
            match self.0 {}
        }

        fn key_up(&self, _key: Key) -> Result<(), InputError> {
            match self.0 {}
        }
    }
}

pub use imp::{CoreGraphicsCapture, CoreGraphicsSimulator, EventTapSource};
