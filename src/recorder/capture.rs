use super::types::Region;
use image::DynamicImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("invalid region {0}")]
    InvalidRegion(Region),
    #[error("screen capture failed: {0}")]
    Backend(String),
}

/// Reads pixels from the display.
pub trait CaptureProvider {
    fn capture(&self, region: Region) -> Result<DynamicImage, CaptureError>;

    /// Bounds of the capturable screen, used to clip validation regions.
    /// `None` when the backend cannot tell.
    fn screen_bounds(&self) -> Option<Region> {
        None
    }
}

impl<T: CaptureProvider + ?Sized> CaptureProvider for &T {
    fn capture(&self, region: Region) -> Result<DynamicImage, CaptureError> {
        (**self).capture(region)
    }

    fn screen_bounds(&self) -> Option<Region> {
        (**self).screen_bounds()
    }
}

impl<T: CaptureProvider + ?Sized> CaptureProvider for Box<T> {
    fn capture(&self, region: Region) -> Result<DynamicImage, CaptureError> {
        (**self).capture(region)
    }

    fn screen_bounds(&self) -> Option<Region> {
        (**self).screen_bounds()
    }
}
