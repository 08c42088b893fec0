//! Structural similarity between a reference screenshot and a live capture.
//!
//! Both images are reduced to 8-bit luminance, the candidate is resized to
//! the reference's dimensions when they differ, and the mean SSIM is taken
//! over every 7×7 window that fits inside the image (uniform weights,
//! `K1 = 0.01`, `K2 = 0.03`, data range 255, sample covariance).

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use thiserror::Error;

pub const WINDOW_SIZE: u32 = 7;

const K1: f64 = 0.01;
const K2: f64 = 0.03;
const DATA_RANGE: f64 = 255.0;

#[derive(Debug, Error)]
pub enum SimilarityError {
    #[error("reference image {path} unavailable: {reason}")]
    ReferenceUnavailable { path: String, reason: String },
    #[error("image {width}x{height} is smaller than the 7x7 comparison window")]
    TooSmall { width: u32, height: u32 },
}

/// How a comparison against a stored reference went.
#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonStatus {
    Scored,
    ReferenceUnavailable(String),
    Failed(String),
}

/// Result of [`compare_with_reference`]. The score is 0 whenever the status
/// is not [`ComparisonStatus::Scored`].
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub score: f64,
    pub status: ComparisonStatus,
}

impl Comparison {
    pub fn is_scored(&self) -> bool {
        self.status == ComparisonStatus::Scored
    }
}

/// Mean SSIM of `candidate` against `reference`, in `[-1, 1]`.
pub fn similarity(
    reference: &DynamicImage,
    candidate: &DynamicImage,
) -> Result<f64, SimilarityError> {
    let reference = reference.to_luma8();
    let mut candidate = candidate.to_luma8();

    if candidate.dimensions() != reference.dimensions() {
        candidate = imageops::resize(
            &candidate,
            reference.width(),
            reference.height(),
            FilterType::Triangle,
        );
    }

    mean_ssim(&reference, &candidate)
}

/// Load the reference from `path` and score `candidate` against it. Never
/// fails: unreadable references and transform errors come back as a zero
/// score with a status saying why.
pub fn compare_with_reference(path: &Path, candidate: &DynamicImage) -> Comparison {
    let reference = match load_reference(path) {
        Ok(reference) => reference,
        Err(err) => {
            return Comparison {
                score: 0.0,
                status: ComparisonStatus::ReferenceUnavailable(err.to_string()),
            }
        }
    };

    match similarity(&reference, candidate) {
        Ok(score) => Comparison {
            score,
            status: ComparisonStatus::Scored,
        },
        Err(err) => Comparison {
            score: 0.0,
            status: ComparisonStatus::Failed(err.to_string()),
        },
    }
}

pub fn load_reference(path: &Path) -> Result<DynamicImage, SimilarityError> {
    image::open(path).map_err(|err| SimilarityError::ReferenceUnavailable {
        path: path.display().to_string(),
        reason: err.to_string(),
    })
}

fn mean_ssim(x: &GrayImage, y: &GrayImage) -> Result<f64, SimilarityError> {
    let (width, height) = x.dimensions();
    if width < WINDOW_SIZE || height < WINDOW_SIZE {
        return Err(SimilarityError::TooSmall { width, height });
    }

    let sums = WindowSums::new(x, y);
    let n = (WINDOW_SIZE * WINDOW_SIZE) as f64;
    let cov_norm = n / (n - 1.0);
    let c1 = (K1 * DATA_RANGE).powi(2);
    let c2 = (K2 * DATA_RANGE).powi(2);

    let mut total = 0.0;
    let mut windows = 0u64;
    for top in 0..=(height - WINDOW_SIZE) {
        for left in 0..=(width - WINDOW_SIZE) {
            let s = sums.window(left, top, WINDOW_SIZE);
            let ux = s.x / n;
            let uy = s.y / n;
            let vx = cov_norm * (s.xx / n - ux * ux);
            let vy = cov_norm * (s.yy / n - uy * uy);
            let vxy = cov_norm * (s.xy / n - ux * uy);

            let numerator = (2.0 * ux * uy + c1) * (2.0 * vxy + c2);
            let denominator = (ux * ux + uy * uy + c1) * (vx + vy + c2);
            total += numerator / denominator;
            windows += 1;
        }
    }

    Ok(total / windows as f64)
}

#[derive(Debug, Default, Clone, Copy)]
struct Moments {
    x: f64,
    y: f64,
    xx: f64,
    yy: f64,
    xy: f64,
}

impl Moments {
    fn add(self, other: Moments) -> Moments {
        Moments {
            x: self.x + other.x,
            y: self.y + other.y,
            xx: self.xx + other.xx,
            yy: self.yy + other.yy,
            xy: self.xy + other.xy,
        }
    }

    fn sub(self, other: Moments) -> Moments {
        Moments {
            x: self.x - other.x,
            y: self.y - other.y,
            xx: self.xx - other.xx,
            yy: self.yy - other.yy,
            xy: self.xy - other.xy,
        }
    }
}

/// Summed-area tables of the first and second moments of two equally sized
/// images, padded with a zero row and column.
struct WindowSums {
    stride: usize,
    table: Vec<Moments>,
}

impl WindowSums {
    fn new(x: &GrayImage, y: &GrayImage) -> Self {
        let (width, height) = x.dimensions();
        let stride = width as usize + 1;
        let mut table = vec![Moments::default(); stride * (height as usize + 1)];

        for row in 0..height {
            let mut running = Moments::default();
            for col in 0..width {
                let a = x.get_pixel(col, row)[0] as f64;
                let b = y.get_pixel(col, row)[0] as f64;
                running = running.add(Moments {
                    x: a,
                    y: b,
                    xx: a * a,
                    yy: b * b,
                    xy: a * b,
                });
                let above = table[row as usize * stride + col as usize + 1];
                table[(row as usize + 1) * stride + col as usize + 1] = above.add(running);
            }
        }

        Self { stride, table }
    }

    fn at(&self, col: u32, row: u32) -> Moments {
        self.table[row as usize * self.stride + col as usize]
    }

    fn window(&self, left: u32, top: u32, size: u32) -> Moments {
        let (right, bottom) = (left + size, top + size);
        self.at(right, bottom)
            .sub(self.at(left, bottom))
            .sub(self.at(right, top))
            .add(self.at(left, top))
    }
}
