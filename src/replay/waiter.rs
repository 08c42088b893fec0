//! Blocking wait until a screen region looks like its reference screenshot.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::similarity::{compare_with_reference, ComparisonStatus};
use crate::clock::Clock;
use crate::recorder::capture::CaptureProvider;
use crate::recorder::types::Region;

pub const DEFAULT_THRESHOLD: f64 = 0.85;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchPolicy {
    /// A capture matches when its similarity is strictly greater than this.
    pub threshold: f64,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchVerdict {
    Matched {
        attempts: u32,
        score: f64,
        elapsed: Duration,
    },
    TimedOut {
        attempts: u32,
        best_score: Option<f64>,
        elapsed: Duration,
    },
}

impl MatchVerdict {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchVerdict::Matched { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            MatchVerdict::Matched { attempts, .. } | MatchVerdict::TimedOut { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            MatchVerdict::Matched { elapsed, .. } | MatchVerdict::TimedOut { elapsed, .. } => {
                *elapsed
            }
        }
    }
}

pub struct RegionMatchWaiter<C, K> {
    capture: C,
    clock: K,
}

impl<C: CaptureProvider, K: Clock> RegionMatchWaiter<C, K> {
    pub fn new(capture: C, clock: K) -> Self {
        Self { capture, clock }
    }

    /// Poll `region` until it scores above the threshold against the image at
    /// `reference`, or until `policy.timeout` has elapsed. Capture errors and
    /// unreadable references count as failed attempts.
    pub fn wait_for_match(
        &self,
        reference: &Path,
        region: Region,
        policy: &MatchPolicy,
    ) -> MatchVerdict {
        info!(
            region = %region,
            reference = %reference.display(),
            "validating: waiting for screen region to match"
        );

        let start = self.clock.now();
        let mut attempts = 0u32;
        let mut best_score: Option<f64> = None;

        while self.clock.elapsed_since(start) < policy.timeout {
            attempts += 1;

            match self.capture.capture(region) {
                Ok(frame) => {
                    let comparison = compare_with_reference(reference, &frame);
                    match &comparison.status {
                        ComparisonStatus::Scored => {}
                        ComparisonStatus::ReferenceUnavailable(reason) => {
                            error!(
                                reference = %reference.display(),
                                %reason,
                                "reference screenshot unavailable"
                            );
                        }
                        ComparisonStatus::Failed(reason) => {
                            warn!(%reason, "image comparison failed");
                        }
                    }

                    let elapsed = self.clock.elapsed_since(start);
                    info!(
                        attempt = attempts,
                        elapsed_ms = elapsed.as_millis() as u64,
                        similarity = format_args!("{:.2}", comparison.score),
                        threshold = policy.threshold,
                        "similarity measured"
                    );
                    best_score = Some(
                        best_score.map_or(comparison.score, |best| best.max(comparison.score)),
                    );

                    if comparison.score > policy.threshold {
                        info!(attempt = attempts, "match successful, proceeding");
                        return MatchVerdict::Matched {
                            attempts,
                            score: comparison.score,
                            elapsed,
                        };
                    }
                }
                Err(err) => {
                    warn!(attempt = attempts, error = %err, "could not grab screenshot, retrying");
                }
            }

            self.clock.sleep(policy.poll_interval);
        }

        let elapsed = self.clock.elapsed_since(start);
        warn!(
            attempts,
            timeout_s = policy.timeout.as_secs_f64(),
            best_score = best_score.unwrap_or(0.0),
            "timeout: screen region did not match"
        );
        MatchVerdict::TimedOut {
            attempts,
            best_score,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedCapture, VirtualClock};
    use image::{DynamicImage, GrayImage, Luma};
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    fn checkerboard() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(40, 20, |x, y| {
            if ((x / 4) + (y / 4)) % 2 == 0 {
                Luma([255])
            } else {
                Luma([0])
            }
        }))
    }

    fn solid() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 20, Luma([128])))
    }

    fn stored_reference() -> (TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ref.png");
        checkerboard().save(&path).unwrap();
        (dir, path)
    }

    fn region() -> Region {
        Region::new(10, 10, 40, 20)
    }

    #[test]
    fn matches_on_first_attempt() {
        let (_dir, reference) = stored_reference();
        let capture = ScriptedCapture::always(checkerboard());
        let clock = VirtualClock::new();
        let waiter = RegionMatchWaiter::new(&capture, &clock);

        let verdict = waiter.wait_for_match(&reference, region(), &MatchPolicy::default());

        assert!(verdict.is_match());
        assert_eq!(verdict.attempts(), 1);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn times_out_after_the_full_timeout() {
        let (_dir, reference) = stored_reference();
        let capture = ScriptedCapture::always(solid());
        let clock = VirtualClock::new();
        let waiter = RegionMatchWaiter::new(&capture, &clock);

        let verdict = waiter.wait_for_match(&reference, region(), &MatchPolicy::default());

        assert!(!verdict.is_match());
        assert_eq!(verdict.attempts(), 20);
        assert_eq!(verdict.elapsed(), DEFAULT_TIMEOUT);
        assert_eq!(capture.calls(), 20);
    }

    #[test]
    fn matches_within_one_poll_of_the_switch() {
        let (_dir, reference) = stored_reference();
        let capture = ScriptedCapture::switching(solid(), 3, checkerboard());
        let clock = VirtualClock::new();
        let waiter = RegionMatchWaiter::new(&capture, &clock);

        let verdict = waiter.wait_for_match(&reference, region(), &MatchPolicy::default());

        match verdict {
            MatchVerdict::Matched {
                attempts, elapsed, ..
            } => {
                assert_eq!(attempts, 4);
                assert_eq!(elapsed, Duration::from_secs(3));
            }
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn capture_errors_are_retried_until_timeout() {
        let (_dir, reference) = stored_reference();
        let capture = ScriptedCapture::failing("display asleep");
        let clock = VirtualClock::new();
        let waiter = RegionMatchWaiter::new(&capture, &clock);
        let policy = MatchPolicy {
            timeout: Duration::from_secs(5),
            ..MatchPolicy::default()
        };

        let verdict = waiter.wait_for_match(&reference, region(), &policy);

        assert_eq!(
            verdict,
            MatchVerdict::TimedOut {
                attempts: 5,
                best_score: None,
                elapsed: Duration::from_secs(5),
            }
        );
    }

    #[test]
    fn missing_reference_never_matches() {
        let dir = tempdir().unwrap();
        let capture = ScriptedCapture::always(checkerboard());
        let clock = VirtualClock::new();
        let waiter = RegionMatchWaiter::new(&capture, &clock);
        let policy = MatchPolicy {
            timeout: Duration::from_secs(3),
            ..MatchPolicy::default()
        };

        let verdict = waiter.wait_for_match(&dir.path().join("gone.png"), region(), &policy);

        assert!(!verdict.is_match());
        assert_eq!(verdict.attempts(), 3);
    }

    #[test]
    fn score_equal_to_threshold_is_not_a_match() {
        let (_dir, reference) = stored_reference();
        let capture = ScriptedCapture::always(checkerboard());
        let clock = VirtualClock::new();
        let waiter = RegionMatchWaiter::new(&capture, &clock);
        let policy = MatchPolicy {
            threshold: 1.0,
            timeout: Duration::from_secs(2),
            ..MatchPolicy::default()
        };

        assert!(!waiter.wait_for_match(&reference, region(), &policy).is_match());
    }
}
