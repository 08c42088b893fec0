//! Record desktop input with visual checkpoints, then replay it and wait at
//! every checkpoint until the screen looks the way it did while recording.

pub mod clock;
pub mod config;
pub mod control;
pub mod input;
pub mod platform;
pub mod recorder;
pub mod replay;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use clock::{Clock, SystemClock};
pub use config::{Config, ConfigError};
pub use recorder::types::{Action, ActionKind, ActionLog, Button, Key, Region, Validation};
pub use recorder::{EventRecorder, RecorderError};
pub use replay::{ReplayError, ReplayOutcome, ReplayScheduler};
