pub mod capture;
pub mod input_event;
pub mod pipeline;
pub mod session;
pub mod state;
pub mod storage;
pub mod types;

pub use pipeline::{EventRecorder, RecorderError};
