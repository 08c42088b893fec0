pub mod scheduler;
pub mod similarity;
pub mod waiter;

pub use scheduler::{ReplayError, ReplayOutcome, ReplayScheduler, ReplayState};
pub use similarity::similarity;
pub use waiter::{MatchPolicy, MatchVerdict, RegionMatchWaiter};
