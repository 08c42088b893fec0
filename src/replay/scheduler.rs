//! Sequential replay of a recorded action log with visual gates.
//!
//! ```text
//! Idle -> Starting -> Running -> Finished
//!                           \-> Aborted
//! ```
//!
//! A scheduler runs exactly once. Both terminal states are final.

use thiserror::Error;
use tracing::{debug, error, info};

use super::waiter::{MatchVerdict, RegionMatchWaiter};
use crate::clock::Clock;
use crate::config::ReplayConfig;
use crate::input::{InputError, InputSimulator};
use crate::recorder::capture::CaptureProvider;
use crate::recorder::types::{Action, ActionKind, ActionLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Idle,
    Starting,
    Running,
    Finished,
    Aborted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplayOutcome {
    Finished {
        dispatched: usize,
    },
    /// The gate in front of action `index` never matched.
    Aborted {
        index: usize,
        dispatched: usize,
        verdict: MatchVerdict,
    },
}

impl ReplayOutcome {
    pub fn dispatched(&self) -> usize {
        match self {
            ReplayOutcome::Finished { dispatched } | ReplayOutcome::Aborted { dispatched, .. } => {
                *dispatched
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("replay scheduler already used (state {0:?})")]
    AlreadyRun(ReplayState),
    #[error("dispatching action {index} ({kind}) failed: {source}")]
    Dispatch {
        index: usize,
        kind: &'static str,
        #[source]
        source: InputError,
    },
}

pub struct ReplayScheduler<C, I, K> {
    capture: C,
    input: I,
    clock: K,
    config: ReplayConfig,
    state: ReplayState,
}

impl<C, I, K> ReplayScheduler<C, I, K>
where
    C: CaptureProvider,
    I: InputSimulator,
    K: Clock,
{
    pub fn new(capture: C, input: I, clock: K, config: ReplayConfig) -> Self {
        Self {
            capture,
            input,
            clock,
            config,
            state: ReplayState::Idle,
        }
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    /// Replay `log` start to end. Returns `Aborted` when a validation gate
    /// times out; a failed dispatch aborts too and is returned as an error.
    pub fn run(&mut self, log: &ActionLog) -> Result<ReplayOutcome, ReplayError> {
        if self.state != ReplayState::Idle {
            return Err(ReplayError::AlreadyRun(self.state));
        }

        self.state = ReplayState::Starting;
        info!(
            lead_in_s = self.config.lead_in.as_secs_f64(),
            actions = log.len(),
            gates = log.validated_count(),
            "replay will start shortly, switch to the target window now"
        );
        self.clock.sleep(self.config.lead_in);

        self.state = ReplayState::Running;
        if log.is_empty() {
            info!("no actions were recorded");
            self.state = ReplayState::Finished;
            return Ok(ReplayOutcome::Finished { dispatched: 0 });
        }

        let policy = self.config.match_policy();
        let mut dispatched = 0;

        for (index, action) in log.iter().enumerate() {
            if index == 0 {
                info!(
                    initial_pause_s = action.time_delta.as_secs_f64(),
                    "initial pause"
                );
            }
            self.clock.sleep(action.time_delta);

            if let Some(validation) = action.validation() {
                let waiter = RegionMatchWaiter::new(&self.capture, &self.clock);
                let verdict =
                    waiter.wait_for_match(&validation.screenshot, validation.region, &policy);
                if !verdict.is_match() {
                    error!(
                        index,
                        remaining = log.len() - index,
                        "replay aborted due to validation failure"
                    );
                    self.state = ReplayState::Aborted;
                    return Ok(ReplayOutcome::Aborted {
                        index,
                        dispatched,
                        verdict,
                    });
                }
            }

            if let Err(source) = self.dispatch(action) {
                error!(index, error = %source, "replay aborted due to input failure");
                self.state = ReplayState::Aborted;
                return Err(ReplayError::Dispatch {
                    index,
                    kind: action.kind.name(),
                    source,
                });
            }
            dispatched += 1;
        }

        info!(dispatched, "replay finished successfully");
        self.state = ReplayState::Finished;
        Ok(ReplayOutcome::Finished { dispatched })
    }

    fn dispatch(&self, action: &Action) -> Result<(), InputError> {
        debug!(kind = action.kind.name(), "dispatching action");
        match &action.kind {
            ActionKind::Move { position: (x, y) } => self.input.move_to(*x, *y),
            ActionKind::ButtonPress { button, .. } => self.input.press(*button),
            ActionKind::ButtonRelease { button, .. } => self.input.release(*button),
            ActionKind::Scroll {
                delta: (dx, dy), ..
            } => self.input.scroll(*dx, *dy),
            ActionKind::KeyPress { key } => self.input.key_down(*key),
            ActionKind::KeyRelease { key } => self.input.key_up(*key),
        }
    }
}
