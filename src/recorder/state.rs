use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderAction {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecorderStateError {
    #[error("cannot {action:?} while {from:?}")]
    InvalidTransition {
        from: SessionState,
        action: RecorderAction,
    },
}

#[derive(Debug)]
pub struct RecorderState {
    state: SessionState,
}

impl RecorderState {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
        }
    }

    pub fn current_state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    fn transition(
        &mut self,
        allowed: &[SessionState],
        to: SessionState,
        action: RecorderAction,
    ) -> Result<(), RecorderStateError> {
        if allowed.contains(&self.state) {
            self.state = to;
            Ok(())
        } else {
            Err(RecorderStateError::InvalidTransition {
                from: self.state,
                action,
            })
        }
    }

    /// A session records once; a stopped log is never reopened.
    pub fn start(&mut self) -> Result<(), RecorderStateError> {
        self.transition(
            &[SessionState::Idle],
            SessionState::Recording,
            RecorderAction::Start,
        )
    }

    /// Idempotent: stopping a stopped recorder is a no-op.
    pub fn stop(&mut self) -> Result<(), RecorderStateError> {
        self.transition(
            &[SessionState::Recording, SessionState::Stopped],
            SessionState::Stopped,
            RecorderAction::Stop,
        )
    }
}

impl Default for RecorderState {
    fn default() -> Self {
        Self::new()
    }
}
