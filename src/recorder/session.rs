use super::storage::ScreenshotStore;
use super::types::{Action, ActionLog};
use uuid::Uuid;

/// Everything one recording produces: the growing action list and the
/// screenshot store its validations point into.
#[derive(Debug)]
pub struct RecordingSession {
    id: String,
    actions: Vec<Action>,
    store: ScreenshotStore,
}

impl RecordingSession {
    pub fn new(store: ScreenshotStore) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            actions: Vec::new(),
            store,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn store(&self) -> &ScreenshotStore {
        &self.store
    }

    pub fn add_action(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Freeze the session into an immutable log.
    pub fn into_log(self) -> ActionLog {
        ActionLog::from(self.actions)
    }
}
