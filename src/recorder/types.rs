use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Width and height of the screenshot taken around every button press.
pub const VALIDATION_AREA_SIZE: (u32, u32) = (200, 100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Button {
    Left,
    Right,
    Middle,
    Other(u8),
}

/// Platform key code, as reported by the input source and understood by the
/// input simulator of the same platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key(pub u32);

/// Screen rectangle in global coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Region whose top-left corner sits on `(x, y)`.
    pub fn anchored_at(x: i32, y: i32, (width, height): (u32, u32)) -> Self {
        Self::new(x, y, width, height)
    }

    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Intersection with `bounds`. Returns `None` when the two do not overlap.
    pub fn clip_to(&self, bounds: &Region) -> Option<Region> {
        let left = (self.x as i64).max(bounds.x as i64);
        let top = (self.y as i64).max(bounds.y as i64);
        let right = self.right().min(bounds.right());
        let bottom = self.bottom().min(bounds.bottom());

        if right <= left || bottom <= top {
            return None;
        }

        Some(Region {
            x: left as i32,
            y: top as i32,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x={} y={} w={} h={}",
            self.x, self.y, self.width, self.height
        )
    }
}

/// Reference screenshot attached to a button press.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub screenshot: PathBuf,
    pub region: Region,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    Move {
        position: (i32, i32),
    },
    ButtonPress {
        position: (i32, i32),
        button: Button,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        validation: Option<Validation>,
    },
    ButtonRelease {
        position: (i32, i32),
        button: Button,
    },
    Scroll {
        position: (i32, i32),
        delta: (i32, i32),
    },
    KeyPress {
        key: Key,
    },
    KeyRelease {
        key: Key,
    },
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Move { .. } => "move",
            ActionKind::ButtonPress { .. } => "button_press",
            ActionKind::ButtonRelease { .. } => "button_release",
            ActionKind::Scroll { .. } => "scroll",
            ActionKind::KeyPress { .. } => "key_press",
            ActionKind::KeyRelease { .. } => "key_release",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(with = "humantime_serde")]
    pub time_delta: Duration,
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl Action {
    pub fn new(time_delta: Duration, kind: ActionKind) -> Self {
        Self { time_delta, kind }
    }

    pub fn validation(&self) -> Option<&Validation> {
        match &self.kind {
            ActionKind::ButtonPress { validation, .. } => validation.as_ref(),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn sample() -> Self {
        Self {
            time_delta: Duration::from_millis(500),
            kind: ActionKind::ButtonPress {
                position: (10, 20),
                button: Button::Left,
                validation: Some(Validation {
                    screenshot: PathBuf::from("screenshots/pre_click_1700000000000.png"),
                    region: Region::anchored_at(10, 20, VALIDATION_AREA_SIZE),
                }),
            },
        }
    }
}

/// Recorded actions in capture order. Frozen once recording stops: the log
/// exposes no way to mutate or reorder its entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionLog {
    actions: Vec<Action>,
}

impl ActionLog {
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.actions.iter()
    }

    /// Sum of all deltas, i.e. the span from recording start to the last event.
    pub fn total_duration(&self) -> Duration {
        self.actions.iter().map(|action| action.time_delta).sum()
    }

    pub fn validated_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|action| action.validation().is_some())
            .count()
    }
}

impl From<Vec<Action>> for ActionLog {
    fn from(actions: Vec<Action>) -> Self {
        Self { actions }
    }
}

impl<'a> IntoIterator for &'a ActionLog {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_roundtrip_json() {
        let action = Action::sample();
        let json = serde_json::to_string(&action).unwrap();
        let back: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(action, back);
    }

    #[test]
    fn action_json_is_tagged_by_kind() {
        let action = Action::new(
            Duration::from_millis(100),
            ActionKind::Scroll {
                position: (5, 5),
                delta: (0, -3),
            },
        );
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["type"], "scroll");
        assert_eq!(value["time_delta"], "100ms");
    }

    #[test]
    fn region_clips_at_screen_edge() {
        let screen = Region::new(0, 0, 1440, 900);
        let region = Region::anchored_at(1400, 850, VALIDATION_AREA_SIZE);
        let clipped = region.clip_to(&screen).expect("overlap");
        assert_eq!(clipped, Region::new(1400, 850, 40, 50));
    }

    #[test]
    fn region_inside_screen_is_unchanged() {
        let screen = Region::new(0, 0, 1440, 900);
        let region = Region::anchored_at(100, 100, VALIDATION_AREA_SIZE);
        assert_eq!(region.clip_to(&screen), Some(region));
    }

    #[test]
    fn region_outside_screen_has_no_overlap() {
        let screen = Region::new(0, 0, 100, 100);
        let region = Region::anchored_at(200, 200, VALIDATION_AREA_SIZE);
        assert_eq!(region.clip_to(&screen), None);
    }

    #[test]
    fn log_reports_total_duration_and_gates() {
        let log = ActionLog::from(vec![
            Action::new(
                Duration::from_millis(250),
                ActionKind::Move { position: (1, 1) },
            ),
            Action::sample(),
        ]);
        assert_eq!(log.total_duration(), Duration::from_millis(750));
        assert_eq!(log.validated_count(), 1);
    }
}
