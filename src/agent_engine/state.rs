use serde::{Deserialize, Serialize};

use crate::perception::types::{ScreenPoint, ScreenSize};
use crate::sandbox::{MouseButton, ScrollDirection};

/// Tool name plus JSON arguments, as chosen by the decision model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl ActionDescriptor {
    /// Non-object `arguments` become an empty map.
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        let arguments = match arguments {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            name: name.into(),
            arguments,
        }
    }
}

impl std::fmt::Display for ActionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({})",
            self.name,
            serde_json::Value::Object(self.arguments.clone())
        )
    }
}

/// Validated, typed form of an [`ActionDescriptor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DesktopAction {
    Click { at: ScreenPoint, button: MouseButton },
    DoubleClick { at: ScreenPoint },
    MoveMouse { to: ScreenPoint },
    TypeText { text: String },
    PressKey { keys: Vec<String> },
    Scroll { at: ScreenPoint, direction: ScrollDirection, amount: u32 },
    Wait { seconds: f64 },
    OpenUrl { url: String },
    GoBack,
    DragAndDrop { from: ScreenPoint, to: ScreenPoint },
    FindOnPage { query: String },
}

impl DesktopAction {
    /// Point to mark on the next screenshot, for pointer actions.
    pub fn interaction_point(&self) -> Option<ScreenPoint> {
        match self {
            DesktopAction::Click { at, .. }
            | DesktopAction::DoubleClick { at }
            | DesktopAction::Scroll { at, .. } => Some(*at),
            DesktopAction::MoveMouse { to } | DesktopAction::DragAndDrop { to, .. } => Some(*to),
            _ => None,
        }
    }
}

/// What the model wants next.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Act(ActionDescriptor),
    /// Explicit termination with the model's final answer.
    Finish { answer: String },
}

/// One decision plus the text that accompanied it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTurn {
    pub decision: Decision,
    /// "Short term goal" stated by the model, if any.
    pub goal: Option<String>,
    /// Full model reply, kept for the step log.
    pub reasoning: String,
}

/// Control loop lifecycle. Everything but `Running` is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoopState {
    Running,
    Completed { answer: String },
    Failed { error: String },
    StepLimitReached,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoopState::Running)
    }
}

/// Mutable per-trial state threaded through the control loop.
#[derive(Debug, Clone)]
pub struct TrialContext {
    pub screen: ScreenSize,
    /// Set by pointer actions, consumed by the next capture.
    pub last_interaction: Option<ScreenPoint>,
    /// Index of the step being executed.
    pub step: usize,
}

impl TrialContext {
    pub fn new(screen: ScreenSize) -> Self {
        Self {
            screen,
            last_interaction: None,
            step: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn descriptor_equality_covers_name_and_arguments() {
        let a = ActionDescriptor::new("click", json!({ "x": 1, "y": 2 }));
        let b = ActionDescriptor::new("click", json!({ "y": 2, "x": 1 }));
        let c = ActionDescriptor::new("right_click", json!({ "x": 1, "y": 2 }));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn descriptor_display() {
        let a = ActionDescriptor::new("type_text", json!({ "text": "hi" }));
        assert_eq!(a.to_string(), r#"type_text({"text":"hi"})"#);
        assert!(ActionDescriptor::new("go_back", json!(null)).arguments.is_empty());
    }

    #[test]
    fn pointer_actions_report_interaction_point() {
        let p = ScreenPoint::new(3, 4);
        assert_eq!(
            DesktopAction::Click { at: p, button: MouseButton::Right }.interaction_point(),
            Some(p)
        );
        assert_eq!(
            DesktopAction::DragAndDrop { from: ScreenPoint::new(0, 0), to: p }.interaction_point(),
            Some(p)
        );
        assert_eq!(DesktopAction::GoBack.interaction_point(), None);
        assert_eq!(DesktopAction::TypeText { text: "a".into() }.interaction_point(), None);
    }

    #[test]
    fn loop_state_terminality() {
        assert!(!LoopState::Running.is_terminal());
        assert!(LoopState::StepLimitReached.is_terminal());
        assert!(LoopState::Completed { answer: "Done".into() }.is_terminal());
    }
}
