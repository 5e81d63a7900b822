//! Per-trial step history.
//!
//! Only the most recently appended step keeps its screenshot bytes; older
//! steps retain the saved path and note but drop the image, bounding what is
//! sent to the model on every turn.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::agent_engine::state::ActionDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Step 0: the task text and the initial screenshot.
    Task,
    Action,
    /// The model's `final_answer`.
    Final,
    /// The action was rejected or its execution failed.
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepObservation {
    /// PNG shown to the model. Never persisted.
    #[serde(skip)]
    pub image: Option<Vec<u8>>,
    pub screenshot: Option<PathBuf>,
    /// Action confirmation, error text or repetition warning.
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub index: usize,
    pub kind: StepKind,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub action: Option<ActionDescriptor>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub observation: StepObservation,
    #[serde(default)]
    pub error: Option<String>,
}

impl Step {
    pub fn task(task: &str, image: Vec<u8>, screenshot: PathBuf) -> Self {
        Self {
            index: 0,
            kind: StepKind::Task,
            goal: None,
            action: None,
            reasoning: task.to_string(),
            observation: StepObservation {
                image: Some(image),
                screenshot: Some(screenshot),
                note: String::new(),
            },
            error: None,
        }
    }
}

/// Borrowed view of a step, as rendered for the model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepView<'a> {
    pub index: usize,
    pub kind: StepKind,
    pub goal: Option<&'a str>,
    pub action: Option<&'a ActionDescriptor>,
    pub reasoning: &'a str,
    pub note: &'a str,
    pub image: Option<&'a [u8]>,
}

impl<'a> From<&'a Step> for StepView<'a> {
    fn from(step: &'a Step) -> Self {
        Self {
            index: step.index,
            kind: step.kind,
            goal: step.goal.as_deref(),
            action: step.action.as_ref(),
            reasoning: &step.reasoning,
            note: &step.observation.note,
            image: step.observation.image.as_deref(),
        }
    }
}

#[derive(Debug, Default)]
pub struct StepMemory {
    steps: Vec<Step>,
}

impl StepMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a step and drops the image of every earlier step.
    pub fn append(&mut self, step: Step) {
        for prev in &mut self.steps {
            prev.observation.image = None;
        }
        tracing::debug!(index = step.index, kind = ?step.kind, "step appended");
        self.steps.push(step);
    }

    /// Restartable view for prompt building. Does not mutate the memory.
    pub fn render_for_model(&self) -> impl Iterator<Item = StepView<'_>> + Clone + '_ {
        self.steps.iter().map(StepView::from)
    }

    /// Drops all images ahead of persisting.
    pub fn finalize(&mut self) {
        for step in &mut self.steps {
            step.observation.image = None;
        }
    }

    pub fn last_action(&self) -> Option<&ActionDescriptor> {
        self.steps.last().and_then(|s| s.action.as_ref())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps that attempted a desktop action, successful or not.
    pub fn action_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.kind, StepKind::Action | StepKind::Failed))
            .count()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn next_index(&self) -> usize {
        self.steps.last().map(|s| s.index + 1).unwrap_or(0)
    }

    pub fn live_images(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.observation.image.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn action_step(index: usize, with_image: bool) -> Step {
        Step {
            index,
            kind: StepKind::Action,
            goal: Some(format!("goal {index}")),
            action: Some(ActionDescriptor::new("click", json!({ "x": index, "y": 1 }))),
            reasoning: String::new(),
            observation: StepObservation {
                image: with_image.then(|| vec![index as u8]),
                screenshot: Some(PathBuf::from(format!("step_{index:03}.png"))),
                note: String::new(),
            },
            error: None,
        }
    }

    #[test]
    fn at_most_one_image_after_every_append() {
        let mut mem = StepMemory::new();
        mem.append(Step::task("find puppies", vec![0], PathBuf::from("step_000.png")));
        assert_eq!(mem.live_images(), 1);
        for i in 1..6 {
            mem.append(action_step(i, i % 2 == 0));
            assert!(mem.live_images() <= 1);
        }
        // The last step had no image, so nothing remains live.
        assert_eq!(mem.live_images(), 0);
        mem.append(action_step(6, true));
        assert_eq!(mem.live_images(), 1);
        assert_eq!(mem.steps().last().and_then(|s| s.observation.image.clone()), Some(vec![6]));
    }

    #[test]
    fn render_is_restartable_and_read_only() {
        let mut mem = StepMemory::new();
        mem.append(Step::task("t", vec![0], PathBuf::from("a.png")));
        mem.append(action_step(1, true));

        let view = mem.render_for_model();
        let first: Vec<_> = view.clone().collect();
        let second: Vec<_> = view.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].image, Some(&[1u8][..]));
        assert_eq!(mem.live_images(), 1);
    }

    #[test]
    fn finalize_drops_all_images_but_keeps_paths() {
        let mut mem = StepMemory::new();
        mem.append(Step::task("t", vec![0], PathBuf::from("a.png")));
        mem.append(action_step(1, true));
        mem.finalize();
        assert_eq!(mem.live_images(), 0);
        assert!(mem.steps().iter().all(|s| s.observation.screenshot.is_some()));
    }

    #[test]
    fn accessors() {
        let mut mem = StepMemory::new();
        assert!(mem.is_empty());
        assert_eq!(mem.next_index(), 0);
        mem.append(Step::task("t", vec![0], PathBuf::from("a.png")));
        assert!(mem.last_action().is_none());
        mem.append(action_step(1, true));
        let mut failed = action_step(2, true);
        failed.kind = StepKind::Failed;
        mem.append(failed);
        assert_eq!(mem.len(), 3);
        assert_eq!(mem.action_steps(), 2);
        assert_eq!(mem.next_index(), 3);
        assert_eq!(mem.last_action().map(|a| a.name.as_str()), Some("click"));
    }

    #[test]
    fn images_are_not_serialized() {
        let step = action_step(1, true);
        let json = serde_json::to_value(&step).expect("serialize");
        assert!(json["observation"].get("image").is_none());
        let back: Step = serde_json::from_value(json).expect("deserialize");
        assert!(back.observation.image.is_none());
        assert_eq!(back.action, step.action);
    }
}
