//! System prompt and message rendering for the decision model.
use crate::agent_engine::memory::{StepKind, StepMemory, StepView};
use crate::llm::types::{ChatMessage, ContentPart, ImageUrl};
use crate::perception::screenshot::to_data_uri;
use crate::perception::types::ScreenSize;

const SYSTEM_TEMPLATE: &str = "\
You are a desktop automation assistant that controls a remote Linux desktop ({width}x{height} pixels) \
to solve the user's task. Today is {date}.

After each action you receive a fresh screenshot. When the previous action had a screen position, \
a green crosshair marks where it happened: use it to check that you clicked what you meant to.

Tools:
{tools}
Answer in this format on every turn:
Short term goal: the immediate sub-goal of this step
What I see: what the latest screenshot shows
Reflection: whether the previous action worked and what to do next
Action:
```python
click(254, 308)
```<end_code>

Rules:
- Call exactly one tool per turn.
- Coordinates are absolute pixels; the origin is the top-left corner.
- To open a web page, use open_url directly instead of clicking the browser icon.
- Wait after actions that start heavy applications.
- Do not repeat an action that had no visible effect; try something else.
- When the task is solved, call final_answer(\"...\") with the answer or \"Done\".";

/// Renders the system prompt for a screen and tool listing.
pub fn system_prompt(screen: ScreenSize, tools_listing: &str) -> String {
    SYSTEM_TEMPLATE
        .replace("{width}", &screen.width.to_string())
        .replace("{height}", &screen.height.to_string())
        .replace("{date}", &chrono::Local::now().format("%A, %d %B %Y").to_string())
        .replace("{tools}", tools_listing)
}

fn with_image(text: String, image: Option<&[u8]>) -> ChatMessage {
    match image {
        Some(png) => ChatMessage::parts(
            "user",
            vec![
                ContentPart::Text { text },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: to_data_uri(png) },
                },
            ],
        ),
        None => ChatMessage::text("user", text),
    }
}

fn assistant_text(step: &StepView<'_>) -> String {
    if !step.reasoning.is_empty() {
        return step.reasoning.to_string();
    }
    let mut out = String::new();
    if let Some(goal) = step.goal {
        out.push_str(&format!("Short term goal: {goal}\n"));
    }
    if let Some(action) = step.action {
        out.push_str(&format!("Action:\n```python\n{action}\n```"));
    }
    out
}

/// Chat transcript for the next decision: system prompt, then one
/// assistant/user pair per step.
pub fn build_messages(system: &str, memory: &StepMemory) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::text("system", system)];
    for step in memory.render_for_model() {
        match step.kind {
            StepKind::Task => {
                messages.push(with_image(format!("New task:\n{}", step.reasoning), step.image));
            }
            StepKind::Action | StepKind::Failed => {
                messages.push(ChatMessage::text("assistant", assistant_text(&step)));
                let header = if step.kind == StepKind::Failed {
                    "Error"
                } else {
                    "Observation"
                };
                messages.push(with_image(format!("{header} (step {}):\n{}", step.index, step.note), step.image));
            }
            StepKind::Final => {
                messages.push(ChatMessage::text("assistant", assistant_text(&step)));
            }
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;
    use crate::agent_engine::memory::{Step, StepObservation};
    use crate::agent_engine::state::ActionDescriptor;
    use crate::llm::types::MessageContent;

    #[test]
    fn system_prompt_mentions_resolution_and_tools() {
        let p = system_prompt(ScreenSize { width: 1024, height: 768 }, "- click(x, y)\n");
        assert!(p.contains("1024x768"));
        assert!(p.contains("- click(x, y)"));
        assert!(!p.contains("{date}"));
    }

    #[test]
    fn only_latest_step_carries_an_image() {
        let mut mem = StepMemory::new();
        mem.append(Step::task("find the weather", vec![1, 2, 3], PathBuf::from("step_000.png")));
        mem.append(Step {
            index: 1,
            kind: StepKind::Action,
            goal: Some("open site".into()),
            action: Some(ActionDescriptor::new("open_url", json!({ "url": "weather.com" }))),
            reasoning: String::new(),
            observation: StepObservation {
                image: Some(vec![4, 5, 6]),
                screenshot: None,
                note: "Opened URL: https://weather.com".into(),
            },
            error: None,
        });

        let msgs = build_messages("sys", &mem);
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].role, "system");
        assert_eq!(msgs[1].image_count(), 0);
        assert_eq!(msgs[2].role, "assistant");
        match &msgs[2].content {
            MessageContent::Text(t) => {
                assert!(t.contains("Short term goal: open site"));
                assert!(t.contains(r#"open_url({"url":"weather.com"})"#));
            }
            other => panic!("unexpected content {other:?}"),
        }
        assert_eq!(msgs[3].image_count(), 1);
        let total: usize = msgs.iter().map(ChatMessage::image_count).sum();
        assert_eq!(total, 1);
    }
}
