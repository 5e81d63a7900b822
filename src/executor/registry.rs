//! Static catalog of desktop tools.
//!
//! Every tool the model may call is declared once here with its argument
//! schema. `dispatch` resolves a descriptor by name, validates it into a typed
//! [`DesktopAction`] and only then touches the desktop.
use crate::agent_engine::state::{ActionDescriptor, DesktopAction, TrialContext};
use crate::errors::{DeskBenchError, DeskBenchResult};
use crate::executor::{input, safety};
use crate::perception::types::ScreenPoint;
use crate::sandbox::{Desktop, MouseButton, ScrollDirection};

/// Name of the termination signal. Advertised to the model, never dispatched.
pub const FINAL_ANSWER: &str = "final_answer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Integer,
    Number,
    String,
}

impl ParamKind {
    pub fn json_type(&self) -> &'static str {
        match self {
            ParamKind::Integer => "integer",
            ParamKind::Number => "number",
            ParamKind::String => "string",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
    /// JSON default used when the argument is omitted; `None` means required.
    pub default: Option<serde_json::Value>,
    pub choices: &'static [&'static str],
}

impl ParamSpec {
    fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            default: None,
            choices: &[],
        }
    }

    fn optional(name: &'static str, kind: ParamKind, description: &'static str, default: serde_json::Value) -> Self {
        Self {
            name,
            kind,
            description,
            default: Some(default),
            choices: &[],
        }
    }

    fn with_choices(mut self, choices: &'static [&'static str]) -> Self {
        self.choices = choices;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolKind {
    Click,
    RightClick,
    DoubleClick,
    MoveMouse,
    TypeText,
    PressKey,
    Scroll,
    Wait,
    OpenUrl,
    GoBack,
    DragAndDrop,
    FindOnPage,
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
    kind: ToolKind,
}

/// Result of a successful dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub action: DesktopAction,
    pub message: String,
    pub point: Option<ScreenPoint>,
}

pub struct ActionRegistry {
    tools: Vec<ToolSpec>,
    type_delay_ms: u64,
}

impl ActionRegistry {
    /// The standard desktop tool set.
    pub fn standard(type_delay_ms: u64) -> Self {
        use ParamKind::*;
        let x = || ParamSpec::required("x", Integer, "The x coordinate (horizontal position)");
        let y = || ParamSpec::required("y", Integer, "The y coordinate (vertical position)");

        let tools = vec![
            ToolSpec {
                name: "click",
                description: "Performs a left-click at the specified coordinates",
                params: vec![x(), y()],
                kind: ToolKind::Click,
            },
            ToolSpec {
                name: "right_click",
                description: "Performs a right-click at the specified coordinates",
                params: vec![x(), y()],
                kind: ToolKind::RightClick,
            },
            ToolSpec {
                name: "double_click",
                description: "Performs a double-click at the specified coordinates",
                params: vec![x(), y()],
                kind: ToolKind::DoubleClick,
            },
            ToolSpec {
                name: "move_mouse",
                description: "Moves the mouse cursor to the specified coordinates",
                params: vec![x(), y()],
                kind: ToolKind::MoveMouse,
            },
            ToolSpec {
                name: "type_text",
                description: "Types the specified text at the current cursor position",
                params: vec![ParamSpec::required("text", String, "The text to type")],
                kind: ToolKind::TypeText,
            },
            ToolSpec {
                name: "press_key",
                description: "Presses a keyboard key or chord, e.g. \"enter\", \"backspace\", \"ctrl+c\"",
                params: vec![ParamSpec::required("key", String, "The key to press")],
                kind: ToolKind::PressKey,
            },
            ToolSpec {
                name: "scroll",
                description: "Moves the mouse to the coordinates, then scrolls. Scrolls pages or zooms depending on the app; do not use it to move through desktop menus",
                params: vec![
                    ParamSpec::required("x", Integer, "The x coordinate of the element to scroll"),
                    ParamSpec::required("y", Integer, "The y coordinate of the element to scroll"),
                    ParamSpec::optional("direction", String, "\"up\" or \"down\"", serde_json::json!("down"))
                        .with_choices(&["up", "down"]),
                    ParamSpec::optional("amount", Integer, "Scroll amount; 1 or 2 is usually right", serde_json::json!(2)),
                ],
                kind: ToolKind::Scroll,
            },
            ToolSpec {
                name: "wait",
                description: "Waits for the specified number of seconds, useful while heavy applications start",
                params: vec![ParamSpec::required("seconds", Number, "Number of seconds to wait, generally 3 is enough")],
                kind: ToolKind::Wait,
            },
            ToolSpec {
                name: "open_url",
                description: "Directly opens a browser with the specified url; use this at the start of web searches rather than clicking the browser",
                params: vec![ParamSpec::required("url", String, "The URL to open")],
                kind: ToolKind::OpenUrl,
            },
            ToolSpec {
                name: "go_back",
                description: "Goes back to the previous page in the browser",
                params: vec![],
                kind: ToolKind::GoBack,
            },
            ToolSpec {
                name: "drag_and_drop",
                description: "Presses at [x1, y1], drags to [x2, y2], then releases",
                params: vec![
                    ParamSpec::required("x1", Integer, "origin x coordinate"),
                    ParamSpec::required("y1", Integer, "origin y coordinate"),
                    ParamSpec::required("x2", Integer, "end x coordinate"),
                    ParamSpec::required("y2", Integer, "end y coordinate"),
                ],
                kind: ToolKind::DragAndDrop,
            },
            ToolSpec {
                name: "find_on_page_ctrl_f",
                description: "Scrolls the browser viewport to the first occurrence of the search string (Ctrl+F)",
                params: vec![ParamSpec::required("search_string", String, "The string to search for on the page")],
                kind: ToolKind::FindOnPage,
            },
        ];

        Self { tools, type_delay_ms }
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Declared parameter names in positional order.
    pub fn param_names(&self, name: &str) -> Option<Vec<&'static str>> {
        self.get(name).map(|t| t.params.iter().map(|p| p.name).collect())
    }

    /// Validates the descriptor into a typed action without touching the desktop.
    pub fn validate(&self, ctx: &TrialContext, descriptor: &ActionDescriptor) -> DeskBenchResult<DesktopAction> {
        let spec = self
            .get(&descriptor.name)
            .ok_or_else(|| DeskBenchError::InvalidAction(format!("unknown tool `{}`", descriptor.name)))?;
        let args = Args::bind(spec, descriptor)?;

        let action = match spec.kind {
            ToolKind::Click | ToolKind::RightClick => DesktopAction::Click {
                at: safety::check_point(ctx.screen, args.int("x")?, args.int("y")?)?,
                button: if spec.kind == ToolKind::Click {
                    MouseButton::Left
                } else {
                    MouseButton::Right
                },
            },
            ToolKind::DoubleClick => DesktopAction::DoubleClick {
                at: safety::check_point(ctx.screen, args.int("x")?, args.int("y")?)?,
            },
            ToolKind::MoveMouse => DesktopAction::MoveMouse {
                to: safety::check_point(ctx.screen, args.int("x")?, args.int("y")?)?,
            },
            ToolKind::TypeText => DesktopAction::TypeText {
                text: safety::check_non_empty("text", args.str("text")?)?.to_string(),
            },
            ToolKind::PressKey => DesktopAction::PressKey {
                keys: safety::parse_keys(args.str("key")?)?,
            },
            ToolKind::Scroll => {
                let direction = match args.str("direction")? {
                    "up" => ScrollDirection::Up,
                    _ => ScrollDirection::Down,
                };
                let amount = args.int("amount")?;
                if !(1..=50).contains(&amount) {
                    return Err(DeskBenchError::InvalidAction(format!(
                        "scroll amount must be between 1 and 50, got {amount}"
                    )));
                }
                DesktopAction::Scroll {
                    at: safety::check_point(ctx.screen, args.int("x")?, args.int("y")?)?,
                    direction,
                    amount: amount as u32,
                }
            }
            ToolKind::Wait => DesktopAction::Wait {
                seconds: safety::check_wait(args.number("seconds")?)?,
            },
            ToolKind::OpenUrl => DesktopAction::OpenUrl {
                url: safety::normalize_url(safety::check_non_empty("url", args.str("url")?)?),
            },
            ToolKind::GoBack => DesktopAction::GoBack,
            ToolKind::DragAndDrop => DesktopAction::DragAndDrop {
                from: safety::check_point(ctx.screen, args.int("x1")?, args.int("y1")?)?,
                to: safety::check_point(ctx.screen, args.int("x2")?, args.int("y2")?)?,
            },
            ToolKind::FindOnPage => DesktopAction::FindOnPage {
                query: safety::check_non_empty("search_string", args.str("search_string")?)?.to_string(),
            },
        };
        Ok(action)
    }

    /// Validates, then executes against the desktop. `InvalidAction` errors
    /// are returned before any desktop call is made.
    pub async fn dispatch(
        &self,
        desktop: &dyn Desktop,
        ctx: &TrialContext,
        descriptor: &ActionDescriptor,
    ) -> DeskBenchResult<Dispatched> {
        let action = self.validate(ctx, descriptor)?;
        tracing::info!(step = ctx.step, tool = %descriptor.name, ?action, "dispatching action");
        let message = input::execute(desktop, &action, self.type_delay_ms).await?;
        tracing::info!(step = ctx.step, msg = %message, "action complete");
        Ok(Dispatched {
            point: action.interaction_point(),
            action,
            message,
        })
    }
}

/// Arguments bound to a tool's schema, with defaults applied.
struct Args {
    values: serde_json::Map<String, serde_json::Value>,
}

impl Args {
    fn bind(spec: &ToolSpec, descriptor: &ActionDescriptor) -> DeskBenchResult<Self> {
        if let Some(extra) = descriptor
            .arguments
            .keys()
            .find(|k| !spec.params.iter().any(|p| p.name == k.as_str()))
        {
            return Err(DeskBenchError::InvalidAction(format!(
                "`{}` takes no argument `{extra}`",
                spec.name
            )));
        }

        let mut values = serde_json::Map::new();
        for param in &spec.params {
            let value = match descriptor.arguments.get(param.name) {
                Some(v) if !v.is_null() => v.clone(),
                _ => match &param.default {
                    Some(d) => d.clone(),
                    None => {
                        return Err(DeskBenchError::InvalidAction(format!(
                            "`{}` is missing required argument `{}`",
                            spec.name, param.name
                        )))
                    }
                },
            };
            check_kind(spec.name, param, &value)?;
            values.insert(param.name.to_string(), value);
        }
        Ok(Self { values })
    }

    fn int(&self, name: &str) -> DeskBenchResult<i64> {
        self.values
            .get(name)
            .and_then(as_integer)
            .ok_or_else(|| DeskBenchError::InvalidAction(format!("`{name}` must be an integer")))
    }

    fn number(&self, name: &str) -> DeskBenchResult<f64> {
        self.values
            .get(name)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| DeskBenchError::InvalidAction(format!("`{name}` must be a number")))
    }

    fn str(&self, name: &str) -> DeskBenchResult<&str> {
        self.values
            .get(name)
            .and_then(|v| v.as_str())
            .ok_or_else(|| DeskBenchError::InvalidAction(format!("`{name}` must be a string")))
    }
}

/// Integers, and floats with no fractional part (`254.0`), are accepted.
fn as_integer(v: &serde_json::Value) -> Option<i64> {
    v.as_i64().or_else(|| {
        v.as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

fn check_kind(tool: &str, param: &ParamSpec, value: &serde_json::Value) -> DeskBenchResult<()> {
    let ok = match param.kind {
        ParamKind::Integer => as_integer(value).is_some(),
        ParamKind::Number => value.is_number(),
        ParamKind::String => value
            .as_str()
            .map(|s| param.choices.is_empty() || param.choices.contains(&s))
            .unwrap_or(false),
    };
    if ok {
        Ok(())
    } else if !param.choices.is_empty() {
        Err(DeskBenchError::InvalidAction(format!(
            "`{tool}` argument `{}` must be one of {:?}, got {value}",
            param.name, param.choices
        )))
    } else {
        Err(DeskBenchError::InvalidAction(format!(
            "`{tool}` argument `{}` must be {}, got {value}",
            param.name,
            param.kind.json_type()
        )))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::perception::types::ScreenSize;

    fn ctx() -> TrialContext {
        TrialContext::new(ScreenSize { width: 1024, height: 768 })
    }

    fn registry() -> ActionRegistry {
        ActionRegistry::standard(0)
    }

    fn validate(name: &str, args: serde_json::Value) -> DeskBenchResult<DesktopAction> {
        registry().validate(&ctx(), &ActionDescriptor::new(name, args))
    }

    #[test]
    fn catalog_has_unique_names() {
        let reg = registry();
        let mut names: Vec<_> = reg.tools().iter().map(|t| t.name).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
        assert_eq!(total, 12);
        assert!(reg.get(FINAL_ANSWER).is_none());
    }

    #[test]
    fn click_validates_into_typed_action() {
        assert_eq!(
            validate("click", json!({ "x": 254, "y": 308 })).expect("click"),
            DesktopAction::Click {
                at: ScreenPoint::new(254, 308),
                button: MouseButton::Left
            }
        );
        assert_eq!(
            validate("right_click", json!({ "x": 1.0, "y": 2 })).expect("right click"),
            DesktopAction::Click {
                at: ScreenPoint::new(1, 2),
                button: MouseButton::Right
            }
        );
    }

    #[test]
    fn unknown_tool_is_invalid() {
        let err = validate("teleport", json!({})).expect_err("unknown");
        assert!(matches!(err, DeskBenchError::InvalidAction(ref m) if m.contains("teleport")));
    }

    #[test]
    fn schema_mismatches_are_invalid() {
        assert!(validate("click", json!({ "x": 10 })).is_err());
        assert!(validate("click", json!({ "x": "10", "y": 5 })).is_err());
        assert!(validate("click", json!({ "x": 10.5, "y": 5 })).is_err());
        assert!(validate("click", json!({ "x": 10, "y": 5, "z": 1 })).is_err());
        assert!(validate("scroll", json!({ "x": 1, "y": 1, "direction": "left" })).is_err());
        assert!(validate("scroll", json!({ "x": 1, "y": 1, "amount": 0 })).is_err());
        assert!(validate("type_text", json!({ "text": "" })).is_err());
        assert!(validate("wait", json!({ "seconds": 600 })).is_err());
    }

    #[test]
    fn out_of_bounds_coordinates_are_invalid() {
        assert!(validate("click", json!({ "x": 1024, "y": 10 })).is_err());
        assert!(validate("drag_and_drop", json!({ "x1": 1, "y1": 1, "x2": 5000, "y2": 1 })).is_err());
    }

    #[test]
    fn scroll_defaults_apply() {
        assert_eq!(
            validate("scroll", json!({ "x": 10, "y": 20 })).expect("scroll"),
            DesktopAction::Scroll {
                at: ScreenPoint::new(10, 20),
                direction: ScrollDirection::Down,
                amount: 2
            }
        );
    }

    #[test]
    fn url_and_keys_are_normalized() {
        assert_eq!(
            validate("open_url", json!({ "url": "maps.google.com" })).expect("url"),
            DesktopAction::OpenUrl {
                url: "https://maps.google.com".into()
            }
        );
        assert_eq!(
            validate("press_key", json!({ "key": "Ctrl+F" })).expect("keys"),
            DesktopAction::PressKey {
                keys: vec!["ctrl".into(), "f".into()]
            }
        );
        assert_eq!(validate("go_back", json!({})).expect("back"), DesktopAction::GoBack);
    }

    #[test]
    fn param_order_follows_declaration() {
        assert_eq!(
            registry().param_names("scroll").expect("scroll"),
            vec!["x", "y", "direction", "amount"]
        );
        assert!(registry().param_names("nope").is_none());
    }
}
