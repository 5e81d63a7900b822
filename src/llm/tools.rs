//! Renders the action catalog for the model: OpenAI function definitions for
//! tool-calling endpoints, and a plain listing for the system prompt.
use serde_json::json;

use crate::executor::registry::{ActionRegistry, ParamSpec, ToolSpec, FINAL_ANSWER};
use crate::llm::types::{FunctionDef, ToolDef};

const FINAL_ANSWER_DESCRIPTION: &str = "Provides a final answer to the given task and ends the run";

fn param_schema(p: &ParamSpec) -> serde_json::Value {
    let mut schema = json!({
        "type": p.kind.json_type(),
        "description": p.description,
    });
    if !p.choices.is_empty() {
        schema["enum"] = json!(p.choices);
    }
    if let Some(default) = &p.default {
        schema["default"] = default.clone();
    }
    schema
}

fn function_def(spec: &ToolSpec) -> FunctionDef {
    let properties: serde_json::Map<String, serde_json::Value> = spec
        .params
        .iter()
        .map(|p| (p.name.to_string(), param_schema(p)))
        .collect();
    let required: Vec<&str> = spec
        .params
        .iter()
        .filter(|p| p.default.is_none())
        .map(|p| p.name)
        .collect();
    FunctionDef {
        name: spec.name.to_string(),
        description: spec.description.to_string(),
        parameters: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

/// Function definitions for every desktop tool plus `final_answer`.
pub fn tool_defs(registry: &ActionRegistry) -> Vec<ToolDef> {
    registry
        .tools()
        .iter()
        .map(function_def)
        .chain(std::iter::once(FunctionDef {
            name: FINAL_ANSWER.to_string(),
            description: FINAL_ANSWER_DESCRIPTION.to_string(),
            parameters: json!({
                "type": "object",
                "properties": { "answer": { "type": "string", "description": "The final answer to the task" } },
                "required": ["answer"],
            }),
        }))
        .map(|function| ToolDef {
            def_type: "function".to_string(),
            function,
        })
        .collect()
}

/// One line per tool: `- click(x: integer, y: integer): Performs a left-click ...`.
pub fn prompt_listing(registry: &ActionRegistry) -> String {
    let mut out = String::new();
    for spec in registry.tools() {
        let params: Vec<String> = spec
            .params
            .iter()
            .map(|p| match &p.default {
                Some(d) => format!("{}: {} = {d}", p.name, p.kind.json_type()),
                None => format!("{}: {}", p.name, p.kind.json_type()),
            })
            .collect();
        out.push_str(&format!("- {}({}): {}\n", spec.name, params.join(", "), spec.description));
    }
    out.push_str(&format!("- {FINAL_ANSWER}(answer: string): {FINAL_ANSWER_DESCRIPTION}\n"));
    out
}
