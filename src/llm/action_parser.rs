//! Turns a raw model reply into a [`ModelTurn`].
//!
//! Tool-calling endpoints answer with `tool_calls`; the first call wins.
//! Text endpoints answer in the
//! `Short term goal: ... / Action: ```python click(254, 308) ``` ` format,
//! whose call is parsed from the first code block. Positional arguments are
//! mapped onto the tool's declared parameter order.
use std::sync::OnceLock;

use regex::Regex;

use crate::agent_engine::state::{ActionDescriptor, Decision, ModelTurn};
use crate::errors::{DeskBenchError, DeskBenchResult};
use crate::executor::registry::{ActionRegistry, FINAL_ANSWER};
use crate::llm::types::LlmResponse;

fn goal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*\**short[ -]term goal\**\s*:\s*(.+)$").expect("goal regex must compile"))
}

fn code_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[a-zA-Z]*\s*\n?(.*?)```").expect("code block regex must compile"))
}

fn call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("call regex must compile"))
}

fn unparseable(msg: impl Into<String>) -> DeskBenchError {
    DeskBenchError::LlmProvider(format!("no parseable action in model reply: {}", msg.into()))
}

/// Parses a model reply into a decision.
pub fn parse_response(resp: &LlmResponse, registry: &ActionRegistry) -> DeskBenchResult<ModelTurn> {
    let goal = goal_re()
        .captures(&resp.content)
        .map(|c| c[1].trim().to_string())
        .filter(|g| !g.is_empty());
    let reasoning = resp.content.trim().to_string();

    let descriptor = if let Some(tc) = resp.tool_calls.first() {
        let raw = tc.function.arguments.trim();
        let args: serde_json::Value = if raw.is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(raw)
                .map_err(|e| unparseable(format!("tool call arguments for `{}`: {e}", tc.function.name)))?
        };
        ActionDescriptor::new(tc.function.name.clone(), args)
    } else {
        parse_code_call(&resp.content, registry)?
    };

    let decision = if descriptor.name == FINAL_ANSWER {
        let answer = match descriptor.arguments.get("answer") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        Decision::Finish { answer }
    } else {
        Decision::Act(descriptor)
    };

    Ok(ModelTurn {
        decision,
        goal,
        reasoning,
    })
}

/// Extracts the first `name(args)` call from the reply's code block.
pub fn parse_code_call(content: &str, registry: &ActionRegistry) -> DeskBenchResult<ActionDescriptor> {
    let code = code_block_re()
        .captures(content)
        .map(|c| c[1].to_string())
        .ok_or_else(|| unparseable("missing code block"))?;

    let line = code
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .ok_or_else(|| unparseable("empty code block"))?;

    let caps = call_re()
        .captures(line)
        .ok_or_else(|| unparseable(format!("`{line}` is not a call")))?;
    let name = caps[1].to_string();
    let after_paren = caps.get(0).map_or(line.len(), |m| m.end());

    let (positional, keyword) = parse_args(call_arguments(&line[after_paren..])?)?;

    let param_names: Vec<&str> = if name == FINAL_ANSWER {
        vec!["answer"]
    } else {
        registry.param_names(&name).unwrap_or_default()
    };

    let mut arguments = serde_json::Map::new();
    for (i, value) in positional.into_iter().enumerate() {
        // Extra positionals get a synthetic key so validation rejects them.
        let key = param_names
            .get(i)
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("arg{i}"));
        arguments.insert(key, value);
    }
    for (key, value) in keyword {
        arguments.insert(key, value);
    }

    Ok(ActionDescriptor {
        name,
        arguments,
    })
}

/// The text up to the `)` that closes the call, ignoring brackets and
/// parentheses inside string literals. Anything after it (a trailing
/// comment, say) is dropped.
fn call_arguments(src: &str) -> DeskBenchResult<&str> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth = 0u32;

    for (i, c) in src.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' if depth == 0 => return Ok(&src[..i]),
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Err(unparseable("unbalanced parentheses in call"))
}

type ParsedArgs = (Vec<serde_json::Value>, Vec<(String, serde_json::Value)>);

fn parse_args(src: &str) -> DeskBenchResult<ParsedArgs> {
    let mut positional = Vec::new();
    let mut keyword = Vec::new();
    for piece in split_top_level(src)? {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        match keyword_split(piece) {
            Some((key, value)) => keyword.push((key.to_string(), parse_literal(value)?)),
            None => {
                if !keyword.is_empty() {
                    return Err(unparseable("positional argument after keyword argument"));
                }
                positional.push(parse_literal(piece)?);
            }
        }
    }
    Ok((positional, keyword))
}

/// `name=value` outside any quotes.
fn keyword_split(piece: &str) -> Option<(&str, &str)> {
    let eq = piece.find('=')?;
    let key = piece[..eq].trim();
    let is_ident = key
        .chars()
        .enumerate()
        .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()));
    (!key.is_empty() && is_ident).then(|| (key, piece[eq + 1..].trim()))
}

/// Splits on commas that are not inside quotes or brackets.
fn split_top_level(src: &str) -> DeskBenchResult<Vec<String>> {
    let mut parts = Vec::new();
    let mut cur = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0i32;
    let mut escaped = false;

    for c in src.chars() {
        if let Some(q) = quote {
            cur.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                cur.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                cur.push(c);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                cur.push(c);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut cur)),
            _ => cur.push(c),
        }
    }
    if quote.is_some() {
        return Err(unparseable("unterminated string literal"));
    }
    parts.push(cur);
    Ok(parts)
}

fn parse_literal(src: &str) -> DeskBenchResult<serde_json::Value> {
    let s = src.trim();
    let first = s.chars().next();
    if let Some(q @ ('\'' | '"')) = first {
        let inner = s
            .strip_prefix(q)
            .and_then(|rest| rest.strip_suffix(q))
            .ok_or_else(|| unparseable(format!("bad string literal {s}")))?;
        return Ok(serde_json::Value::String(unescape(inner)));
    }
    match s {
        "True" | "true" => return Ok(serde_json::Value::Bool(true)),
        "False" | "false" => return Ok(serde_json::Value::Bool(false)),
        "None" | "null" => return Ok(serde_json::Value::Null),
        _ => {}
    }
    if let Ok(i) = s.parse::<i64>() {
        return Ok(serde_json::Value::from(i));
    }
    if let Ok(f) = s.parse::<f64>() {
        return Ok(serde_json::Value::from(f));
    }
    Err(unparseable(format!("unsupported argument `{s}`")))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
