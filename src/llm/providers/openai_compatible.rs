use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::{DeskBenchError, DeskBenchResult};
use crate::llm::provider::LlmProvider;
use crate::llm::sse_parser;
use crate::llm::types::{
    CallConfig, ChatMessage, FunctionCall, LlmResponse, StreamChunk, StreamChunkKind, ToolCall, ToolDef,
};

const IMAGE_PLACEHOLDER: &str = "<omitted_base64_image>";

/// Chat-completions client for any OpenAI-compatible endpoint.
/// `api_base` is the full completions URL.
pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn request_body(messages: &[ChatMessage], tools: &[ToolDef], cfg: &CallConfig) -> DeskBenchResult<Value> {
        let mut body = json!({
            "model": cfg.model,
            "messages": messages,
            "stream": cfg.stream,
            "temperature": cfg.temperature,
            "max_tokens": cfg.max_tokens,
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(tools)?;
            body["tool_choice"] = json!("auto");
        }
        Ok(body)
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn chat(&self, messages: Vec<ChatMessage>, tools: Vec<ToolDef>, cfg: &CallConfig) -> DeskBenchResult<LlmResponse> {
        let body = Self::request_body(&messages, &tools, cfg)?;
        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            stream = cfg.stream,
            tools = tools.len(),
            body = %sanitized_body(&body),
            "posting chat completion"
        );

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DeskBenchError::LlmProvider(format!("{status}: {detail}")));
        }

        let reply = if cfg.stream {
            read_stream(response).await?
        } else {
            read_json(response).await?
        };
        tracing::info!(
            provider = %self.id,
            content_len = reply.content.len(),
            reasoning_len = reply.reasoning.len(),
            tools = ?reply.tool_calls.iter().map(|c| c.function.name.as_str()).collect::<Vec<_>>(),
            "chat completion received"
        );
        Ok(reply)
    }
}

/// A tool call being assembled from stream fragments.
#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    call_type: String,
    name: String,
    arguments: String,
}

impl PendingCall {
    fn merge(&mut self, delta: &Value) {
        if let Some(id) = delta["id"].as_str().filter(|s| !s.is_empty()) {
            self.id = id.to_string();
        }
        if let Some(t) = delta["type"].as_str().filter(|s| !s.is_empty()) {
            self.call_type = t.to_string();
        }
        if let Some(name) = delta["function"]["name"].as_str() {
            self.name.push_str(name);
        }
        if let Some(args) = delta["function"]["arguments"].as_str() {
            self.arguments.push_str(args);
        }
    }

    fn into_call(self) -> Option<ToolCall> {
        if self.name.is_empty() {
            return None;
        }
        Some(ToolCall {
            id: self.id,
            call_type: if self.call_type.is_empty() {
                "function".into()
            } else {
                self.call_type
            },
            function: FunctionCall {
                name: self.name,
                arguments: self.arguments,
            },
        })
    }
}

#[derive(Debug, Default)]
struct ReplyBuilder {
    content: String,
    reasoning: String,
    calls: BTreeMap<usize, PendingCall>,
}

impl ReplyBuilder {
    /// Returns `true` once the stream signalled its end.
    fn absorb(&mut self, chunk: StreamChunk) -> bool {
        match chunk.kind {
            StreamChunkKind::Content => self.content.push_str(&chunk.content),
            StreamChunkKind::Reasoning => self.reasoning.push_str(&chunk.content),
            StreamChunkKind::ToolCall => {
                let deltas: Vec<Value> = serde_json::from_str(&chunk.content).unwrap_or_default();
                for delta in &deltas {
                    let slot = delta["index"].as_u64().unwrap_or(0) as usize;
                    self.calls.entry(slot).or_default().merge(delta);
                }
            }
            StreamChunkKind::Done => return true,
            StreamChunkKind::Error => tracing::warn!(detail = %chunk.content, "error chunk in stream"),
        }
        false
    }

    fn finish(self) -> LlmResponse {
        LlmResponse {
            content: self.content,
            reasoning: self.reasoning,
            tool_calls: self.calls.into_values().filter_map(PendingCall::into_call).collect(),
        }
    }
}

/// Accumulates raw stream bytes and yields complete lines. Decoding waits for
/// the newline, so a multi-byte character split across network reads stays
/// intact.
#[derive(Debug, Default)]
struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, piece: &[u8]) {
        self.bytes.extend_from_slice(piece);
    }

    fn next_line(&mut self) -> Option<String> {
        let end = self.bytes.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.bytes.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

async fn read_stream(response: reqwest::Response) -> DeskBenchResult<LlmResponse> {
    let mut bytes = response.bytes_stream();
    let mut lines = LineBuffer::default();
    let mut reply = ReplyBuilder::default();

    'stream: while let Some(piece) = bytes.next().await {
        lines.push(&piece?);
        while let Some(line) = lines.next_line() {
            match sse_parser::parse_sse_line(&line) {
                Ok(Some(chunk)) => {
                    if reply.absorb(chunk) {
                        break 'stream;
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::debug!(error = %e, "skipping unparseable event"),
            }
        }
    }
    Ok(reply.finish())
}

#[derive(Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<RawToolCall>,
}

#[derive(Deserialize)]
struct RawToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default)]
    call_type: String,
    function: RawFunction,
}

#[derive(Deserialize)]
struct RawFunction {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: Option<String>,
}

async fn read_json(response: reqwest::Response) -> DeskBenchResult<LlmResponse> {
    let completion: Completion = response.json().await?;
    let Some(choice) = completion.choices.into_iter().next() else {
        return Err(DeskBenchError::LlmProvider("completion without choices".into()));
    };
    let msg = choice.message;
    let calls = msg.tool_calls.into_iter().map(|raw| PendingCall {
        id: raw.id,
        call_type: raw.call_type,
        name: raw.function.name,
        arguments: raw.function.arguments.unwrap_or_else(|| "{}".into()),
    });
    Ok(LlmResponse {
        content: msg.content.unwrap_or_default(),
        reasoning: msg.reasoning_content.unwrap_or_default(),
        tool_calls: calls.filter_map(PendingCall::into_call).collect(),
    })
}

/// The request body with every image part's URL replaced, for logging.
fn sanitized_body(body: &Value) -> String {
    let mut copy = body.clone();
    let parts = copy["messages"]
        .as_array_mut()
        .into_iter()
        .flatten()
        .filter_map(|m| m.get_mut("content").and_then(Value::as_array_mut))
        .flatten();
    for part in parts {
        if part["type"] == "image_url" {
            part["image_url"]["url"] = json!(IMAGE_PLACEHOLDER);
        }
    }
    copy.to_string()
}
