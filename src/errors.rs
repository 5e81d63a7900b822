use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeskBenchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    /// Unknown tool name or arguments that do not fit the tool's schema.
    /// Never retried and never reaches the desktop.
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Screenshot could not be taken, decoded or persisted.
    #[error("Capture failure: {0}")]
    CaptureFailure(String),

    /// Primary and fallback decision endpoints both failed.
    #[error("Decision model unavailable: {last_error}")]
    ModelUnavailable { last_error: String },

    #[error("Sandbox provisioning failed: {0}")]
    Provisioning(String),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Evaluation error: {0}")]
    Eval(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

impl DeskBenchError {
    /// Errors that end a trial. `InvalidAction` only fails the current step.
    pub fn is_trial_fatal(&self) -> bool {
        !matches!(self, DeskBenchError::InvalidAction(_))
    }
}

pub type DeskBenchResult<T> = Result<T, DeskBenchError>;
