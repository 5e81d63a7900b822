use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{DeskBenchError, DeskBenchResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub eval: EvalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. If a role is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub roles: RolesConfig,
    /// Upper bound for one decision call, including streaming.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            active_provider: String::new(),
            providers: HashMap::new(),
            roles: RolesConfig::default(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    pub api_base: String,
    /// Default model for this provider (used when no role config exists).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Optional API key stored in config.toml (falls back to env var DESKBENCH_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Maps decision roles to specific provider+model combinations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Endpoint asked first for every decision.
    pub primary: Option<RoleEntry>,
    /// Endpoint asked once when the primary call fails.
    pub fallback: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    /// Model name sent to the API.
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    /// Overrides the provider-level temperature for this role.
    pub temperature: Option<f64>,
    /// Send the action catalog as function definitions.
    #[serde(default = "default_true")]
    pub use_tools: bool,
}

fn default_temperature() -> f64 {
    0.1
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_call_timeout() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub api_base: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub template: String,
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
    /// Lifetime of one sandbox; also the wall-clock ceiling of a trial.
    pub timeout_secs: u64,
    pub provision_timeout_secs: u64,
    /// Shell commands run once after provisioning, before the agent starts.
    pub setup_commands: Vec<String>,
}

pub const FIREFOX_POLICY_SETUP: &str = "sudo mkdir -p /usr/lib/firefox-esr/distribution && echo '{\"policies\":{\"OverrideFirstRunPage\":\"\",\"OverridePostUpdatePage\":\"\",\"DisableProfileImport\":true,\"DontCheckDefaultBrowser\":true}}' | sudo tee /usr/lib/firefox-esr/distribution/policies.json > /dev/null";

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:49983".into(),
            api_key: None,
            template: "desktop".into(),
            width: 1024,
            height: 768,
            dpi: 96,
            timeout_secs: 600,
            provision_timeout_secs: 120,
            setup_commands: vec![FIREFOX_POLICY_SETUP.into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_steps: usize,
    /// Pause between an action and its screenshot.
    pub settle_delay_ms: u64,
    /// Per-character delay used by `type_text`.
    pub type_delay_ms: u64,
    pub max_consecutive_failures: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 200,
            settle_delay_ms: 2500,
            type_delay_ms: 75,
            max_consecutive_failures: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub num_runs: usize,
    pub max_parallel_tasks: usize,
    /// Defaults to `num_runs` when unset.
    pub max_parallel_runs: Option<usize>,
    pub output_dir: PathBuf,
    /// Task name → natural-language goal.
    pub tasks: BTreeMap<String, String>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            num_runs: 3,
            max_parallel_tasks: 2,
            max_parallel_runs: None,
            output_dir: PathBuf::from("./eval_results"),
            tasks: default_tasks(),
        }
    }
}

fn default_tasks() -> BTreeMap<String, String> {
    [
        ("puppies", "Find me pictures of cute puppies"),
        ("gmaps", "Use Google Maps to find the Hugging Face HQ in Paris"),
        ("wiki", "Go to Wikipedia and find what happened on April 4th"),
        (
            "commute",
            "Find out the travel time by train from Bern to Basel on Google Maps",
        ),
        (
            "hf_space",
            "Go to Hugging Face Spaces and then find the Space flux.1 schnell. Use the space to generate an image of a GPU",
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl SandboxConfig {
    /// `DESKBENCH_SANDBOX_API_KEY` wins over the key stored in config.toml.
    pub fn resolved_api_key(&self) -> String {
        std::env::var("DESKBENCH_SANDBOX_API_KEY")
            .unwrap_or_else(|_| self.api_key.clone().unwrap_or_default())
    }
}

/// Places searched for `config.toml`, highest priority first.
fn config_candidates() -> Vec<PathBuf> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    let user_dir = dirs::config_dir().map(|d| d.join("deskbench"));
    [exe_dir, std::env::current_dir().ok(), user_dir]
        .into_iter()
        .flatten()
        .map(|dir| dir.join("config.toml"))
        .collect()
}

fn resolve_config_path() -> DeskBenchResult<PathBuf> {
    let candidates = config_candidates();
    match candidates.iter().find(|c| c.is_file()) {
        Some(found) => {
            tracing::debug!(path = %found.display(), "using config file");
            Ok(found.clone())
        }
        None => Err(DeskBenchError::Config(format!(
            "config.toml not found (searched {})",
            candidates
                .iter()
                .map(|c| c.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

pub fn load_config() -> DeskBenchResult<AppConfig> {
    let path = resolve_config_path()?;
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> DeskBenchResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(
        path = %path.display(),
        provider = %config.llm.active_provider,
        tasks = config.eval.tasks.len(),
        "config loaded"
    );
    Ok(config)
}
