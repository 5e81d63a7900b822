use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, LlmConfig, RoleEntry};
use crate::errors::{DeskBenchError, DeskBenchResult};
use crate::executor::registry::ActionRegistry;
use crate::llm::decision::{DecisionModel, EndpointModel, ModelFactory};
use crate::llm::fallback::FallbackModel;
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::replay::ReplayModel;
use crate::llm::types::CallConfig;

/// Decision roles. `Fallback` is only consulted when configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Fallback,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::Fallback => "fallback",
        }
    }
}

/// A resolved role: which provider to call and how.
#[derive(Clone)]
pub struct RoleBinding {
    pub provider: Arc<dyn LlmProvider>,
    pub call: CallConfig,
    pub use_tools: bool,
}

/// Registry of all available LLM providers, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    pub fn new(llm_config: LlmConfig) -> Self {
        Self {
            providers: HashMap::new(),
            llm_config,
        }
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    fn provider(&self, id: &str) -> DeskBenchResult<Arc<dyn LlmProvider>> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| DeskBenchError::Config(format!("Provider '{id}' not registered")))
    }

    fn bind_entry(&self, role: Role, entry: &RoleEntry) -> DeskBenchResult<RoleBinding> {
        let provider = self.provider(&entry.provider).map_err(|_| {
            DeskBenchError::Config(format!(
                "Role '{}' references unknown provider '{}'",
                role.as_str(),
                entry.provider
            ))
        })?;
        let defaults = self.llm_config.providers.get(&entry.provider);
        let temperature = entry
            .temperature
            .unwrap_or_else(|| defaults.map(|p| p.temperature).unwrap_or(0.1));
        let max_tokens = defaults.map(|p| p.max_tokens).unwrap_or(4096);
        tracing::debug!(
            role = role.as_str(),
            provider = %entry.provider,
            model = %entry.model,
            stream = entry.stream,
            temperature = temperature,
            "resolved role config"
        );
        Ok(RoleBinding {
            provider,
            call: CallConfig {
                model: entry.model.clone(),
                stream: entry.stream,
                temperature,
                max_tokens,
            },
            use_tools: entry.use_tools,
        })
    }

    /// Resolves a role.
    ///
    /// Resolution order:
    /// 1. `[llm.roles.<role>]` in config.toml
    /// 2. Primary only: the active provider with its default model and temperature
    ///
    /// An unconfigured fallback resolves to `None`.
    pub fn binding_for_role(&self, role: Role) -> DeskBenchResult<Option<RoleBinding>> {
        let entry = match role {
            Role::Primary => self.llm_config.roles.primary.as_ref(),
            Role::Fallback => self.llm_config.roles.fallback.as_ref(),
        };
        if let Some(entry) = entry {
            return self.bind_entry(role, entry).map(Some);
        }
        if role == Role::Fallback {
            return Ok(None);
        }

        let active = &self.llm_config.active_provider;
        let provider = self.provider(active).map_err(|_| {
            DeskBenchError::Config(format!("Active provider '{active}' not found in registry"))
        })?;
        let entry = self.llm_config.providers.get(active);
        let (model, temperature, max_tokens) = entry
            .map(|p| (p.model.clone(), p.temperature, p.max_tokens))
            .unwrap_or_else(|| (String::new(), 0.1, 4096));
        tracing::debug!(
            provider = %active,
            model = %model,
            "primary role not configured, using active provider"
        );
        Ok(Some(RoleBinding {
            provider,
            call: CallConfig {
                model,
                stream: false,
                temperature,
                max_tokens,
            },
            use_tools: true,
        }))
    }

    /// Factory for the per-trial decision model: the primary endpoint, wrapped
    /// in a [`FallbackModel`] when a fallback role is configured.
    pub fn model_factory(&self, actions: Arc<ActionRegistry>) -> DeskBenchResult<ModelFactory> {
        let primary = self
            .binding_for_role(Role::Primary)?
            .ok_or_else(|| DeskBenchError::Config("no primary decision model configured".into()))?;
        let fallback = self.binding_for_role(Role::Fallback)?;
        let timeout = Duration::from_secs(self.llm_config.call_timeout_secs);

        tracing::info!(
            primary = %format!("{}/{}", primary.provider.name(), primary.call.model),
            fallback = ?fallback.as_ref().map(|f| format!("{}/{}", f.provider.name(), f.call.model)),
            timeout_secs = timeout.as_secs(),
            "decision model configured"
        );

        let endpoint = move |b: &RoleBinding, actions: &Arc<ActionRegistry>| -> Box<dyn DecisionModel> {
            Box::new(EndpointModel::new(
                b.provider.clone(),
                b.call.clone(),
                actions.clone(),
                b.use_tools,
                timeout,
            ))
        };

        Ok(Arc::new(move || {
            let p = endpoint(&primary, &actions);
            Ok(match &fallback {
                Some(f) => Box::new(FallbackModel::new(p, endpoint(f, &actions))) as Box<dyn DecisionModel>,
                None => p,
            })
        }))
    }

    /// Build a registry from the loaded app config.
    /// API keys are read from environment variables named `DESKBENCH_<ID>_API_KEY`.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::new(config.llm.clone());
        for (id, entry) in &config.llm.providers {
            let api_key = std::env::var(format!("DESKBENCH_{}_API_KEY", id.to_uppercase()))
                .unwrap_or_else(|_| entry.api_key.clone().unwrap_or_default());
            let provider = OpenAiCompatibleProvider::new(id.clone(), entry.api_base.clone(), api_key);
            registry.register(Arc::new(provider));
        }
        registry
    }
}

/// Factory replaying a recorded trial; every trial gets a fresh cursor.
pub fn replay_factory(path: &std::path::Path) -> DeskBenchResult<ModelFactory> {
    let recording = Arc::new(ReplayModel::load(path)?);
    Ok(Arc::new(move || {
        Ok(Box::new(recording.restart()) as Box<dyn DecisionModel>)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderEntry, RolesConfig};

    fn provider_entry(model: &str) -> ProviderEntry {
        ProviderEntry {
            display_name: model.into(),
            api_base: "http://localhost:1/v1/chat/completions".into(),
            model: model.into(),
            temperature: 0.3,
            max_tokens: 1024,
            api_key: Some("k".into()),
        }
    }

    fn config(roles: RolesConfig) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.llm.active_provider = "main".into();
        cfg.llm.providers.insert("main".into(), provider_entry("main-model"));
        cfg.llm.providers.insert("backup".into(), provider_entry("backup-model"));
        cfg.llm.roles = roles;
        cfg
    }

    fn role(provider: &str, model: &str) -> RoleEntry {
        RoleEntry {
            provider: provider.into(),
            model: model.into(),
            stream: true,
            temperature: None,
            use_tools: false,
        }
    }

    #[test]
    fn primary_defaults_to_active_provider() {
        let reg = ProviderRegistry::from_config(&config(RolesConfig::default()));
        assert_eq!(reg.list_names(), vec!["backup".to_string(), "main".to_string()]);
        let b = reg.binding_for_role(Role::Primary).expect("resolve").expect("primary");
        assert_eq!(b.provider.name(), "main");
        assert_eq!(b.call.model, "main-model");
        assert_eq!(b.call.max_tokens, 1024);
        assert!(reg.binding_for_role(Role::Fallback).expect("resolve").is_none());
    }

    #[test]
    fn roles_override_provider_defaults() {
        let reg = ProviderRegistry::from_config(&config(RolesConfig {
            primary: Some(role("main", "vl-large")),
            fallback: Some(role("backup", "vl-small")),
        }));
        let p = reg.binding_for_role(Role::Primary).expect("resolve").expect("primary");
        assert_eq!(p.call.model, "vl-large");
        assert!(p.call.stream);
        assert!((p.call.temperature - 0.3).abs() < f64::EPSILON);
        let f = reg.binding_for_role(Role::Fallback).expect("resolve").expect("fallback");
        assert_eq!(f.provider.name(), "backup");
    }

    #[test]
    fn unknown_role_provider_is_config_error() {
        let reg = ProviderRegistry::from_config(&config(RolesConfig {
            primary: Some(role("nope", "m")),
            fallback: None,
        }));
        assert!(matches!(
            reg.binding_for_role(Role::Primary),
            Err(DeskBenchError::Config(_))
        ));
    }

    #[test]
    fn factory_wraps_fallback_when_configured() {
        let actions = Arc::new(ActionRegistry::standard(0));
        let single = ProviderRegistry::from_config(&config(RolesConfig::default()))
            .model_factory(actions.clone())
            .expect("factory");
        assert_eq!(single().expect("model").name(), "main/main-model");

        let pair = ProviderRegistry::from_config(&config(RolesConfig {
            primary: Some(role("main", "a")),
            fallback: Some(role("backup", "b")),
        }))
        .model_factory(actions)
        .expect("factory");
        assert_eq!(pair().expect("model").name(), "main/a (fallback backup/b)");
    }
}
