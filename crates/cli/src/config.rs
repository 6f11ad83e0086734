use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use residencias_rag::LlmProvider;
use serde::Deserialize;

pub const DEFAULT_CONFIG: &str = "residencias.toml";

#[derive(Debug, Default, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct BackendConfig {
    pub url: Option<String>,
    pub key: Option<String>,
    /// JSON snapshot served from memory instead of the remote tables.
    pub snapshot: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: Option<String>,
    pub routing_model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub phrase_answers: bool,
    pub fallback: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            routing_model: None,
            api_key: None,
            base_url: None,
            phrase_answers: true,
            fallback: true,
        }
    }
}

impl LlmConfig {
    pub fn provider(&self) -> Result<LlmProvider> {
        LlmProvider::from_str(&self.provider)
            .ok_or_else(|| anyhow!(format!("unknown provider {}", self.provider)))
    }

    pub fn model_name(&self, provider: LlmProvider) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| default_llm_model(provider).to_string())
    }

    pub fn routing_model_name(&self, provider: LlmProvider) -> String {
        self.routing_model
            .clone()
            .unwrap_or_else(|| self.model_name(provider))
    }
}

pub fn default_llm_model(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "gpt-4.1-mini",
        LlmProvider::Deepseek => "deepseek-chat",
        LlmProvider::Local => "local",
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&contents).map_err(|e| anyhow!("invalid config: {e}"))
}

impl AppConfig {
    /// Environment values win over the file. `lookup` is `std::env::var` outside tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(url) = lookup("SUPABASE_URL") {
            self.backend.url = Some(url);
        }
        if let Some(key) = lookup("SUPABASE_KEY") {
            self.backend.key = Some(key);
        }
        if let Some(provider) = lookup("RESIDENCIAS_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Some(model) = lookup("RESIDENCIAS_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(model) = lookup("RESIDENCIAS_ROUTING_MODEL") {
            self.llm.routing_model = Some(model);
        }
        if let Some(flag) = lookup("RESIDENCIAS_VERBOSE") {
            self.verbose = matches!(flag.trim(), "1" | "true" | "yes");
        }
        if self.llm.api_key.is_none() {
            let var = LlmProvider::from_str(&self.llm.provider).and_then(|p| p.api_key_var());
            self.llm.api_key = var.and_then(lookup);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_file_gives_defaults() {
        let config = load_config(Path::new("does/not/exist.toml")).unwrap();
        assert_eq!(config.llm.provider, "openai");
        assert!(config.llm.phrase_answers);
        assert!(config.backend.url.is_none());
    }

    #[test]
    fn file_then_environment() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[backend]\nurl = \"https://db.example\"\nkey = \"file-key\"\n\n[llm]\nprovider = \"deepseek\"\nphrase_answers = false"
        )
        .unwrap();
        let mut config = load_config(file.path()).unwrap();
        assert_eq!(config.backend.url.as_deref(), Some("https://db.example"));
        assert!(!config.llm.phrase_answers);
        assert!(config.llm.fallback);

        let env: HashMap<&str, &str> = HashMap::from([
            ("SUPABASE_KEY", "env-key"),
            ("DEEPSEEK_API_KEY", "sk-deep"),
            ("OPENAI_API_KEY", "sk-open"),
            ("RESIDENCIAS_VERBOSE", "1"),
            ("RESIDENCIAS_ROUTING_MODEL", ""),
        ]);
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.backend.key.as_deref(), Some("env-key"));
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-deep"));
        assert!(config.verbose);
        assert!(config.llm.routing_model.is_none());
        let provider = config.llm.provider().unwrap();
        assert_eq!(config.llm.routing_model_name(provider), "deepseek-chat");
    }

    #[test]
    fn bad_provider_and_bad_toml() {
        let config = LlmConfig {
            provider: "gemini".to_string(),
            ..LlmConfig::default()
        };
        assert!(config.provider().is_err());
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[llm\nprovider = 3").unwrap();
        assert!(load_config(file.path()).is_err());
    }
}
