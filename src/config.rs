//! Runtime configuration for the agent pipeline.
//!
//! Secrets come from the environment; everything else has defaults that a
//! YAML config file can override. Network timeouts are explicit here so a
//! hung provider call can never stall a pipeline stage indefinitely.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Fully resolved agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model alias or full id for completions.
    pub model: String,
    /// Max tokens per completion.
    pub max_tokens: u32,
    /// Anthropic API key.
    pub anthropic_api_key: String,
    /// GitHub token with repo scope.
    pub github_token: String,
    /// Override for the model API base URL (tests).
    pub llm_base_url: Option<String>,
    /// Override for the GitHub API base URL (tests).
    pub github_base_url: Option<String>,
    /// Per-call timeout for model completions.
    pub llm_timeout: Duration,
    /// Per-call timeout for repository API calls.
    pub github_timeout: Duration,
    /// Open a pull request after a successful commit.
    pub open_pull_request: bool,
    /// Largest file content `write_file` accepts, in bytes.
    pub max_file_size: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "sonnet".into(),
            max_tokens: 8192,
            anthropic_api_key: String::new(),
            github_token: String::new(),
            llm_base_url: None,
            github_base_url: None,
            llm_timeout: Duration::from_secs(120),
            github_timeout: Duration::from_secs(30),
            open_pull_request: true,
            max_file_size: 256 * 1024,
        }
    }
}

/// Optional overrides read from a YAML config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    model: Option<String>,
    max_tokens: Option<u32>,
    llm_timeout_secs: Option<u64>,
    github_timeout_secs: Option<u64>,
    open_pull_request: Option<bool>,
    max_file_size: Option<usize>,
}

impl AgentConfig {
    /// Build a config from environment variables alone.
    ///
    /// `ANTHROPIC_API_KEY` and `GITHUB_TOKEN` are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ConfigError::MissingEnv("ANTHROPIC_API_KEY"))?;
        let github_token =
            std::env::var("GITHUB_TOKEN").map_err(|_| ConfigError::MissingEnv("GITHUB_TOKEN"))?;

        Ok(Self {
            anthropic_api_key,
            github_token,
            ..Default::default()
        })
    }

    /// Build a config from the environment plus a YAML override file.
    pub fn from_env_and_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_env()?;
        let text = std::fs::read_to_string(path)?;
        let file: FileConfig = serde_yaml::from_str(&text)?;
        config.apply(file);
        Ok(config)
    }

    fn apply(&mut self, file: FileConfig) {
        if let Some(model) = file.model {
            self.model = model;
        }
        if let Some(max_tokens) = file.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(secs) = file.llm_timeout_secs {
            self.llm_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.github_timeout_secs {
            self.github_timeout = Duration::from_secs(secs);
        }
        if let Some(open) = file.open_pull_request {
            self.open_pull_request = open;
        }
        if let Some(size) = file.max_file_size {
            self.max_file_size = size;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let config = AgentConfig::default();
        assert_eq!(config.model, "sonnet");
        assert_eq!(config.llm_timeout, Duration::from_secs(120));
        assert_eq!(config.github_timeout, Duration::from_secs(30));
        assert!(config.open_pull_request);
    }

    #[test]
    fn file_overrides_apply() {
        let mut config = AgentConfig::default();
        let file: FileConfig = serde_yaml::from_str(
            "model: opus\nmax_tokens: 4096\ngithub_timeout_secs: 10\nopen_pull_request: false\n",
        )
        .unwrap();
        config.apply(file);

        assert_eq!(config.model, "opus");
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.github_timeout, Duration::from_secs(10));
        assert!(!config.open_pull_request);
    }

    #[test]
    fn unknown_file_keys_rejected() {
        let result: Result<FileConfig, _> = serde_yaml::from_str("modle: typo\n");
        assert!(result.is_err());
    }

    #[test]
    fn from_file_reads_yaml() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "model: haiku\nllm_timeout_secs: 60").unwrap();

        // from_env_and_file needs the env secrets; exercise the file half
        // directly to keep the test hermetic.
        let text = std::fs::read_to_string(tmp.path()).unwrap();
        let file: FileConfig = serde_yaml::from_str(&text).unwrap();
        let mut config = AgentConfig::default();
        config.apply(file);

        assert_eq!(config.model, "haiku");
        assert_eq!(config.llm_timeout, Duration::from_secs(60));
    }
}
