use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransportConfig {
    /// WebSocket endpoint of the agent orchestrator.
    pub url: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8082".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackendsConfig {
    /// HTTP endpoint that executes graph queries and returns normalized rows.
    pub query_url: String,
    /// HTTP endpoint that builds code fragments into live previews.
    pub sandbox_url: String,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            query_url: "http://127.0.0.1:8090/api/query".to_string(),
            sandbox_url: "http://127.0.0.1:8090/api/sandbox".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub directory: Option<String>,
    pub retention_days: Option<u64>,
}

impl Config {
    /// Load from the first existing candidate path, falling back to
    /// defaults. Environment variables override file values so a session
    /// can be pointed at another stack without editing config.
    pub fn load_with_path(explicit: Option<&std::path::Path>) -> Result<(Self, Option<PathBuf>)> {
        let mut candidates = Vec::new();

        if let Some(path) = explicit {
            candidates.push(path.to_path_buf());
        }
        if let Ok(explicit) = std::env::var("ADSCOPE_CONFIG") {
            candidates.push(PathBuf::from(explicit));
        }
        candidates.push(PathBuf::from("adscope.toml"));
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("adscope").join("adscope.toml"));
        }

        let (mut config, path) = match candidates.into_iter().find(|p| p.exists()) {
            Some(path) => (Self::load_from(&path)?, Some(path)),
            None => (Config::default(), None),
        };
        config.apply_env_overrides();
        Ok((config, path))
    }

    fn load_from(path: &std::path::Path) -> Result<Config> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("ADSCOPE_WS_URL") {
            self.transport.url = url;
        }
        if let Ok(url) = std::env::var("ADSCOPE_QUERY_URL") {
            self.backends.query_url = url;
        }
        if let Ok(url) = std::env::var("ADSCOPE_SANDBOX_URL") {
            self.backends.sandbox_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ws = self.transport.url.trim().to_lowercase();
        if !ws.starts_with("ws://") && !ws.starts_with("wss://") {
            anyhow::bail!(
                "Transport URL must start with ws:// or wss://, got: {}",
                self.transport.url
            );
        }
        for (name, url) in [
            ("query backend", &self.backends.query_url),
            ("sandbox backend", &self.backends.sandbox_url),
        ] {
            let lower = url.trim().to_lowercase();
            if !lower.starts_with("http://") && !lower.starts_with("https://") {
                anyhow::bail!("{name} URL must start with http:// or https://, got: {url}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn bad_scheme_fails_validation() {
        let mut config = Config::default();
        config.transport.url = "http://localhost:8082".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.backends.query_url = "ftp://somewhere".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_config_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adscope.toml");
        std::fs::write(
            &path,
            "[backends]\nquery_url = \"http://10.0.0.5/api/query\"\nsandbox_url = \"http://10.0.0.5/api/sandbox\"\n",
        )
        .unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.backends.query_url, "http://10.0.0.5/api/query");
        assert_eq!(config.transport.url, "ws://localhost:8082");
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [transport]
            url = "wss://agents.example.com/chat"
            "#,
        )
        .unwrap();
        assert_eq!(config.transport.url, "wss://agents.example.com/chat");
        assert!(config.backends.query_url.starts_with("http://127.0.0.1"));
    }
}
