//! Relay configuration.
//!
//! Loaded once at startup from an optional JSON startup file, with
//! environment variables (a `.env` file is honoured) filling the gaps, and
//! then shared read-only behind an `Arc`. API keys never appear in source.

use crate::consts;
use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use voice_relay_types::BackendType;

/// Everything an adapter needs to reach its backend. Immutable once a
/// session starts.
#[derive(Debug)]
pub struct AdapterConfig {
    pub backend_type: BackendType,
    pub api_key: SecretString,
    /// VoiceFlow version identifier, "production" unless configured.
    pub version_id: String,
    pub system_prompt: String,
    pub sample_rate: u32,
    /// Upper bound for connecting and completing the backend handshake.
    pub connect_timeout: Duration,
    pub llm_url: String,
    pub llm_model: String,
    /// Send client audio to the LLM backend as binary frames instead of
    /// `input_audio_buffer.append` events.
    pub llm_binary_audio: bool,
    /// Where Retell's custom LLM websocket connects in.
    pub retell_listen: SocketAddr,
    pub voiceflow_url: String,
    /// Upper bound for one VoiceFlow interact request once streaming.
    pub request_timeout: Duration,
    /// Sent to the client when a VoiceFlow launch produced no text.
    pub greeting: String,
    /// Sent to the client when a VoiceFlow interact request fails.
    pub error_reply: String,
}

impl AdapterConfig {
    /// A config for `backend_type` with every option at its default.
    pub fn new(backend_type: BackendType, api_key: &str) -> Self {
        Self {
            backend_type,
            api_key: SecretString::from(api_key.to_string()),
            version_id: consts::DEFAULT_VERSION_ID.to_string(),
            system_prompt: String::new(),
            sample_rate: consts::DEFAULT_SAMPLE_RATE,
            connect_timeout: consts::DEFAULT_CONNECT_TIMEOUT,
            llm_url: consts::LLM_BASE_URL.to_string(),
            llm_model: consts::LLM_DEFAULT_MODEL.to_string(),
            llm_binary_audio: false,
            retell_listen: consts::RETELL_DEFAULT_LISTEN
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8766))),
            voiceflow_url: consts::VOICEFLOW_BASE_URL.to_string(),
            request_timeout: consts::DEFAULT_REQUEST_TIMEOUT,
            greeting: consts::DEFAULT_GREETING.to_string(),
            error_reply: consts::DEFAULT_ERROR_REPLY.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_llm_url(mut self, url: &str) -> Self {
        self.llm_url = url.to_string();
        self
    }

    pub fn with_retell_listen(mut self, addr: SocketAddr) -> Self {
        self.retell_listen = addr;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_voiceflow_url(mut self, url: &str) -> Self {
        self.voiceflow_url = url.to_string();
        self
    }
}

/// Process-wide configuration handed to the session manager.
#[derive(Debug)]
pub struct RelayConfig {
    pub listen: SocketAddr,
    /// Capacity of each per-direction session queue.
    pub queue_capacity: usize,
    /// How long a closing session waits for its loops before aborting them.
    pub shutdown_grace: Duration,
    /// `tracing` filter directives, `RUST_LOG` syntax.
    pub log_filter: String,
    pub adapter: Arc<AdapterConfig>,
}

/// Values given on the command line. They win over the file and the
/// environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub port: Option<u16>,
    pub backend: Option<BackendType>,
}

impl RelayConfig {
    pub fn new(adapter: AdapterConfig) -> Self {
        Self {
            listen: consts::DEFAULT_LISTEN
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8765))),
            queue_capacity: consts::DEFAULT_QUEUE_CAPACITY,
            shutdown_grace: consts::DEFAULT_SHUTDOWN_GRACE,
            log_filter: "info".to_string(),
            adapter: Arc::new(adapter),
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Loads configuration from `file` when one is given, with the
    /// environment filling in whatever the file leaves out.
    ///
    /// *   `RELAY_LISTEN`: Address to bind the client websocket to. Defaults to "0.0.0.0:8765".
    /// *   `RELAY_BACKEND`: "llm", "retell" or "voiceflow". Defaults to "llm".
    /// *   `RELAY_API_KEY`: Backend key. Falls back to `OPENAI_API_KEY`, `RETELL_API_KEY`
    ///     or `VOICEFLOW_API_KEY` depending on the backend.
    /// *   `VOICEFLOW_VERSION_ID`: (Optional) Defaults to "production".
    /// *   `RELAY_SYSTEM_PROMPT`, `RELAY_SAMPLE_RATE`, `RELAY_CONNECT_TIMEOUT_MS`,
    ///     `RELAY_QUEUE_CAPACITY`, `RELAY_REQUEST_TIMEOUT_MS`, `RELAY_GREETING`,
    ///     `RELAY_ERROR_REPLY`: (Optional)
    /// *   `RETELL_LISTEN`: (Optional) Address Retell connects in to. Defaults to "127.0.0.1:8766".
    /// *   `LLM_URL`, `LLM_MODEL`, `LLM_BINARY_AUDIO`, `VOICEFLOW_URL`: (Optional)
    /// *   `RUST_LOG`: (Optional) The logging filter. Defaults to "info".
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(file, &Overrides::default())
    }

    /// Like [`RelayConfig::load`], with command line values applied last.
    pub fn load_with(file: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let file = match file {
            Some(path) => ConfigFile::read(path)?,
            None => ConfigFile::default(),
        };
        let env = ConfigFile::from_lookup(|key| std::env::var(key).ok())?;
        let mut merged = ConfigFile::layered(file, env);
        if let Some(backend) = overrides.backend {
            merged.backend = Some(backend);
        }
        let mut config = merged.resolve()?;
        if let Some(port) = overrides.port {
            config.listen.set_port(port);
        }
        Ok(config)
    }

    /// Loads configuration from the environment only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),
}

/// The startup file format. Every field is optional; anything left out falls
/// back to the environment and then to the defaults.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    listen: Option<String>,
    backend: Option<BackendType>,
    api_key: Option<String>,
    version_id: Option<String>,
    system_prompt: Option<String>,
    sample_rate: Option<u32>,
    connect_timeout_ms: Option<u64>,
    queue_capacity: Option<usize>,
    llm_url: Option<String>,
    llm_model: Option<String>,
    llm_binary_audio: Option<bool>,
    retell_listen: Option<String>,
    voiceflow_url: Option<String>,
    request_timeout_ms: Option<u64>,
    greeting: Option<String>,
    error_reply: Option<String>,
    log_filter: Option<String>,
    #[serde(skip)]
    fallback_keys: FallbackKeys,
}

/// Backend specific key variables, consulted after the generic one.
#[derive(Debug, Default)]
struct FallbackKeys {
    openai: Option<String>,
    retell: Option<String>,
    voiceflow: Option<String>,
}

fn parse_var<T: std::str::FromStr>(key: &str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
        })
        .transpose()
}

impl ConfigFile {
    fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            listen: lookup("RELAY_LISTEN"),
            backend: parse_var("RELAY_BACKEND", lookup("RELAY_BACKEND"))?,
            api_key: lookup("RELAY_API_KEY"),
            version_id: lookup("VOICEFLOW_VERSION_ID"),
            system_prompt: lookup("RELAY_SYSTEM_PROMPT"),
            sample_rate: parse_var("RELAY_SAMPLE_RATE", lookup("RELAY_SAMPLE_RATE"))?,
            connect_timeout_ms: parse_var("RELAY_CONNECT_TIMEOUT_MS", lookup("RELAY_CONNECT_TIMEOUT_MS"))?,
            queue_capacity: parse_var("RELAY_QUEUE_CAPACITY", lookup("RELAY_QUEUE_CAPACITY"))?,
            llm_url: lookup("LLM_URL"),
            llm_model: lookup("LLM_MODEL"),
            llm_binary_audio: parse_var("LLM_BINARY_AUDIO", lookup("LLM_BINARY_AUDIO"))?,
            retell_listen: lookup("RETELL_LISTEN"),
            voiceflow_url: lookup("VOICEFLOW_URL"),
            request_timeout_ms: parse_var("RELAY_REQUEST_TIMEOUT_MS", lookup("RELAY_REQUEST_TIMEOUT_MS"))?,
            greeting: lookup("RELAY_GREETING"),
            error_reply: lookup("RELAY_ERROR_REPLY"),
            log_filter: lookup("RUST_LOG"),
            fallback_keys: FallbackKeys {
                openai: lookup("OPENAI_API_KEY"),
                retell: lookup("RETELL_API_KEY"),
                voiceflow: lookup("VOICEFLOW_API_KEY"),
            },
        })
    }

    /// The startup file wins; the environment fills the gaps.
    fn layered(file: ConfigFile, env: ConfigFile) -> ConfigFile {
        env.overlay(file)
    }

    /// Values set in `top` win over the ones in `self`.
    fn overlay(self, top: ConfigFile) -> ConfigFile {
        ConfigFile {
            listen: top.listen.or(self.listen),
            backend: top.backend.or(self.backend),
            api_key: top.api_key.or(self.api_key),
            version_id: top.version_id.or(self.version_id),
            system_prompt: top.system_prompt.or(self.system_prompt),
            sample_rate: top.sample_rate.or(self.sample_rate),
            connect_timeout_ms: top.connect_timeout_ms.or(self.connect_timeout_ms),
            queue_capacity: top.queue_capacity.or(self.queue_capacity),
            llm_url: top.llm_url.or(self.llm_url),
            llm_model: top.llm_model.or(self.llm_model),
            llm_binary_audio: top.llm_binary_audio.or(self.llm_binary_audio),
            retell_listen: top.retell_listen.or(self.retell_listen),
            voiceflow_url: top.voiceflow_url.or(self.voiceflow_url),
            request_timeout_ms: top.request_timeout_ms.or(self.request_timeout_ms),
            greeting: top.greeting.or(self.greeting),
            error_reply: top.error_reply.or(self.error_reply),
            log_filter: top.log_filter.or(self.log_filter),
            fallback_keys: FallbackKeys {
                openai: top.fallback_keys.openai.or(self.fallback_keys.openai),
                retell: top.fallback_keys.retell.or(self.fallback_keys.retell),
                voiceflow: top.fallback_keys.voiceflow.or(self.fallback_keys.voiceflow),
            },
        }
    }

    fn resolve(self) -> Result<RelayConfig, ConfigError> {
        let backend = self.backend.unwrap_or(BackendType::LlmDirect);

        let fallback = match backend {
            BackendType::LlmDirect => ("OPENAI_API_KEY", self.fallback_keys.openai),
            BackendType::Retell => ("RETELL_API_KEY", self.fallback_keys.retell),
            BackendType::VoiceFlow => ("VOICEFLOW_API_KEY", self.fallback_keys.voiceflow),
        };
        let api_key = self.api_key.or(fallback.1).filter(|k| !k.trim().is_empty());

        // Retell is reached on a local integration socket and may run without a key.
        let api_key = match (backend, api_key) {
            (_, Some(key)) => key,
            (BackendType::Retell, None) => String::new(),
            (_, None) => {
                return Err(ConfigError::MissingVar(format!(
                    "RELAY_API_KEY or {} must be set for the '{}' backend",
                    fallback.0, backend
                )))
            }
        };

        let mut adapter = AdapterConfig::new(backend, &api_key);
        if let Some(version_id) = self.version_id.filter(|v| !v.trim().is_empty()) {
            adapter.version_id = version_id;
        }
        if let Some(prompt) = self.system_prompt {
            adapter.system_prompt = prompt;
        }
        if let Some(rate) = self.sample_rate {
            if rate == 0 {
                return Err(ConfigError::InvalidValue("sample_rate".to_string(), "must be positive".to_string()));
            }
            adapter.sample_rate = rate;
        }
        if let Some(ms) = self.connect_timeout_ms {
            adapter.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(url) = self.llm_url {
            adapter.llm_url = url;
        }
        if let Some(model) = self.llm_model {
            adapter.llm_model = model;
        }
        if let Some(binary) = self.llm_binary_audio {
            adapter.llm_binary_audio = binary;
        }
        if let Some(listen) = self.retell_listen {
            adapter.retell_listen = listen
                .parse::<SocketAddr>()
                .map_err(|e| ConfigError::InvalidValue("retell_listen".to_string(), e.to_string()))?;
        }
        if let Some(url) = self.voiceflow_url {
            adapter.voiceflow_url = url;
        }
        if let Some(ms) = self.request_timeout_ms {
            adapter.request_timeout = Duration::from_millis(ms);
        }
        if let Some(greeting) = self.greeting {
            adapter.greeting = greeting;
        }
        if let Some(reply) = self.error_reply {
            adapter.error_reply = reply;
        }

        let mut config = RelayConfig::new(adapter);
        if let Some(listen) = self.listen {
            config.listen = listen
                .parse::<SocketAddr>()
                .map_err(|e| ConfigError::InvalidValue("listen".to_string(), e.to_string()))?;
        }
        if let Some(capacity) = self.queue_capacity {
            if capacity == 0 {
                return Err(ConfigError::InvalidValue(
                    "queue_capacity".to_string(),
                    "must be positive".to_string(),
                ));
            }
            config.queue_capacity = capacity;
        }
        if let Some(filter) = self.log_filter {
            config.log_filter = filter;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_llm_backend_with_openai_key() {
        let config = ConfigFile::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")]))
            .unwrap()
            .resolve()
            .unwrap();

        assert_eq!(config.adapter.backend_type, BackendType::LlmDirect);
        assert_eq!(config.adapter.api_key.expose_secret(), "sk-test");
        assert_eq!(config.adapter.version_id, "production");
        assert_eq!(config.adapter.sample_rate, 24000);
        assert_eq!(config.listen.port(), 8765);
    }

    #[test]
    fn voiceflow_requires_a_key() {
        let err = ConfigFile::from_lookup(lookup(&[("RELAY_BACKEND", "voiceflow")]))
            .unwrap()
            .resolve()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(_)));
    }

    #[test]
    fn retell_runs_without_a_key() {
        let config = ConfigFile::from_lookup(lookup(&[("RELAY_BACKEND", "retell")]))
            .unwrap()
            .resolve()
            .unwrap();
        assert_eq!(config.adapter.backend_type, BackendType::Retell);
        assert_eq!(config.adapter.api_key.expose_secret(), "");
    }

    #[test]
    fn rejects_invalid_numbers() {
        let err = ConfigFile::from_lookup(lookup(&[("RELAY_SAMPLE_RATE", "fast")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key, _) if key == "RELAY_SAMPLE_RATE"));
    }

    #[test]
    fn file_overrides_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "backend": "voiceflow",
                "api_key": "vf-file",
                "version_id": "development",
                "connect_timeout_ms": 2500,
                "listen": "127.0.0.1:9000"
            }}"#
        )
        .unwrap();

        let file = ConfigFile::read(file.path()).unwrap();
        let env = ConfigFile::from_lookup(lookup(&[
            ("RELAY_API_KEY", "vf-env"),
            ("RELAY_BACKEND", "retell"),
            ("RELAY_GREETING", "Hello from env"),
            ("RETELL_LISTEN", "127.0.0.1:9100"),
            ("RELAY_REQUEST_TIMEOUT_MS", "750"),
        ]))
        .unwrap();
        let config = ConfigFile::layered(file, env).resolve().unwrap();

        assert_eq!(config.adapter.backend_type, BackendType::VoiceFlow);
        assert_eq!(config.adapter.api_key.expose_secret(), "vf-file");
        assert_eq!(config.adapter.greeting, "Hello from env");
        assert_eq!(config.adapter.retell_listen, "127.0.0.1:9100".parse::<SocketAddr>().unwrap());
        assert_eq!(config.adapter.request_timeout, Duration::from_millis(750));
        assert_eq!(config.adapter.version_id, "development");
        assert_eq!(config.adapter.connect_timeout, Duration::from_millis(2500));
        assert_eq!(config.listen, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"bakend": "retell"}}"#).unwrap();
        assert!(matches!(ConfigFile::read(file.path()), Err(ConfigError::Parse(..))));
    }
}
