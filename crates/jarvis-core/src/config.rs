use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{JarvisError, SecretValue, optional_env};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const CONFIG_PATH_ENV: &str = "JARVIS_CONFIG";

/// Top-level configuration structure. Every section is optional in the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchConfig,
    pub generation: GenerationConfig,
    pub logging: LoggingConfig,
    /// File the configuration was read from; `None` when running on defaults.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Config {
    /// Search-provider credential, if the referenced environment variable is set.
    pub fn search_api_key(&self) -> Option<SecretValue> {
        optional_env(&self.search.api_key_env)
    }

    /// Generation-provider credential, if the referenced environment variable is set.
    pub fn generation_api_key(&self) -> Option<SecretValue> {
        optional_env(&self.generation.api_key_env)
    }
}

/// Helper to load configuration with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument (must exist).
    /// 2. `JARVIS_CONFIG` environment variable (must exist).
    /// 3. `config.toml` in the current working directory, if present.
    /// 4. Built-in defaults.
    pub fn load(path: Option<PathBuf>) -> Result<Config, JarvisError> {
        let config = Self::read(path)?;
        Self::report(&config);
        Ok(config)
    }

    /// Same resolution and validation as [`ConfigLoader::load`] without emitting
    /// any log events, so callers can install telemetry from `logging.level`
    /// and then call [`ConfigLoader::report`].
    pub fn read(path: Option<PathBuf>) -> Result<Config, JarvisError> {
        let config = match resolve_path(path) {
            Some(candidate) => {
                let raw = fs::read_to_string(&candidate)
                    .map_err(|err| JarvisError::config_io(candidate.clone(), err))?;
                let mut config = Self::parse(&raw)?;
                config.source = Some(candidate);
                config
            }
            None => Config::default(),
        };

        Self::validate(&config)?;
        Ok(config)
    }

    /// Log where the configuration came from and which credentials are unset.
    pub fn report(config: &Config) {
        match &config.source {
            Some(path) => debug!(path = %path.display(), "loaded configuration file"),
            None => debug!("no configuration file found; using defaults"),
        }

        // Missing credentials are reported by the stage that needs them; here we only warn.
        for var in [&config.search.api_key_env, &config.generation.api_key_env] {
            if optional_env(var).is_none() {
                warn!(variable = %var, "credential not set; dependent stages will fail");
            }
        }
    }

    /// Parse configuration from TOML text without touching the filesystem.
    pub fn parse(raw: &str) -> Result<Config, JarvisError> {
        toml::from_str(raw).map_err(|err| JarvisError::InvalidConfiguration(err.to_string()))
    }

    fn validate(config: &Config) -> Result<(), JarvisError> {
        if config.search.api_key_env.trim().is_empty() {
            return Err(JarvisError::InvalidConfiguration(
                "search.api_key_env must reference an environment variable".into(),
            ));
        }
        if config.generation.api_key_env.trim().is_empty() {
            return Err(JarvisError::InvalidConfiguration(
                "generation.api_key_env must reference an environment variable".into(),
            ));
        }
        if config.generation.model.trim().is_empty() {
            return Err(JarvisError::InvalidConfiguration(
                "generation.model must not be empty".into(),
            ));
        }
        if config.search.max_results == 0 {
            return Err(JarvisError::InvalidConfiguration(
                "search.max_results must be at least 1".into(),
            ));
        }
        if config.search.timeout_secs == 0 || config.generation.timeout_secs == 0 {
            return Err(JarvisError::InvalidConfiguration(
                "provider timeouts must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = path {
        return Some(path);
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return Some(PathBuf::from(from_env));
        }
    }

    let default = Path::new(DEFAULT_CONFIG_PATH);
    default.exists().then(|| default.to_path_buf())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key_env: String,
    pub search_depth: String,
    pub max_results: u8,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.tavily.com".into(),
            api_key_env: "TAVILY_API_KEY".into(),
            search_depth: "advanced".into(),
            max_results: 5,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com".into(),
            model: "gemini-2.5-flash".into(),
            api_key_env: "GOOGLE_API_KEY".into(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub usage_log_dir: PathBuf,
    pub retention_days: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            usage_log_dir: PathBuf::from("data/logs"),
            retention_days: 90,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn capture<T>(f: impl FnOnce() -> T) -> (T, String) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let value = tracing::subscriber::with_default(subscriber, f);
        (value, logs.text())
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = ConfigLoader::parse("").unwrap();
        assert_eq!(config.search.max_results, 5);
        assert_eq!(config.search.api_key_env, "TAVILY_API_KEY");
        assert_eq!(config.generation.model, "gemini-2.5-flash");
        assert_eq!(config.logging.retention_days, 90);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = ConfigLoader::parse(
            r#"
            [generation]
            model = "gemini-2.5-pro"

            [logging]
            retention_days = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.generation.model, "gemini-2.5-pro");
        assert_eq!(config.generation.api_key_env, "GOOGLE_API_KEY");
        assert_eq!(config.logging.retention_days, 0);
        assert_eq!(config.search.search_depth, "advanced");
    }

    #[test]
    fn explicit_path_is_loaded_and_validated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[search]\nmax_results = 0").unwrap();

        let err = ConfigLoader::load(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, JarvisError::InvalidConfiguration(_)));
    }

    #[test]
    fn missing_explicit_path_is_an_io_error() {
        let err = ConfigLoader::load(Some(PathBuf::from("/nonexistent/jarvis.toml"))).unwrap_err();
        assert!(matches!(err, JarvisError::ConfigIo { .. }));
    }

    #[test]
    fn read_is_silent_and_report_warns_about_unset_credentials() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[search]\napi_key_env = \"JARVIS_TEST_UNSET_SEARCH_KEY\"\n\n[logging]\nlevel = \"debug\""
        )
        .unwrap();

        let (config, logs) = capture(|| ConfigLoader::read(Some(file.path().to_path_buf())));
        let config = config.unwrap();
        assert!(logs.is_empty(), "read logged: {logs}");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.source.as_deref(), Some(file.path()));

        let ((), logs) = capture(|| ConfigLoader::report(&config));
        assert!(logs.contains("loaded configuration file"));
        assert!(logs.contains("JARVIS_TEST_UNSET_SEARCH_KEY"));
        assert!(logs.contains("credential not set"));
    }

    #[test]
    fn malformed_toml_is_rejected() {
        let err = ConfigLoader::parse("[search\nendpoint = 1").unwrap_err();
        assert!(matches!(err, JarvisError::InvalidConfiguration(_)));
    }
}
