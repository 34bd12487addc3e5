use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub listen_addr: String,
    pub max_concurrency: usize,
    pub config_path: Option<PathBuf>,
    pub usage_log: bool,
}

impl AppConfig {
    const DEFAULT_PORT: &'static str = "8000";
    const DEFAULT_MAX_CONCURRENCY: usize = 8;

    pub fn from_env() -> Result<Self> {
        let listen_addr = match env::var("JARVIS_API_ADDR") {
            Ok(addr) if !addr.trim().is_empty() => addr.trim().to_string(),
            _ => {
                let port = env::var("PORT").unwrap_or_else(|_| Self::DEFAULT_PORT.to_string());
                let port: u16 = port
                    .trim()
                    .parse()
                    .with_context(|| format!("PORT must be a valid port number, got `{port}`"))?;
                format!("0.0.0.0:{port}")
            }
        };

        let max_concurrency = env::var("JARVIS_MAX_CONCURRENT_REQUESTS")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(Self::DEFAULT_MAX_CONCURRENCY);

        let config_path = env::var("JARVIS_CONFIG")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        let usage_log = match env::var("JARVIS_USAGE_LOG") {
            Ok(value) => parse_bool(&value)
                .with_context(|| "JARVIS_USAGE_LOG must be true or false")?,
            Err(_) => true,
        };

        Ok(Self {
            listen_addr,
            max_concurrency,
            config_path,
            usage_log,
        })
    }
}

fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
