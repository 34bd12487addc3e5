use std::collections::HashSet;
use std::env;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Wrapper around sensitive values to reduce accidental logging.
#[derive(Clone)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "***redacted***")
    }
}

/// Read an environment variable as a secret, treating blank values as unset.
pub fn optional_env(var: &str) -> Option<SecretValue> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Some(SecretValue(value)),
        _ => None,
    }
}

static REDACTION_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "api_key",
            Regex::new(r#"(?i)(api[_-]?key"?\s*[:=]\s*"?)([A-Za-z0-9\-_.+/]+)"#)
                .expect("invalid api_key regex"),
        ),
        (
            "query_key",
            Regex::new(r"(?i)([?&]key=)([^&\s]+)").expect("invalid query_key regex"),
        ),
        (
            "secret",
            Regex::new(r"(?i)(secret\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid secret regex"),
        ),
        (
            "bearer",
            Regex::new(r"(?i)(bearer\s+)([A-Za-z0-9\-_.+=/]+)").expect("invalid bearer regex"),
        ),
        (
            "sk_token",
            Regex::new(r"(sk-[A-Za-z0-9]{16,})").expect("invalid sk_token regex"),
        ),
    ]
});

/// Replace anything that looks like a credential with `[REDACTED]`, recording
/// the names of the patterns that fired.
pub fn redact(input: &str, redactions: &mut HashSet<String>) -> String {
    let mut output = input.to_string();
    for (name, regex) in REDACTION_PATTERNS.iter() {
        let mut matched = false;
        output = regex
            .replace_all(&output, |caps: &Captures| {
                matched = true;
                if caps.len() > 2 {
                    format!("{}[REDACTED]", &caps[1])
                } else {
                    "[REDACTED]".to_string()
                }
            })
            .to_string();
        if matched {
            redactions.insert((*name).to_string());
        }
    }
    output
}

/// Convenience wrapper around [`redact`] when the fired patterns do not matter.
pub fn redact_secrets(input: &str) -> String {
    redact(input, &mut HashSet::new())
}
