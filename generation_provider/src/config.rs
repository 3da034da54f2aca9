use std::time::Duration;

use crate::generator::OllamaConfig;

/// Default settings for a locally running Ollama-compatible server.
#[derive(Debug, Clone, Copy)]
pub struct OllamaDefaults {
    pub endpoint: &'static str,
    pub model: &'static str,
    pub timeout_secs: u64,
    pub temperature: f32,
}

pub const OLLAMA_DEFAULTS: OllamaDefaults = OllamaDefaults {
    endpoint: "http://127.0.0.1:11434",
    model: "llama3.2:1b",
    timeout_secs: 120,
    temperature: 0.0,
};

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: OLLAMA_DEFAULTS.endpoint.into(),
            model: OLLAMA_DEFAULTS.model.into(),
            timeout: Duration::from_secs(OLLAMA_DEFAULTS.timeout_secs),
            temperature: OLLAMA_DEFAULTS.temperature,
        }
    }
}
