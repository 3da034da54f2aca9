use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Static metadata describing a generator instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorInfo {
    pub endpoint: String,
    pub model: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeneratorError {
    #[error("invalid generator configuration: {message}")]
    InvalidConfiguration { message: String },
    #[error("generator request failed: {message}")]
    Transport { message: String },
    #[error("generator returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("invalid generator response: {message}")]
    InvalidResponse { message: String },
}

/// Core interface for text generation: prompt in, text out.
pub trait Generator: Send + Sync {
    /// Generate at most `max_new_tokens` tokens continuing `prompt`.
    fn generate(&self, prompt: &str, max_new_tokens: usize) -> Result<String, GeneratorError>;
    fn info(&self) -> &GeneratorInfo;
}

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL of the server, e.g. `http://127.0.0.1:11434`.
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
    pub temperature: f32,
}

/// Blocking client for the `/api/generate` endpoint of an Ollama-compatible server.
#[derive(Debug)]
pub struct OllamaGenerator {
    info: GeneratorInfo,
    url: String,
    temperature: f32,
    client: Client,
}

impl OllamaGenerator {
    pub fn new(config: OllamaConfig) -> Result<Self, GeneratorError> {
        let endpoint = config.endpoint.trim().trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return Err(GeneratorError::InvalidConfiguration {
                message: "endpoint must not be empty".into(),
            });
        }
        if config.model.trim().is_empty() {
            return Err(GeneratorError::InvalidConfiguration {
                message: "model must not be empty".into(),
            });
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| GeneratorError::InvalidConfiguration {
                message: format!("failed to build HTTP client: {err}"),
            })?;

        Ok(Self {
            url: format!("{endpoint}/api/generate"),
            info: GeneratorInfo { endpoint, model: config.model },
            temperature: config.temperature,
            client,
        })
    }
}

impl Generator for OllamaGenerator {
    fn generate(&self, prompt: &str, max_new_tokens: usize) -> Result<String, GeneratorError> {
        let body = GenerateRequest {
            model: &self.info.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                num_predict: max_new_tokens,
                temperature: self.temperature,
            },
        };
        tracing::debug!(
            model = %self.info.model,
            max_new_tokens,
            prompt_chars = prompt.len(),
            "calling generator"
        );

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .map_err(|err| GeneratorError::Transport {
                message: format!("POST {}: {err}", self.url),
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .map_err(|err| GeneratorError::Transport {
                message: format!("failed to read response body: {err}"),
            })?;
        if !status.is_success() {
            return Err(GeneratorError::Http { status: status.as_u16(), body: text });
        }
        parse_generate_response(&text)
    }

    fn info(&self) -> &GeneratorInfo {
        &self.info
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_predict: usize,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn parse_generate_response(body: &str) -> Result<String, GeneratorError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|err| GeneratorError::InvalidResponse {
            message: format!("failed to parse response: {err}"),
        })?;
    if let Some(error) = parsed.error {
        return Err(GeneratorError::InvalidResponse { message: error });
    }
    parsed
        .response
        .map(|text| text.trim().to_string())
        .ok_or_else(|| GeneratorError::InvalidResponse {
            message: "missing `response` field".into(),
        })
}
