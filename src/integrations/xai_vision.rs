use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::{
    config::Config,
    constants::{TRANSCRIPTION_TEMPERATURE, TRANSCRIPTION_TIMEOUT_SECS},
    error::{AppError, Result},
    models::RawGrid,
};

const SYSTEM_PROMPT: &str = "Ensure the transcription is precise and follows the grid structure. \
Ignore the color of the background, whether blue or red. \
Use numbers (1-10) for piece ranks, 'B' for bombs, and 'F' for the flag. \
Double-check your results, as mismatches can happen.";

const USER_PROMPT: &str = r#"Transcribe a Stratego setup and place it in a JSON object, like in the example below.

Example:
{
  "1": ["6", "6", "2", "2", "2", "7", "2", "2", "6", "6"],
  "2": ["4", "2", "9", "2", "5", "2", "10", "4", "3", "8"],
  "3": ["5", "4", "B", "B", "8", "1", "7", "B", "B", "5"],
  "4": ["7", "4", "3", "3", "3", "5", "B", "F", "B", "3"]
}"#;

/// Turns a picture of a setup into a raw grid. The output is untrusted and
/// still has to pass the shape and consistency checks.
#[async_trait]
pub trait SetupTranscriber: Send + Sync {
    /// Whether `transcribe` can reach a backend at all.
    fn is_configured(&self) -> bool;

    async fn transcribe(&self, image: &[u8], mime_type: &str) -> Result<RawGrid>;
}

#[derive(Clone, Debug)]
pub struct XaiVisionClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: Client,
}

impl XaiVisionClient {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(TRANSCRIPTION_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            base_url,
            api_key,
            model,
            client,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.xai_base_url.clone(),
            config.xai_api_key.clone(),
            config.xai_vision_model.clone(),
        )
    }

    fn request_body(&self, image: &[u8], mime_type: &str) -> Value {
        let data_url = format!("data:{};base64,{}", mime_type, STANDARD.encode(image));
        json!({
            "model": self.model,
            "temperature": TRANSCRIPTION_TEMPERATURE,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": USER_PROMPT },
                        { "type": "image_url", "image_url": { "url": data_url, "detail": "high" } }
                    ]
                }
            ]
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl SetupTranscriber for XaiVisionClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some() && !self.base_url.trim().is_empty()
    }

    async fn transcribe(&self, image: &[u8], mime_type: &str) -> Result<RawGrid> {
        let api_key = match (&self.api_key, self.is_configured()) {
            (Some(key), true) => key,
            _ => {
                return Err(AppError::Transcription(
                    "Transcription service is not configured".to_string(),
                ))
            }
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        tracing::info!(model = %self.model, bytes = image.len(), "Requesting setup transcription");

        let resp = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&self.request_body(image, mime_type))
            .send()
            .await
            .map_err(|e| AppError::Transcription(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Transcription(format!(
                "Vision API returned {}: {}",
                status, body
            )));
        }

        let payload: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| AppError::Transcription(e.to_string()))?;
        let content = payload
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| AppError::Transcription("Vision API returned no content".to_string()))?;

        tracing::debug!("Transcription response: {}", content);
        parse_transcribed_grid(&content)
    }
}

/// Extracts the row map from a model reply. Accepts proper JSON arrays,
/// Python-style list strings (`"['6', '2']"`) and entries missing the
/// separating commas.
pub fn parse_transcribed_grid(content: &str) -> Result<RawGrid> {
    let body = match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => return Err(no_grid_error()),
    };

    let grid = match serde_json::from_str::<serde_json::Map<String, Value>>(body) {
        Ok(map) => grid_from_json(map)?,
        Err(_) => grid_from_lines(body),
    };

    if grid.is_empty() {
        return Err(no_grid_error());
    }
    Ok(grid)
}

fn no_grid_error() -> AppError {
    AppError::Transcription("No setup grid found in transcription".to_string())
}

fn grid_from_json(map: serde_json::Map<String, Value>) -> Result<RawGrid> {
    let mut grid = RawGrid::new();
    for (key, value) in map {
        let pieces = match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Some(normalize_label(&s)),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>(),
            Value::String(s) => Some(parse_list_literal(&s)),
            _ => None,
        }
        .ok_or_else(|| AppError::Transcription(format!("Row {} is not a list of pieces", key)))?;
        grid.insert(key.trim().to_string(), pieces);
    }
    Ok(grid)
}

// One `"key": [...]` or `"key": "[...]"` entry per line.
fn grid_from_lines(body: &str) -> RawGrid {
    body.lines()
        .filter_map(|line| {
            let line = line.trim().strip_prefix('"')?;
            let (key, rest) = line.split_once('"')?;
            let rest = rest.trim_start().strip_prefix(':')?;
            let open = rest.find('[')?;
            let close = rest.rfind(']')?;
            (open < close).then(|| (key.trim().to_string(), parse_list_literal(&rest[open..=close])))
        })
        .collect()
}

fn parse_list_literal(list: &str) -> Vec<String> {
    list.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(normalize_label)
        .filter(|label| !label.is_empty())
        .collect()
}

fn normalize_label(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '\'' || c == '"')
        .trim()
        .to_ascii_uppercase()
}
