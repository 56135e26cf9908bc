//! Home-screen screenshot validation backed by a vision model.
//!
//! The model is asked for a JSON verdict `{"isHomeScreen": bool, "reason": str}`.
//! Replies are searched for a fenced ```` ```json ```` block first and then
//! for the first inline object mentioning `isHomeScreen`.

use std::time::Duration;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, warn};

use homescreen_types::api::{HealthResponse, ValidateRequest, ValidateResponse};

use crate::auth::AppState;

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1000;
const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";
const DEFAULT_REASON: &str = "The model did not give a reason.";

const PROMPT: &str = r#"Is this image a screenshot of a smartphone home screen?

Check for the features of a home screen:
- several app icons laid out in a grid
- a dock of frequently used apps at the bottom
- a status bar (time, battery) at the top
- a visible wallpaper

Answer in JSON only, with no other text:
{"isHomeScreen": true or false, "reason": "a specific explanation of the decision"}"#;

#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    #[error("imageData is required")]
    MissingImage,
    #[error("imageData is not valid base64")]
    InvalidImage,
    #[error("validation request failed: {0}")]
    Upstream(String),
    #[error("could not parse the validation result")]
    Unparseable,
    #[error("validator setup failed: {0}")]
    Setup(String),
}

impl ValidateError {
    fn is_client_error(&self) -> bool {
        matches!(self, Self::MissingImage | Self::InvalidImage)
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

pub struct Validator {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    strict: bool,
    base_url: String,
    fenced: Regex,
    inline: Regex,
}

impl Validator {
    /// `strict` decides what happens without an API key: reject every image
    /// (true) or accept every image with an explanatory reason (false).
    pub fn new(api_key: Option<String>, model: &str, strict: bool) -> Result<Self, ValidateError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ValidateError::Setup(e.to_string()))?;
        let fenced = Regex::new(r"```json\s*([\s\S]*?)\s*```").map_err(|e| ValidateError::Setup(e.to_string()))?;
        let inline =
            Regex::new(r#"\{[\s\S]*?"isHomeScreen"[\s\S]*?\}"#).map_err(|e| ValidateError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.to_string(),
            strict,
            base_url: ANTHROPIC_API_URL.to_string(),
            fenced,
            inline,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub async fn validate(&self, image_data: Option<&str>) -> Result<ValidateResponse, ValidateError> {
        let image_data = image_data.map(str::trim).filter(|d| !d.is_empty());
        let Some(image_data) = image_data else {
            return Err(ValidateError::MissingImage);
        };
        let (media_type, payload) = split_data_url(image_data);
        // Wrapped base64 (MIME style line breaks) is accepted.
        let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        match B64.decode(&payload) {
            Ok(bytes) if !bytes.is_empty() => {}
            _ => return Err(ValidateError::InvalidImage),
        }

        let Some(api_key) = &self.api_key else {
            warn!("No API key configured; validation skipped (strict = {})", self.strict);
            let reason = if self.strict {
                "Validation is unavailable because no API key is configured."
            } else {
                "Validation was skipped because no API key is configured."
            };
            return Ok(ValidateResponse {
                is_home_screen: !self.strict,
                reason: reason.to_string(),
                error: None,
            });
        };

        let text = self.ask_model(api_key, media_type, &payload).await?;
        debug!("Validation reply: {}", text);

        let (is_home_screen, reason) = self.extract_verdict(&text).ok_or(ValidateError::Unparseable)?;
        Ok(ValidateResponse {
            is_home_screen,
            reason: reason.unwrap_or_else(|| DEFAULT_REASON.to_string()),
            error: None,
        })
    }

    async fn ask_model(&self, api_key: &str, media_type: &str, payload: &str) -> Result<String, ValidateError> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": { "type": "base64", "media_type": media_type, "data": payload }
                    },
                    { "type": "text", "text": PROMPT }
                ]
            }]
        });

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ValidateError::Upstream(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(200).collect();
            return Err(ValidateError::Upstream(format!("HTTP {}: {}", status, detail)));
        }

        let parsed: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| ValidateError::Upstream(e.to_string()))?;
        Ok(parsed
            .content
            .into_iter()
            .find(|b| b.kind == "text")
            .and_then(|b| b.text)
            .unwrap_or_default())
    }

    /// Pull `(isHomeScreen, reason)` out of a free-form model reply.
    pub fn extract_verdict(&self, text: &str) -> Option<(bool, Option<String>)> {
        let fenced = self
            .fenced
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| parse_verdict(m.as_str()));
        fenced.or_else(|| {
            self.inline
                .find(text)
                .and_then(|m| parse_verdict(m.as_str()))
        })
    }
}

fn parse_verdict(candidate: &str) -> Option<(bool, Option<String>)> {
    let value: Value = serde_json::from_str(candidate).ok()?;
    let is_home_screen = value.get("isHomeScreen")?.as_bool()?;
    let reason = value
        .get("reason")
        .and_then(Value::as_str)
        .filter(|r| !r.trim().is_empty())
        .map(str::to_string);
    Some((is_home_screen, reason))
}

/// Split `data:image/png;base64,AAAA` into `("image/png", "AAAA")`. Bare
/// base64 is assumed to be JPEG.
fn split_data_url(data: &str) -> (&str, &str) {
    let Some(rest) = data.strip_prefix("data:") else {
        return (DEFAULT_MEDIA_TYPE, data);
    };
    match rest.split_once(',') {
        Some((header, payload)) => {
            let media_type = header.split(';').next().filter(|m| !m.is_empty());
            (media_type.unwrap_or(DEFAULT_MEDIA_TYPE), payload)
        }
        None => (DEFAULT_MEDIA_TYPE, data),
    }
}

pub async fn validate_homescreen(State(state): State<AppState>, Json(req): Json<ValidateRequest>) -> Response {
    match state.validator.validate(req.image_data.as_deref()).await {
        Ok(verdict) => Json(verdict).into_response(),
        Err(e) if e.is_client_error() => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response()
        }
        Err(e) => {
            error!("Validation error: {}", e);
            let reason = match e {
                ValidateError::Unparseable => "The model's reply could not be parsed.".to_string(),
                ref other => format!("Error: {}", other),
            };
            let body = ValidateResponse {
                is_home_screen: false,
                reason,
                error: Some(e.to_string()),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        has_api_key: state.validator.has_api_key(),
        backend: state.backend.to_string(),
    })
}
