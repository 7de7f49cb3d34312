use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use fungid_contracts::errors::IdentifyError;
use fungid_contracts::records::GroundingSource;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::EngineConfig;

/// Provider output mode. Grounded search returns prose plus citations and is
/// used for identification; strict JSON is used for comparisons, where no
/// grounding is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    GroundedSearch,
    StrictJson,
}

/// Which tier produced a successful reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Primary,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct ModelReply {
    pub text: String,
    pub sources: Vec<GroundingSource>,
}

/// Seam between the fallback control flow and the HTTP transport, so the
/// fallback contract is testable without a live provider.
pub trait TextModel {
    fn generate(
        &self,
        model: &str,
        parts: &[Value],
        mode: OutputMode,
    ) -> Result<ModelReply, IdentifyError>;
}

/// Issues the primary request; on a quota classification, and only on that
/// classification, retries exactly once against the fallback model. Every
/// other failure kind short-circuits without a secondary call.
pub fn invoke_with_fallback<M: TextModel>(
    model: &M,
    primary: &str,
    fallback: &str,
    parts: &[Value],
    mode: OutputMode,
) -> Result<(ModelReply, ModelTier), IdentifyError> {
    match model.generate(primary, parts, mode) {
        Ok(reply) => Ok((reply, ModelTier::Primary)),
        Err(err) if err.is_quota() => {
            let reply = model.generate(fallback, parts, mode)?;
            Ok((reply, ModelTier::Fallback))
        }
        Err(err) => Err(err),
    }
}

/// Blocking Gemini `generateContent` transport.
pub struct GeminiTextModel<'a> {
    config: &'a EngineConfig,
    http: &'a HttpClient,
}

impl<'a> GeminiTextModel<'a> {
    pub fn new(config: &'a EngineConfig, http: &'a HttpClient) -> Self {
        Self { config, http }
    }
}

impl TextModel for GeminiTextModel<'_> {
    fn generate(
        &self,
        model: &str,
        parts: &[Value],
        mode: OutputMode,
    ) -> Result<ModelReply, IdentifyError> {
        let endpoint = generate_content_endpoint(&self.config.api_base, model);
        let mut payload = json!({
            "contents": [{"role": "user", "parts": parts}],
        });
        match mode {
            OutputMode::GroundedSearch => {
                payload["tools"] = json!([{"googleSearch": {}}]);
            }
            OutputMode::StrictJson => {
                payload["generationConfig"] = json!({"responseMimeType": "application/json"});
            }
        }

        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.config.api_key.as_str())])
            .timeout(self.config.request_timeout)
            .json(&payload)
            .send()
            .map_err(|err| IdentifyError::NetworkFailure(err.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| IdentifyError::NetworkFailure(err.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(classify_http_failure(status, &body));
        }

        let parsed: Value = serde_json::from_str(&body).map_err(|_| {
            IdentifyError::InvalidResponse("provider returned a non-JSON body".to_string())
        })?;
        let text = completion_text(&parsed);
        if text.trim().is_empty() {
            return Err(IdentifyError::InvalidResponse(
                "provider returned no text candidates".to_string(),
            ));
        }
        Ok(ModelReply {
            text,
            sources: grounding_sources(&parsed),
        })
    }
}

pub fn generate_content_endpoint(api_base: &str, model: &str) -> String {
    let trimmed = model.trim();
    let model_path = if trimmed.starts_with("models/") {
        trimmed.to_string()
    } else {
        format!("models/{trimmed}")
    };
    format!("{}/{}:generateContent", api_base.trim_end_matches('/'), model_path)
}

/// Classifies a non-2xx provider response into exactly one error kind. The
/// decision is made once, here; callers never re-derive it from message
/// text. Quota detection accepts either the numeric too-many-requests status
/// or a resource-exhaustion phrase, since the structured error code is not
/// guaranteed to exist.
pub fn classify_http_failure(status: u16, body: &str) -> IdentifyError {
    let snippet = truncate(body, 300);
    if status == 429 || looks_like_quota(body) {
        return IdentifyError::QuotaExceeded(snippet);
    }
    if status == 401 || (matches!(status, 400 | 403) && looks_like_bad_credential(body)) {
        return IdentifyError::InvalidCredential(snippet);
    }
    IdentifyError::InvalidResponse(format!("provider returned HTTP {status}: {snippet}"))
}

fn looks_like_quota(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains("resource_exhausted")
        || lowered.contains("resource exhausted")
        || lowered.contains("quota")
        || lowered.contains("rate limit")
        || lowered.contains("too many requests")
}

fn looks_like_bad_credential(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains("api key not valid")
        || lowered.contains("api_key_invalid")
        || lowered.contains("invalid api key")
        || lowered.contains("permission_denied")
        || lowered.contains("unauthenticated")
}

fn completion_text(payload: &Value) -> String {
    let parts = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<&str>>()
        .join("")
}

/// Harvests web-search citations. Entries without a URI are filtered out;
/// missing titles get a readable default.
fn grounding_sources(payload: &Value) -> Vec<GroundingSource> {
    let chunks = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(|candidate| candidate.get("groundingMetadata"))
        .and_then(|meta| meta.get("groundingChunks"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    chunks
        .iter()
        .filter_map(|chunk| chunk.get("web"))
        .filter_map(|web| {
            let uri = web
                .get("uri")
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or_default();
            if uri.is_empty() {
                return None;
            }
            let title = web
                .get("title")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|title| !title.is_empty())
                .unwrap_or("Untitled Source");
            Some(GroundingSource {
                title: title.to_string(),
                uri: uri.to_string(),
            })
        })
        .collect()
}

pub fn text_part(text: &str) -> Value {
    json!({ "text": text })
}

pub fn inline_image_part(bytes: &[u8], mime_type: &str) -> Value {
    json!({
        "inlineData": {
            "mimeType": mime_type,
            "data": BASE64.encode(bytes),
        }
    })
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
