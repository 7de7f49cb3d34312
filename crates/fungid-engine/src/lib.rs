use std::env;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fungid_contracts::errors::IdentifyError;
use fungid_contracts::events::{EventPayload, EventWriter};
use fungid_contracts::records::{
    ComparisonRecord, GeoPoint, GroundingSource, HistoryEntry, ImageQuality, MushroomRecord,
};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

pub mod decode;
pub mod images;
pub mod invoke;
pub mod prompts;
pub mod sanitize;

use decode::decode_completion;
use images::{
    acquire_distribution_map, acquire_subject_image, normalize_to_data_url, thumbnail_data_url,
    GeminiImageModel, ImageFailure, ImageOutcome, THUMBNAIL_MAX_DIM,
};
use invoke::{
    inline_image_part, invoke_with_fallback, text_part, GeminiTextModel, ModelTier, OutputMode,
};
use prompts::{compare_prompt, identify_prompt, photo_context, query_context, Difficulty, Language};
use sanitize::{sanitize_comparison, sanitize_mushroom};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const PRIMARY_TEXT_MODEL: &str = "gemini-3-pro-preview";
pub const FALLBACK_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const IMAGE_MODEL: &str = "gemini-2.5-flash-image";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Engine configuration, resolved once at startup. Call sites never re-derive
/// credentials; they receive this object.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub api_key: String,
    pub api_base: String,
    pub primary_model: String,
    pub fallback_model: String,
    pub image_model: String,
    pub request_timeout: Duration,
}

impl EngineConfig {
    /// Resolves the credential from the ordered environment sources and the
    /// optional model/base overrides. `ConfigMissing` when no source is set.
    pub fn from_env() -> Result<Self, IdentifyError> {
        let api_key = resolve_api_key().ok_or(IdentifyError::ConfigMissing)?;
        Ok(Self::with_api_key(api_key))
    }

    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: non_empty_env("FUNGID_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            primary_model: non_empty_env("FUNGID_TEXT_MODEL")
                .unwrap_or_else(|| PRIMARY_TEXT_MODEL.to_string()),
            fallback_model: non_empty_env("FUNGID_FALLBACK_TEXT_MODEL")
                .unwrap_or_else(|| FALLBACK_TEXT_MODEL.to_string()),
            image_model: non_empty_env("FUNGID_IMAGE_MODEL")
                .unwrap_or_else(|| IMAGE_MODEL.to_string()),
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

/// Ordered credential sources; first non-empty wins.
pub fn resolve_api_key() -> Option<String> {
    non_empty_env("FUNGID_API_KEY")
        .or_else(|| non_empty_env("GEMINI_API_KEY"))
        .or_else(|| non_empty_env("GOOGLE_API_KEY"))
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Outcome of the image-based flow. The primary image is the caller's own
/// photograph, so only the distribution map is acquired.
#[derive(Debug, Clone)]
pub struct ImageIdentification {
    pub record: MushroomRecord,
    pub sources: Vec<GroundingSource>,
    pub map_image: Option<String>,
    pub map_failure: Option<ImageFailure>,
}

/// Outcome of the text-based flow, which additionally renders the subject.
#[derive(Debug, Clone)]
pub struct TextIdentification {
    pub record: MushroomRecord,
    pub sources: Vec<GroundingSource>,
    pub subject_image: Option<String>,
    pub subject_failure: Option<ImageFailure>,
    pub map_image: Option<String>,
    pub map_failure: Option<ImageFailure>,
}

/// Orchestrates the identification pipeline: prompt construction, the
/// two-tier model invocation, decoding, sanitization, and best-effort image
/// acquisition. Image failures become flags on the result; only the stages
/// before them raise error kinds.
pub struct IdentificationEngine {
    config: EngineConfig,
    http: HttpClient,
    events: Option<EventWriter>,
}

impl IdentificationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn identify_from_image(
        &self,
        image_bytes: &[u8],
        mime_type: &str,
        location: Option<GeoPoint>,
        language: Language,
        difficulty: Difficulty,
        quality: ImageQuality,
    ) -> Result<ImageIdentification, IdentifyError> {
        let mime = mime_type.trim().to_lowercase();
        if !mime.starts_with("image/") {
            return Err(IdentifyError::ImageUploadInvalid(mime_type.to_string()));
        }
        if image_bytes.is_empty() {
            return Err(IdentifyError::ImageUploadInvalid(
                "empty image payload".to_string(),
            ));
        }

        self.emit(
            "identify_started",
            json!({"mode": "image", "language": language.as_str()}),
        );
        let context = photo_context(location.map(|point| (point.latitude, point.longitude)));
        let prompt = identify_prompt(&context, language, difficulty);
        let parts = vec![inline_image_part(image_bytes, &mime), text_part(&prompt)];
        let (record, sources) = self.invoke_and_sanitize(&parts)?;

        let (map_image, map_failure) = self.acquire_map(&record, quality);
        Ok(ImageIdentification {
            record,
            sources,
            map_image,
            map_failure,
        })
    }

    pub fn identify_from_text(
        &self,
        query: &str,
        language: Language,
        difficulty: Difficulty,
        quality: ImageQuality,
    ) -> Result<TextIdentification, IdentifyError> {
        self.emit(
            "identify_started",
            json!({"mode": "text", "query": query, "language": language.as_str()}),
        );
        let prompt = identify_prompt(&query_context(query), language, difficulty);
        let parts = vec![text_part(&prompt)];
        let (record, sources) = self.invoke_and_sanitize(&parts)?;

        let image_model = GeminiImageModel::new(&self.config, &self.http);
        let subject = acquire_subject_image(&image_model, &record, quality);
        let (subject_image, subject_failure) = self.degrade("subject", subject);
        let (map_image, map_failure) = self.acquire_map(&record, quality);

        Ok(TextIdentification {
            record,
            sources,
            subject_image,
            subject_failure,
            map_image,
            map_failure,
        })
    }

    pub fn compare(
        &self,
        a: &MushroomRecord,
        b: &MushroomRecord,
        language: Language,
    ) -> Result<ComparisonRecord, IdentifyError> {
        let prompt = compare_prompt(a, b, language);
        let transport = GeminiTextModel::new(&self.config, &self.http);
        let (reply, tier) = invoke_with_fallback(
            &transport,
            &self.config.primary_model,
            &self.config.fallback_model,
            &[text_part(&prompt)],
            OutputMode::StrictJson,
        )?;
        self.note_tier(tier);
        let decoded = decode_completion(&reply.text)?;
        sanitize_comparison(&decoded).ok_or(IdentifyError::IdentificationFailed)
    }

    /// Builds the persisted unit from a completed identification. The
    /// primary image reference is canonicalized to a data URL and both
    /// images are thumbnailed before they enter storage.
    pub fn new_history_entry(
        &self,
        record: MushroomRecord,
        sources: Vec<GroundingSource>,
        primary_image_source: &str,
        map_image: Option<String>,
        subject_image_failed: bool,
        map_image_failed: bool,
    ) -> HistoryEntry {
        let normalized = normalize_to_data_url(&self.http, primary_image_source);
        let image = thumbnail_data_url(&normalized, THUMBNAIL_MAX_DIM);
        let map_image = map_image.map(|map| thumbnail_data_url(&map, THUMBNAIL_MAX_DIM));
        let timestamp = timestamp_millis();
        let id = HistoryEntry::synthetic_id(timestamp, &record.scientific_name);
        self.emit("history_entry_built", json!({"id": id}));
        HistoryEntry {
            id,
            timestamp,
            image,
            record,
            sources,
            map_image,
            subject_image_failed,
            map_image_failed,
            diary: None,
        }
    }

    fn invoke_and_sanitize(
        &self,
        parts: &[Value],
    ) -> Result<(MushroomRecord, Vec<GroundingSource>), IdentifyError> {
        let transport = GeminiTextModel::new(&self.config, &self.http);
        let (reply, tier) = invoke_with_fallback(
            &transport,
            &self.config.primary_model,
            &self.config.fallback_model,
            parts,
            OutputMode::GroundedSearch,
        )?;
        self.note_tier(tier);
        let decoded = decode_completion(&reply.text)?;
        let record = sanitize_mushroom(&decoded).ok_or(IdentifyError::IdentificationFailed)?;
        Ok((record, reply.sources))
    }

    fn acquire_map(
        &self,
        record: &MushroomRecord,
        quality: ImageQuality,
    ) -> (Option<String>, Option<ImageFailure>) {
        let image_model = GeminiImageModel::new(&self.config, &self.http);
        match acquire_distribution_map(&image_model, record, quality) {
            Some(outcome) => self.degrade("distribution_map", outcome),
            None => (None, None),
        }
    }

    fn degrade(&self, kind: &str, outcome: ImageOutcome) -> (Option<String>, Option<ImageFailure>) {
        let (image, failure) = outcome.into_parts();
        if let Some(failure) = failure {
            self.emit(
                "image_degraded",
                json!({
                    "image": kind,
                    "reason": match failure {
                        ImageFailure::Quota => "quota",
                        ImageFailure::Other => "error",
                    },
                }),
            );
        }
        (image, failure)
    }

    fn note_tier(&self, tier: ModelTier) {
        if tier == ModelTier::Fallback {
            self.emit(
                "fallback_triggered",
                json!({"model": self.config.fallback_model}),
            );
        }
    }

    /// Event emission is observability only; a logging failure must never
    /// abort an identification.
    fn emit(&self, event_type: &str, payload: Value) {
        if let Some(events) = &self.events {
            let payload: EventPayload = payload.as_object().cloned().unwrap_or_default();
            let _ = events.emit(event_type, payload);
        }
    }
}

fn timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
