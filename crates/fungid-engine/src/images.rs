use std::sync::OnceLock;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use fungid_contracts::records::{is_not_available, ImageQuality, MushroomRecord};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::invoke::{classify_http_failure, generate_content_endpoint};
use crate::prompts::{distribution_map_prompt, image_size_hint, subject_image_prompt};
use crate::EngineConfig;

/// Longest thumbnail edge for persisted imagery.
pub const THUMBNAIL_MAX_DIM: u32 = 512;

const THUMBNAIL_JPEG_QUALITY: u8 = 80;
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a best-effort image generation call. Failures are data, not
/// errors: a cosmetic asset must never invalidate a completed
/// identification. Quota is kept distinct so the caller can warn about
/// degraded imagery instead of silently proceeding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    Image(String),
    Quota,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFailure {
    Quota,
    Other,
}

impl ImageOutcome {
    pub fn into_parts(self) -> (Option<String>, Option<ImageFailure>) {
        match self {
            ImageOutcome::Image(data_url) => (Some(data_url), None),
            ImageOutcome::Quota => (None, Some(ImageFailure::Quota)),
            ImageOutcome::Failed => (None, Some(ImageFailure::Other)),
        }
    }
}

/// Seam between acquisition policy and the image transport.
pub trait ImageModel {
    fn generate(&self, prompt: &str, quality: ImageQuality) -> ImageOutcome;
}

/// Best-effort photorealistic rendering of the identified subject.
pub fn acquire_subject_image<M: ImageModel>(
    model: &M,
    record: &MushroomRecord,
    quality: ImageQuality,
) -> ImageOutcome {
    model.generate(&subject_image_prompt(record), quality)
}

/// Best-effort distribution map. Returns `None` without issuing any call
/// when the distribution description is a not-available placeholder; there
/// is nothing to visualize and the call would be wasted.
pub fn acquire_distribution_map<M: ImageModel>(
    model: &M,
    record: &MushroomRecord,
    quality: ImageQuality,
) -> Option<ImageOutcome> {
    if is_not_available(&record.distribution) {
        return None;
    }
    Some(model.generate(&distribution_map_prompt(record), quality))
}

/// Gemini image-generation transport. Never returns an error; every failure
/// collapses to `Quota` or `Failed`.
pub struct GeminiImageModel<'a> {
    config: &'a EngineConfig,
    http: &'a HttpClient,
}

impl<'a> GeminiImageModel<'a> {
    pub fn new(config: &'a EngineConfig, http: &'a HttpClient) -> Self {
        Self { config, http }
    }
}

impl ImageModel for GeminiImageModel<'_> {
    fn generate(&self, prompt: &str, quality: ImageQuality) -> ImageOutcome {
        let endpoint = generate_content_endpoint(&self.config.api_base, &self.config.image_model);
        let payload = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": {"imageSize": image_size_hint(quality)},
            },
        });

        let response = match self
            .http
            .post(&endpoint)
            .query(&[("key", self.config.api_key.as_str())])
            .timeout(self.config.request_timeout)
            .json(&payload)
            .send()
        {
            Ok(response) => response,
            Err(_) => return ImageOutcome::Failed,
        };

        let status = response.status().as_u16();
        let body = match response.text() {
            Ok(body) => body,
            Err(_) => return ImageOutcome::Failed,
        };
        if !(200..300).contains(&status) {
            if classify_http_failure(status, &body).is_quota() {
                return ImageOutcome::Quota;
            }
            return ImageOutcome::Failed;
        }

        let parsed: Value = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) => return ImageOutcome::Failed,
        };
        match first_inline_image(&parsed) {
            Some(data_url) => ImageOutcome::Image(data_url),
            None => ImageOutcome::Failed,
        }
    }
}

/// Finds the first inline image in a generateContent response and returns it
/// as a data URL; the payload is already base64, so no re-encode round trip.
fn first_inline_image(payload: &Value) -> Option<String> {
    let candidates = payload.get("candidates").and_then(Value::as_array)?;
    for candidate in candidates {
        let parts = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for part in parts {
            let Some(inline) = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
            else {
                continue;
            };
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let mime = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            return Some(format!("data:{mime};base64,{data}"));
        }
    }
    None
}

/// Locally synthesized stand-in shown when subject-image generation fails:
/// a flat two-tone mushroom glyph, generated without any network fetch.
pub fn placeholder_image() -> String {
    static PLACEHOLDER: OnceLock<String> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| {
            let size = 256u32;
            let mut canvas = RgbImage::from_pixel(size, size, Rgb([234, 231, 220]));
            let cx = size as i64 / 2;
            for y in 0..size {
                for x in 0..size {
                    let dx = x as i64 - cx;
                    let dy = y as i64 - 120;
                    // Cap: upper half-disc.
                    if dy <= 0 && dx * dx + dy * dy * 2 <= 90 * 90 {
                        canvas.put_pixel(x, y, Rgb([156, 102, 68]));
                    }
                    // Stem: vertical bar below the cap.
                    if (120..200).contains(&(y as i64)) && dx.abs() <= 18 {
                        canvas.put_pixel(x, y, Rgb([214, 203, 180]));
                    }
                }
            }
            encode_png_data_url(&DynamicImage::ImageRgb8(canvas))
                .unwrap_or_else(|| "data:image/png;base64,".to_string())
        })
        .clone()
}

/// Canonicalizes any image reference into a self-contained PNG data URL so
/// persisted and exported entries never depend on a live session. Total from
/// the caller's point of view: every failure path yields the placeholder.
/// Vector data URLs pass through untouched; rasterizing them is lossy and
/// unnecessary.
pub fn normalize_to_data_url(http: &HttpClient, source: &str) -> String {
    let trimmed = source.trim();
    if trimmed.starts_with("data:image/svg") {
        return trimmed.to_string();
    }

    let bytes = if trimmed.starts_with("data:") {
        decode_data_url(trimmed).map(|(_, bytes)| bytes)
    } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        fetch_bytes(http, trimmed)
    } else if trimmed.is_empty() {
        None
    } else {
        std::fs::read(trimmed).ok()
    };

    bytes
        .and_then(|bytes| image::load_from_memory(&bytes).ok())
        .and_then(|decoded| encode_png_data_url(&decoded))
        .unwrap_or_else(placeholder_image)
}

/// Bounded-dimension re-encode for storage. Raster data URLs are scaled so
/// neither dimension exceeds `max_dim` (aspect preserved) and re-encoded as
/// JPEG at a fixed moderate quality; anything else passes through unchanged.
pub fn thumbnail_data_url(source: &str, max_dim: u32) -> String {
    if !source.starts_with("data:image/") || source.starts_with("data:image/svg") {
        return source.to_string();
    }
    let Some((_, bytes)) = decode_data_url(source) else {
        return source.to_string();
    };
    let Ok(decoded) = image::load_from_memory(&bytes) else {
        return source.to_string();
    };

    let bound = max_dim.max(1);
    let resized = if decoded.width() > bound || decoded.height() > bound {
        decoded.resize(bound, bound, FilterType::Triangle)
    } else {
        decoded
    };
    let flattened = flatten_alpha(&resized);

    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, THUMBNAIL_JPEG_QUALITY);
    if encoder
        .encode_image(&DynamicImage::ImageRgb8(flattened))
        .is_err()
    {
        return source.to_string();
    }
    format!("data:image/jpeg;base64,{}", BASE64.encode(out))
}

/// Blends transparency onto white before JPEG encoding; JPEG has no alpha
/// channel and a black default background corrupts light imagery.
fn flatten_alpha(decoded: &DynamicImage) -> RgbImage {
    let rgba = decoded.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let Rgba([r, g, b, a]) = *pixel;
        let alpha = u16::from(a);
        let blend =
            |channel: u8| -> u8 { (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8 };
        flattened.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    flattened
}

fn decode_data_url(value: &str) -> Option<(String, Vec<u8>)> {
    let rest = value.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    if !header.contains("base64") {
        return None;
    }
    let mime = header.split(';').next().unwrap_or("").to_string();
    let bytes = BASE64.decode(data.trim().as_bytes()).ok()?;
    Some((mime, bytes))
}

fn encode_png_data_url(decoded: &DynamicImage) -> Option<String> {
    let mut out = std::io::Cursor::new(Vec::new());
    decoded.write_to(&mut out, ImageFormat::Png).ok()?;
    Some(format!(
        "data:image/png;base64,{}",
        BASE64.encode(out.into_inner())
    ))
}

fn fetch_bytes(http: &HttpClient, url: &str) -> Option<Vec<u8>> {
    let response = http.get(url).timeout(FETCH_TIMEOUT).send().ok()?;
    if !response.status().is_success() {
        return None;
    }
    response.bytes().ok().map(|bytes| bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use fungid_contracts::records::{Toxicity, NOT_AVAILABLE};

    use super::*;

    struct CountingModel {
        prompts: RefCell<Vec<String>>,
        outcome: ImageOutcome,
    }

    impl CountingModel {
        fn new(outcome: ImageOutcome) -> Self {
            Self {
                prompts: RefCell::new(Vec::new()),
                outcome,
            }
        }
    }

    impl ImageModel for CountingModel {
        fn generate(&self, prompt: &str, _quality: ImageQuality) -> ImageOutcome {
            self.prompts.borrow_mut().push(prompt.to_string());
            self.outcome.clone()
        }
    }

    fn record(distribution: &str) -> MushroomRecord {
        MushroomRecord {
            common_name: "Níscalo".to_string(),
            scientific_name: "Lactarius deliciosus".to_string(),
            synonyms: Vec::new(),
            description: String::new(),
            habitat: "Pinares".to_string(),
            season: String::new(),
            distribution: distribution.to_string(),
            culinary_uses: Vec::new(),
            toxicity: Toxicity::default(),
            recipes: Vec::new(),
            similar: Vec::new(),
        }
    }

    fn png_data_url(width: u32, height: u32) -> String {
        let canvas = RgbImage::from_pixel(width, height, Rgb([10, 120, 60]));
        encode_png_data_url(&DynamicImage::ImageRgb8(canvas)).expect("encode")
    }

    fn decoded_dims(data_url: &str) -> (u32, u32) {
        let (_, bytes) = decode_data_url(data_url).expect("data url");
        let decoded = image::load_from_memory(&bytes).expect("decode");
        (decoded.width(), decoded.height())
    }

    #[test]
    fn placeholder_distribution_skips_the_call_entirely() {
        let model = CountingModel::new(ImageOutcome::Image("data:image/png;base64,".into()));
        let outcome =
            acquire_distribution_map(&model, &record(NOT_AVAILABLE), ImageQuality::Standard);
        assert!(outcome.is_none());
        assert!(model.prompts.borrow().is_empty());
    }

    #[test]
    fn real_distribution_issues_one_call_with_the_map_prompt() {
        let model = CountingModel::new(ImageOutcome::Image("data:image/png;base64,x".into()));
        let outcome = acquire_distribution_map(
            &model,
            &record("Mediterráneo occidental"),
            ImageQuality::Standard,
        );
        assert_eq!(
            outcome,
            Some(ImageOutcome::Image("data:image/png;base64,x".into()))
        );
        let prompts = model.prompts.borrow();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Lactarius deliciosus"));
        assert!(prompts[0].contains("Mediterráneo occidental"));
    }

    #[test]
    fn subject_acquisition_uses_the_subject_prompt() {
        let model = CountingModel::new(ImageOutcome::Quota);
        let outcome = acquire_subject_image(&model, &record(""), ImageQuality::High);
        assert_eq!(outcome, ImageOutcome::Quota);
        assert!(model.prompts.borrow()[0].contains("Photorealistic"));
    }

    #[test]
    fn outcome_parts_distinguish_quota_from_other_failures() {
        assert_eq!(
            ImageOutcome::Quota.into_parts(),
            (None, Some(ImageFailure::Quota))
        );
        assert_eq!(
            ImageOutcome::Failed.into_parts(),
            (None, Some(ImageFailure::Other))
        );
        let (url, failure) = ImageOutcome::Image("data:x".into()).into_parts();
        assert_eq!(url.as_deref(), Some("data:x"));
        assert!(failure.is_none());
    }

    #[test]
    fn thumbnail_bounds_both_dimensions_preserving_aspect() {
        let source = png_data_url(4000, 2000);
        let thumb = thumbnail_data_url(&source, 400);
        assert!(thumb.starts_with("data:image/jpeg;base64,"));
        assert_eq!(decoded_dims(&thumb), (400, 200));
    }

    #[test]
    fn thumbnail_leaves_small_images_dimensions_alone() {
        let source = png_data_url(120, 80);
        let thumb = thumbnail_data_url(&source, 400);
        assert_eq!(decoded_dims(&thumb), (120, 80));
    }

    #[test]
    fn thumbnail_passes_through_non_raster_sources() {
        let svg = "data:image/svg+xml;base64,PHN2Zy8+";
        assert_eq!(thumbnail_data_url(svg, 400), svg);
        assert_eq!(
            thumbnail_data_url("https://example.test/photo.jpg", 400),
            "https://example.test/photo.jpg"
        );
    }

    #[test]
    fn normalize_is_total_and_falls_back_to_the_placeholder() {
        let http = HttpClient::new();
        let normalized = normalize_to_data_url(&http, "/nonexistent/path.png");
        assert_eq!(normalized, placeholder_image());
        assert_eq!(normalize_to_data_url(&http, ""), placeholder_image());
    }

    #[test]
    fn normalize_reencodes_raster_data_urls_as_png() {
        let http = HttpClient::new();
        let source = png_data_url(32, 32);
        let normalized = normalize_to_data_url(&http, &source);
        assert!(normalized.starts_with("data:image/png;base64,"));
        assert_eq!(decoded_dims(&normalized), (32, 32));
    }

    #[test]
    fn normalize_passes_vector_data_urls_through() {
        let http = HttpClient::new();
        let svg = "data:image/svg+xml;base64,PHN2Zy8+";
        assert_eq!(normalize_to_data_url(&http, svg), svg);
    }

    #[test]
    fn normalize_reads_local_files() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("photo.png");
        let canvas = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
        canvas.save(&path)?;
        let http = HttpClient::new();
        let normalized = normalize_to_data_url(&http, path.to_str().unwrap_or_default());
        assert!(normalized.starts_with("data:image/png;base64,"));
        Ok(())
    }

    #[test]
    fn placeholder_is_a_decodable_png_data_url() {
        let placeholder = placeholder_image();
        assert!(placeholder.starts_with("data:image/png;base64,"));
        assert_eq!(decoded_dims(&placeholder), (256, 256));
    }

    #[test]
    fn inline_image_extraction_reads_both_key_spellings() {
        let payload = serde_json::json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "caption"},
                    {"inline_data": {"mime_type": "image/webp", "data": "QUJD"}}
                ]}
            }]
        });
        assert_eq!(
            first_inline_image(&payload).as_deref(),
            Some("data:image/webp;base64,QUJD")
        );
        assert!(first_inline_image(&serde_json::json!({})).is_none());
    }
}
