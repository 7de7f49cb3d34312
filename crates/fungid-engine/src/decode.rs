use fungid_contracts::errors::IdentifyError;
use serde_json::Value;

/// Extracts a JSON object from a raw completion. Grounded responses come
/// back as prose-adjacent text and often wrap the object in a fenced code
/// block; strict-JSON responses parse directly. Parsing is strict: either a
/// full parse succeeds or the whole completion is rejected. No best-effort
/// repair.
pub fn decode_completion(raw: &str) -> Result<Value, IdentifyError> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }
    if let Some(inner) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(inner) {
            return Ok(value);
        }
    }
    Err(IdentifyError::InvalidResponse(
        "completion contained no parseable JSON".to_string(),
    ))
}

/// Returns the contents of the first fenced code block, tolerating an
/// optional language tag on the opening fence.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    let body_start = after_fence.find('\n').map(|idx| idx + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}
