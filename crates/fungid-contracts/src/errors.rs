use thiserror::Error;

/// Failure taxonomy of the identification pipeline. The kind is decided once
/// at the invoker boundary; callers branch on the variant, never on message
/// substrings.
#[derive(Debug, Error)]
pub enum IdentifyError {
    /// No usable API credential in any of the configured sources. A
    /// deployment problem, not a transient one.
    #[error("no API credential configured; set FUNGID_API_KEY, GEMINI_API_KEY, or GOOGLE_API_KEY")]
    ConfigMissing,

    /// The provider rejected the credential.
    #[error("the provider rejected the API credential: {0}")]
    InvalidCredential(String),

    /// Rate limit or resource exhaustion. Triggers the fallback tier before
    /// being surfaced.
    #[error("provider quota exhausted: {0}")]
    QuotaExceeded(String),

    /// Transport-level failure reaching the provider.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The completion could not be decoded as JSON by any strategy.
    #[error("provider response could not be decoded: {0}")]
    InvalidResponse(String),

    /// The model reported it could not identify the subject, or the
    /// sanitized result was unusably empty.
    #[error("the model could not identify the subject")]
    IdentificationFailed,

    /// Caller-supplied file is not an image; caught before any network call.
    #[error("uploaded file is not an image: {0}")]
    ImageUploadInvalid(String),
}

impl IdentifyError {
    /// Stable machine-readable discriminant, used for event payloads and by
    /// UI layers that map kinds to localized messages.
    pub fn kind(&self) -> &'static str {
        match self {
            IdentifyError::ConfigMissing => "config_missing",
            IdentifyError::InvalidCredential(_) => "invalid_credential",
            IdentifyError::QuotaExceeded(_) => "quota_exceeded",
            IdentifyError::NetworkFailure(_) => "network_failure",
            IdentifyError::InvalidResponse(_) => "invalid_response",
            IdentifyError::IdentificationFailed => "identification_failed",
            IdentifyError::ImageUploadInvalid(_) => "image_upload_invalid",
        }
    }

    /// True for the quota/rate-limit condition that the invoker answers with
    /// a secondary-model attempt.
    pub fn is_quota(&self) -> bool {
        matches!(self, IdentifyError::QuotaExceeded(_))
    }
}
