use thiserror::Error;

/// §7 error kinds as the pipeline encounters them. None of these
/// terminate a worker; `submit` and the sub-pipeline stages report
/// failure through `SubmitOutcome`/counters instead of propagating `Err`
/// to the caller, except for the configuration-time errors below.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid filter pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("enrichment request failed: {0}")]
    EnrichmentFailed(String),

    /// §7 "Programmer" error kind: a user-supplied filter predicate
    /// panicked. Caught at the dispatcher, never propagated as `Err` —
    /// this variant only exists to give the caught panic a typed message
    /// for logging.
    #[error("filter '{filter}' panicked: {message}")]
    FilterPanicked { filter: String, message: String },

    /// Same as `FilterPanicked` but for a registered `Transform`.
    #[error("transform panicked: {message}")]
    TransformPanicked { message: String },
}

/// Renders a caught panic payload as a string, matching the message shape
/// `std::panic::Location`-less panics produce.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
