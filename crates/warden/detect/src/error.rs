/// Errors from server detection.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("detector registered twice: {0}")]
    DuplicateDetector(&'static str),
    #[error("detector {detector} failed on {class_name}: {reason}")]
    ActionFailed {
        detector: &'static str,
        class_name: String,
        reason: String,
    },
    #[error("server recognition state unavailable: {0}")]
    RecognitionUnavailable(String),
}

pub type DetectResult<T> = Result<T, DetectError>;
