/// Errors from the CPU self-protection subsystem.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("malformed {what}: {input:?}")]
    Parse { what: &'static str, input: String },
    #[error("resource unavailable: {resource}: {reason}")]
    ResourceUnavailable { resource: String, reason: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("controller task failed: {0}")]
    TaskFailed(String),
}

impl GuardError {
    pub(crate) fn parse(what: &'static str, input: impl Into<String>) -> Self {
        Self::Parse {
            what,
            input: input.into(),
        }
    }

    pub(crate) fn unavailable(resource: impl Into<String>, reason: impl ToString) -> Self {
        Self::ResourceUnavailable {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }
}

pub type GuardResult<T> = Result<T, GuardError>;
