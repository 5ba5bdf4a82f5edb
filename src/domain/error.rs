use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("domain validation failed: {message}")]
    Validation { message: String },
    #[error("progress for job may not move from {from}% back to {to}%")]
    ProgressRegression { from: u8, to: u8 },
    #[error("job already reached terminal stage `{stage}`")]
    AlreadyTerminal { stage: &'static str },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
