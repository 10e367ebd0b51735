use crate::domain::CityListError;

/// Failures that end a batch. Per-item provider errors never become one of these.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] CityListError),
    #[error("Resource unavailable: {0}")]
    Resource(String),
    #[error("Persistence failed: {0}")]
    Persistence(String),
}

impl PipelineError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::Input(_))
    }
}
