use thiserror::Error;

/// Failures reported by the registry collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Registry conflict: {0}")]
    Conflict(String),

    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Registry serialization error: {0}")]
    Serialization(String),
}

impl RegistryError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Unavailability is worth retrying; everything else is not
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
