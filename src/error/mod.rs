use thiserror::Error;

/// Errors surfaced by selection resolution and reconstruction.
///
/// `InvalidSelection` is always detected before any matrix arithmetic;
/// `InconsistentModel` is detected at the point mismatched matrices
/// would be combined. Neither is ever recovered from silently.
#[derive(Debug, Error)]
pub enum FactorModelError {
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("inconsistent model: {0}")]
    InconsistentModel(String),
}

pub type Result<T> = std::result::Result<T, FactorModelError>;

impl FactorModelError {
    pub(crate) fn invalid_selection(msg: impl Into<String>) -> Self {
        FactorModelError::InvalidSelection(msg.into())
    }

    pub(crate) fn inconsistent_model(msg: impl Into<String>) -> Self {
        FactorModelError::InconsistentModel(msg.into())
    }
}
