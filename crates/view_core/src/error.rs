use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewError {
    /// Misuse of a lifecycle: showing a closed dialog, rendering a removed
    /// view, and the like.
    #[error("lifecycle violation: {0}")]
    Lifecycle(String),
    #[error("unknown template `{0}`")]
    UnknownTemplate(String),
    #[error("template `{id}` is malformed: {reason}")]
    Template { id: String, reason: String },
    #[error("invalid markup: {0}")]
    Markup(String),
    #[error("invalid selector `{0}`")]
    Selector(String),
    #[error("no element matches `{0}`")]
    MissingElement(String),
    #[error("unknown region `{0}`")]
    UnknownRegion(String),
    #[error("invalid data: {0}")]
    Data(String),
}

impl ViewError {
    pub fn lifecycle(message: impl Into<String>) -> Self {
        ViewError::Lifecycle(message.into())
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(self, ViewError::Lifecycle(_))
    }
}

pub type Result<T> = std::result::Result<T, ViewError>;
