use thiserror::Error;

/// Failure taxonomy shared by every core operation.
///
/// Handlers decide what reaches the user: `InvalidInput` and `NotFound` become an
/// ephemeral reply, `StoreUnavailable` aborts the event, and `MissingConfiguration`
/// is recovered with defaults before it ever leaves the engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("missing configuration at {0}")]
    MissingConfiguration(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        CoreError::InvalidInput(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        CoreError::StoreUnavailable(msg.into())
    }

    /// Text safe to show the invoking member, if any.
    pub fn user_message(&self) -> Option<String> {
        match self {
            CoreError::InvalidInput(msg) => Some(msg.clone()),
            CoreError::NotFound(what) => {
                let mut chars = what.chars();
                let capitalized = match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::from("Record"),
                };
                Some(format!("{} not found.", capitalized))
            }
            CoreError::StoreUnavailable(_) | CoreError::MissingConfiguration(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::StoreUnavailable(_) => "store_unavailable",
            CoreError::InvalidInput(_) => "invalid_input",
            CoreError::NotFound(_) => "not_found",
            CoreError::MissingConfiguration(_) => "missing_configuration",
        }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        CoreError::StoreUnavailable(err.to_string())
    }
}
