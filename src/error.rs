use crate::resource::PluginLookup;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ChrisError {
    #[error("no plugin found with {0}")]
    PluginNotFound(PluginLookup),
    #[error("no pipeline found with {0}")]
    PipelineNotFound(String),
    #[error("request to CUBE failed: {0}")]
    Transport(String),
    #[error("incorrect login: {0}")]
    IncorrectLogin(String),
    #[error("unexpected CUBE response: {0}")]
    UnexpectedResponse(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not logged in to CUBE")]
    NotLoggedIn,
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl ChrisError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ChrisError::PluginNotFound(_) | ChrisError::PipelineNotFound(_)
        )
    }
}

impl From<reqwest::Error> for ChrisError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            return ChrisError::UnexpectedResponse(error.to_string());
        }

        ChrisError::Transport(error.to_string())
    }
}

pub type Result<T, E = ChrisError> = std::result::Result<T, E>;
