use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoxError>;

#[derive(Error, Debug, Clone)]
pub enum CoxError {
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("model not fitted yet - call fit() first")]
    ModelNotFitted,

    #[error("survival data is broken: {message}")]
    InvalidSurvivalData { message: String },
}

impl CoxError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    pub fn invalid_survival_data(message: impl Into<String>) -> Self {
        Self::InvalidSurvivalData { message: message.into() }
    }
}
