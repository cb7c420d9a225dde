use thiserror::Error;

use crate::api::ApiError;
use crate::notify::NotifyError;

#[derive(Error, Debug)]
pub enum AttdError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Failed to bind {path}: {source}")]
    Bind {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
