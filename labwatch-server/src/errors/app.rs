use super::{ModemError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Settings error: {0}")]
    SettingsError(#[from] config::ConfigError),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Modem error: {0}")]
    ModemError(#[from] ModemError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Worker failed: {0}")]
    WorkerError(#[from] tokio::task::JoinError),
}
