#[derive(Debug, thiserror::Error)]
pub enum PowerError {
    #[error("Power status unavailable")]
    Unavailable,

    #[error("Unexpected power supply value: {0}")]
    InvalidValue(String),

    #[error("Power supply I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
