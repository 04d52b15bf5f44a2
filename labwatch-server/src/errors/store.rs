#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Document I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Document is not valid JSON: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Sensor not found: {0}")]
    SensorNotFound(String),

    #[error("Contact index out of range: {0}")]
    ContactNotFound(usize),

    #[error("Store lock poisoned")]
    Poisoned,
}
