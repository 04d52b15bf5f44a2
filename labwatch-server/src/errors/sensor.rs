#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("Sensor file unreadable: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Sensor CRC check failed")]
    CrcMismatch,

    #[error("Sensor reply has no temperature field")]
    MissingTemperature,

    #[error("Invalid temperature value: {0}")]
    InvalidValue(String),
}
