/// Hard faults on the serial line.
///
/// A missing or malformed reply is not an error, see [`crate::services::modem::Reply`].
#[derive(Debug, thiserror::Error)]
pub enum ModemError {
    #[error("Serial line is closed")]
    LineClosed,

    #[error("Serial port error: {0}")]
    SerialError(#[from] serialport::Error),

    #[error("Serial I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serial worker failed: {0}")]
    WorkerError(#[from] tokio::task::JoinError),
}
