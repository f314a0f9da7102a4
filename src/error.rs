/// Errors that can occur when talking to the treadmill rig.
#[derive(Debug, thiserror::Error)]
pub enum TreadmillError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No serial port found")]
    PortNotFound,

    #[error("Connection closed mid-frame: expected {expected} payload bytes, got {received}")]
    ConnectionClosed { expected: usize, received: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(String),

    #[error("Render fault: {0}")]
    RenderFault(String),

    #[error("Acquisition stream stopped")]
    StreamStopped,

    #[error("Timeout waiting for data")]
    Timeout,
}

impl TreadmillError {
    /// True for faults that end the decode loop: the connection is gone or
    /// a frame was truncated.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            TreadmillError::Serial(_)
                | TreadmillError::Io(_)
                | TreadmillError::PortNotFound
                | TreadmillError::ConnectionClosed { .. }
        )
    }
}
