use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection refused by {0}. Make sure the server is running and the IP address and port are correct.")]
    ConnectionRefused(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Did not receive acknowledgement from server: {0}")]
    Handshake(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid size '{0}': expected digits followed by B, K, KB, M or MB")]
    InvalidSize(String),

    #[error("Invalid unit '{0}': the unit should be B, KB or MB")]
    InvalidUnit(String),

    #[error("the transfer_time is zero")]
    ZeroTransferTime,
}

pub type Result<T> = std::result::Result<T, Error>;
