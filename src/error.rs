use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocsnapError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("JSON error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Could not count images in '{folder}'")]
    CountFailed { folder: String },
    #[error("Response for item {index} has no image payload")]
    MissingPayload { index: usize },
    #[error("Invalid image payload: {0}")]
    InvalidPayload(String),
    #[error("No captured image to send")]
    NoCapture,
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Load task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, DocsnapError>;
