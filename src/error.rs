use thiserror::Error;

/// Errors surfaced by the provisioning core. None of them is fatal; the
/// operator re-initiates the action.
#[derive(Debug, Error)]
pub enum Error {
    #[error("NFC not supported on this device or platform")]
    CapabilityUnavailable,

    #[error("error reading NFC tag: {0}")]
    ScanFailed(String),

    #[error("NFC scan cancelled")]
    ScanCancelled,

    #[error("card service rejected the request ({}): {detail}", status_label(.status))]
    BackendRejected { status: Option<u16>, detail: String },

    #[error("invalid card data: {0}")]
    Validation(String),

    #[error("card {0} is not in the local cache")]
    UnknownCard(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::BackendRejected {
            status: err.status().map(|s| s.as_u16()),
            detail: err.to_string(),
        }
    }
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("HTTP {code}"),
        None => "no response".to_string(),
    }
}
