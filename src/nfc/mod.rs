pub mod line;

use async_trait::async_trait;
use std::{fmt, sync::Arc};
use tokio::sync::watch;

use crate::error::{Error, Result};

pub use line::{LineReader, UnavailableReader};

const UID_LEN: usize = 7;

/// A 7-byte tag UID, displayed as uppercase hex without separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardUid([u8; UID_LEN]);

impl CardUid {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; UID_LEN] = bytes
            .try_into()
            .map_err(|_| Error::ScanFailed(format!("tag UID must be {UID_LEN} bytes")))?;
        Ok(Self(arr))
    }

    /// Accepts serial numbers as readers report them, e.g. `04:99:6c:6a:92:69:80`.
    pub fn from_serial(serial: &str) -> Result<Self> {
        let digits: String = serial
            .chars()
            .filter(|c| !matches!(c, ':' | '-') && !c.is_whitespace())
            .collect();
        let bytes = hex::decode(&digits)
            .map_err(|_| Error::ScanFailed(format!("tag UID {serial:?} is not hex")))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for CardUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

/// Hardware able to report the serial number of a tapped tag.
#[async_trait]
pub trait TagReader: Send + Sync {
    fn is_available(&self) -> bool;

    /// Wait for the next tap and return the raw serial number.
    async fn read_serial(&self) -> Result<String>;
}

/// Owner side of a scan cancellation.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

/// Task side of a scan cancellation.
#[derive(Debug, Clone)]
pub struct CancelToken(watch::Receiver<bool>);

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelToken(rx))
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancelled. Never resolves if the handle is dropped
    /// without cancelling.
    pub async fn cancelled(&mut self) {
        while !*self.0.borrow_and_update() {
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Succeeded(CardUid),
    Failed(String),
    Cancelled,
}

/// One operator-facing scanning slot: a reader plus the state of the last
/// attempt.
///
/// A failed read disables the session until [`NfcReadSession::retry`].
pub struct NfcReadSession {
    reader: Arc<dyn TagReader>,
    state: ScanState,
    disabled: bool,
}

impl NfcReadSession {
    pub fn new(reader: Arc<dyn TagReader>) -> Result<Self> {
        if !reader.is_available() {
            tracing::warn!("NFC reader unavailable, scanning disabled");
            return Err(Error::CapabilityUnavailable);
        }
        Ok(Self {
            reader,
            state: ScanState::Idle,
            disabled: false,
        })
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn can_scan(&self) -> bool {
        !self.disabled
    }

    pub fn retry(&mut self) {
        self.disabled = false;
        self.state = ScanState::Idle;
    }

    pub async fn scan(&mut self, mut cancel: CancelToken) -> Result<CardUid> {
        if self.disabled {
            return Err(Error::ScanFailed(
                "reader disabled after a failed read, retry first".to_string(),
            ));
        }
        if cancel.is_cancelled() {
            self.state = ScanState::Cancelled;
            return Err(Error::ScanCancelled);
        }

        self.state = ScanState::Scanning;
        tracing::info!("tap your NFC tag to read its UID");

        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            read = self.reader.read_serial() => Some(read),
        };

        let Some(read) = read else {
            tracing::info!("NFC scan cancelled");
            self.state = ScanState::Cancelled;
            return Err(Error::ScanCancelled);
        };

        match read.and_then(|serial| CardUid::from_serial(&serial)) {
            Ok(uid) => {
                tracing::info!(%uid, "NFC tag read");
                self.state = ScanState::Succeeded(uid.clone());
                Ok(uid)
            }
            Err(err) => {
                let reason = match err {
                    Error::ScanFailed(reason) => reason,
                    other => other.to_string(),
                };
                tracing::warn!(%reason, "error reading NFC tag");
                self.state = ScanState::Failed(reason.clone());
                self.disabled = true;
                Err(Error::ScanFailed(reason))
            }
        }
    }
}
