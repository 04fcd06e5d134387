use async_trait::async_trait;
use std::sync::Arc;

use super::TagReader;
use crate::{
    console::Console,
    error::{Error, Result},
};

/// Keyboard-wedge readers: USB readers that type the tag serial followed by
/// Enter into the operator's console.
pub struct LineReader {
    console: Arc<Console>,
}

impl LineReader {
    pub fn new(console: Arc<Console>) -> Self {
        Self { console }
    }
}

#[async_trait]
impl TagReader for LineReader {
    fn is_available(&self) -> bool {
        true
    }

    async fn read_serial(&self) -> Result<String> {
        loop {
            let Some(line) = self.console.next_line().await else {
                return Err(Error::ScanFailed("reader input closed".to_string()));
            };
            let serial = line.trim();
            if !serial.is_empty() {
                return Ok(serial.to_string());
            }
        }
    }
}

/// Stand-in for platforms without NFC support.
pub struct UnavailableReader;

#[async_trait]
impl TagReader for UnavailableReader {
    fn is_available(&self) -> bool {
        false
    }

    async fn read_serial(&self) -> Result<String> {
        Err(Error::CapabilityUnavailable)
    }
}
