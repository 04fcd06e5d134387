use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Length in bytes of every key slot on the tag.
pub const KEY_LEN: usize = 16;

const DEFAULT_DEBUG_MARKER: &str = "debug";

/// Hex text of one 16-byte key slot.
///
/// The text is kept exactly as generated or as received from the card
/// service. Keys are never re-encoded, so a value carried forward through an
/// edit is byte-for-byte what the backend stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardKey(String);

impl CardKey {
    /// Fresh key from the thread-local CSPRNG, lowercase hex.
    pub fn generate() -> Self {
        let bytes: [u8; KEY_LEN] = rand::random();
        Self(hex::encode(bytes))
    }

    /// Parse operator input, rejecting anything that is not 16 bytes of hex.
    pub fn from_hex(s: &str) -> Result<Self> {
        let key = Self(s.trim().to_string());
        key.check("key")?;
        Ok(key)
    }

    fn repeated(digit: char) -> Self {
        Self(std::iter::repeat_n(digit, KEY_LEN * 2).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shape check used before anything is submitted to the card service.
    pub fn check(&self, slot: &str) -> Result<()> {
        match hex::decode(&self.0) {
            Ok(bytes) if bytes.len() == KEY_LEN => Ok(()),
            Ok(_) => Err(Error::Validation(format!("{slot} must be {KEY_LEN} bytes"))),
            Err(_) => Err(Error::Validation(format!("{slot} is not valid hex"))),
        }
    }
}

impl fmt::Display for CardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three independently generated key slots of a card.
///
/// `k3` and `k4` are not stored: the protocol mirrors them from `k1` and `k2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet {
    pub k0: CardKey,
    pub k1: CardKey,
    pub k2: CardKey,
}

impl KeySet {
    /// Fixed key material for disposable test cards.
    pub fn debug() -> Self {
        Self {
            k0: CardKey::repeated('1'),
            k1: CardKey::repeated('2'),
            k2: CardKey::repeated('3'),
        }
    }

    /// Exact-value detection of the debug triple.
    pub fn is_debug(&self) -> bool {
        *self == Self::debug()
    }

    pub fn k3(&self) -> &CardKey {
        &self.k1
    }

    pub fn k4(&self) -> &CardKey {
        &self.k2
    }

    pub fn check(&self) -> Result<()> {
        self.k0.check("k0")?;
        self.k1.check("k1")?;
        self.k2.check("k2")
    }
}

/// Produce a key triple for a new card or a rotation.
pub fn generate_keys(debug: bool) -> KeySet {
    if debug {
        return KeySet::debug();
    }

    KeySet {
        k0: CardKey::generate(),
        k1: CardKey::generate(),
        k2: CardKey::generate(),
    }
}

/// Decides from a card name whether the card is a disposable debug card.
///
/// The default is a case-sensitive substring match on `"debug"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugCardRule {
    marker: Option<String>,
}

impl DebugCardRule {
    pub fn substring(marker: impl Into<String>) -> Self {
        Self {
            marker: Some(marker.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { marker: None }
    }

    pub fn matches(&self, card_name: &str) -> bool {
        match &self.marker {
            Some(marker) if !marker.is_empty() => card_name.contains(marker.as_str()),
            _ => false,
        }
    }
}

impl Default for DebugCardRule {
    fn default() -> Self {
        Self::substring(DEFAULT_DEBUG_MARKER)
    }
}
