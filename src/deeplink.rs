//! Provisioning deep links and factory-reset documents for the tag
//! programming app.
//!
//! Everything here is derived from a cached [`Card`] alone; nothing talks to
//! the card service.

use serde::Serialize;
use std::{
    io::Write,
    path::{Path, PathBuf},
};
use url::Url;

use crate::{
    error::{Error, Result},
    keys::{CardKey, KeySet},
    models::Card,
};

const DEEPLINK_SCHEME: &str = "boltcard";
const RESET_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningMode {
    /// Write the card's keys onto a blank tag.
    Write,
    /// Restore a tag holding the card's keys to factory state.
    Wipe,
}

impl ProvisioningMode {
    fn action(self) -> &'static str {
        match self {
            ProvisioningMode::Write => "program",
            ProvisioningMode::Wipe => "reset",
        }
    }
}

/// `<origin>/api/v1/auth?a=<otp>`, with `&wipe=true` for a reset.
///
/// `origin` is the extension root and must end with a slash.
pub fn auth_url(origin: &Url, otp: &str, mode: ProvisioningMode) -> Result<Url> {
    let mut url = origin
        .join("api/v1/auth")
        .map_err(|e| Error::Config(format!("invalid origin {origin}: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("a", otp);
        if mode == ProvisioningMode::Wipe {
            query.append_pair("wipe", "true");
        }
    }
    Ok(url)
}

/// `boltcard://{program|reset}?url=<url-encoded auth URL>`
pub fn provisioning_link(card: &Card, origin: &Url, mode: ProvisioningMode) -> Result<String> {
    let auth = auth_url(origin, &card.otp, mode)?;
    let link = Url::parse_with_params(
        &format!("{DEEPLINK_SCHEME}://{}", mode.action()),
        &[("url", auth.as_str())],
    )
    .map_err(|e| Error::Config(format!("cannot build deep link: {e}")))?;
    Ok(link.into())
}

/// Factory-reset instruction for the programming app.
///
/// Once a card is deleted from the service this document is the only
/// remaining copy of its keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetPayload {
    pub action: &'static str,
    pub k0: CardKey,
    pub k1: CardKey,
    pub k2: CardKey,
    pub k3: CardKey,
    pub k4: CardKey,
    pub uid: String,
    pub version: u8,
}

impl ResetPayload {
    pub fn from_card(card: &Card) -> Self {
        let keys = &card.keys;
        Self {
            action: "wipe",
            k0: keys.k0.clone(),
            k1: keys.k1.clone(),
            k2: keys.k2.clone(),
            k3: keys.k3().clone(),
            k4: keys.k4().clone(),
            uid: card.uid.clone(),
            version: RESET_VERSION,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Write the card's reset document to `<dir>/<card name>.json`.
    ///
    /// An existing file is never replaced; the card id (and a counter if
    /// needed) is appended to the name instead. The receipt records the keys
    /// that were written.
    pub fn export(card: &Card, dir: &Path) -> Result<ResetExport> {
        let payload = Self::from_card(card);
        std::fs::create_dir_all(dir)?;

        let stem = file_stem(&card.card_name);
        let id = file_stem(&card.id);
        let candidates = std::iter::once(format!("{stem}.json"))
            .chain(std::iter::once(format!("{stem}-{id}.json")))
            .chain((2..).map(|n| format!("{stem}-{id}-{n}.json")));

        let body = serde_json::to_string_pretty(&payload)?;
        let (path, mut file) = candidates
            .map(|name| dir.join(name))
            .find_map(|path| {
                match std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&path)
                {
                    Ok(file) => Some(Ok((path, file))),
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => None,
                    Err(e) => Some(Err(e)),
                }
            })
            .unwrap_or_else(|| Err(std::io::ErrorKind::AlreadyExists.into()))?;
        file.write_all(body.as_bytes())?;
        tracing::info!(card_id = %card.id, path = %path.display(), "exported reset payload");

        Ok(ResetExport {
            card_id: card.id.clone(),
            keys: card.keys.clone(),
            path,
        })
    }
}

/// Proof that a card's reset payload was written out. Only
/// [`ResetPayload::export`] builds one; deleting the card requires it, and
/// only while the card still holds the exported keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetExport {
    card_id: String,
    keys: KeySet,
    path: PathBuf,
}

impl ResetExport {
    pub fn card_id(&self) -> &str {
        &self.card_id
    }

    pub fn keys(&self) -> &KeySet {
        &self.keys
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    match stem.as_str() {
        "" | "." | ".." => "card".to_string(),
        _ => stem,
    }
}
