use anyhow::{Result, bail};
use std::sync::Arc;

use crate::{
    app_state::AppState,
    config::ReaderKind,
    console::Console,
    error::Error,
    nfc::{CardUid, LineReader, NfcReadSession, TagReader, UnavailableReader, cancel_pair},
    rotation::EditSession,
};

use super::load_card;

fn reader(console: &Arc<Console>, kind: ReaderKind) -> Arc<dyn TagReader> {
    match kind {
        ReaderKind::Keyboard => Arc::new(LineReader::new(console.clone())),
        ReaderKind::None => Arc::new(UnavailableReader),
    }
}

/// Read one tag UID. Ctrl+C cancels the current attempt; after a failed read
/// the operator decides whether to try again.
pub async fn read_uid(console: &Arc<Console>, kind: ReaderKind) -> Result<CardUid> {
    let mut session = NfcReadSession::new(reader(console, kind))?;

    loop {
        if !session.can_scan() {
            if !console.confirm("Try reading the tag again?").await {
                bail!("no tag UID read");
            }
            session.retry();
        }

        let (handle, token) = cancel_pair();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handle.cancel();
            }
        });

        eprintln!("Tap your NFC tag to copy its UID");
        let result = session.scan(token).await;
        interrupt.abort();
        tracing::debug!(state = ?session.state(), "scan attempt finished");

        match result {
            Ok(uid) => return Ok(uid),
            Err(Error::ScanFailed(reason)) => {
                eprintln!("There was an error reading this NFC tag: {reason}");
            }
            Err(err) => return Err(err.into()),
        }
    }
}

pub async fn scan(state: &mut AppState, card_id: Option<&str>, kind: ReaderKind) -> Result<()> {
    let Some(card_id) = card_id else {
        println!("{}", read_uid(&state.console, kind).await?);
        return Ok(());
    };

    let card = load_card(state, card_id).await?;
    let mut session = EditSession::edit(&card, &state.debug_rule);
    let uid = read_uid(&state.console, kind).await?;
    session.set_uid(&uid);

    let updated = state.registry.submit(&session).await?;
    println!("Card {} uid set to {}", updated.id, updated.uid);
    Ok(())
}
