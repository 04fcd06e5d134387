pub mod cards;
pub mod links;
pub mod scan;

use anyhow::Result;

use crate::{app_state::AppState, config::Command, error::Error, models::Card};

pub async fn run(state: &mut AppState, command: Command) -> Result<()> {
    match command {
        Command::List => cards::list(state).await,
        Command::Create(args) => cards::create(state, args).await,
        Command::Update(args) => cards::update(state, args).await,
        Command::Rotate { card_id } => cards::rotate(state, &card_id).await,
        Command::Enable { card_id } => cards::set_enabled(state, &card_id, true).await,
        Command::Disable { card_id } => cards::set_enabled(state, &card_id, false).await,
        Command::Link { card_id, wipe } => links::link(state, &card_id, wipe).await,
        Command::ExportWipe { card_id } => links::export_wipe(state, &card_id).await,
        Command::Delete { card_id, yes } => cards::delete(state, &card_id, yes).await,
        Command::Scan { card_id, reader } => scan::scan(state, card_id.as_deref(), reader).await,
    }
}

/// Refresh the cache and look up one card.
async fn load_card(state: &mut AppState, card_id: &str) -> Result<Card> {
    state.registry.list().await?;
    let card = state
        .registry
        .card(card_id)
        .cloned()
        .ok_or_else(|| Error::UnknownCard(card_id.to_string()))?;
    Ok(card)
}
