use anyhow::Result;

use crate::{
    app_state::AppState,
    deeplink::{ProvisioningMode, ResetPayload, provisioning_link},
};

use super::load_card;

/// Print the programming (or reset) deep link for a card.
pub async fn link(state: &mut AppState, card_id: &str, wipe: bool) -> Result<()> {
    let card = load_card(state, card_id).await?;
    let mode = if wipe {
        ProvisioningMode::Wipe
    } else {
        ProvisioningMode::Write
    };
    println!("{}", provisioning_link(&card, &state.origin, mode)?);
    if wipe {
        println!("{}", ResetPayload::from_card(&card).to_json()?);
    }
    Ok(())
}

pub async fn export_wipe(state: &mut AppState, card_id: &str) -> Result<()> {
    let card = load_card(state, card_id).await?;
    let export = ResetPayload::export(&card, &state.config.export_dir)?;
    println!("{}", export.path().display());
    Ok(())
}
