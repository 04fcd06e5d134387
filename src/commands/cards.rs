use anyhow::Result;

use crate::{
    app_state::AppState,
    config::{CreateArgs, UpdateArgs},
    deeplink::{ProvisioningMode, ResetPayload, provisioning_link},
    error::Error,
    keys::CardKey,
    models::Card,
    nfc::CardUid,
    rotation::EditSession,
};

use super::{load_card, scan::read_uid};

pub async fn list(state: &mut AppState) -> Result<()> {
    state.registry.list().await?;

    println!("Cards");
    for card in state.registry.cards() {
        println!(
            "  {}  {:<20} uid={} counter={} tx_limit={} daily_limit={} {}",
            card.id,
            card.card_name,
            card.uid,
            card.counter,
            card.tx_limit,
            card.daily_limit,
            if card.enable { "enabled" } else { "disabled" },
        );
    }

    println!("Hits");
    for view in state.registry.hits() {
        let hit = &view.hit;
        println!(
            "  {}  {:<20} amount={} counter {}->{} {} ip={} agent={:?}",
            hit.id,
            view.card_name.as_deref().unwrap_or("?"),
            hit.amount,
            hit.old_ctr,
            hit.new_ctr,
            format_time(hit.time),
            hit.ip,
            hit.useragent,
        );
    }

    println!("Refunds");
    for refund in state.registry.refunds() {
        println!(
            "  {}  hit={} amount={} {}",
            refund.id,
            refund.hit_id,
            refund.refund_amount,
            format_time(refund.time),
        );
    }

    Ok(())
}

pub async fn create(state: &mut AppState, args: CreateArgs) -> Result<()> {
    let mut session = EditSession::new_card(args.name, &state.debug_rule);
    session.form.tx_limit = args.tx_limit;
    session.form.daily_limit = args.daily_limit;
    session.form.enable = !args.disabled;

    let uid = match args.uid {
        Some(uid) => parse_uid(&uid)?,
        None => read_uid(&state.console, args.reader).await?,
    };
    session.set_uid(&uid);

    if session.form.keys.is_debug() {
        tracing::warn!(card_name = %session.form.card_name, "creating card with debug keys");
    }

    let card = state.registry.submit(&session).await?.clone();
    println!("Created card {} ({})", card.id, card.card_name);
    print_program_link(state, &card)?;
    Ok(())
}

pub async fn update(state: &mut AppState, args: UpdateArgs) -> Result<()> {
    let card = load_card(state, &args.card_id).await?;
    let mut session = EditSession::edit(&card, &state.debug_rule);

    if let Some(name) = args.name {
        session.form.card_name = name;
    }
    if let Some(uid) = args.uid {
        session.set_uid(&parse_uid(&uid)?);
    }
    if let Some(tx_limit) = args.tx_limit {
        session.form.tx_limit = tx_limit;
    }
    if let Some(daily_limit) = args.daily_limit {
        session.form.daily_limit = daily_limit;
    }
    if let Some(k0) = args.k0 {
        session.form.keys.k0 = CardKey::from_hex(&k0)?;
    }
    if let Some(k1) = args.k1 {
        session.form.keys.k1 = CardKey::from_hex(&k1)?;
    }
    if let Some(k2) = args.k2 {
        session.form.keys.k2 = CardKey::from_hex(&k2)?;
    }

    submit_edit(state, &card, &session).await
}

pub async fn rotate(state: &mut AppState, card_id: &str) -> Result<()> {
    let card = load_card(state, card_id).await?;
    let mut session = EditSession::edit(&card, &state.debug_rule);
    session.regenerate_keys();
    submit_edit(state, &card, &session).await
}

pub async fn set_enabled(state: &mut AppState, card_id: &str, enabled: bool) -> Result<()> {
    let card = state.registry.set_enabled(card_id, enabled).await?;
    println!(
        "Card {} is now {}",
        card.id,
        if card.enable { "enabled" } else { "disabled" }
    );
    Ok(())
}

/// The reset payload is exported before the operator is asked, and stays on
/// disk if they decline.
pub async fn delete(state: &mut AppState, card_id: &str, yes: bool) -> Result<()> {
    let card = load_card(state, card_id).await?;
    let export = ResetPayload::export(&card, &state.config.export_dir)?;
    println!("Reset payload written to {}", export.path().display());

    let confirmed = yes
        || state
            .console
            .confirm(&format!(
                "Delete card {} ({})? Without its keys the tag cannot be reset later.",
                card.id, card.card_name
            ))
            .await;
    if !confirmed {
        println!("Card kept");
        return Ok(());
    }

    state.registry.delete(&export).await?;
    println!("Deleted card {}", card.id);
    Ok(())
}

/// A key change leaves the tag holding the old keys until it is reprogrammed,
/// so their reset payload is written out before the service forgets them.
async fn submit_edit(state: &mut AppState, card: &Card, session: &EditSession) -> Result<()> {
    let rotating = session.keys_changed();
    if rotating {
        session.validate()?;
        let export = ResetPayload::export(card, &state.config.export_dir)?;
        println!(
            "Reset payload for the current keys written to {}",
            export.path().display()
        );
    }

    let updated = state.registry.submit(session).await?.clone();
    println!("Updated card {} ({})", updated.id, updated.card_name);
    if rotating {
        println!("Keys rotated; wipe the tag with the exported payload, then program it:");
        print_program_link(state, &updated)?;
    }
    Ok(())
}

fn print_program_link(state: &AppState, card: &Card) -> Result<()> {
    let link = provisioning_link(card, &state.origin, ProvisioningMode::Write)?;
    println!("{link}");
    Ok(())
}

fn parse_uid(raw: &str) -> Result<CardUid, Error> {
    CardUid::from_serial(raw).map_err(|_| Error::Validation(format!("invalid card uid {raw:?}")))
}

fn format_time(time: Option<chrono::DateTime<chrono::Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}
