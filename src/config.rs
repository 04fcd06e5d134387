use clap::{Args, Parser, Subcommand};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::{
    error::{Error, Result},
    keys::DebugCardRule,
};

#[derive(Parser, Debug, Clone)]
#[command(name = "boltcard-admin")]
#[command(about = "Provision, rotate and retire Bolt Cards against a Bolt Cards service")]
#[command(version)]
pub struct Config {
    /// Bolt Cards extension root (e.g., "https://lnbits.example.com/boltcards")
    #[arg(long, env = "BOLTCARD_URL")]
    pub url: String,

    /// Admin key of the wallet owning the cards (needed for any change)
    #[arg(long, env = "BOLTCARD_ADMIN_KEY", hide_env_values = true)]
    pub admin_key: Option<String>,

    /// Invoice key used for read-only requests
    #[arg(long, env = "BOLTCARD_INVOICE_KEY", hide_env_values = true)]
    pub invoice_key: Option<String>,

    /// Include cards of every wallet of the key's user
    #[arg(long, env = "BOLTCARD_ALL_WALLETS")]
    pub all_wallets: bool,

    /// Card service request timeout in seconds
    #[arg(long, env = "BOLTCARD_TIMEOUT_SECS", default_value = "30")]
    pub timeout_secs: u64,

    /// Card names containing this marker get fixed debug keys
    #[arg(long, env = "BOLTCARD_DEBUG_MARKER", default_value = "debug")]
    pub debug_marker: String,

    /// Never hand out debug keys, whatever the card name
    #[arg(long)]
    pub no_debug_cards: bool,

    /// Directory where reset payloads are exported
    #[arg(long, env = "BOLTCARD_EXPORT_DIR", default_value = ".")]
    pub export_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show cards, hits and refunds
    List,
    /// Create a card with fresh keys
    Create(CreateArgs),
    /// Edit a card's policy fields or keys
    Update(UpdateArgs),
    /// Replace all three keys of a card
    Rotate { card_id: String },
    Enable { card_id: String },
    Disable { card_id: String },
    /// Print the deep link for the programming app
    Link {
        card_id: String,
        /// Link that resets the tag instead of programming it
        #[arg(long)]
        wipe: bool,
    },
    /// Write a card's reset payload to the export directory
    ExportWipe { card_id: String },
    /// Export the reset payload, then delete the card
    Delete {
        card_id: String,
        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },
    /// Read a tag UID, optionally storing it on a card
    Scan {
        #[arg(long)]
        card_id: Option<String>,
        #[arg(long, value_enum, default_value = "keyboard")]
        reader: ReaderKind,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    #[arg(long)]
    pub name: String,
    /// Tag UID; read from the NFC reader when omitted
    #[arg(long)]
    pub uid: Option<String>,
    #[arg(long, default_value = "0")]
    pub tx_limit: i64,
    #[arg(long, default_value = "0")]
    pub daily_limit: i64,
    #[arg(long)]
    pub disabled: bool,
    #[arg(long, value_enum, default_value = "keyboard")]
    pub reader: ReaderKind,
}

#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    pub card_id: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub uid: Option<String>,
    #[arg(long)]
    pub tx_limit: Option<i64>,
    #[arg(long)]
    pub daily_limit: Option<i64>,
    #[arg(long)]
    pub k0: Option<String>,
    #[arg(long)]
    pub k1: Option<String>,
    #[arg(long)]
    pub k2: Option<String>,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderKind {
    /// USB reader that types the UID like a keyboard
    Keyboard,
    /// No NFC hardware
    None,
}

impl Config {
    /// Extension root with a trailing slash, ready for relative joins.
    pub fn origin(&self) -> Result<Url> {
        let mut raw = self.url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw).map_err(|e| Error::Config(format!("invalid url {raw:?}: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(Error::Config(format!("{raw:?} cannot be a base URL")));
        }
        Ok(url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn debug_rule(&self) -> DebugCardRule {
        if self.no_debug_cards {
            DebugCardRule::disabled()
        } else {
            DebugCardRule::substring(self.debug_marker.clone())
        }
    }
}
