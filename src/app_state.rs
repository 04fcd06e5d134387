use std::sync::Arc;
use url::Url;

use crate::{
    config::Config,
    console::Console,
    error::Result,
    keys::DebugCardRule,
    registry::CardRegistry,
    service::{CardService, HttpCardService},
};

pub struct AppState {
    pub config: Arc<Config>,
    pub origin: Url,
    pub debug_rule: DebugCardRule,
    pub registry: CardRegistry,
    pub console: Arc<Console>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        service: Arc<dyn CardService>,
        console: Arc<Console>,
    ) -> Result<Self> {
        Ok(Self {
            origin: config.origin()?,
            debug_rule: config.debug_rule(),
            registry: CardRegistry::new(service),
            console,
            config,
        })
    }

    pub fn from_config(config: Arc<Config>) -> Result<Self> {
        let service: Arc<dyn CardService> = Arc::new(HttpCardService::new(
            &config.origin()?,
            config.admin_key.clone(),
            config.invoice_key.clone(),
            config.all_wallets,
            config.timeout(),
        )?);

        Self::new(config, service, Arc::new(Console::stdin()?))
    }
}
