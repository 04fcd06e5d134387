use std::sync::Arc;

use crate::{
    deeplink::ResetExport,
    error::{Error, Result},
    models::{Card, CreateCardRequest, Hit, HitView, Refund, UpdateCardRequest},
    rotation::{EditSession, Submission},
    service::CardService,
};

/// Local cache of cards, hits and refunds, kept in step with the card
/// service.
///
/// Only the registry's own operations write the cache, and only after the
/// service confirmed the change. A failed call leaves it as it was.
pub struct CardRegistry {
    service: Arc<dyn CardService>,
    cards: Vec<Card>,
    hits: Vec<HitView>,
    refunds: Vec<Refund>,
}

impl CardRegistry {
    pub fn new(service: Arc<dyn CardService>) -> Self {
        Self {
            service,
            cards: Vec::new(),
            hits: Vec::new(),
            refunds: Vec::new(),
        }
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn hits(&self) -> &[HitView] {
        &self.hits
    }

    pub fn refunds(&self) -> &[Refund] {
        &self.refunds
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.id == card_id)
    }

    /// Reload everything. Hits are fetched after the cards, since naming them
    /// needs the card list.
    pub async fn list(&mut self) -> Result<()> {
        let cards = self.service.list_cards().await?;
        let hits = self.service.list_hits().await?;
        let hits = resolve_hits(&cards, hits);
        let refunds = self.service.list_refunds().await?;

        tracing::info!(
            cards = cards.len(),
            hits = hits.len(),
            refunds = refunds.len(),
            "card cache refreshed"
        );
        self.cards = cards;
        self.hits = hits;
        self.refunds = refunds;
        Ok(())
    }

    pub async fn create(&mut self, request: &CreateCardRequest) -> Result<&Card> {
        let card = self.service.create_card(request).await?;
        tracing::info!(card_id = %card.id, card_name = %card.card_name, "card created");
        self.cards.push(card);
        Ok(&self.cards[self.cards.len() - 1])
    }

    pub async fn update(&mut self, card_id: &str, request: &UpdateCardRequest) -> Result<&Card> {
        let card = self.service.update_card(card_id, request).await?;
        tracing::info!(
            card_id = %card.id,
            rotated = request.previous.is_some(),
            "card updated"
        );
        Ok(self.replace(card))
    }

    /// Send an edit session to the service as a create or an update.
    pub async fn submit(&mut self, session: &EditSession) -> Result<&Card> {
        match session.submission()? {
            Submission::Create(request) => self.create(&request).await,
            Submission::Update { card_id, request } => self.update(&card_id, &request).await,
        }
    }

    pub async fn set_enabled(&mut self, card_id: &str, enabled: bool) -> Result<&Card> {
        let card = self.service.set_enabled(card_id, enabled).await?;
        tracing::info!(card_id = %card.id, enabled = card.enable, "card enable flag changed");
        Ok(self.replace(card))
    }

    /// Delete a card whose reset payload has been exported.
    ///
    /// The export must hold the card's current keys. There is no undo: after
    /// this the export is the only copy of the keys.
    pub async fn delete(&mut self, export: &ResetExport) -> Result<()> {
        let card_id = export.card_id();
        let card = self
            .card(card_id)
            .ok_or_else(|| Error::UnknownCard(card_id.to_string()))?;
        if &card.keys != export.keys() {
            return Err(Error::Validation(format!(
                "reset payload {} does not hold the current keys of card {card_id}, export it again",
                export.path().display()
            )));
        }

        self.service.delete_card(card_id).await?;
        tracing::info!(
            card_id,
            reset_payload = %export.path().display(),
            "card deleted"
        );
        self.cards.retain(|c| c.id != card_id);
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.hits)
            .into_iter()
            .partition(|h| h.hit.card_id == card_id);
        self.hits = kept;
        self.refunds
            .retain(|r| !removed.iter().any(|h| h.hit.id == r.hit_id));
        Ok(())
    }

    fn replace(&mut self, card: Card) -> &Card {
        self.cards.retain(|c| c.id != card.id);
        self.cards.push(card);
        &self.cards[self.cards.len() - 1]
    }
}

fn resolve_hits(cards: &[Card], hits: Vec<Hit>) -> Vec<HitView> {
    hits.into_iter()
        .map(|hit| {
            let card_name = cards
                .iter()
                .find(|c| c.id == hit.card_id)
                .map(|c| c.card_name.clone());
            HitView { hit, card_name }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        deeplink::ResetPayload,
        keys::{DebugCardRule, KeySet, generate_keys},
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory card service recording calls in order.
    #[derive(Default)]
    pub(crate) struct MemoryService {
        pub(crate) cards: Mutex<Vec<Card>>,
        pub(crate) hits: Vec<Hit>,
        pub(crate) refunds: Vec<Refund>,
        pub(crate) calls: Mutex<Vec<String>>,
        pub(crate) reject: Option<&'static str>,
        pub(crate) reject_updates: bool,
    }

    impl MemoryService {
        fn record(&self, call: &str) -> Result<()> {
            self.calls.lock().unwrap().push(call.to_string());
            match self.reject {
                Some(detail) => Err(Error::BackendRejected {
                    status: Some(400),
                    detail: detail.to_string(),
                }),
                None => Ok(()),
            }
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CardService for MemoryService {
        async fn list_cards(&self) -> Result<Vec<Card>> {
            self.record("list_cards")?;
            Ok(self.cards.lock().unwrap().clone())
        }

        async fn create_card(&self, request: &CreateCardRequest) -> Result<Card> {
            self.record("create_card")?;
            let form = &request.card;
            let mut cards = self.cards.lock().unwrap();
            let card = Card {
                id: format!("CARD{}", cards.len() + 1),
                wallet: "w1".to_string(),
                card_name: form.card_name.clone(),
                uid: form.uid.clone(),
                external_id: "ext".to_string(),
                counter: form.counter,
                tx_limit: form.tx_limit,
                daily_limit: form.daily_limit,
                enable: form.enable,
                keys: form.keys.clone(),
                otp: "otp".to_string(),
                time: None,
            };
            cards.push(card.clone());
            Ok(card)
        }

        async fn update_card(&self, card_id: &str, request: &UpdateCardRequest) -> Result<Card> {
            self.record("update_card")?;
            if self.reject_updates {
                return Err(Error::BackendRejected {
                    status: Some(400),
                    detail: "Card does not exist.".to_string(),
                });
            }
            let mut cards = self.cards.lock().unwrap();
            let card = cards
                .iter_mut()
                .find(|c| c.id == card_id)
                .ok_or_else(|| Error::BackendRejected {
                    status: Some(404),
                    detail: "Card does not exist.".to_string(),
                })?;
            if let Some(previous) = &request.previous {
                if previous.k0 != card.keys.k0 || previous.k1 != card.keys.k1 {
                    return Err(Error::BackendRejected {
                        status: Some(400),
                        detail: "previous keys do not match".to_string(),
                    });
                }
            }
            card.card_name = request.card.card_name.clone();
            card.uid = request.card.uid.clone();
            card.tx_limit = request.card.tx_limit;
            card.keys = request.card.keys.clone();
            Ok(card.clone())
        }

        async fn set_enabled(&self, card_id: &str, enable: bool) -> Result<Card> {
            self.record("set_enabled")?;
            let mut cards = self.cards.lock().unwrap();
            let card = cards.iter_mut().find(|c| c.id == card_id).unwrap();
            card.enable = enable;
            Ok(card.clone())
        }

        async fn delete_card(&self, card_id: &str) -> Result<()> {
            self.record("delete_card")?;
            self.cards.lock().unwrap().retain(|c| c.id != card_id);
            Ok(())
        }

        async fn list_hits(&self) -> Result<Vec<Hit>> {
            self.record("list_hits")?;
            Ok(self.hits.clone())
        }

        async fn list_refunds(&self) -> Result<Vec<Refund>> {
            self.record("list_refunds")?;
            Ok(self.refunds.clone())
        }
    }

    pub(crate) fn card(id: &str, name: &str) -> Card {
        Card {
            id: id.to_string(),
            wallet: "w1".to_string(),
            card_name: name.to_string(),
            uid: "04996C6A926980".to_string(),
            external_id: "ext".to_string(),
            counter: 0,
            tx_limit: 1000,
            daily_limit: 10000,
            enable: true,
            keys: generate_keys(false),
            otp: "otp".to_string(),
            time: None,
        }
    }

    fn hit(id: &str, card_id: &str) -> Hit {
        Hit {
            id: id.to_string(),
            card_id: card_id.to_string(),
            ip: "127.0.0.1".to_string(),
            spent: true,
            useragent: "wallet".to_string(),
            old_ctr: 1,
            new_ctr: 2,
            amount: 21,
            time: None,
        }
    }

    pub(crate) fn seeded() -> MemoryService {
        MemoryService {
            cards: Mutex::new(vec![card("CARD1", "alice"), card("CARD2", "bob")]),
            hits: vec![hit("h1", "CARD2"), hit("h2", "GONE")],
            refunds: vec![Refund {
                id: "r1".to_string(),
                hit_id: "h1".to_string(),
                refund_amount: 5,
                time: None,
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_list_loads_cards_before_hits_and_names_them() {
        let service = Arc::new(seeded());
        let mut registry = CardRegistry::new(service.clone());
        registry.list().await.unwrap();

        assert_eq!(
            service.calls(),
            vec!["list_cards", "list_hits", "list_refunds"]
        );
        assert_eq!(registry.cards().len(), 2);
        assert_eq!(registry.hits()[0].card_name.as_deref(), Some("bob"));
        assert_eq!(registry.hits()[1].card_name, None);
        assert_eq!(registry.refunds().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_list_keeps_previous_cache() {
        let mut registry = CardRegistry::new(Arc::new(seeded()));
        registry.list().await.unwrap();

        registry.service = Arc::new(MemoryService {
            reject: Some("unavailable"),
            ..Default::default()
        });
        assert!(matches!(
            registry.list().await,
            Err(Error::BackendRejected { .. })
        ));
        assert_eq!(registry.cards().len(), 2);
        assert_eq!(registry.hits().len(), 2);
    }

    #[tokio::test]
    async fn test_create_debug_card_keeps_keys_verbatim() {
        let mut registry = CardRegistry::new(Arc::new(MemoryService::default()));
        let mut session = EditSession::new_card("debug-1", &DebugCardRule::default());
        session.form.uid = "04996C6A926980".to_string();

        let created = registry.submit(&session).await.unwrap().clone();
        assert_eq!(created.id, "CARD1");
        assert_eq!(created.keys, KeySet::debug());
        assert_eq!(registry.cards(), &[created]);
    }

    #[tokio::test]
    async fn test_rotation_replaces_cached_record() {
        let service = Arc::new(seeded());
        let mut registry = CardRegistry::new(service.clone());
        registry.list().await.unwrap();

        let mut session = EditSession::edit(registry.card("CARD1").unwrap(), &DebugCardRule::default());
        session.regenerate_keys();
        let new_keys = session.form.keys.clone();

        registry.submit(&session).await.unwrap();
        assert_eq!(registry.cards().len(), 2);
        assert_eq!(registry.card("CARD1").unwrap().keys, new_keys);
    }

    #[tokio::test]
    async fn test_rejected_rotation_leaves_cache_unchanged() {
        let service = Arc::new(seeded());
        let mut registry = CardRegistry::new(service.clone());
        registry.list().await.unwrap();
        let before = registry.card("CARD1").unwrap().clone();

        // Someone else rotated the card since our snapshot.
        service.cards.lock().unwrap()[0].keys = generate_keys(false);

        let mut session = EditSession::edit(&before, &DebugCardRule::default());
        session.regenerate_keys();
        let err = registry.submit(&session).await.unwrap_err();

        assert!(matches!(err, Error::BackendRejected { ref detail, .. } if detail == "previous keys do not match"));
        assert_eq!(registry.card("CARD1"), Some(&before));
    }

    #[tokio::test]
    async fn test_set_enabled_replaces_record() {
        let mut registry = CardRegistry::new(Arc::new(seeded()));
        registry.list().await.unwrap();

        let card = registry.set_enabled("CARD2", false).await.unwrap();
        assert!(!card.enable);
        assert!(!registry.card("CARD2").unwrap().enable);
        assert_eq!(registry.cards().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_requires_export_and_removes_card() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(seeded());
        let mut registry = CardRegistry::new(service.clone());
        registry.list().await.unwrap();

        let card = registry.card("CARD2").unwrap().clone();
        let export = ResetPayload::export(&card, dir.path()).unwrap();
        assert!(export.path().exists());

        registry.delete(&export).await.unwrap();
        assert!(registry.card("CARD2").is_none());
        assert!(registry.hits().iter().all(|h| h.hit.card_id != "CARD2"));
        assert!(registry.refunds().is_empty());
        assert!(service.calls().contains(&"delete_card".to_string()));

        assert!(matches!(
            registry.delete(&export).await,
            Err(Error::UnknownCard(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_card() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = CardRegistry::new(Arc::new(seeded()));
        registry.list().await.unwrap();
        registry.service = Arc::new(MemoryService {
            reject: Some("Not your card."),
            ..Default::default()
        });

        let card = registry.card("CARD1").unwrap().clone();
        let export = ResetPayload::export(&card, dir.path()).unwrap();
        assert!(registry.delete(&export).await.is_err());
        assert!(registry.card("CARD1").is_some());
    }

    #[tokio::test]
    async fn test_delete_refused_after_rotation_since_export() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(seeded());
        let mut registry = CardRegistry::new(service.clone());
        registry.list().await.unwrap();

        let before = registry.card("CARD1").unwrap().clone();
        let stale = ResetPayload::export(&before, dir.path()).unwrap();

        let mut session = EditSession::edit(&before, &DebugCardRule::default());
        session.regenerate_keys();
        registry.submit(&session).await.unwrap();

        assert!(matches!(
            registry.delete(&stale).await,
            Err(Error::Validation(_))
        ));
        assert!(registry.card("CARD1").is_some());
        assert!(!service.calls().contains(&"delete_card".to_string()));

        let rotated = registry.card("CARD1").unwrap().clone();
        let fresh = ResetPayload::export(&rotated, dir.path()).unwrap();
        registry.delete(&fresh).await.unwrap();
        assert!(registry.card("CARD1").is_none());
    }

    #[tokio::test]
    async fn test_delete_keeps_refunds_of_other_cards() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = CardRegistry::new(Arc::new(seeded()));
        registry.list().await.unwrap();

        let alice = registry.card("CARD1").unwrap().clone();
        let export = ResetPayload::export(&alice, dir.path()).unwrap();
        registry.delete(&export).await.unwrap();

        assert_eq!(registry.hits().len(), 2);
        assert_eq!(registry.refunds().len(), 1);
    }
}
