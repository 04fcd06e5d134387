use crate::{
    error::{Error, Result},
    keys::{DebugCardRule, KeySet, generate_keys},
    models::{Card, CardForm, CreateCardRequest, PreviousKeys, UpdateCardRequest},
    nfc::CardUid,
};

/// What an edit session turns into when the operator submits it.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Create(CreateCardRequest),
    Update {
        card_id: String,
        request: UpdateCardRequest,
    },
}

/// One pass of the card editor.
///
/// For an existing card the key triple is snapshotted when the session
/// opens. The snapshot is private and never changes, whatever happens to the
/// editable form; it is the evidence sent as `prev_k*` when keys change.
#[derive(Debug, Clone)]
pub struct EditSession {
    card_id: Option<String>,
    snapshot: Option<KeySet>,
    debug_rule: DebugCardRule,
    pub form: CardForm,
}

impl EditSession {
    /// A new card, with debug key material if the rule classifies its name
    /// as a debug card.
    pub fn new_card(card_name: impl Into<String>, rule: &DebugCardRule) -> Self {
        let card_name = card_name.into();
        let keys = generate_keys(rule.matches(&card_name));
        Self {
            card_id: None,
            snapshot: None,
            debug_rule: rule.clone(),
            form: CardForm::new(card_name, keys),
        }
    }

    pub fn edit(card: &Card, rule: &DebugCardRule) -> Self {
        Self {
            card_id: Some(card.id.clone()),
            snapshot: Some(card.keys.clone()),
            debug_rule: rule.clone(),
            form: CardForm::from_card(card),
        }
    }

    pub fn is_new(&self) -> bool {
        self.card_id.is_none()
    }

    /// Replace the live keys with a fresh triple. Uses the form's current
    /// card name for debug detection.
    pub fn regenerate_keys(&mut self) {
        self.form.keys = generate_keys(self.debug_rule.matches(&self.form.card_name));
    }

    pub fn set_uid(&mut self, uid: &CardUid) {
        self.form.uid = uid.to_string();
    }

    /// True when any of k0, k1, k2 differs from the snapshot.
    pub fn keys_changed(&self) -> bool {
        match &self.snapshot {
            Some(snapshot) => {
                snapshot.k0 != self.form.keys.k0
                    || snapshot.k1 != self.form.keys.k1
                    || snapshot.k2 != self.form.keys.k2
            }
            None => false,
        }
    }

    /// Checks run before anything is sent: form shape and the debug-key
    /// guard.
    pub fn validate(&self) -> Result<()> {
        self.form.validate()?;
        self.check_debug_keys()
    }

    /// Validate the form and build the request for the card service.
    pub fn submission(&self) -> Result<Submission> {
        self.validate()?;

        let Some(card_id) = &self.card_id else {
            return Ok(Submission::Create(CreateCardRequest {
                card: self.form.clone(),
            }));
        };

        let previous = match &self.snapshot {
            Some(snapshot) if self.keys_changed() => Some(PreviousKeys::from(snapshot.clone())),
            _ => None,
        };

        Ok(Submission::Update {
            card_id: card_id.clone(),
            request: UpdateCardRequest {
                card: self.form.clone(),
                previous,
            },
        })
    }

    fn check_debug_keys(&self) -> Result<()> {
        let introduces_keys = self.is_new() || self.keys_changed();
        if introduces_keys
            && self.form.keys.is_debug()
            && !self.debug_rule.matches(&self.form.card_name)
        {
            return Err(Error::Validation(format!(
                "debug key material on non-debug card {:?}",
                self.form.card_name
            )));
        }
        Ok(())
    }
}
