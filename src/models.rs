use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    error::{Error, Result},
    keys::{CardKey, KeySet},
};

const UID_LEN: usize = 7;

/// A provisioned card as stored by the card service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    #[serde(default)]
    pub wallet: String,
    pub card_name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub counter: i64,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub tx_limit: i64,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub daily_limit: i64,
    #[serde(default = "enabled_by_default")]
    pub enable: bool,
    #[serde(flatten)]
    pub keys: KeySet,
    #[serde(default)]
    pub otp: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub time: Option<DateTime<Utc>>,
}

/// A tap recorded by the card service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: String,
    pub card_id: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub spent: bool,
    #[serde(default)]
    pub useragent: String,
    pub old_ctr: i64,
    pub new_ctr: i64,
    #[serde(default)]
    pub amount: i64,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub time: Option<DateTime<Utc>>,
}

/// A hit resolved against the cached cards.
#[derive(Debug, Clone, PartialEq)]
pub struct HitView {
    pub hit: Hit,
    pub card_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub hit_id: String,
    pub refund_amount: i64,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub time: Option<DateTime<Utc>>,
}

/// Editable card fields, as an operator sees them in an edit session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardForm {
    pub card_name: String,
    pub uid: String,
    pub counter: i64,
    pub tx_limit: i64,
    pub daily_limit: i64,
    pub enable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet: Option<String>,
    #[serde(flatten)]
    pub keys: KeySet,
}

impl CardForm {
    pub fn new(card_name: impl Into<String>, keys: KeySet) -> Self {
        Self {
            card_name: card_name.into(),
            uid: String::new(),
            counter: 0,
            tx_limit: 0,
            daily_limit: 0,
            enable: true,
            wallet: None,
            keys,
        }
    }

    pub fn from_card(card: &Card) -> Self {
        Self {
            card_name: card.card_name.clone(),
            uid: card.uid.clone(),
            counter: card.counter,
            tx_limit: card.tx_limit,
            daily_limit: card.daily_limit,
            enable: card.enable,
            wallet: (!card.wallet.is_empty()).then(|| card.wallet.clone()),
            keys: card.keys.clone(),
        }
    }

    /// Shape checks the card service applies too: a 7-byte UID and three
    /// 16-byte keys, all hex.
    pub fn validate(&self) -> Result<()> {
        if self.card_name.trim().is_empty() {
            return Err(Error::Validation("card name must not be empty".to_string()));
        }
        match hex::decode(&self.uid) {
            Ok(bytes) if bytes.len() == UID_LEN => {}
            Ok(_) => {
                return Err(Error::Validation(format!(
                    "card uid must be {UID_LEN} bytes"
                )));
            }
            Err(_) => return Err(Error::Validation("card uid is not valid hex".to_string())),
        }
        if self.tx_limit < 0 || self.daily_limit < 0 {
            return Err(Error::Validation("limits must not be negative".to_string()));
        }
        self.keys.check()
    }
}

/// Body of `POST cards`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateCardRequest {
    #[serde(flatten)]
    pub card: CardForm,
}

/// Key values a card held before the edit, sent as `prev_k0..prev_k2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviousKeys {
    #[serde(rename = "prev_k0")]
    pub k0: CardKey,
    #[serde(rename = "prev_k1")]
    pub k1: CardKey,
    #[serde(rename = "prev_k2")]
    pub k2: CardKey,
}

impl From<KeySet> for PreviousKeys {
    fn from(keys: KeySet) -> Self {
        Self {
            k0: keys.k0,
            k1: keys.k1,
            k2: keys.k2,
        }
    }
}

/// Body of `PUT cards/{id}`. `previous` is only present for a rotation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateCardRequest {
    #[serde(flatten)]
    pub card: CardForm,
    #[serde(flatten)]
    pub previous: Option<PreviousKeys>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceErrorBody {
    pub detail: serde_json::Value,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(i64),
    Float(f64),
    Text(String),
}

/// Older card tables keep limits in TEXT columns.
fn lenient_amount<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) => Ok(n),
        NumberOrText::Float(f) => Ok(f as i64),
        NumberOrText::Text(s) if s.trim().is_empty() => Ok(0),
        NumberOrText::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<NumberOrText>::deserialize(deserializer)?;
    let parsed = match raw {
        None => None,
        Some(NumberOrText::Number(secs)) => DateTime::from_timestamp(secs, 0),
        Some(NumberOrText::Float(secs)) => DateTime::from_timestamp(secs as i64, 0),
        Some(NumberOrText::Text(s)) => parse_timestamp(&s),
    };
    Ok(parsed)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_keys;
    use serde_json::json;

    fn card_json() -> serde_json::Value {
        json!({
            "id": "CARD1",
            "wallet": "w1",
            "card_name": "alice",
            "uid": "04996C6A926980",
            "external_id": "ext1",
            "counter": 7,
            "tx_limit": "1000",
            "daily_limit": 5000,
            "enable": true,
            "k0": "0C3B25D92B38AE443229DD59AD34B85D",
            "k1": "0c3b25d92b38ae443229dd59ad34b85d",
            "k2": "b45775776cb224c75bcde7ca3704e933",
            "prev_k0": "00000000000000000000000000000000",
            "otp": "abcd",
            "time": "2024-03-01T12:30:00"
        })
    }

    #[test]
    fn test_card_decodes_service_record() {
        let card: Card = serde_json::from_value(card_json()).unwrap();
        assert_eq!(card.tx_limit, 1000);
        assert_eq!(card.daily_limit, 5000);
        assert_eq!(card.keys.k0.as_str(), "0C3B25D92B38AE443229DD59AD34B85D");
        assert_eq!(
            card.time.unwrap().to_rfc3339(),
            "2024-03-01T12:30:00+00:00"
        );
    }

    #[test]
    fn test_timestamp_formats() {
        assert!(parse_timestamp("2024-03-01T12:30:00Z").is_some());
        assert!(parse_timestamp("2024-03-01 12:30:00.123456").is_some());
        assert!(parse_timestamp("yesterday").is_none());

        let hit: Hit = serde_json::from_value(json!({
            "id": "h1", "card_id": "CARD1", "old_ctr": 1, "new_ctr": 2, "time": 1709296200
        }))
        .unwrap();
        assert_eq!(hit.time.unwrap().timestamp(), 1709296200);
    }

    #[test]
    fn test_update_without_previous_keys_omits_prev_fields() {
        let card: Card = serde_json::from_value(card_json()).unwrap();
        let request = UpdateCardRequest {
            card: CardForm::from_card(&card),
            previous: None,
        };
        let body = serde_json::to_value(&request).unwrap();
        let fields = body.as_object().unwrap();
        assert!(!fields.contains_key("prev_k0"));
        assert!(!fields.contains_key("prev_k1"));
        assert!(!fields.contains_key("prev_k2"));
        assert_eq!(body["k0"], "0C3B25D92B38AE443229DD59AD34B85D");
        assert_eq!(body["wallet"], "w1");
    }

    #[test]
    fn test_update_with_previous_keys_serializes_prev_fields() {
        let card: Card = serde_json::from_value(card_json()).unwrap();
        let mut form = CardForm::from_card(&card);
        form.keys = generate_keys(false);
        let request = UpdateCardRequest {
            card: form,
            previous: Some(card.keys.clone().into()),
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["prev_k0"], "0C3B25D92B38AE443229DD59AD34B85D");
        assert_eq!(body["prev_k1"], "0c3b25d92b38ae443229dd59ad34b85d");
        assert_eq!(body["prev_k2"], "b45775776cb224c75bcde7ca3704e933");
        assert_ne!(body["k1"], body["prev_k1"]);
    }

    #[test]
    fn test_form_validation() {
        let mut form = CardForm::new("alice", generate_keys(false));
        form.uid = "04996C6A926980".to_string();
        assert!(form.validate().is_ok());

        form.uid = "04996C".to_string();
        assert!(matches!(form.validate(), Err(Error::Validation(_))));

        form.uid = "04996C6A926980".to_string();
        form.tx_limit = -1;
        assert!(matches!(form.validate(), Err(Error::Validation(_))));

        let blank = CardForm::new("  ", generate_keys(false));
        assert!(matches!(blank.validate(), Err(Error::Validation(_))));
    }
}
