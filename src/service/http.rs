use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use super::CardService;
use crate::{
    error::{Error, Result},
    models::{Card, CreateCardRequest, Hit, Refund, ServiceErrorBody, UpdateCardRequest},
};

const API_KEY_HEADER: &str = "X-Api-Key";

/// Card service client for the Bolt Cards extension REST API.
///
/// Reads authenticate with the invoice key (or the admin key if that is all
/// we have); writes need the admin key.
pub struct HttpCardService {
    api_base: Url,
    admin_key: Option<String>,
    invoice_key: Option<String>,
    all_wallets: bool,
    client: Client,
    timeout: Duration,
}

impl HttpCardService {
    /// `origin` is the extension root, e.g. `https://host/boltcards/`.
    pub fn new(
        origin: &Url,
        admin_key: Option<String>,
        invoice_key: Option<String>,
        all_wallets: bool,
        timeout: Duration,
    ) -> Result<Self> {
        if admin_key.is_none() && invoice_key.is_none() {
            return Err(Error::Config(
                "an admin key or an invoice key is required".to_string(),
            ));
        }
        let api_base = origin
            .join("api/v1/")
            .map_err(|e| Error::Config(format!("invalid origin {origin}: {e}")))?;

        Ok(Self {
            api_base,
            admin_key,
            invoice_key,
            all_wallets,
            client: Client::new(),
            timeout,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("{} cannot be a base URL", self.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn listing(&self, collection: &str) -> Result<Url> {
        let mut url = self.endpoint(&[collection])?;
        if self.all_wallets {
            url.query_pairs_mut().append_pair("all_wallets", "true");
        }
        Ok(url)
    }

    fn read_key(&self) -> &str {
        self.invoice_key
            .as_deref()
            .or(self.admin_key.as_deref())
            .unwrap_or_default()
    }

    fn write_key(&self) -> Result<&str> {
        self.admin_key
            .as_deref()
            .ok_or_else(|| Error::Config("this operation needs the admin key".to_string()))
    }

    fn request(&self, method: Method, url: Url, key: &str) -> RequestBuilder {
        tracing::debug!(%method, %url, "card service request");
        self.client
            .request(method, url)
            .timeout(self.timeout)
            .header(API_KEY_HEADER, key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<ServiceErrorBody>(&body) {
            Ok(ServiceErrorBody {
                detail: serde_json::Value::String(detail),
            }) => detail,
            Ok(ServiceErrorBody { detail }) => detail.to_string(),
            Err(_) if !body.trim().is_empty() => body,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        };
        tracing::warn!(status = status.as_u16(), %detail, "card service rejected request");

        Err(Error::BackendRejected {
            status: Some(status.as_u16()),
            detail,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl CardService for HttpCardService {
    async fn list_cards(&self) -> Result<Vec<Card>> {
        let url = self.listing("cards")?;
        self.fetch(self.request(Method::GET, url, self.read_key()))
            .await
    }

    async fn create_card(&self, request: &CreateCardRequest) -> Result<Card> {
        let url = self.endpoint(&["cards"])?;
        self.fetch(self.request(Method::POST, url, self.write_key()?).json(request))
            .await
    }

    async fn update_card(&self, card_id: &str, request: &UpdateCardRequest) -> Result<Card> {
        let url = self.endpoint(&["cards", card_id])?;
        self.fetch(self.request(Method::PUT, url, self.write_key()?).json(request))
            .await
    }

    async fn set_enabled(&self, card_id: &str, enable: bool) -> Result<Card> {
        let flag = if enable { "true" } else { "false" };
        let url = self.endpoint(&["cards", "enable", card_id, flag])?;
        self.fetch(self.request(Method::GET, url, self.write_key()?))
            .await
    }

    async fn delete_card(&self, card_id: &str) -> Result<()> {
        let url = self.endpoint(&["cards", card_id])?;
        self.send(self.request(Method::DELETE, url, self.write_key()?))
            .await?;
        Ok(())
    }

    async fn list_hits(&self) -> Result<Vec<Hit>> {
        let url = self.listing("hits")?;
        self.fetch(self.request(Method::GET, url, self.read_key()))
            .await
    }

    async fn list_refunds(&self) -> Result<Vec<Refund>> {
        let url = self.listing("refunds")?;
        self.fetch(self.request(Method::GET, url, self.read_key()))
            .await
    }
}
