pub mod http;

use async_trait::async_trait;

use crate::{
    error::Result,
    models::{Card, CreateCardRequest, Hit, Refund, UpdateCardRequest},
};

pub use http::HttpCardService;

/// The remote card service. Errors come back as
/// [`Error::BackendRejected`](crate::error::Error::BackendRejected) with the
/// service's own message; nothing is retried.
#[async_trait]
pub trait CardService: Send + Sync {
    /// GET cards
    async fn list_cards(&self) -> Result<Vec<Card>>;

    /// POST cards
    async fn create_card(&self, request: &CreateCardRequest) -> Result<Card>;

    /// PUT cards/{id}
    async fn update_card(&self, card_id: &str, request: &UpdateCardRequest) -> Result<Card>;

    /// GET cards/enable/{id}/{enable}
    async fn set_enabled(&self, card_id: &str, enable: bool) -> Result<Card>;

    /// DELETE cards/{id}
    async fn delete_card(&self, card_id: &str) -> Result<()>;

    /// GET hits
    async fn list_hits(&self) -> Result<Vec<Hit>>;

    /// GET refunds
    async fn list_refunds(&self) -> Result<Vec<Refund>>;
}
