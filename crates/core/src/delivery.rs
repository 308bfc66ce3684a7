//! Seams to the document renderer and the mail transport.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::quote::{QuoteDetails, QuoteId, QuoteStatus};
use crate::errors::ApplicationError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub attachment: Option<Attachment>,
}

/// Printable artifact produced from a quote read model.
pub type RenderedDocument = Attachment;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("mail transport failed: {0}")]
    Transport(String),
    #[error("document rendering failed: {0}")]
    Render(String),
}

impl From<DeliveryError> for ApplicationError {
    fn from(error: DeliveryError) -> Self {
        match error {
            DeliveryError::Transport(message) => Self::Transport(message),
            DeliveryError::Render(message) => {
                Self::Configuration(format!("document rendering failed: {message}"))
            }
        }
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Returns only after the message has been accepted for delivery.
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError>;
}

pub trait DocumentRenderer: Send + Sync {
    fn render(&self, details: &QuoteDetails) -> Result<RenderedDocument, DeliveryError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub quote_id: QuoteId,
    pub recipient: String,
    pub link: String,
    pub status: QuoteStatus,
    pub status_changed: bool,
}
