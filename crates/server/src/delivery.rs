use std::sync::Arc;

use tracing::{info, warn};

use quotecraft_core::delivery::{DeliveryReceipt, DocumentRenderer, MailTransport, OutgoingMail};
use quotecraft_core::domain::quote::QuoteId;
use quotecraft_core::errors::ApplicationError;
use quotecraft_core::sharing::share_link;
use quotecraft_core::visibility::{require_modifiable, Principal};
use quotecraft_db::QuoteRepository;

use crate::render::QuoteTemplates;

#[derive(Clone, Debug)]
pub struct DeliverySettings {
    pub from_address: String,
    pub base_url: String,
}

/// E-mails a quote to its client and moves drafts to `sent` once the
/// transport has accepted the message.
pub struct QuoteDelivery {
    quotes: Arc<dyn QuoteRepository>,
    templates: Arc<QuoteTemplates>,
    renderer: Arc<dyn DocumentRenderer>,
    transport: Arc<dyn MailTransport>,
    settings: DeliverySettings,
}

impl QuoteDelivery {
    pub fn new(
        quotes: Arc<dyn QuoteRepository>,
        templates: Arc<QuoteTemplates>,
        renderer: Arc<dyn DocumentRenderer>,
        transport: Arc<dyn MailTransport>,
        settings: DeliverySettings,
    ) -> Self {
        Self { quotes, templates, renderer, transport, settings }
    }

    pub async fn send(
        &self,
        actor: &Principal,
        id: QuoteId,
        attach_document: bool,
    ) -> Result<DeliveryReceipt, ApplicationError> {
        let details = self.quotes.get_details(actor, id).await?;
        require_modifiable(&details.quote, actor, "send quote")?;

        let grant = self.quotes.ensure_token(actor, id).await?;
        let link = share_link(&self.settings.base_url, &grant.token);

        let attachment =
            if attach_document { Some(self.renderer.render(&details)?) } else { None };
        let mail = OutgoingMail {
            from: self.settings.from_address.clone(),
            to: details.client.email.clone(),
            subject: QuoteTemplates::email_subject(&details),
            html_body: self.templates.email_body(&details, &link)?,
            attachment,
        };

        if let Err(error) = self.transport.send(&mail).await {
            warn!(
                event_name = "delivery.failed",
                quote_id = id.0,
                quote_number = %details.quote.quote_number,
                error = %error,
                "quote e-mail was not accepted by the transport"
            );
            return Err(error.into());
        }

        let status = self.quotes.mark_delivered(actor, id).await?;
        let status_changed = status != details.quote.status;
        info!(
            event_name = "delivery.sent",
            quote_id = id.0,
            quote_number = %details.quote.quote_number,
            status = %status,
            status_changed,
            attached_document = mail.attachment.is_some(),
            token_prefix = grant.token.log_prefix(),
            "quote e-mailed to client"
        );

        Ok(DeliveryReceipt { quote_id: id, recipient: mail.to, link, status, status_changed })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use quotecraft_core::delivery::{DeliveryError, MailTransport, OutgoingMail};
    use quotecraft_core::domain::quote::{QuoteId, QuoteStatus};
    use quotecraft_core::domain::user::{Role, UserId};
    use quotecraft_core::errors::ApplicationError;
    use quotecraft_core::visibility::Principal;

    use crate::test_support::{seeded_quote, test_state};

    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub(crate) sent: Mutex<Vec<OutgoingMail>>,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError> {
            self.sent.lock().expect("lock").push(mail.clone());
            Ok(())
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl MailTransport for FailingTransport {
        async fn send(&self, _mail: &OutgoingMail) -> Result<(), DeliveryError> {
            Err(DeliveryError::Transport("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn successful_send_marks_the_draft_as_sent() {
        let transport = Arc::new(RecordingTransport::default());
        let state = test_state(transport.clone()).await;
        let quote_id = seeded_quote(&state).await;

        let receipt =
            state.delivery.send(&Principal::System, quote_id, true).await.expect("send");

        assert_eq!(receipt.status, QuoteStatus::Sent);
        assert!(receipt.status_changed);
        assert_eq!(receipt.recipient, "ana@x.com");
        assert!(receipt.link.starts_with("http://quotes.test/view?token="));

        let sent = transport.sent.lock().expect("lock");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].html_body.contains(&receipt.link));
        assert!(sent[0].attachment.is_some());
    }

    #[tokio::test]
    async fn resending_keeps_the_same_link_and_status() {
        let transport = Arc::new(RecordingTransport::default());
        let state = test_state(transport.clone()).await;
        let quote_id = seeded_quote(&state).await;

        let first = state.delivery.send(&Principal::System, quote_id, false).await.expect("send");
        let second = state.delivery.send(&Principal::System, quote_id, false).await.expect("send");

        assert_eq!(first.link, second.link);
        assert_eq!(second.status, QuoteStatus::Sent);
        assert!(!second.status_changed);
    }

    #[tokio::test]
    async fn transport_failure_leaves_the_quote_in_draft() {
        let state = test_state(Arc::new(FailingTransport)).await;
        let quote_id = seeded_quote(&state).await;

        let error = state
            .delivery
            .send(&Principal::System, quote_id, false)
            .await
            .expect_err("transport fails");
        assert!(matches!(error, ApplicationError::Transport(_)));

        let details =
            state.quotes.get_details(&Principal::System, quote_id).await.expect("details");
        assert_eq!(details.quote.status, QuoteStatus::Draft);
    }

    #[tokio::test]
    async fn hidden_quotes_cannot_be_sent() {
        let transport = Arc::new(RecordingTransport::default());
        let state = test_state(transport.clone()).await;
        let quote_id = seeded_quote(&state).await;
        let stranger = Principal::user(UserId(999), Role::User);

        let error =
            state.delivery.send(&stranger, quote_id, false).await.expect_err("hidden quote");
        assert!(matches!(error, ApplicationError::NotFound(_)));

        let missing = state
            .delivery
            .send(&Principal::System, QuoteId(404), false)
            .await
            .expect_err("missing quote");
        assert!(matches!(missing, ApplicationError::NotFound(_)));
        assert!(transport.sent.lock().expect("lock").is_empty());
    }
}
