use std::sync::Arc;

use quotecraft_core::clock::Clock;
use quotecraft_core::config::{AppConfig, MailConfig};
use quotecraft_core::delivery::{DeliveryError, DocumentRenderer, MailTransport};
use quotecraft_db::{
    ClientRepository, DbPool, QuoteRepository, QuoteRepositorySettings, ServiceRepository,
    SqlClientRepository, SqlQuoteRepository, SqlServiceRepository, SqlUserRepository,
    UserRepository,
};

use crate::delivery::{DeliverySettings, QuoteDelivery};
use crate::outbox::{DisabledTransport, OutboxTransport};
use crate::render::{HtmlDocumentRenderer, QuoteTemplates};

/// Shared handles for every request handler.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub users: Arc<dyn UserRepository>,
    pub clients: Arc<dyn ClientRepository>,
    pub services: Arc<dyn ServiceRepository>,
    pub quotes: Arc<dyn QuoteRepository>,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub delivery: Arc<QuoteDelivery>,
    pub clock: Arc<dyn Clock>,
    /// Public origin for `/view?token=` links.
    pub share_base_url: String,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        db_pool: DbPool,
        clock: Arc<dyn Clock>,
        transport: Arc<dyn MailTransport>,
    ) -> Result<Self, DeliveryError> {
        let quotes: Arc<dyn QuoteRepository> = Arc::new(SqlQuoteRepository::new(
            db_pool.clone(),
            clock.clone(),
            QuoteRepositorySettings {
                token_expiry_days: config.sharing.token_expiry_days,
                default_valid_days: config.quotes.default_valid_days,
                number_reservation_attempts: config.quotes.number_reservation_attempts,
            },
        ));
        let templates = Arc::new(QuoteTemplates::embedded()?);
        let renderer: Arc<dyn DocumentRenderer> =
            Arc::new(HtmlDocumentRenderer::new(QuoteTemplates::embedded()?));
        let delivery = QuoteDelivery::new(
            quotes.clone(),
            templates,
            renderer.clone(),
            transport,
            DeliverySettings {
                from_address: config.mail.from_address.clone(),
                base_url: config.sharing.base_url.clone(),
            },
        );

        Ok(Self {
            users: Arc::new(SqlUserRepository::new(db_pool.clone(), clock.clone())),
            clients: Arc::new(SqlClientRepository::new(db_pool.clone(), clock.clone())),
            services: Arc::new(SqlServiceRepository::new(db_pool.clone(), clock.clone())),
            quotes,
            renderer,
            delivery: Arc::new(delivery),
            clock,
            share_base_url: config.sharing.base_url.clone(),
            db_pool,
        })
    }
}

/// Bundled transport selected by `mail.enabled`.
pub fn transport_for(config: &MailConfig) -> Arc<dyn MailTransport> {
    if config.enabled {
        Arc::new(OutboxTransport::new(config.outbox_dir.clone()))
    } else {
        Arc::new(DisabledTransport)
    }
}
