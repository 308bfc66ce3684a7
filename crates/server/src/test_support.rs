use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;

use quotecraft_core::clock::FixedClock;
use quotecraft_core::config::AppConfig;
use quotecraft_core::delivery::MailTransport;
use quotecraft_core::domain::client::ClientInput;
use quotecraft_core::domain::quote::{QuoteDraft, QuoteId, QuoteItemInput};
use quotecraft_core::domain::service::ServiceInput;
use quotecraft_core::domain::user::{NewUser, Role, UserId};
use quotecraft_core::pricing::Discount;
use quotecraft_core::visibility::Principal;
use quotecraft_db::{connect_with_settings, migrations};

use crate::state::AppState;

pub(crate) const TEST_PASSWORD: &str = "correct horse";

/// In-memory state pinned to 2026-03-10 with links on `http://quotes.test`.
pub(crate) async fn test_state(transport: Arc<dyn MailTransport>) -> AppState {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");

    let mut config = AppConfig::default();
    config.sharing.base_url = "http://quotes.test".to_string();
    let now = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).single().expect("valid time");

    AppState::new(&config, pool, Arc::new(FixedClock::new(now)), transport).expect("state")
}

/// System-owned private draft for `ana@x.com`: 3 x Consulting at 100.00, 50.00 off.
pub(crate) async fn seeded_quote(state: &AppState) -> QuoteId {
    let client = state
        .clients
        .create(
            &Principal::System,
            ClientInput {
                name: "Ana".to_string(),
                email: "ana@x.com".to_string(),
                phone: None,
                company: None,
                address: None,
                is_public: false,
            },
        )
        .await
        .expect("client");
    let service = state
        .services
        .create(&Principal::System, ServiceInput::new("Consulting", Decimal::new(100_00, 2)))
        .await
        .expect("service");

    let mut draft = QuoteDraft::new(client.id, vec![QuoteItemInput::new(service.id, 3)]);
    draft.discount = Discount::Fixed(Decimal::new(50, 0));
    state.quotes.create(&Principal::System, draft).await.expect("quote").id
}

pub(crate) async fn create_user(state: &AppState, username: &str, role: Role) -> UserId {
    let user = NewUser {
        username: username.to_string(),
        email: format!("{username}@example.com"),
        display_name: None,
        role,
    };
    state.users.create(&Principal::System, user, TEST_PASSWORD).await.expect("user").id
}
