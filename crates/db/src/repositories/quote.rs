use std::collections::HashMap;
use std::sync::Arc;

use chrono::Datelike;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::{debug, info, warn};

use quotecraft_core::clock::Clock;
use quotecraft_core::domain::client::ClientId;
use quotecraft_core::domain::quote::{
    valid_until, Quote, QuoteDetails, QuoteDraft, QuoteFilter, QuoteId, QuoteItem,
    QuoteItemInput, QuoteStatus, QuoteSummary, QuoteUpdate,
};
use quotecraft_core::domain::service::ServiceId;
use quotecraft_core::errors::{ApplicationError, ConflictKind, DomainError, EntityKind};
use quotecraft_core::numbering::QuoteNumber;
use quotecraft_core::pricing::{compute_totals, Discount, DiscountType};
use quotecraft_core::sharing::{ShareGrant, ShareToken, DEFAULT_TOKEN_EXPIRY_DAYS};
use quotecraft_core::visibility::{require_modifiable, require_visible, Principal};

use super::client::fetch_client;
use super::service::fetch_service;
use super::user::owner_display_name;
use super::{
    column, like_pattern, optional_owner, parse_date, parse_decimal, parse_label,
    parse_timestamp, push_scope, QuoteRepository, RepositoryError,
};
use crate::DbPool;

const QUOTE_COLUMNS: &str = "q.id, q.quote_number, q.client_id, q.issue_date, q.valid_until, \
                             q.discount_type, q.discount_value, q.notes, q.status, q.view_token, \
                             q.token_expires_at, q.owner_id, q.is_public, q.created_at, \
                             q.updated_at";

const TOKEN_MINT_ATTEMPTS: u32 = 3;

/// Bumps the per-year counter and returns the reserved sequence. The first
/// reservation of a year is seeded from the highest number already stored.
const RESERVE_NUMBER_SQL: &str = "INSERT INTO quote_number_sequence (year, last_value)
     VALUES (?, COALESCE((SELECT MAX(CAST(substr(quote_number, 9) AS INTEGER))
                          FROM quotes WHERE quote_number LIKE ?), 0) + 1)
     ON CONFLICT(year) DO UPDATE
         SET last_value = MAX(quote_number_sequence.last_value + 1, excluded.last_value)
     RETURNING last_value";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuoteRepositorySettings {
    pub token_expiry_days: u32,
    pub default_valid_days: u32,
    pub number_reservation_attempts: u32,
}

impl Default for QuoteRepositorySettings {
    fn default() -> Self {
        Self {
            token_expiry_days: DEFAULT_TOKEN_EXPIRY_DAYS,
            default_valid_days: 30,
            number_reservation_attempts: 5,
        }
    }
}

pub struct SqlQuoteRepository {
    pool: DbPool,
    clock: Arc<dyn Clock>,
    settings: QuoteRepositorySettings,
}

/// Item with its unit price resolved against the catalogue.
struct ResolvedLine {
    service_id: ServiceId,
    quantity: u32,
    unit_price: Decimal,
}

impl SqlQuoteRepository {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>, settings: QuoteRepositorySettings) -> Self {
        Self { pool, clock, settings }
    }

    async fn modifiable(
        &self,
        conn: &mut SqliteConnection,
        actor: &Principal,
        id: QuoteId,
        action: &'static str,
    ) -> Result<Quote, RepositoryError> {
        let quote = require_visible(fetch_quote(conn, id).await?, actor, EntityKind::Quote)?;
        require_modifiable(&quote, actor, action)?;
        Ok(quote)
    }

    async fn try_create(
        &self,
        actor: &Principal,
        draft: &QuoteDraft,
    ) -> Result<Quote, RepositoryError> {
        let now = self.clock.now();
        let issue_date = now.date_naive();
        let owner = actor.owner_for_new_records();

        let mut tx = self.pool.begin().await?;
        let quote_number = reserve_number(&mut tx, issue_date.year()).await?;

        require_visible(fetch_client(&mut tx, draft.client_id).await?, actor, EntityKind::Client)?;
        let lines = resolve_lines(&mut tx, actor, &draft.items, &[]).await?;
        let days = draft.valid_days.unwrap_or(self.settings.default_valid_days);
        let valid_until = valid_until(issue_date, days);

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO quotes (quote_number, client_id, issue_date, valid_until, discount_type,
                                 discount_value, notes, status, owner_id, is_public, created_at,
                                 updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(quote_number.to_string())
        .bind(draft.client_id.0)
        .bind(issue_date.to_string())
        .bind(valid_until.to_string())
        .bind(draft.discount.kind().as_str())
        .bind(draft.discount.value().to_string())
        .bind(&draft.notes)
        .bind(draft.status.as_str())
        .bind(owner.map(|id| id.0))
        .bind(draft.is_public)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .fetch_one(&mut *tx)
        .await?;

        insert_lines(&mut tx, id, &lines).await?;
        tx.commit().await?;

        info!(
            event_name = "quote.created",
            quote_id = id,
            quote_number = %quote_number,
            item_count = lines.len(),
            "quote created"
        );

        Ok(Quote {
            id: QuoteId(id),
            quote_number,
            client_id: draft.client_id,
            issue_date,
            valid_until,
            status: draft.status,
            discount: draft.discount,
            notes: draft.notes.clone(),
            owner,
            is_public: draft.is_public,
            share: None,
            created_at: now,
            updated_at: now,
        })
    }
}

fn row_to_quote(row: &SqliteRow) -> Result<Quote, RepositoryError> {
    let quote_number: String = column(row, "quote_number")?;
    let issue_date: String = column(row, "issue_date")?;
    let valid_until: String = column(row, "valid_until")?;
    let discount_type: String = column(row, "discount_type")?;
    let discount_value: String = column(row, "discount_value")?;
    let status: String = column(row, "status")?;
    let view_token: Option<String> = column(row, "view_token")?;
    let token_expires_at: Option<String> = column(row, "token_expires_at")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;

    let share = match view_token {
        Some(token) => Some(ShareGrant {
            token: ShareToken::from_stored(token),
            expires_at: token_expires_at.as_deref().map(parse_timestamp).transpose()?,
        }),
        None => None,
    };

    Ok(Quote {
        id: QuoteId(column(row, "id")?),
        quote_number: parse_label(&quote_number)?,
        client_id: ClientId(column(row, "client_id")?),
        issue_date: parse_date(&issue_date)?,
        valid_until: parse_date(&valid_until)?,
        status: parse_label(&status)?,
        discount: parse_discount(&discount_type, &discount_value)?,
        notes: column(row, "notes")?,
        owner: optional_owner(column(row, "owner_id")?),
        is_public: column(row, "is_public")?,
        share,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn parse_discount(kind: &str, value: &str) -> Result<Discount, RepositoryError> {
    let kind: DiscountType = parse_label(kind)?;
    Ok(Discount::from_parts(kind, parse_decimal(value)?))
}

fn parse_quantity(raw: i64) -> Result<u32, RepositoryError> {
    u32::try_from(raw).map_err(|_| RepositoryError::Decode(format!("invalid quantity `{raw}`")))
}

async fn fetch_quote(
    conn: &mut SqliteConnection,
    id: QuoteId,
) -> Result<Option<Quote>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {QUOTE_COLUMNS} FROM quotes q WHERE q.id = ?"))
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_quote).transpose()
}

async fn fetch_items(
    conn: &mut SqliteConnection,
    id: QuoteId,
) -> Result<Vec<QuoteItem>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT qi.id, qi.service_id, s.name AS service_name, qi.quantity, qi.unit_price
         FROM quote_items qi
         JOIN services s ON s.id = qi.service_id
         WHERE qi.quote_id = ?
         ORDER BY qi.id",
    )
    .bind(id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            let unit_price: String = column(row, "unit_price")?;
            Ok(QuoteItem {
                id: column(row, "id")?,
                service_id: ServiceId(column(row, "service_id")?),
                service_name: column(row, "service_name")?,
                quantity: parse_quantity(column(row, "quantity")?)?,
                unit_price: parse_decimal(&unit_price)?,
            })
        })
        .collect()
}

/// Totals are always derived from the stored items.
async fn load_details(
    conn: &mut SqliteConnection,
    quote: Quote,
) -> Result<QuoteDetails, RepositoryError> {
    let client = fetch_client(conn, quote.client_id).await?.ok_or_else(|| {
        RepositoryError::Decode(format!("quote {} references a missing client", quote.id))
    })?;
    let items = fetch_items(conn, quote.id).await?;
    let owner_name = owner_display_name(conn, quote.owner).await?;

    Ok(QuoteDetails::assemble(quote, client, items, owner_name))
}

async fn reserve_number(
    conn: &mut SqliteConnection,
    year: i32,
) -> Result<QuoteNumber, RepositoryError> {
    let reserved: i64 = sqlx::query_scalar(RESERVE_NUMBER_SQL)
        .bind(year)
        .bind(format!("{}%", QuoteNumber::year_prefix(year)))
        .fetch_one(&mut *conn)
        .await?;

    let sequence = u32::try_from(reserved)
        .map_err(|_| RepositoryError::Decode(format!("invalid quote sequence `{reserved}`")))?;
    Ok(QuoteNumber::new(year, sequence)?)
}

/// Services on new lines must be visible and active. Services listed in
/// `retained` are already on the quote and stay usable after deactivation.
async fn resolve_lines(
    conn: &mut SqliteConnection,
    actor: &Principal,
    items: &[QuoteItemInput],
    retained: &[ServiceId],
) -> Result<Vec<ResolvedLine>, RepositoryError> {
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let service =
            require_visible(fetch_service(conn, item.service_id).await?, actor, EntityKind::Service)?;
        if !service.is_active && !retained.contains(&service.id) {
            return Err(DomainError::validation(
                "items",
                format!("service `{}` is inactive", service.name),
            )
            .into());
        }
        lines.push(ResolvedLine {
            service_id: service.id,
            quantity: item.quantity,
            unit_price: item.unit_price.unwrap_or(service.base_price),
        });
    }
    Ok(lines)
}

async fn insert_lines(
    conn: &mut SqliteConnection,
    quote_id: i64,
    lines: &[ResolvedLine],
) -> Result<(), RepositoryError> {
    for line in lines {
        sqlx::query(
            "INSERT INTO quote_items (quote_id, service_id, quantity, unit_price)
             VALUES (?, ?, ?, ?)",
        )
        .bind(quote_id)
        .bind(line.service_id.0)
        .bind(i64::from(line.quantity))
        .bind(line.unit_price.to_string())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn retryable(error: &RepositoryError) -> bool {
    error.conflict_kind() == Some(ConflictKind::DuplicateQuoteNumber) || error.is_busy()
}

#[async_trait::async_trait]
impl QuoteRepository for SqlQuoteRepository {
    async fn create(&self, actor: &Principal, draft: QuoteDraft) -> Result<Quote, RepositoryError> {
        let draft = draft.validate()?;
        let attempts = self.settings.number_reservation_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.try_create(actor, &draft).await {
                Err(error) if attempt < attempts && retryable(&error) => {
                    warn!(
                        event_name = "quote.number.conflict_retry",
                        attempt,
                        max_attempts = attempts,
                        error = %error,
                        "quote number reservation conflicted, retrying"
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn get_details(
        &self,
        actor: &Principal,
        id: QuoteId,
    ) -> Result<QuoteDetails, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let quote = require_visible(fetch_quote(&mut conn, id).await?, actor, EntityKind::Quote)?;
        load_details(&mut conn, quote).await
    }

    async fn list(
        &self,
        actor: &Principal,
        filter: &QuoteFilter,
    ) -> Result<Vec<QuoteSummary>, RepositoryError> {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT q.id, q.quote_number, q.client_id, c.name AS client_name, q.issue_date,
                    q.valid_until, q.status, q.discount_type, q.discount_value, q.owner_id,
                    q.is_public
             FROM quotes q
             JOIN clients c ON c.id = q.client_id
             WHERE 1 = 1",
        );
        if let Some(status) = filter.status {
            builder.push(" AND q.status = ").push_bind(status.as_str());
        }
        if let Some(client_id) = filter.client_id {
            builder.push(" AND q.client_id = ").push_bind(client_id.0);
        }
        if let Some(term) = filter.search.as_deref().filter(|term| !term.trim().is_empty()) {
            let pattern = like_pattern(term);
            builder.push(" AND (q.quote_number LIKE ").push_bind(pattern.clone());
            builder.push(" ESCAPE '\\' OR c.name LIKE ").push_bind(pattern);
            builder.push(" ESCAPE '\\')");
        }
        push_scope(&mut builder, actor.scope(), "q");
        builder.push(" ORDER BY q.issue_date DESC, q.id DESC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = rows.iter().map(|row| column(row, "id")).collect::<Result<_, _>>()?;
        let mut lines = item_lines_for(&self.pool, &ids).await?;

        rows.iter()
            .map(|row| {
                let id: i64 = column(row, "id")?;
                let quote_number: String = column(row, "quote_number")?;
                let issue_date: String = column(row, "issue_date")?;
                let valid_until: String = column(row, "valid_until")?;
                let status: String = column(row, "status")?;
                let discount_type: String = column(row, "discount_type")?;
                let discount_value: String = column(row, "discount_value")?;
                let discount = parse_discount(&discount_type, &discount_value)?;
                let quote_lines = lines.remove(&id).unwrap_or_default();

                Ok(QuoteSummary {
                    id: QuoteId(id),
                    quote_number: parse_label(&quote_number)?,
                    client_id: ClientId(column(row, "client_id")?),
                    client_name: column(row, "client_name")?,
                    issue_date: parse_date(&issue_date)?,
                    valid_until: parse_date(&valid_until)?,
                    status: parse_label(&status)?,
                    owner: optional_owner(column(row, "owner_id")?),
                    is_public: column(row, "is_public")?,
                    totals: compute_totals(&quote_lines, &discount),
                })
            })
            .collect()
    }

    async fn update(
        &self,
        actor: &Principal,
        id: QuoteId,
        update: QuoteUpdate,
    ) -> Result<QuoteDetails, RepositoryError> {
        let update = update.validate()?;
        let mut tx = self.pool.begin().await?;
        let mut quote = self.modifiable(&mut tx, actor, id, "modify this quote").await?;
        if let Some(status) = update.status {
            quote.transition_to(status)?;
        }

        require_visible(fetch_client(&mut tx, update.client_id).await?, actor, EntityKind::Client)?;
        let retained: Vec<ServiceId> =
            sqlx::query_scalar("SELECT service_id FROM quote_items WHERE quote_id = ?")
                .bind(id.0)
                .fetch_all(&mut *tx)
                .await?
                .into_iter()
                .map(ServiceId)
                .collect();
        let lines = resolve_lines(&mut tx, actor, &update.items, &retained).await?;
        let now = self.clock.now();

        sqlx::query(
            "UPDATE quotes
             SET client_id = ?, discount_type = ?, discount_value = ?, notes = ?, status = ?,
                 is_public = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(update.client_id.0)
        .bind(update.discount.kind().as_str())
        .bind(update.discount.value().to_string())
        .bind(&update.notes)
        .bind(quote.status.as_str())
        .bind(update.is_public)
        .bind(now.to_rfc3339())
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM quote_items WHERE quote_id = ?").bind(id.0).execute(&mut *tx).await?;
        insert_lines(&mut tx, id.0, &lines).await?;

        let quote = Quote {
            client_id: update.client_id,
            discount: update.discount,
            notes: update.notes,
            is_public: update.is_public,
            updated_at: now,
            ..quote
        };
        let details = load_details(&mut tx, quote).await?;
        tx.commit().await?;

        info!(event_name = "quote.updated", quote_id = id.0, item_count = lines.len(), "quote updated");
        Ok(details)
    }

    async fn set_status(
        &self,
        actor: &Principal,
        id: QuoteId,
        status: QuoteStatus,
    ) -> Result<Quote, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let mut quote = self.modifiable(&mut conn, actor, id, "change quote status").await?;
        let previous = quote.status;
        quote.transition_to(status)?;
        quote.updated_at = self.clock.now();

        sqlx::query("UPDATE quotes SET status = ?, updated_at = ? WHERE id = ?")
            .bind(quote.status.as_str())
            .bind(quote.updated_at.to_rfc3339())
            .bind(id.0)
            .execute(&mut *conn)
            .await?;

        info!(
            event_name = "quote.status.changed",
            quote_id = id.0,
            from = %previous,
            to = %quote.status,
            "quote status changed"
        );
        Ok(quote)
    }

    async fn delete(&self, actor: &Principal, id: QuoteId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        self.modifiable(&mut tx, actor, id, "delete this quote").await?;
        sqlx::query("DELETE FROM quotes WHERE id = ?").bind(id.0).execute(&mut *tx).await?;
        tx.commit().await?;

        info!(event_name = "quote.deleted", quote_id = id.0, "quote deleted");
        Ok(())
    }

    async fn toggle_visibility(
        &self,
        actor: &Principal,
        id: QuoteId,
    ) -> Result<Quote, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let mut quote = self.modifiable(&mut conn, actor, id, "change quote visibility").await?;
        quote.is_public = !quote.is_public;
        quote.updated_at = self.clock.now();

        sqlx::query("UPDATE quotes SET is_public = ?, updated_at = ? WHERE id = ?")
            .bind(quote.is_public)
            .bind(quote.updated_at.to_rfc3339())
            .bind(id.0)
            .execute(&mut *conn)
            .await?;

        Ok(quote)
    }

    async fn preview_next_number(&self, year: i32) -> Result<QuoteNumber, RepositoryError> {
        let highest: i64 = sqlx::query_scalar(
            "SELECT MAX(
                 COALESCE((SELECT last_value FROM quote_number_sequence WHERE year = ?), 0),
                 COALESCE((SELECT MAX(CAST(substr(quote_number, 9) AS INTEGER))
                           FROM quotes WHERE quote_number LIKE ?), 0))",
        )
        .bind(year)
        .bind(format!("{}%", QuoteNumber::year_prefix(year)))
        .fetch_one(&self.pool)
        .await?;

        let highest = u32::try_from(highest)
            .map_err(|_| RepositoryError::Decode(format!("invalid quote sequence `{highest}`")))?;
        Ok(QuoteNumber::following(year, (highest > 0).then_some(highest))?)
    }

    async fn mark_delivered(
        &self,
        actor: &Principal,
        id: QuoteId,
    ) -> Result<QuoteStatus, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let quote = self.modifiable(&mut conn, actor, id, "send this quote").await?;
        let Some(next) = quote.status.after_delivery() else {
            return Ok(quote.status);
        };

        // Conditional on the stored status so a concurrent edit is not overwritten.
        sqlx::query("UPDATE quotes SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(next.as_str())
            .bind(self.clock.now().to_rfc3339())
            .bind(id.0)
            .bind(quote.status.as_str())
            .execute(&mut *conn)
            .await?;

        let stored: String = sqlx::query_scalar("SELECT status FROM quotes WHERE id = ?")
            .bind(id.0)
            .fetch_one(&mut *conn)
            .await?;
        parse_label(&stored)
    }

    async fn ensure_token(
        &self,
        actor: &Principal,
        id: QuoteId,
    ) -> Result<ShareGrant, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let quote = self.modifiable(&mut conn, actor, id, "share this quote").await?;
        let now = self.clock.now();
        let mut stored = quote.share;

        for _ in 0..TOKEN_MINT_ATTEMPTS {
            // A stored token is reused until it expires; rotation only replaces expired ones.
            if let Some(grant) = stored.as_ref().filter(|grant| grant.is_valid_at(now)) {
                return Ok(grant.clone());
            }

            let grant = ShareGrant::issue(now, self.settings.token_expiry_days);
            let result = sqlx::query(
                "UPDATE quotes SET view_token = ?, token_expires_at = ?
                 WHERE id = ? AND view_token IS ?",
            )
            .bind(grant.token.as_str())
            .bind(grant.expires_at.map(|at| at.to_rfc3339()))
            .bind(id.0)
            .bind(stored.as_ref().map(|previous| previous.token.as_str().to_owned()))
            .execute(&mut *conn)
            .await;

            match result.map_err(RepositoryError::from) {
                Ok(done) if done.rows_affected() == 1 => {
                    info!(
                        event_name = "share.token.minted",
                        quote_id = id.0,
                        token_prefix = grant.token.log_prefix(),
                        replaced_expired = stored.is_some(),
                        "share token minted"
                    );
                    return Ok(grant);
                }
                // Another writer changed the token first; adopt what it stored.
                Ok(_) => {
                    stored = fetch_quote(&mut conn, id)
                        .await?
                        .ok_or(ApplicationError::NotFound(EntityKind::Quote))?
                        .share;
                }
                Err(error) if error.conflict_kind() == Some(ConflictKind::DuplicateToken) => {
                    warn!(event_name = "share.token.collision", quote_id = id.0, "token collision");
                }
                Err(error) => return Err(error),
            }
        }

        Err(ApplicationError::Conflict(ConflictKind::DuplicateToken).into())
    }

    async fn resolve_token(&self, token: &str) -> Result<Option<QuoteId>, RepositoryError> {
        let Some(token) = ShareToken::parse(token) else {
            debug!(event_name = "share.token.rejected", reason = "malformed", "share token rejected");
            return Ok(None);
        };

        let row: Option<(i64, Option<String>)> =
            sqlx::query_as("SELECT id, token_expires_at FROM quotes WHERE view_token = ?")
                .bind(token.as_str())
                .fetch_optional(&self.pool)
                .await?;

        let Some((id, expires_at)) = row else {
            info!(
                event_name = "share.token.rejected",
                reason = "unknown",
                token_prefix = token.log_prefix(),
                "share token rejected"
            );
            return Ok(None);
        };

        let expires_at = expires_at.as_deref().map(parse_timestamp).transpose()?;
        let grant = ShareGrant { token, expires_at };
        if !grant.is_valid_at(self.clock.now()) {
            info!(
                event_name = "share.token.rejected",
                reason = "expired",
                quote_id = id,
                token_prefix = grant.token.log_prefix(),
                "share token rejected"
            );
            return Ok(None);
        }

        Ok(Some(QuoteId(id)))
    }

    async fn revoke_token(&self, actor: &Principal, id: QuoteId) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        self.modifiable(&mut conn, actor, id, "revoke this quote's share link").await?;

        sqlx::query("UPDATE quotes SET view_token = NULL, token_expires_at = NULL WHERE id = ?")
            .bind(id.0)
            .execute(&mut *conn)
            .await?;

        info!(event_name = "share.token.revoked", quote_id = id.0, "share token revoked");
        Ok(())
    }

    async fn get_shared_details(&self, token: &str) -> Result<QuoteDetails, RepositoryError> {
        let not_found = || RepositoryError::from(ApplicationError::NotFound(EntityKind::Quote));
        let id = self.resolve_token(token).await?.ok_or_else(not_found)?;

        let mut conn = self.pool.acquire().await?;
        let quote = fetch_quote(&mut conn, id).await?.ok_or_else(not_found)?;
        load_details(&mut conn, quote).await
    }
}

async fn item_lines_for(
    pool: &DbPool,
    quote_ids: &[i64],
) -> Result<HashMap<i64, Vec<(u32, Decimal)>>, RepositoryError> {
    let mut builder: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("SELECT quote_id, quantity, unit_price FROM quote_items WHERE quote_id IN (");
    let mut separated = builder.separated(", ");
    for id in quote_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let rows = builder.build().fetch_all(pool).await?;
    let mut lines: HashMap<i64, Vec<(u32, Decimal)>> = HashMap::new();
    for row in &rows {
        let unit_price: String = column(row, "unit_price")?;
        lines
            .entry(column(row, "quote_id")?)
            .or_default()
            .push((parse_quantity(column(row, "quantity")?)?, parse_decimal(&unit_price)?));
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use quotecraft_core::clock::FixedClock;
    use quotecraft_core::domain::client::{ClientId, ClientInput};
    use quotecraft_core::domain::quote::{
        QuoteDraft, QuoteFilter, QuoteItemInput, QuoteStatus, QuoteUpdate,
    };
    use quotecraft_core::domain::service::{ServiceId, ServiceInput};
    use quotecraft_core::domain::user::Role;
    use quotecraft_core::errors::{ApplicationError, DomainError, EntityKind};
    use quotecraft_core::pricing::{compute_totals, Discount};
    use quotecraft_core::visibility::Principal;

    use super::{QuoteRepositorySettings, SqlQuoteRepository};
    use crate::repositories::{
        ClientRepository, QuoteRepository, RepositoryError, ServiceRepository,
        SqlClientRepository, SqlServiceRepository,
    };
    use crate::test_support::{insert_user, memory_pool};
    use crate::DbPool;

    fn money(raw: &str) -> Decimal {
        Decimal::from_str(raw).expect("decimal literal")
    }

    fn application(error: RepositoryError) -> ApplicationError {
        ApplicationError::from(error)
    }

    struct Fixture {
        pool: DbPool,
        clock: Arc<FixedClock>,
        quotes: SqlQuoteRepository,
        services: SqlServiceRepository,
        clients: SqlClientRepository,
        alice: Principal,
        bob: Principal,
        client: ClientId,
        consulting: ServiceId,
    }

    impl Fixture {
        async fn new() -> Self {
            let start = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).single().expect("valid time");
            Self::starting_at(start).await
        }

        async fn starting_at(start: chrono::DateTime<Utc>) -> Self {
            let pool = memory_pool().await;
            let clock = Arc::new(FixedClock::new(start));
            let alice = Principal::user(insert_user(&pool, "alice", Role::User).await, Role::User);
            let bob = Principal::user(insert_user(&pool, "bob", Role::User).await, Role::User);

            let clients = SqlClientRepository::new(pool.clone(), clock.clone());
            let services = SqlServiceRepository::new(pool.clone(), clock.clone());
            let quotes =
                SqlQuoteRepository::new(pool.clone(), clock.clone(), QuoteRepositorySettings::default());

            let client = clients
                .create(
                    &alice,
                    ClientInput {
                        name: "Ana".to_string(),
                        email: "ana@x.com".to_string(),
                        ..ClientInput::default()
                    },
                )
                .await
                .expect("client")
                .id;
            let consulting = services
                .create(&alice, ServiceInput::new("Consulting", money("100.00")))
                .await
                .expect("service")
                .id;

            Self { pool, clock, quotes, services, clients, alice, bob, client, consulting }
        }

        fn draft(&self, quantity: u32) -> QuoteDraft {
            QuoteDraft::new(self.client, vec![QuoteItemInput::new(self.consulting, quantity)])
        }

        async fn count(&self, table: &str) -> i64 {
            sqlx::query_scalar(&format!("SELECT COUNT(1) FROM {table}"))
                .fetch_one(&self.pool)
                .await
                .expect("count")
        }
    }

    #[tokio::test]
    async fn consulting_quote_totals_match_the_calculator() {
        let fx = Fixture::new().await;
        let items = vec![QuoteItemInput::priced(fx.consulting, 3, money("100.00"))];
        let draft = QuoteDraft {
            discount: Discount::Fixed(money("50")),
            ..QuoteDraft::new(fx.client, items)
        };

        let quote = fx.quotes.create(&fx.alice, draft).await.expect("create");
        let details = fx.quotes.get_details(&fx.alice, quote.id).await.expect("details");

        assert_eq!(details.totals.subtotal, money("300.00"));
        assert_eq!(details.totals.discount, money("50.00"));
        assert_eq!(details.totals.total, money("250.00"));
        assert_eq!(details.totals, compute_totals(&details.items, &Discount::Fixed(money("50"))));
        assert_eq!(details.client.name, "Ana");
        assert_eq!(details.owner_name, "alice");
        assert_eq!(details.items[0].service_name, "Consulting");
    }

    #[tokio::test]
    async fn missing_unit_price_snapshots_the_base_price() {
        let fx = Fixture::new().await;
        let quote = fx.quotes.create(&fx.alice, fx.draft(2)).await.expect("create");

        let repriced = ServiceInput::new("Consulting", money("180.00"));
        fx.services.update(&fx.alice, fx.consulting, repriced).await.expect("reprice");

        let details = fx.quotes.get_details(&fx.alice, quote.id).await.expect("details");
        assert_eq!(details.items[0].unit_price, money("100.00"));
        assert_eq!(details.totals.total, money("200.00"));
    }

    #[tokio::test]
    async fn numbers_are_sequential_within_a_year() {
        let fx = Fixture::new().await;

        let first = fx.quotes.create(&fx.alice, fx.draft(1)).await.expect("first");
        let second = fx.quotes.create(&fx.alice, fx.draft(1)).await.expect("second");

        assert_eq!(first.quote_number.to_string(), "QT-2026-0001");
        assert_eq!(second.quote_number.to_string(), "QT-2026-0002");
        assert_eq!(
            fx.quotes.preview_next_number(2026).await.expect("preview").to_string(),
            "QT-2026-0003"
        );
        assert_eq!(first.valid_until, first.issue_date + Duration::days(30));
    }

    #[tokio::test]
    async fn numbering_restarts_in_a_new_year() {
        let start = Utc.with_ymd_and_hms(2026, 12, 31, 22, 0, 0).single().expect("valid time");
        let fx = Fixture::starting_at(start).await;

        fx.quotes.create(&fx.alice, fx.draft(1)).await.expect("december");
        fx.quotes.create(&fx.alice, fx.draft(1)).await.expect("december");
        fx.clock.advance(Duration::hours(4));
        let january = fx.quotes.create(&fx.alice, fx.draft(1)).await.expect("january");

        assert_eq!(january.quote_number.to_string(), "QT-2027-0001");
    }

    #[tokio::test]
    async fn deleted_numbers_are_not_reissued() {
        let fx = Fixture::new().await;
        fx.quotes.create(&fx.alice, fx.draft(1)).await.expect("first");
        let second = fx.quotes.create(&fx.alice, fx.draft(1)).await.expect("second");
        fx.quotes.delete(&fx.alice, second.id).await.expect("delete");

        let third = fx.quotes.create(&fx.alice, fx.draft(1)).await.expect("third");
        assert_eq!(third.quote_number.to_string(), "QT-2026-0003");
    }

    #[tokio::test]
    async fn counter_is_seeded_from_existing_numbers() {
        let fx = Fixture::new().await;
        sqlx::query(
            "INSERT INTO quotes (quote_number, client_id, issue_date, valid_until, created_at,
                                 updated_at)
             VALUES ('QT-2026-0041', ?, '2026-01-05', '2026-02-04', '2026-01-05T00:00:00Z',
                     '2026-01-05T00:00:00Z')",
        )
        .bind(fx.client.0)
        .execute(&fx.pool)
        .await
        .expect("legacy quote");

        let next = fx.quotes.create(&fx.alice, fx.draft(1)).await.expect("create");
        assert_eq!(next.quote_number.to_string(), "QT-2026-0042");
    }

    #[tokio::test]
    async fn failed_creation_leaves_nothing_behind() {
        let fx = Fixture::new().await;
        let draft = QuoteDraft::new(
            fx.client,
            vec![QuoteItemInput::new(fx.consulting, 1), QuoteItemInput::new(ServiceId(9_999), 1)],
        );

        let error = fx.quotes.create(&fx.alice, draft).await.expect_err("unknown service");
        assert_eq!(application(error), ApplicationError::NotFound(EntityKind::Service));
        assert_eq!(fx.count("quotes").await, 0);
        assert_eq!(fx.count("quote_items").await, 0);

        let quote = fx.quotes.create(&fx.alice, fx.draft(1)).await.expect("create");
        assert_eq!(quote.quote_number.to_string(), "QT-2026-0001");
    }

    #[tokio::test]
    async fn amounts_beyond_the_ceiling_are_rejected_before_any_write() {
        let fx = Fixture::new().await;
        let items = vec![QuoteItemInput::priced(
            fx.consulting,
            4_000_000,
            money("79228162514264337593543950.00"),
        )];

        let error = fx.quotes.create(&fx.alice, QuoteDraft::new(fx.client, items)).await;

        assert!(matches!(
            application(error.expect_err("oversized line")),
            ApplicationError::Domain(DomainError::Validation { .. })
        ));
        assert_eq!(fx.count("quotes").await, 0);
        assert_eq!(fx.count("quote_items").await, 0);
    }

    #[tokio::test]
    async fn oversized_stored_lines_still_list_and_load() {
        let fx = Fixture::new().await;
        let quote = fx.quotes.create(&fx.alice, fx.draft(1)).await.expect("create");
        sqlx::query("UPDATE quote_items SET quantity = ?, unit_price = ? WHERE quote_id = ?")
            .bind(4_000_000_000_i64)
            .bind("79228162514264337593543950.00")
            .bind(quote.id.0)
            .execute(&fx.pool)
            .await
            .expect("overwrite line");

        let listed = fx.quotes.list(&fx.alice, &QuoteFilter::default()).await.expect("list");
        let details = fx.quotes.get_details(&fx.alice, quote.id).await.expect("details");

        assert_eq!(listed[0].totals, details.totals);
        assert_eq!(details.totals.subtotal, Decimal::MAX);
        assert_eq!(details.totals.total, Decimal::MAX);
    }

    #[tokio::test]
    async fn creation_rejects_terminal_status_and_empty_items() {
        let fx = Fixture::new().await;
        let approved = QuoteDraft { status: QuoteStatus::Approved, ..fx.draft(1) };
        assert!(matches!(
            application(fx.quotes.create(&fx.alice, approved).await.expect_err("approved")),
            ApplicationError::Domain(DomainError::Validation { field: "status", .. })
        ));

        let empty = QuoteDraft::new(fx.client, Vec::new());
        assert!(fx.quotes.create(&fx.alice, empty).await.is_err());

        let sent = QuoteDraft { status: QuoteStatus::Sent, ..fx.draft(1) };
        assert_eq!(fx.quotes.create(&fx.alice, sent).await.expect("sent").status, QuoteStatus::Sent);
    }

    #[tokio::test]
    async fn inactive_services_are_only_kept_on_existing_quotes() {
        let fx = Fixture::new().await;
        let quote = fx.quotes.create(&fx.alice, fx.draft(1)).await.expect("create");
        fx.services.set_active(&fx.alice, fx.consulting, false).await.expect("deactivate");

        assert!(fx.quotes.create(&fx.alice, fx.draft(1)).await.is_err());

        let update = QuoteUpdate {
            client_id: fx.client,
            items: vec![QuoteItemInput::priced(fx.consulting, 4, money("90.00"))],
            discount: Discount::Percentage(money("10")),
            notes: Some("repriced".to_string()),
            status: Some(QuoteStatus::Approved),
            is_public: false,
        };
        let details = fx.quotes.update(&fx.alice, quote.id, update).await.expect("update");

        assert_eq!(details.items.len(), 1);
        assert_eq!(details.totals.subtotal, money("360.00"));
        assert_eq!(details.totals.discount, money("36.00"));
        assert_eq!(details.totals.total, money("324.00"));
        assert_eq!(details.quote.status, QuoteStatus::Approved);
        assert_eq!(fx.count("quote_items").await, 1);
    }

    #[tokio::test]
    async fn private_quotes_follow_the_visibility_policy() {
        let fx = Fixture::new().await;
        let quote = fx.quotes.create(&fx.alice, fx.draft(1)).await.expect("create");
        let filter = QuoteFilter::default();

        assert!(fx.quotes.list(&fx.bob, &filter).await.expect("list").is_empty());
        let hidden = fx.quotes.get_details(&fx.bob, quote.id).await.expect_err("hidden");
        assert_eq!(application(hidden), ApplicationError::NotFound(EntityKind::Quote));

        fx.quotes.toggle_visibility(&fx.alice, quote.id).await.expect("publish");
        let visible = fx.quotes.list(&fx.bob, &filter).await.expect("list");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].client_name, "Ana");
        assert_eq!(visible[0].totals.total, money("100.00"));

        let forbidden = fx.quotes.set_status(&fx.bob, quote.id, QuoteStatus::Rejected).await;
        assert!(matches!(
            application(forbidden.expect_err("not owner")),
            ApplicationError::Forbidden { .. }
        ));

        fx.quotes.toggle_visibility(&fx.alice, quote.id).await.expect("unpublish");
        assert_eq!(fx.quotes.list(&Principal::System, &filter).await.expect("admin").len(), 1);
    }

    #[tokio::test]
    async fn list_filters_by_status_and_search_term() {
        let fx = Fixture::new().await;
        let other = fx
            .clients
            .create(
                &fx.alice,
                ClientInput {
                    name: "Globex".to_string(),
                    email: "buyer@globex.com".to_string(),
                    ..ClientInput::default()
                },
            )
            .await
            .expect("client");

        let first = fx.quotes.create(&fx.alice, fx.draft(1)).await.expect("create");
        let second = fx
            .quotes
            .create(
                &fx.alice,
                QuoteDraft::new(other.id, vec![QuoteItemInput::new(fx.consulting, 2)]),
            )
            .await
            .expect("create");
        fx.quotes.set_status(&fx.alice, second.id, QuoteStatus::Sent).await.expect("status");

        let sent = QuoteFilter { status: Some(QuoteStatus::Sent), ..QuoteFilter::default() };
        let found = fx.quotes.list(&fx.alice, &sent).await.expect("list");
        assert_eq!(found.iter().map(|q| q.id).collect::<Vec<_>>(), vec![second.id]);

        let by_name = QuoteFilter { search: Some("glob".to_string()), ..QuoteFilter::default() };
        assert_eq!(fx.quotes.list(&fx.alice, &by_name).await.expect("list").len(), 1);

        let by_number =
            QuoteFilter { search: Some("2026-0001".to_string()), ..QuoteFilter::default() };
        let found = fx.quotes.list(&fx.alice, &by_number).await.expect("list");
        assert_eq!(found.iter().map(|q| q.id).collect::<Vec<_>>(), vec![first.id]);

        let by_client = QuoteFilter { client_id: Some(other.id), ..QuoteFilter::default() };
        assert_eq!(fx.quotes.list(&fx.alice, &by_client).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn deleting_a_quote_removes_its_items() {
        let fx = Fixture::new().await;
        let quote = fx.quotes.create(&fx.alice, fx.draft(3)).await.expect("create");
        assert_eq!(fx.count("quote_items").await, 1);

        fx.quotes.delete(&fx.alice, quote.id).await.expect("delete");
        assert_eq!(fx.count("quote_items").await, 0);
        assert!(fx.quotes.get_details(&fx.alice, quote.id).await.is_err());
    }

    #[tokio::test]
    async fn referenced_clients_and_services_cannot_be_deleted() {
        let fx = Fixture::new().await;
        fx.quotes.create(&fx.alice, fx.draft(1)).await.expect("create");

        let client = fx.clients.delete(&fx.alice, fx.client).await.expect_err("has quotes");
        let service = fx.services.delete(&fx.alice, fx.consulting).await.expect_err("in use");
        assert_eq!(
            application(client),
            ApplicationError::Conflict(quotecraft_core::errors::ConflictKind::ClientHasQuotes)
        );
        assert_eq!(
            application(service),
            ApplicationError::Conflict(quotecraft_core::errors::ConflictKind::ServiceInUse)
        );
    }

    #[tokio::test]
    async fn delivery_only_advances_drafts() {
        let fx = Fixture::new().await;
        let draft = fx.quotes.create(&fx.alice, fx.draft(1)).await.expect("create");
        let approved = fx.quotes.create(&fx.alice, fx.draft(1)).await.expect("create");
        fx.quotes.set_status(&fx.alice, approved.id, QuoteStatus::Approved).await.expect("approve");

        assert_eq!(fx.quotes.mark_delivered(&fx.alice, draft.id).await.expect("send"), QuoteStatus::Sent);
        assert_eq!(
            fx.quotes.mark_delivered(&fx.alice, approved.id).await.expect("send"),
            QuoteStatus::Approved
        );
    }

    #[tokio::test]
    async fn share_tokens_resolve_until_they_expire() {
        let fx = Fixture::new().await;
        let quote = fx.quotes.create(&fx.alice, fx.draft(1)).await.expect("create");

        let grant = fx.quotes.ensure_token(&fx.alice, quote.id).await.expect("mint");
        let again = fx.quotes.ensure_token(&fx.alice, quote.id).await.expect("reuse");
        assert_eq!(grant, again);
        assert_eq!(fx.quotes.resolve_token(grant.token.as_str()).await.expect("resolve"), Some(quote.id));

        let shared = fx.quotes.get_shared_details(grant.token.as_str()).await.expect("shared");
        assert_eq!(shared.quote.id, quote.id);

        fx.clock.advance(Duration::days(31));
        assert_eq!(fx.quotes.resolve_token(grant.token.as_str()).await.expect("resolve"), None);
        let expired = fx.quotes.get_shared_details(grant.token.as_str()).await.expect_err("expired");
        assert_eq!(application(expired), ApplicationError::NotFound(EntityKind::Quote));

        let renewed = fx.quotes.ensure_token(&fx.alice, quote.id).await.expect("re-mint");
        assert_ne!(renewed.token, grant.token);
        assert_eq!(
            fx.quotes.resolve_token(renewed.token.as_str()).await.expect("resolve"),
            Some(quote.id)
        );
    }

    #[tokio::test]
    async fn revoked_and_unknown_tokens_are_indistinguishable() {
        let fx = Fixture::new().await;
        let quote = fx.quotes.create(&fx.alice, fx.draft(1)).await.expect("create");
        let grant = fx.quotes.ensure_token(&fx.alice, quote.id).await.expect("mint");

        fx.quotes.revoke_token(&fx.alice, quote.id).await.expect("revoke");

        assert_eq!(fx.quotes.resolve_token(grant.token.as_str()).await.expect("resolve"), None);
        assert_eq!(fx.quotes.resolve_token(&"A".repeat(43)).await.expect("resolve"), None);
        assert_eq!(fx.quotes.resolve_token("../etc/passwd").await.expect("resolve"), None);
    }

    #[tokio::test]
    async fn only_owners_can_share() {
        let fx = Fixture::new().await;
        let quote =
            fx.quotes.create(&fx.alice, QuoteDraft { is_public: true, ..fx.draft(1) }).await.expect("create");

        let error = fx.quotes.ensure_token(&fx.bob, quote.id).await.expect_err("not owner");
        assert!(matches!(application(error), ApplicationError::Forbidden { .. }));
    }
}
