use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::client::{Client, ClientId};
use crate::domain::service::ServiceId;
use crate::domain::user::UserId;
use crate::errors::DomainError;
use crate::numbering::QuoteNumber;
use crate::pricing::{compute_totals, Discount, PricedLine, Totals};
use crate::sharing::ShareGrant;
use crate::validation::{optional_text, validate_amount, validate_quantity};
use crate::visibility::Owned;

pub const MAX_VALID_DAYS: u32 = 3650;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuoteId(pub i64);

impl fmt::Display for QuoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Draft,
    Sent,
    Approved,
    Rejected,
}

use QuoteStatus::{Approved, Draft, Rejected, Sent};

/// Every ordered pair of distinct states. Approval and rejection are manual
/// decisions, so any authorized editor may move a quote anywhere.
const TRANSITIONS: &[(QuoteStatus, QuoteStatus)] = &[
    (Draft, Sent),
    (Draft, Approved),
    (Draft, Rejected),
    (Sent, Draft),
    (Sent, Approved),
    (Sent, Rejected),
    (Approved, Draft),
    (Approved, Sent),
    (Approved, Rejected),
    (Rejected, Draft),
    (Rejected, Sent),
    (Rejected, Approved),
];

impl QuoteStatus {
    pub const ALL: [QuoteStatus; 4] = [Draft, Sent, Approved, Rejected];

    pub fn as_str(&self) -> &'static str {
        match self {
            Draft => "draft",
            Sent => "sent",
            Approved => "approved",
            Rejected => "rejected",
        }
    }

    /// States a quote may be created in.
    pub fn is_initial(&self) -> bool {
        matches!(self, Draft | Sent)
    }

    pub fn can_transition_to(&self, next: QuoteStatus) -> bool {
        *self == next || TRANSITIONS.contains(&(*self, next))
    }

    /// Status implied by a confirmed delivery. Only drafts move; decided
    /// quotes keep their status when re-sent.
    pub fn after_delivery(&self) -> Option<QuoteStatus> {
        match self {
            Draft => Some(Sent),
            Sent | Approved | Rejected => None,
        }
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Draft),
            "sent" => Ok(Sent),
            "approved" => Ok(Approved),
            "rejected" => Ok(Rejected),
            other => Err(DomainError::validation(
                "status",
                format!("unsupported status `{other}` (expected draft|sent|approved|rejected)"),
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Quote {
    pub id: QuoteId,
    pub quote_number: QuoteNumber,
    pub client_id: ClientId,
    pub issue_date: NaiveDate,
    pub valid_until: NaiveDate,
    pub status: QuoteStatus,
    pub discount: Discount,
    pub notes: Option<String>,
    pub owner: Option<UserId>,
    pub is_public: bool,
    #[serde(skip)]
    pub share: Option<ShareGrant>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    pub fn transition_to(&mut self, next: QuoteStatus) -> Result<(), DomainError> {
        if self.status.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidQuoteTransition { from: self.status, to: next })
    }

    pub fn validity_lapsed(&self, today: NaiveDate) -> bool {
        today > self.valid_until
    }
}

impl Owned for Quote {
    fn owner(&self) -> Option<UserId> {
        self.owner
    }

    fn is_public(&self) -> bool {
        self.is_public
    }
}

/// Persisted line. `unit_price` is the snapshot taken when the line was
/// written, independent of the service's current base price.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteItem {
    pub id: i64,
    pub service_id: ServiceId,
    pub service_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl QuoteItem {
    pub fn line_total(&self) -> Decimal {
        PricedLine::line_total(self)
    }
}

impl PricedLine for QuoteItem {
    fn quantity(&self) -> u32 {
        self.quantity
    }

    fn unit_price(&self) -> Decimal {
        self.unit_price
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteItemInput {
    pub service_id: ServiceId,
    pub quantity: u32,
    /// `None` snapshots the service's base price at write time.
    #[serde(default)]
    pub unit_price: Option<Decimal>,
}

impl QuoteItemInput {
    pub fn new(service_id: ServiceId, quantity: u32) -> Self {
        Self { service_id, quantity, unit_price: None }
    }

    pub fn priced(service_id: ServiceId, quantity: u32, unit_price: Decimal) -> Self {
        Self { service_id, quantity, unit_price: Some(unit_price) }
    }

    pub fn validate(self) -> Result<Self, DomainError> {
        Ok(Self {
            service_id: self.service_id,
            quantity: validate_quantity(self.quantity)?,
            unit_price: self.unit_price.map(|price| validate_amount("unit_price", price)).transpose()?,
        })
    }
}

fn validate_items(items: Vec<QuoteItemInput>) -> Result<Vec<QuoteItemInput>, DomainError> {
    if items.is_empty() {
        return Err(DomainError::validation("items", "a quote needs at least one item"));
    }
    items.into_iter().map(QuoteItemInput::validate).collect()
}

/// Candidate quote collected by a create form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteDraft {
    pub client_id: ClientId,
    pub items: Vec<QuoteItemInput>,
    /// Falls back to the configured default when absent.
    #[serde(default)]
    pub valid_days: Option<u32>,
    #[serde(default)]
    pub discount: Discount,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "default_status")]
    pub status: QuoteStatus,
    #[serde(default)]
    pub is_public: bool,
}

fn default_status() -> QuoteStatus {
    Draft
}

impl QuoteDraft {
    pub fn new(client_id: ClientId, items: Vec<QuoteItemInput>) -> Self {
        Self {
            client_id,
            items,
            valid_days: None,
            discount: Discount::None,
            notes: None,
            status: Draft,
            is_public: false,
        }
    }

    pub fn validate(self) -> Result<Self, DomainError> {
        if !self.status.is_initial() {
            return Err(DomainError::validation(
                "status",
                "new quotes start as draft or sent",
            ));
        }
        if let Some(days) = self.valid_days {
            validate_valid_days(days)?;
        }

        Ok(Self {
            client_id: self.client_id,
            items: validate_items(self.items)?,
            valid_days: self.valid_days,
            discount: self.discount.validate()?,
            notes: optional_text(self.notes.as_deref()),
            status: self.status,
            is_public: self.is_public,
        })
    }
}

pub fn validate_valid_days(days: u32) -> Result<u32, DomainError> {
    if days == 0 || days > MAX_VALID_DAYS {
        return Err(DomainError::validation(
            "valid_days",
            format!("must be between 1 and {MAX_VALID_DAYS}"),
        ));
    }
    Ok(days)
}

/// `issue_date + days`; saturates at the calendar maximum.
pub fn valid_until(issue_date: NaiveDate, days: u32) -> NaiveDate {
    issue_date.checked_add_days(Days::new(u64::from(days))).unwrap_or(NaiveDate::MAX)
}

/// Full replacement of a quote's editable fields and item set. Issue date,
/// validity and number are fixed at creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteUpdate {
    pub client_id: ClientId,
    pub items: Vec<QuoteItemInput>,
    #[serde(default)]
    pub discount: Discount,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: Option<QuoteStatus>,
    #[serde(default)]
    pub is_public: bool,
}

impl QuoteUpdate {
    pub fn validate(self) -> Result<Self, DomainError> {
        Ok(Self {
            client_id: self.client_id,
            items: validate_items(self.items)?,
            discount: self.discount.validate()?,
            notes: optional_text(self.notes.as_deref()),
            status: self.status,
            is_public: self.is_public,
        })
    }
}

/// Read model returned by detail lookups. Totals are always derived from
/// `items`; nothing here is cached.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuoteDetails {
    pub quote: Quote,
    pub client: Client,
    pub owner_name: String,
    pub items: Vec<QuoteItem>,
    pub totals: Totals,
}

impl QuoteDetails {
    pub fn assemble(quote: Quote, client: Client, items: Vec<QuoteItem>, owner_name: String) -> Self {
        let totals = compute_totals(&items, &quote.discount);
        Self { quote, client, owner_name, items, totals }
    }
}

/// Row shown in quote listings.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuoteSummary {
    pub id: QuoteId,
    pub quote_number: QuoteNumber,
    pub client_id: ClientId,
    pub client_name: String,
    pub issue_date: NaiveDate,
    pub valid_until: NaiveDate,
    pub status: QuoteStatus,
    pub owner: Option<UserId>,
    pub is_public: bool,
    pub totals: Totals,
}

impl Owned for QuoteSummary {
    fn owner(&self) -> Option<UserId> {
        self.owner
    }

    fn is_public(&self) -> bool {
        self.is_public
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteFilter {
    #[serde(default)]
    pub status: Option<QuoteStatus>,
    #[serde(default)]
    pub client_id: Option<ClientId>,
    /// Case-insensitive match on quote number or client name.
    #[serde(default)]
    pub search: Option<String>,
}

/// What an unauthenticated link holder may see: no owner, no internal ids.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SharedQuoteView {
    pub quote_number: QuoteNumber,
    pub issue_date: NaiveDate,
    pub valid_until: NaiveDate,
    /// `valid_until` has passed as of the day the view was built.
    pub validity_lapsed: bool,
    pub status: QuoteStatus,
    pub client_name: String,
    pub client_company: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<SharedQuoteLine>,
    pub totals: Totals,
}

impl SharedQuoteView {
    pub fn at(details: &QuoteDetails, today: NaiveDate) -> Self {
        Self {
            quote_number: details.quote.quote_number,
            issue_date: details.quote.issue_date,
            valid_until: details.quote.valid_until,
            validity_lapsed: details.quote.validity_lapsed(today),
            status: details.quote.status,
            client_name: details.client.name.clone(),
            client_company: details.client.company.clone(),
            notes: details.quote.notes.clone(),
            items: details.items.iter().map(SharedQuoteLine::from).collect(),
            totals: details.totals,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SharedQuoteLine {
    pub service_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl From<&QuoteItem> for SharedQuoteLine {
    fn from(item: &QuoteItem) -> Self {
        Self {
            service_name: item.service_name.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            line_total: item.line_total(),
        }
    }
}
