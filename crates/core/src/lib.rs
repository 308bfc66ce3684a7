pub mod clock;
pub mod config;
pub mod delivery;
pub mod domain;
pub mod errors;
pub mod numbering;
pub mod pricing;
pub mod sharing;
pub mod validation;
pub mod visibility;

pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::client::{Client, ClientId, ClientInput};
pub use domain::quote::{
    Quote, QuoteDetails, QuoteDraft, QuoteFilter, QuoteId, QuoteItem, QuoteItemInput,
    QuoteStatus, QuoteSummary, QuoteUpdate, SharedQuoteView,
};
pub use domain::service::{Service, ServiceId, ServiceInput};
pub use domain::user::{NewUser, Role, User, UserId, UserUpdate};
pub use errors::{ApplicationError, ConflictKind, DomainError, EntityKind, InterfaceError};
pub use numbering::QuoteNumber;
pub use pricing::{compute_totals, Discount, DiscountType, Totals};
pub use sharing::{ShareGrant, ShareToken};
pub use visibility::{Owned, Principal, VisibilityScope};
