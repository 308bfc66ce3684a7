pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

#[cfg(test)]
pub(crate) mod test_support;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{DemoCatalogue, SeedResult, VerificationResult};
pub use repositories::{
    ClientRepository, QuoteRepository, QuoteRepositorySettings, RepositoryError,
    ServiceRepository, SqlClientRepository, SqlQuoteRepository, SqlServiceRepository,
    SqlUserRepository, UserRepository,
};
