use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Public, system-owned catalogue entries used for demos and smoke tests.
const DEMO_SERVICES: &[DemoService] = &[
    DemoService {
        name: "Consulting",
        description: "Hourly advisory session",
        base_price: Decimal::from_parts(10_000, 0, 0, false, 2),
        category: "Advisory",
    },
    DemoService {
        name: "Website Design",
        description: "Responsive marketing site, up to five pages",
        base_price: Decimal::from_parts(250_000, 0, 0, false, 2),
        category: "Design",
    },
    DemoService {
        name: "Logo Design",
        description: "Three concepts and two revision rounds",
        base_price: Decimal::from_parts(80_000, 0, 0, false, 2),
        category: "Design",
    },
    DemoService {
        name: "Monthly Maintenance",
        description: "Updates, backups and uptime monitoring",
        base_price: Decimal::from_parts(15_000, 0, 0, false, 2),
        category: "Support",
    },
];

const DEMO_CLIENT: DemoClient = DemoClient {
    name: "Acme Demo Co",
    email: "buyer@acme-demo.example",
    phone: "(11) 98765-4321",
    company: "Acme Demo Co",
};

/// Idempotent demo catalogue plus one sample client, all public and owned by the system.
pub struct DemoCatalogue;

impl DemoCatalogue {
    /// Inserts whatever is missing. Rows are matched by service name and
    /// client email, so running this twice changes nothing.
    pub async fn load(pool: &DbPool, now: DateTime<Utc>) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        let timestamp = now.to_rfc3339();
        let mut services_inserted = 0;

        for service in DEMO_SERVICES {
            let inserted = sqlx::query(
                "INSERT INTO services (name, description, base_price, category, is_active,
                                       owner_id, is_public, created_at, updated_at)
                 SELECT ?, ?, ?, ?, 1, NULL, 1, ?, ?
                 WHERE NOT EXISTS (SELECT 1 FROM services WHERE name = ? AND owner_id IS NULL)",
            )
            .bind(service.name)
            .bind(service.description)
            .bind(service.base_price.to_string())
            .bind(service.category)
            .bind(&timestamp)
            .bind(&timestamp)
            .bind(service.name)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            services_inserted += inserted;
        }

        let clients_inserted = sqlx::query(
            "INSERT INTO clients (name, email, phone, company, address, owner_id, is_public,
                                  created_at, updated_at)
             SELECT ?, ?, ?, ?, NULL, NULL, 1, ?, ?
             WHERE NOT EXISTS (SELECT 1 FROM clients WHERE email = ?)",
        )
        .bind(DEMO_CLIENT.name)
        .bind(DEMO_CLIENT.email)
        .bind(DEMO_CLIENT.phone)
        .bind(DEMO_CLIENT.company)
        .bind(&timestamp)
        .bind(&timestamp)
        .bind(DEMO_CLIENT.email)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        Ok(SeedResult { services_inserted, clients_inserted })
    }

    /// Checks that every demo row exists with its expected price and visibility.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for service in DEMO_SERVICES {
            let stored: Option<(String, bool)> = sqlx::query_as(
                "SELECT base_price, is_public FROM services WHERE name = ? AND owner_id IS NULL",
            )
            .bind(service.name)
            .fetch_optional(pool)
            .await?;

            let matches = stored.is_some_and(|(price, is_public)| {
                is_public && price.parse::<Decimal>().ok() == Some(service.base_price)
            });
            checks.push((service.name, matches));
        }

        let client_present: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM clients WHERE email = ? AND is_public = 1)",
        )
        .bind(DEMO_CLIENT.email)
        .fetch_one(pool)
        .await?;
        checks.push((DEMO_CLIENT.name, client_present == 1));

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes demo rows that no quote references.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        for service in DEMO_SERVICES {
            sqlx::query(
                "DELETE FROM services
                 WHERE name = ? AND owner_id IS NULL
                   AND NOT EXISTS (SELECT 1 FROM quote_items WHERE service_id = services.id)",
            )
            .bind(service.name)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query(
            "DELETE FROM clients
             WHERE email = ? AND NOT EXISTS (SELECT 1 FROM quotes WHERE client_id = clients.id)",
        )
        .bind(DEMO_CLIENT.email)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub fn service_count() -> usize {
        DEMO_SERVICES.len()
    }
}

#[derive(Debug, Clone, Copy)]
struct DemoService {
    name: &'static str,
    description: &'static str,
    base_price: Decimal,
    category: &'static str,
}

#[derive(Debug, Clone, Copy)]
struct DemoClient {
    name: &'static str,
    email: &'static str,
    phone: &'static str,
    company: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedResult {
    pub services_inserted: u64,
    pub clients_inserted: u64,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
