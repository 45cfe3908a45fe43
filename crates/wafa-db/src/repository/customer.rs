//! # Customer Repository
//!
//! Customer rows scoped to a merchant by foreign key, with a uniqueness
//! constraint on the platform customer id per merchant.
//!
//! Balances and tiers are read here but written exclusively by the
//! ledger repository. Customers are never hard-deleted in the core
//! flow; the boundary toggles `is_active` instead.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use wafa_core::{Customer, Tier};

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

/// Raw customer row; `tier` text is parsed on the way out.
#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: String,
    merchant_id: String,
    external_id: String,
    email: Option<String>,
    name: Option<String>,
    points: i64,
    tier: String,
    share_count: i64,
    is_active: bool,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CustomerRow {
    fn into_customer(self) -> DbResult<Customer> {
        let tier: Tier = self
            .tier
            .parse()
            .map_err(|e| DbError::corrupt("customer tier", &self.id, e))?;

        Ok(Customer {
            id: self.id,
            merchant_id: self.merchant_id,
            external_id: self.external_id,
            email: self.email,
            name: self.name,
            points: self.points,
            tier,
            share_count: self.share_count,
            is_active: self.is_active,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_CUSTOMER: &str = "SELECT id, merchant_id, external_id, email, name, points, tier, \
     share_count, is_active, version, created_at, updated_at FROM customers";

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Gets a customer by internal ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<Customer>> {
        let row: Option<CustomerRow> =
            sqlx::query_as(&format!("{SELECT_CUSTOMER} WHERE id = ?1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(CustomerRow::into_customer).transpose()
    }

    /// Gets an active customer by the platform customer id, scoped to a
    /// merchant.
    ///
    /// Soft-deleted customers are invisible here on purpose: events for
    /// them become dispatcher no-ops.
    pub async fn get_by_external_id(
        &self,
        merchant_id: &str,
        external_id: &str,
    ) -> DbResult<Option<Customer>> {
        let row: Option<CustomerRow> = sqlx::query_as(&format!(
            "{SELECT_CUSTOMER} WHERE merchant_id = ?1 AND external_id = ?2 AND is_active = 1"
        ))
        .bind(merchant_id)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CustomerRow::into_customer).transpose()
    }

    /// Gets an existing customer or creates one at zero points.
    ///
    /// Used by enrollment collaborators (welcome/install webhooks are
    /// preceded by a get-or-create at the boundary). A concurrent
    /// creation race is resolved by re-reading after a unique-violation
    /// insert failure.
    pub async fn get_or_create(
        &self,
        merchant_id: &str,
        external_id: &str,
        email: Option<&str>,
        name: Option<&str>,
    ) -> DbResult<Customer> {
        if let Some(existing) = self.get_by_external_id(merchant_id, external_id).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            merchant_id: merchant_id.to_string(),
            external_id: external_id.to_string(),
            email: email.map(str::to_string),
            name: name.map(str::to_string),
            points: 0,
            tier: Tier::Bronze,
            share_count: 0,
            is_active: true,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let inserted = sqlx::query(
            "INSERT INTO customers (id, merchant_id, external_id, email, name, points, tier, \
             share_count, is_active, version, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(&customer.id)
        .bind(&customer.merchant_id)
        .bind(&customer.external_id)
        .bind(&customer.email)
        .bind(&customer.name)
        .bind(customer.points)
        .bind(customer.tier.as_str())
        .bind(customer.share_count)
        .bind(customer.is_active)
        .bind(customer.version)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => {
                debug!(
                    customer_id = %customer.id,
                    merchant_id = %merchant_id,
                    external_id = %external_id,
                    "Customer created"
                );
                Ok(customer)
            }
            Err(e) => {
                let db_err: DbError = e.into();
                if db_err.is_unique_violation() {
                    // Lost a creation race; the winner's row is there now.
                    self.get_by_external_id(merchant_id, external_id)
                        .await?
                        .ok_or(db_err)
                } else {
                    Err(db_err)
                }
            }
        }
    }

    /// Records the platform-reported referral share count.
    pub async fn record_share(&self, id: &str, share_count: i64) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE customers SET share_count = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(share_count)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", id));
        }

        Ok(())
    }

    /// Soft-deletes a customer. Subsequent events for them no-op.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE customers SET is_active = 0, updated_at = ?2 WHERE id = ?1 AND is_active = 1",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer (active)", id));
        }

        Ok(())
    }

    /// Counts a merchant's active customers.
    pub async fn count_for_merchant(&self, merchant_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM customers WHERE merchant_id = ?1 AND is_active = 1",
        )
        .bind(merchant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
