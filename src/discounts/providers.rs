// Read adapters for the sales and customer subsystems
//
// The engine only needs a sale's total and a customer's loyalty tier. It never
// changes either aggregate; the caller may store the discounted total next to
// the original through `record_discounted_total`, which leaves the total the
// engine reads untouched.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::RwLock;

use crate::discounts::error::DResult;
use crate::discounts::types::LoyaltyTier;

/// Access to sales owned by the sales subsystem
#[async_trait]
pub trait SaleProvider: Send + Sync {
    /// Total of the sale before discount, None when the sale does not exist
    async fn sale_total(&self, sale_id: &str) -> DResult<Option<Decimal>>;

    /// Store the total after a discount was applied, keeping the original total
    async fn record_discounted_total(&self, sale_id: &str, new_total: Decimal) -> DResult<()>;
}

/// Access to customers owned by the customer subsystem
#[async_trait]
pub trait CustomerProvider: Send + Sync {
    /// Loyalty tier of a customer
    ///
    /// The outer None means the customer does not exist; the inner None means
    /// the customer exists without a tier.
    async fn loyalty_tier(&self, customer_id: &str) -> DResult<Option<Option<LoyaltyTier>>>;
}

/// Unknown tier names are treated as no tier rather than failing the evaluation
fn parse_tier(customer_id: &str, raw: Option<String>) -> Option<LoyaltyTier> {
    let raw = raw?;
    match LoyaltyTier::from_str(&raw) {
        Ok(tier) => Some(tier),
        Err(_) => {
            tracing::warn!("Customer {} has unknown loyalty tier '{}'", customer_id, raw);
            None
        }
    }
}

/// Sales read from the shared `sales` table
#[derive(Clone)]
pub struct PgSaleProvider {
    pool: PgPool,
}

impl PgSaleProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SaleProvider for PgSaleProvider {
    async fn sale_total(&self, sale_id: &str) -> DResult<Option<Decimal>> {
        let total: Option<Decimal> = sqlx::query_scalar("SELECT total FROM sales WHERE id = $1")
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(total)
    }

    async fn record_discounted_total(&self, sale_id: &str, new_total: Decimal) -> DResult<()> {
        sqlx::query("UPDATE sales SET discounted_total = $1, updated_at = NOW() WHERE id = $2")
            .bind(new_total)
            .bind(sale_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Customers read from the shared `customers` table
#[derive(Clone)]
pub struct PgCustomerProvider {
    pool: PgPool,
}

impl PgCustomerProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomerProvider for PgCustomerProvider {
    async fn loyalty_tier(&self, customer_id: &str) -> DResult<Option<Option<LoyaltyTier>>> {
        let row: Option<Option<String>> =
            sqlx::query_scalar("SELECT loyalty_tier FROM customers WHERE id = $1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|raw| parse_tier(customer_id, raw)))
    }
}

/// Sales kept in process memory
#[derive(Default)]
pub struct InMemorySaleProvider {
    sales: RwLock<HashMap<String, Decimal>>,
    discounted: RwLock<HashMap<String, Decimal>>,
}

impl InMemorySaleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, sale_id: impl Into<String>, total: Decimal) {
        self.sales.write().await.insert(sale_id.into(), total);
    }

    /// Last discounted total recorded for a sale
    pub async fn discounted_total(&self, sale_id: &str) -> Option<Decimal> {
        self.discounted.read().await.get(sale_id).copied()
    }
}

#[async_trait]
impl SaleProvider for InMemorySaleProvider {
    async fn sale_total(&self, sale_id: &str) -> DResult<Option<Decimal>> {
        Ok(self.sales.read().await.get(sale_id).copied())
    }

    async fn record_discounted_total(&self, sale_id: &str, new_total: Decimal) -> DResult<()> {
        if self.sales.read().await.contains_key(sale_id) {
            self.discounted
                .write()
                .await
                .insert(sale_id.to_string(), new_total);
        }
        Ok(())
    }
}

/// Customers kept in process memory
#[derive(Default)]
pub struct InMemoryCustomerProvider {
    customers: RwLock<HashMap<String, Option<String>>>,
}

impl InMemoryCustomerProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a customer with its raw tier name, as the customer subsystem stores it
    pub async fn insert(&self, customer_id: impl Into<String>, tier: Option<&str>) {
        self.customers
            .write()
            .await
            .insert(customer_id.into(), tier.map(str::to_string));
    }
}

#[async_trait]
impl CustomerProvider for InMemoryCustomerProvider {
    async fn loyalty_tier(&self, customer_id: &str) -> DResult<Option<Option<LoyaltyTier>>> {
        let raw = self.customers.read().await.get(customer_id).cloned();
        Ok(raw.map(|raw| parse_tier(customer_id, raw)))
    }
}
