use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::coupons::error::{CouponError, CouponResult};
use crate::coupons::models::{Coupon, CouponChanges, NewCouponRecord};
use crate::discounts::error::{CouponRejection, DResult, DiscountError};

/// Computes the deduction for a coupon inside the redemption transaction.
/// An error aborts the redemption and leaves the usage counter untouched.
pub type Settlement<'a> = &'a (dyn Fn(&Coupon) -> DResult<Decimal> + Send + Sync);

/// A committed coupon redemption
#[derive(Debug, Clone)]
pub struct Redemption {
    /// Coupon state after the increment
    pub coupon: Coupon,
    pub amount_deducted: Decimal,
}

/// Persistent coupon storage
///
/// `redeem` is the only operation that mutates `uses_consumed`. It must be a
/// single compare-and-increment: two callers racing for the last use get one
/// success and one `CouponInvalid(Exhausted)`.
#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn insert(&self, record: NewCouponRecord) -> CouponResult<Coupon>;

    /// Insert every record or none of them
    async fn insert_batch(&self, records: Vec<NewCouponRecord>) -> CouponResult<Vec<Coupon>>;

    async fn list(&self) -> CouponResult<Vec<Coupon>>;

    async fn find_by_id(&self, id: Uuid) -> CouponResult<Option<Coupon>>;

    async fn find_by_code(&self, code: &str) -> CouponResult<Option<Coupon>>;

    /// Replace the editable fields. Fails with `Conflict` when the new
    /// `max_uses` is below the uses already consumed.
    async fn update(&self, id: Uuid, changes: CouponChanges) -> CouponResult<Coupon>;

    /// Returns false when no coupon had this id
    async fn delete(&self, id: Uuid) -> CouponResult<bool>;

    /// Atomically consume one use of `code` and settle the deduction
    async fn redeem(
        &self,
        code: &str,
        today: NaiveDate,
        sale_total: Decimal,
        settle: Settlement<'_>,
    ) -> DResult<Redemption>;
}

/// Map a unique violation on `code` to `DuplicateCode`
fn map_insert_error(err: sqlx::Error, code: &str) -> CouponError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            CouponError::DuplicateCode(code.to_string())
        }
        _ => CouponError::DatabaseError(err),
    }
}

/// PostgreSQL-backed coupon repository
#[derive(Clone)]
pub struct PgCouponRepository {
    pool: PgPool,
}

impl PgCouponRepository {
    /// Create a new PgCouponRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Work out why the conditional increment matched no row
    async fn classify_rejection(
        &self,
        code: &str,
        today: NaiveDate,
        sale_total: Decimal,
    ) -> DResult<CouponRejection> {
        let reason = match self.find_by_code(code).await? {
            None => CouponRejection::NotFound,
            // Redeemable again by the time we looked: another request took the last use
            Some(coupon) => coupon
                .rejection(today, sale_total)
                .unwrap_or(CouponRejection::Exhausted),
        };
        Ok(reason)
    }
}

#[async_trait]
impl CouponRepository for PgCouponRepository {
    async fn insert(&self, record: NewCouponRecord) -> CouponResult<Coupon> {
        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            INSERT INTO coupons (id, code, campaign_name, discount_kind, value, expiration_date, max_uses, minimum_sale_amount)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, code, campaign_name, discount_kind, value, expiration_date,
                      max_uses, uses_consumed, minimum_sale_amount, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.code)
        .bind(&record.campaign_name)
        .bind(record.discount_kind)
        .bind(record.value)
        .bind(record.expiration_date)
        .bind(record.max_uses)
        .bind(record.minimum_sale_amount)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, &record.code))?;

        Ok(coupon)
    }

    async fn insert_batch(&self, records: Vec<NewCouponRecord>) -> CouponResult<Vec<Coupon>> {
        // Rolled back on drop if any insert fails
        let mut tx = self.pool.begin().await?;
        let mut coupons = Vec::with_capacity(records.len());

        for record in records {
            let coupon = sqlx::query_as::<_, Coupon>(
                r#"
                INSERT INTO coupons (id, code, campaign_name, discount_kind, value, expiration_date, max_uses, minimum_sale_amount)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING id, code, campaign_name, discount_kind, value, expiration_date,
                          max_uses, uses_consumed, minimum_sale_amount, created_at, updated_at
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&record.code)
            .bind(&record.campaign_name)
            .bind(record.discount_kind)
            .bind(record.value)
            .bind(record.expiration_date)
            .bind(record.max_uses)
            .bind(record.minimum_sale_amount)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_insert_error(e, &record.code))?;

            coupons.push(coupon);
        }

        tx.commit().await?;
        Ok(coupons)
    }

    async fn list(&self) -> CouponResult<Vec<Coupon>> {
        let coupons = sqlx::query_as::<_, Coupon>(
            r#"
            SELECT id, code, campaign_name, discount_kind, value, expiration_date,
                   max_uses, uses_consumed, minimum_sale_amount, created_at, updated_at
            FROM coupons
            ORDER BY created_at, code
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(coupons)
    }

    async fn find_by_id(&self, id: Uuid) -> CouponResult<Option<Coupon>> {
        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            SELECT id, code, campaign_name, discount_kind, value, expiration_date,
                   max_uses, uses_consumed, minimum_sale_amount, created_at, updated_at
            FROM coupons
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(coupon)
    }

    async fn find_by_code(&self, code: &str) -> CouponResult<Option<Coupon>> {
        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            SELECT id, code, campaign_name, discount_kind, value, expiration_date,
                   max_uses, uses_consumed, minimum_sale_amount, created_at, updated_at
            FROM coupons
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(coupon)
    }

    async fn update(&self, id: Uuid, changes: CouponChanges) -> CouponResult<Coupon> {
        // The cap guard runs against the live counter, not a value read earlier
        let updated = sqlx::query_as::<_, Coupon>(
            r#"
            UPDATE coupons
            SET discount_kind = $1,
                value = $2,
                expiration_date = $3,
                max_uses = $4,
                minimum_sale_amount = $5,
                updated_at = NOW()
            WHERE id = $6
              AND ($4::INTEGER IS NULL OR $4::INTEGER >= uses_consumed)
            RETURNING id, code, campaign_name, discount_kind, value, expiration_date,
                      max_uses, uses_consumed, minimum_sale_amount, created_at, updated_at
            "#,
        )
        .bind(changes.discount_kind)
        .bind(changes.value)
        .bind(changes.expiration_date)
        .bind(changes.max_uses)
        .bind(changes.minimum_sale_amount)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(coupon) => Ok(coupon),
            None => match self.find_by_id(id).await? {
                None => Err(CouponError::NotFound(id)),
                Some(existing) => Err(CouponError::Conflict(format!(
                    "maxUses cannot be lower than the {} uses already consumed",
                    existing.uses_consumed
                ))),
            },
        }
    }

    async fn delete(&self, id: Uuid) -> CouponResult<bool> {
        let result = sqlx::query("DELETE FROM coupons WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn redeem(
        &self,
        code: &str,
        today: NaiveDate,
        sale_total: Decimal,
        settle: Settlement<'_>,
    ) -> DResult<Redemption> {
        // Dropping the transaction before commit (error or cancelled request) rolls back
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Coupon>(
            r#"
            UPDATE coupons
            SET uses_consumed = uses_consumed + 1,
                updated_at = NOW()
            WHERE code = $1
              AND expiration_date >= $2
              AND (max_uses IS NULL OR uses_consumed < max_uses)
              AND minimum_sale_amount <= $3
            RETURNING id, code, campaign_name, discount_kind, value, expiration_date,
                      max_uses, uses_consumed, minimum_sale_amount, created_at, updated_at
            "#,
        )
        .bind(code)
        .bind(today)
        .bind(sale_total)
        .fetch_optional(&mut *tx)
        .await?;

        let coupon = match updated {
            Some(coupon) => coupon,
            None => {
                tx.rollback().await?;
                let reason = self.classify_rejection(code, today, sale_total).await?;
                tracing::warn!("Coupon {} redemption refused: {}", code, reason);
                return Err(DiscountError::CouponInvalid(reason));
            }
        };

        let amount_deducted = settle(&coupon)?;

        tx.commit().await?;

        tracing::info!(
            "Coupon {} redeemed ({} of {:?} uses)",
            coupon.code,
            coupon.uses_consumed,
            coupon.max_uses
        );

        Ok(Redemption {
            coupon,
            amount_deducted,
        })
    }
}

/// Coupon repository held in process memory
///
/// Used for tests and for running the service without a database. One mutex
/// guards the whole map, so check-and-increment is a single critical section.
#[derive(Default)]
pub struct InMemoryCouponRepository {
    coupons: Mutex<HashMap<Uuid, Coupon>>,
}

impl InMemoryCouponRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn build(record: NewCouponRecord) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: Uuid::new_v4(),
            code: record.code,
            campaign_name: record.campaign_name,
            discount_kind: record.discount_kind,
            value: record.value,
            expiration_date: record.expiration_date,
            max_uses: record.max_uses,
            uses_consumed: 0,
            minimum_sale_amount: record.minimum_sale_amount,
            created_at: now,
            updated_at: now,
        }
    }

    fn code_taken(coupons: &HashMap<Uuid, Coupon>, code: &str) -> bool {
        coupons.values().any(|c| c.code == code)
    }
}

#[async_trait]
impl CouponRepository for InMemoryCouponRepository {
    async fn insert(&self, record: NewCouponRecord) -> CouponResult<Coupon> {
        let mut coupons = self.coupons.lock().await;
        if Self::code_taken(&coupons, &record.code) {
            return Err(CouponError::DuplicateCode(record.code));
        }

        let coupon = Self::build(record);
        coupons.insert(coupon.id, coupon.clone());
        Ok(coupon)
    }

    async fn insert_batch(&self, records: Vec<NewCouponRecord>) -> CouponResult<Vec<Coupon>> {
        let mut coupons = self.coupons.lock().await;

        // Validate the whole batch before touching the map
        let mut seen = std::collections::HashSet::new();
        for record in &records {
            if Self::code_taken(&coupons, &record.code) || !seen.insert(record.code.clone()) {
                return Err(CouponError::DuplicateCode(record.code.clone()));
            }
        }

        let created: Vec<Coupon> = records.into_iter().map(Self::build).collect();
        for coupon in &created {
            coupons.insert(coupon.id, coupon.clone());
        }
        Ok(created)
    }

    async fn list(&self) -> CouponResult<Vec<Coupon>> {
        let coupons = self.coupons.lock().await;
        let mut all: Vec<Coupon> = coupons.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.code.cmp(&b.code)));
        Ok(all)
    }

    async fn find_by_id(&self, id: Uuid) -> CouponResult<Option<Coupon>> {
        Ok(self.coupons.lock().await.get(&id).cloned())
    }

    async fn find_by_code(&self, code: &str) -> CouponResult<Option<Coupon>> {
        let coupons = self.coupons.lock().await;
        Ok(coupons.values().find(|c| c.code == code).cloned())
    }

    async fn update(&self, id: Uuid, changes: CouponChanges) -> CouponResult<Coupon> {
        let mut coupons = self.coupons.lock().await;
        let coupon = coupons.get_mut(&id).ok_or(CouponError::NotFound(id))?;

        if let Some(max) = changes.max_uses {
            if max < coupon.uses_consumed {
                return Err(CouponError::Conflict(format!(
                    "maxUses cannot be lower than the {} uses already consumed",
                    coupon.uses_consumed
                )));
            }
        }

        coupon.discount_kind = changes.discount_kind;
        coupon.value = changes.value;
        coupon.expiration_date = changes.expiration_date;
        coupon.max_uses = changes.max_uses;
        coupon.minimum_sale_amount = changes.minimum_sale_amount;
        coupon.updated_at = Utc::now();

        Ok(coupon.clone())
    }

    async fn delete(&self, id: Uuid) -> CouponResult<bool> {
        Ok(self.coupons.lock().await.remove(&id).is_some())
    }

    async fn redeem(
        &self,
        code: &str,
        today: NaiveDate,
        sale_total: Decimal,
        settle: Settlement<'_>,
    ) -> DResult<Redemption> {
        let mut coupons = self.coupons.lock().await;
        let coupon = coupons
            .values_mut()
            .find(|c| c.code == code)
            .ok_or(DiscountError::CouponInvalid(CouponRejection::NotFound))?;

        if let Some(reason) = coupon.rejection(today, sale_total) {
            tracing::warn!("Coupon {} redemption refused: {}", code, reason);
            return Err(DiscountError::CouponInvalid(reason));
        }

        let mut next = coupon.clone();
        next.uses_consumed += 1;
        next.updated_at = Utc::now();

        let amount_deducted = settle(&next)?;
        *coupon = next.clone();

        Ok(Redemption {
            coupon: next,
            amount_deducted,
        })
    }
}
