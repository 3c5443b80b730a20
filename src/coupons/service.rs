use rand::Rng;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::coupons::error::{CouponError, CouponResult};
use crate::coupons::models::{
    validate_kind_and_value, BatchCreateCouponsRequest, Coupon, CouponResponse,
    CreateCouponRequest, NewCouponRecord, UpdateCouponRequest,
};
use crate::coupons::repository::CouponRepository;
use crate::coupons::status_machine::{CouponStatus, StatusMachine};
use crate::validation::normalize_coupon_code;

/// Longest campaign prefix kept in generated codes
const PREFIX_MAX_LEN: usize = 24;

/// Random characters appended to the campaign prefix
const CODE_SUFFIX_LEN: usize = 8;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Batch generation retries when a generated code collides with a stored one
const MAX_BATCH_ATTEMPTS: usize = 3;

/// Turn a campaign name into a code prefix
///
/// Upper-cases the name, replaces anything outside A-Z/0-9 with '-', collapses
/// runs of '-', trims them from both ends and truncates. Falls back to "PROMO"
/// when nothing usable is left.
pub fn campaign_prefix(campaign_name: &str) -> String {
    let mut prefix = String::with_capacity(campaign_name.len());
    for ch in campaign_name.trim().chars() {
        let ch = ch.to_ascii_uppercase();
        if ch.is_ascii_alphanumeric() {
            prefix.push(ch);
        } else if !prefix.ends_with('-') {
            prefix.push('-');
        }
    }

    let prefix: String = prefix.trim_matches('-').chars().take(PREFIX_MAX_LEN).collect();
    let prefix = prefix.trim_end_matches('-').to_string();

    if prefix.is_empty() {
        "PROMO".to_string()
    } else {
        prefix
    }
}

/// Generate one code of the form `<PREFIX>-<8 random characters>`
pub fn generate_code<R: Rng + ?Sized>(prefix: &str, rng: &mut R) -> String {
    let suffix: String = (0..CODE_SUFFIX_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}", prefix, suffix)
}

/// Generate `count` distinct codes for a campaign
fn generate_codes(campaign_name: &str, count: usize) -> Vec<String> {
    let prefix = campaign_prefix(campaign_name);
    let mut rng = rand::thread_rng();
    let mut codes = std::collections::HashSet::with_capacity(count);

    while codes.len() < count {
        codes.insert(generate_code(&prefix, &mut rng));
    }

    codes.into_iter().collect()
}

/// Service for coupon administration
///
/// Every method here is an administrative operation. None of them consumes a
/// coupon use; redemption only happens through discount evaluation.
#[derive(Clone)]
pub struct CouponService {
    repo: Arc<dyn CouponRepository>,
    clock: Arc<dyn Clock>,
}

impl CouponService {
    /// Create a new CouponService
    pub fn new(repo: Arc<dyn CouponRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    fn respond(&self, coupon: Coupon) -> CouponResponse {
        CouponResponse::from_coupon(coupon, self.clock.today())
    }

    /// Create a single coupon with a caller-chosen code
    pub async fn create(&self, request: CreateCouponRequest) -> CouponResult<CouponResponse> {
        let record = NewCouponRecord {
            code: normalize_coupon_code(&request.code),
            campaign_name: None,
            discount_kind: request.discount_kind,
            value: request.value,
            expiration_date: request.expiration_date,
            max_uses: request.max_uses,
            minimum_sale_amount: request.minimum_sale_amount.unwrap_or(Decimal::ZERO),
        };

        let coupon = self.repo.insert(record).await?;
        tracing::info!("Created coupon {} ({})", coupon.code, coupon.id);
        Ok(self.respond(coupon))
    }

    /// Generate `count` unique coupons for a campaign
    ///
    /// The batch is stored atomically. If a generated code collides with an
    /// existing one the whole batch is regenerated, up to three attempts.
    pub async fn create_batch(
        &self,
        request: BatchCreateCouponsRequest,
    ) -> CouponResult<Vec<CouponResponse>> {
        let count = request.count as usize;
        let campaign_name = request.campaign_name.trim().to_string();

        for attempt in 1..=MAX_BATCH_ATTEMPTS {
            let records: Vec<NewCouponRecord> = generate_codes(&campaign_name, count)
                .into_iter()
                .map(|code| NewCouponRecord {
                    code,
                    campaign_name: Some(campaign_name.clone()),
                    discount_kind: request.discount_kind,
                    value: request.value,
                    expiration_date: request.expiration_date,
                    max_uses: Some(request.max_uses.unwrap_or(1)),
                    minimum_sale_amount: request.minimum_amount.unwrap_or(Decimal::ZERO),
                })
                .collect();

            match self.repo.insert_batch(records).await {
                Ok(coupons) => {
                    tracing::info!(
                        "Generated {} coupons for campaign '{}'",
                        coupons.len(),
                        campaign_name
                    );
                    return Ok(coupons.into_iter().map(|c| self.respond(c)).collect());
                }
                Err(CouponError::DuplicateCode(code)) if attempt < MAX_BATCH_ATTEMPTS => {
                    tracing::warn!(
                        "Generated code {} already exists, regenerating batch (attempt {})",
                        code,
                        attempt
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(CouponError::Conflict(format!(
            "Could not generate unique codes for campaign '{}'",
            campaign_name
        )))
    }

    /// List every coupon with its derived status
    pub async fn list(&self) -> CouponResult<Vec<CouponResponse>> {
        let coupons = self.repo.list().await?;
        tracing::debug!("Retrieved {} coupons", coupons.len());
        Ok(coupons.into_iter().map(|c| self.respond(c)).collect())
    }

    /// Fetch one coupon
    pub async fn get(&self, id: Uuid) -> CouponResult<CouponResponse> {
        let coupon = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or(CouponError::NotFound(id))?;
        Ok(self.respond(coupon))
    }

    /// Edit a coupon's terms
    ///
    /// The code and the usage counter are not editable. An exhausted or
    /// expired coupon cannot be edited back into a redeemable state.
    pub async fn update(
        &self,
        id: Uuid,
        request: UpdateCouponRequest,
    ) -> CouponResult<CouponResponse> {
        let existing = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or(CouponError::NotFound(id))?;

        let changes = request.merge(&existing);
        validate_kind_and_value(changes.discount_kind, changes.value).map_err(|e| {
            CouponError::ValidationError(
                e.message
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string()),
            )
        })?;

        let today = self.clock.today();
        let current = existing.status(today);
        let next = CouponStatus::derive(
            existing.uses_consumed,
            changes.max_uses,
            changes.expiration_date,
            today,
        );
        StatusMachine::transition(current, next).map_err(CouponError::Conflict)?;

        let coupon = self.repo.update(id, changes).await?;
        tracing::info!("Updated coupon {} ({})", coupon.code, coupon.id);
        Ok(self.respond(coupon))
    }

    /// Remove a coupon
    pub async fn delete(&self, id: Uuid) -> CouponResult<()> {
        if !self.repo.delete(id).await? {
            return Err(CouponError::NotFound(id));
        }
        tracing::info!("Deleted coupon {}", id);
        Ok(())
    }
}
