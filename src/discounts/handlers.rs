// HTTP handlers for discount evaluation endpoints

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use validator::Validate;

use crate::discounts::error::{DResult, DiscountError};
use crate::discounts::metrics::MetricsSummary;
use crate::discounts::models::{ApplyDiscountRequest, DiscountResult};
use crate::discounts::types::DiscountKind;
use crate::AppState;

/// Handler for POST /discounts/apply
/// Evaluates the single best discount for a sale and customer
#[utoipa::path(
    post,
    path = "/discounts/apply",
    request_body = ApplyDiscountRequest,
    responses(
        (status = 200, description = "Discount evaluated", body = DiscountResult),
        (status = 400, description = "ERROR_DATOS, ERROR_CUPON or ERROR_APLICACION", body = crate::error::ErrorResponse,
            example = json!({"kind": "ERROR_CUPON", "message": "Invalid coupon: exhausted", "timestamp": "2024-12-24T10:00:00Z"}))
    ),
    tag = "discounts"
)]
pub async fn apply_discount(
    State(state): State<AppState>,
    payload: Result<Json<ApplyDiscountRequest>, JsonRejection>,
) -> DResult<Json<DiscountResult>> {
    // Malformed JSON is a data error like any other, not axum's default 422
    let Json(request) = payload.map_err(|rejection| {
        DiscountError::ValidationError(rejection.body_text())
    })?;
    request.validate()?;

    let sale_id = request.sale_id.as_deref().unwrap_or_default().trim();
    let customer_id = request.customer_id.as_deref().unwrap_or_default().trim();
    let coupon_code = request.normalized_coupon_code();

    tracing::debug!(
        "Evaluating discount for sale {} customer {} coupon {:?}",
        sale_id,
        customer_id,
        coupon_code
    );

    let result = state
        .evaluator
        .apply(sale_id, customer_id, coupon_code.as_deref())
        .await?;

    if state.write_back_sale_total && result.kind != DiscountKind::NoDiscount {
        // Any coupon use is committed by now, so the result stands either way
        if let Err(e) = state
            .sales
            .record_discounted_total(sale_id, result.new_sale_total)
            .await
        {
            state.evaluator.metrics().record_write_back_failure();
            tracing::error!("Failed to record discounted total for sale {}: {}", sale_id, e);
        }
    }

    Ok(Json(result))
}

/// Handler for GET /discounts/metrics
#[utoipa::path(
    get,
    path = "/discounts/metrics",
    responses(
        (status = 200, description = "Evaluation counters", body = MetricsSummary)
    ),
    tag = "discounts"
)]
pub async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSummary> {
    Json(state.evaluator.metrics().summary())
}
