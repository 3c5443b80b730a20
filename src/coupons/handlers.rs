// HTTP handlers for coupon administration endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::coupons::{
    BatchCreateCouponsRequest, CouponError, CouponResponse, CreateCouponRequest,
    UpdateCouponRequest,
};
use crate::AppState;

/// Handler for POST /coupons
/// Creates a single coupon with a chosen code
#[utoipa::path(
    post,
    path = "/coupons",
    request_body = CreateCouponRequest,
    responses(
        (status = 201, description = "Coupon created", body = CouponResponse),
        (status = 400, description = "Invalid input data", body = crate::error::ErrorResponse),
        (status = 409, description = "Code already exists", body = crate::error::ErrorResponse)
    ),
    tag = "coupons"
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    Json(payload): Json<CreateCouponRequest>,
) -> Result<(StatusCode, Json<CouponResponse>), CouponError> {
    tracing::debug!("Creating coupon {}", payload.code);
    payload.validate()?;

    let coupon = state.coupon_service.create(payload).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

/// Handler for POST /coupons/batch
/// Generates a campaign's worth of unique codes in one atomic insert
#[utoipa::path(
    post,
    path = "/coupons/batch",
    request_body = BatchCreateCouponsRequest,
    responses(
        (status = 201, description = "Coupons generated", body = Vec<CouponResponse>),
        (status = 400, description = "Invalid input data", body = crate::error::ErrorResponse),
        (status = 409, description = "Unique codes could not be generated", body = crate::error::ErrorResponse)
    ),
    tag = "coupons"
)]
pub async fn create_coupon_batch(
    State(state): State<AppState>,
    Json(payload): Json<BatchCreateCouponsRequest>,
) -> Result<(StatusCode, Json<Vec<CouponResponse>>), CouponError> {
    tracing::debug!(
        "Generating {} coupons for campaign '{}'",
        payload.count,
        payload.campaign_name
    );
    payload.validate()?;

    let coupons = state.coupon_service.create_batch(payload).await?;
    Ok((StatusCode::CREATED, Json(coupons)))
}

/// Handler for GET /coupons
#[utoipa::path(
    get,
    path = "/coupons",
    responses(
        (status = 200, description = "All coupons with derived status", body = Vec<CouponResponse>)
    ),
    tag = "coupons"
)]
pub async fn list_coupons(
    State(state): State<AppState>,
) -> Result<Json<Vec<CouponResponse>>, CouponError> {
    let coupons = state.coupon_service.list().await?;
    Ok(Json(coupons))
}

/// Handler for GET /coupons/:id
#[utoipa::path(
    get,
    path = "/coupons/{id}",
    params(
        ("id" = Uuid, Path, description = "Coupon ID")
    ),
    responses(
        (status = 200, description = "Coupon found", body = CouponResponse),
        (status = 404, description = "Coupon not found", body = crate::error::ErrorResponse)
    ),
    tag = "coupons"
)]
pub async fn get_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CouponResponse>, CouponError> {
    let coupon = state.coupon_service.get(id).await?;
    Ok(Json(coupon))
}

/// Handler for PUT /coupons/:id
/// Edits a coupon's terms; code and usage counter are fixed
/// A null or omitted maxUses keeps the cap, clearMaxUses makes the coupon unlimited
#[utoipa::path(
    put,
    path = "/coupons/{id}",
    params(
        ("id" = Uuid, Path, description = "Coupon ID")
    ),
    request_body = UpdateCouponRequest,
    responses(
        (status = 200, description = "Coupon updated", body = CouponResponse),
        (status = 400, description = "Invalid input data", body = crate::error::ErrorResponse),
        (status = 404, description = "Coupon not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Change conflicts with usage or lifecycle", body = crate::error::ErrorResponse)
    ),
    tag = "coupons"
)]
pub async fn update_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCouponRequest>,
) -> Result<Json<CouponResponse>, CouponError> {
    tracing::debug!("Updating coupon {}", id);
    payload.validate()?;

    let coupon = state.coupon_service.update(id, payload).await?;
    Ok(Json(coupon))
}

/// Handler for DELETE /coupons/:id
#[utoipa::path(
    delete,
    path = "/coupons/{id}",
    params(
        ("id" = Uuid, Path, description = "Coupon ID")
    ),
    responses(
        (status = 204, description = "Coupon deleted"),
        (status = 404, description = "Coupon not found", body = crate::error::ErrorResponse)
    ),
    tag = "coupons"
)]
pub async fn delete_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CouponError> {
    state.coupon_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
