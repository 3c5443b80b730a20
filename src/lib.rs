pub mod clock;
pub mod config;
pub mod coupons;
pub mod db;
pub mod discounts;
pub mod error;
pub mod validation;

use axum::{
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use clock::{Clock, SystemClock};
use config::{AppConfig, DiscountConfig};
use coupons::{
    BatchCreateCouponsRequest, CouponRepository, CouponResponse, CouponService, CouponStatus,
    CreateCouponRequest, InMemoryCouponRepository, PgCouponRepository, UpdateCouponRequest,
};
use discounts::{
    ApplyDiscountRequest, AuditLogger, CustomerProvider, DiscountEvaluator, DiscountKind,
    DiscountMetrics, DiscountResult, DiscountType, InMemoryCustomerProvider,
    InMemorySaleProvider, LoyaltyTier, MetricsSummary, PgCustomerProvider, PgSaleProvider,
    RuleRegistry, SaleProvider,
};
use error::ErrorResponse;

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        discounts::handlers::apply_discount,
        discounts::handlers::get_metrics,
        coupons::handlers::create_coupon,
        coupons::handlers::create_coupon_batch,
        coupons::handlers::list_coupons,
        coupons::handlers::get_coupon,
        coupons::handlers::update_coupon,
        coupons::handlers::delete_coupon,
        health,
    ),
    components(
        schemas(
            ApplyDiscountRequest,
            DiscountResult,
            DiscountKind,
            DiscountType,
            LoyaltyTier,
            MetricsSummary,
            CreateCouponRequest,
            BatchCreateCouponsRequest,
            UpdateCouponRequest,
            CouponResponse,
            CouponStatus,
            ErrorResponse,
            HealthResponse,
        )
    ),
    tags(
        (name = "discounts", description = "Discount evaluation"),
        (name = "coupons", description = "Coupon administration"),
        (name = "health", description = "Service health")
    ),
    info(
        title = "Discount Engine API",
        version = "0.1.0",
        description = "Selects the best promotional discount for a sale and redeems coupons safely under concurrency"
    )
)]
pub struct ApiDoc;

/// Storage-specific collaborators the engine runs against
pub struct Backends {
    pub sales: Arc<dyn SaleProvider>,
    pub customers: Arc<dyn CustomerProvider>,
    pub coupons: Arc<dyn CouponRepository>,
    pub audit_logger: AuditLogger,
}

impl Backends {
    /// Everything backed by PostgreSQL
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            sales: Arc::new(PgSaleProvider::new(pool.clone())),
            customers: Arc::new(PgCustomerProvider::new(pool.clone())),
            coupons: Arc::new(PgCouponRepository::new(pool.clone())),
            audit_logger: AuditLogger::new(pool),
        }
    }

    /// Empty process-local stores
    pub fn in_memory() -> Self {
        Self {
            sales: Arc::new(InMemorySaleProvider::new()),
            customers: Arc::new(InMemoryCustomerProvider::new()),
            coupons: Arc::new(InMemoryCouponRepository::new()),
            audit_logger: AuditLogger::tracing_only(),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub evaluator: DiscountEvaluator,
    pub coupon_service: CouponService,
    pub sales: Arc<dyn SaleProvider>,
    pub write_back_sale_total: bool,
}

impl AppState {
    pub fn new(
        backends: Backends,
        clock: Arc<dyn Clock>,
        discounts: &DiscountConfig,
        lookup_timeout: Duration,
        write_back_sale_total: bool,
    ) -> Self {
        let registry = Arc::new(RuleRegistry::from_config(discounts));
        let evaluator = DiscountEvaluator::new(
            registry,
            backends.sales.clone(),
            backends.customers,
            backends.coupons.clone(),
            clock.clone(),
            backends.audit_logger,
            DiscountMetrics::new(),
            lookup_timeout,
        );

        Self {
            evaluator,
            coupon_service: CouponService::new(backends.coupons, clock),
            sales: backends.sales,
            write_back_sale_total,
        }
    }

    /// State for a running server, using the system calendar
    pub fn from_config(backends: Backends, config: &AppConfig) -> Self {
        Self::new(
            backends,
            Arc::new(SystemClock),
            &config.discounts,
            config.lookup_timeout,
            config.write_back_sale_total,
        )
    }
}

/// Liveness payload
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: &'static str,
}

/// Handler for GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    ),
    tag = "health"
)]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Creates and configures the application router
/// Maps all API endpoints to their handlers and adds CORS and tracing middleware
pub fn create_router(state: AppState) -> Router {
    // Configure CORS to allow all origins, methods, and headers
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health))
        .route("/discounts/apply", post(discounts::handlers::apply_discount))
        .route("/discounts/metrics", get(discounts::handlers::get_metrics))
        .route(
            "/coupons",
            post(coupons::handlers::create_coupon).get(coupons::handlers::list_coupons),
        )
        .route("/coupons/batch", post(coupons::handlers::create_coupon_batch))
        .route(
            "/coupons/:id",
            get(coupons::handlers::get_coupon)
                .put(coupons::handlers::update_coupon)
                .delete(coupons::handlers::delete_coupon),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
