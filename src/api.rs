use axum::{
    extract::{Extension, Path, Query},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{EligibilityReport, PlatformStats, QuotaEngine, QuotaStatus};
use crate::error::QuotaResult;
use crate::pricing::{PriceUpdate, PricingAuditEvent, PricingConfig};
use crate::quota::ListingQuota;

/// key: quota-api -> rest endpoints
pub fn quota_routes() -> Router {
    Router::new()
        .route(
            "/api/quota/users/:user_id/eligibility",
            get(check_eligibility),
        )
        .route("/api/quota/users/:user_id/free", get(can_create_free))
        .route("/api/quota/users/:user_id/status", get(user_status))
        .route("/api/quota/users/:user_id/history", get(user_history))
        .route("/api/quota/users/:user_id/consume", post(consume_free))
        .route("/api/quota/users/:user_id/paid", post(record_paid))
        .route("/api/quota/stats", get(platform_stats))
        .route("/api/quota/cleanup", post(cleanup))
        .route("/api/pricing/config", get(pricing_config))
        .route("/api/pricing/audit", get(pricing_audit))
        .route("/api/pricing/phase/advance", post(advance_phase))
        .route("/api/pricing/launch/extend", post(extend_launch))
        .route("/api/pricing/prices", patch(update_prices))
}

pub async fn check_eligibility(
    Extension(engine): Extension<QuotaEngine>,
    Path(user_id): Path<Uuid>,
) -> QuotaResult<Json<EligibilityReport>> {
    Ok(Json(engine.check_listing_eligibility(user_id).await?))
}

pub async fn can_create_free(
    Extension(engine): Extension<QuotaEngine>,
    Path(user_id): Path<Uuid>,
) -> QuotaResult<Json<FreeListingCheck>> {
    let (allowed, quota) = engine.can_create_free_listing(user_id).await?;
    Ok(Json(FreeListingCheck { allowed, quota }))
}

pub async fn user_status(
    Extension(engine): Extension<QuotaEngine>,
    Path(user_id): Path<Uuid>,
) -> QuotaResult<Json<QuotaStatus>> {
    Ok(Json(engine.user_quota_status(user_id).await?))
}

pub async fn user_history(
    Extension(engine): Extension<QuotaEngine>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> QuotaResult<Json<Vec<ListingQuota>>> {
    let periods = query.periods.unwrap_or(0);
    Ok(Json(engine.user_quota_history(user_id, periods).await?))
}

pub async fn consume_free(
    Extension(engine): Extension<QuotaEngine>,
    Path(user_id): Path<Uuid>,
) -> QuotaResult<Json<ConsumeResponse>> {
    let quota = engine.consume_free_listing(user_id).await?;
    Ok(Json(ConsumeResponse {
        metered: quota.is_some(),
        quota,
    }))
}

pub async fn record_paid(
    Extension(engine): Extension<QuotaEngine>,
    Path(user_id): Path<Uuid>,
) -> QuotaResult<Json<ListingQuota>> {
    Ok(Json(engine.add_paid_listing(user_id).await?))
}

pub async fn platform_stats(
    Extension(engine): Extension<QuotaEngine>,
) -> QuotaResult<Json<PlatformStats>> {
    Ok(Json(engine.platform_stats().await?))
}

pub async fn cleanup(
    Extension(engine): Extension<QuotaEngine>,
) -> QuotaResult<Json<CleanupResponse>> {
    let deleted = engine.cleanup_old_quotas().await?;
    Ok(Json(CleanupResponse { deleted }))
}

pub async fn pricing_config(
    Extension(engine): Extension<QuotaEngine>,
) -> QuotaResult<Json<PricingConfig>> {
    Ok(Json(engine.global_config().await?))
}

pub async fn pricing_audit(
    Extension(engine): Extension<QuotaEngine>,
    Query(query): Query<AuditQuery>,
) -> QuotaResult<Json<Vec<PricingAuditEvent>>> {
    let limit = query.limit.unwrap_or(50);
    Ok(Json(engine.pricing_audit_log(limit).await?))
}

pub async fn advance_phase(
    Extension(engine): Extension<QuotaEngine>,
    Json(payload): Json<AdminRequest>,
) -> QuotaResult<Json<PricingConfig>> {
    Ok(Json(
        engine.transition_global_to_next_phase(payload.admin_id).await?,
    ))
}

pub async fn extend_launch(
    Extension(engine): Extension<QuotaEngine>,
    Json(payload): Json<ExtendLaunchRequest>,
) -> QuotaResult<Json<PricingConfig>> {
    Ok(Json(
        engine
            .extend_launch_phase(payload.launch_phase_end_date, payload.admin_id)
            .await?,
    ))
}

pub async fn update_prices(
    Extension(engine): Extension<QuotaEngine>,
    Json(payload): Json<UpdatePricesRequest>,
) -> QuotaResult<Json<PricingConfig>> {
    Ok(Json(
        engine
            .update_global_prices(payload.fields, payload.admin_id)
            .await?,
    ))
}

#[derive(Debug, Serialize)]
pub struct FreeListingCheck {
    pub allowed: bool,
    pub quota: Option<ListingQuota>,
}

#[derive(Debug, Serialize)]
pub struct ConsumeResponse {
    /// `false` when the launch phase made the listing free without touching the quota.
    pub metered: bool,
    pub quota: Option<ListingQuota>,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub deleted: u64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub periods: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AdminRequest {
    pub admin_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ExtendLaunchRequest {
    pub admin_id: Uuid,
    pub launch_phase_end_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePricesRequest {
    pub admin_id: Uuid,
    pub fields: PriceUpdate,
}
