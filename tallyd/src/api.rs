//! HTTP API for the tally daemon.
//!
//! Thin wrappers over the reconciliation and manual-operation services:
//! - Health check
//! - Run reconciliation now
//! - Process a return scan
//! - List / resolve manual review rows
//! - Unit operations (assign serial, fix sold flag, damage, repair,
//!   dispose, delivery intake)
//!
//! Handlers translate rejections into status codes and reason strings;
//! all decisions live in the services they call.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use tally_connectors::OrdersClient;
use tally_domain::{ManualReviewItem, ProductId, Serial, UnitId, UserId};
use tally_store::Store;

use crate::error::DaemonError;
use crate::manual;
use crate::reconciler::{CycleSummary, Reconciler};
use crate::returns::process_return;

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState<S: Store> {
    pub store: Arc<S>,
    pub reconciler: Arc<Reconciler<S>>,
    pub orders: Arc<OrdersClient>,
    pub lookback_days: i64,
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Request to process a return scan.
#[derive(Debug, Deserialize)]
pub struct ReturnRequest {
    pub scanned_serial: String,
    pub placeholder_unit_id: UnitId,
    pub user_id: Option<UserId>,
}

/// Request to resolve a review row.
#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub order_id: String,
    pub sku: String,
    pub user_id: UserId,
}

/// Request to assign a serial to an untagged unit.
#[derive(Debug, Deserialize)]
pub struct AssignSerialRequest {
    pub unit_id: UnitId,
    pub new_serial: String,
    pub user_id: UserId,
}

/// Request naming a unit by serial.
#[derive(Debug, Deserialize)]
pub struct SerialRequest {
    pub serial_number: String,
}

/// Request to mark a unit repaired.
#[derive(Debug, Deserialize)]
pub struct RepairRequest {
    pub unit_id: UnitId,
    pub new_product_id: Option<ProductId>,
}

/// Request to dispose a unit.
#[derive(Debug, Deserialize)]
pub struct DisposeRequest {
    pub unit_id: UnitId,
}

/// Request to record a received delivery.
#[derive(Debug, Deserialize)]
pub struct DeliveryRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    pub po_number: String,
    pub sn_prefix: Option<String>,
    #[serde(default)]
    pub damaged: bool,
}

/// Response for a recorded delivery.
#[derive(Debug, Serialize)]
pub struct DeliveryResponse {
    pub unit_ids: Vec<UnitId>,
}

/// Generic success response.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router<S: Store>(state: Arc<ApiState<S>>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/sync", post(sync_handler))
        .route("/returns", post(return_handler))
        .route("/reviews", get(reviews_handler))
        .route("/reviews/resolve", post(resolve_handler))
        .route("/units/assign-serial", post(assign_serial_handler))
        .route("/units/fix-sold", post(fix_sold_handler))
        .route("/units/damaged", post(damaged_handler))
        .route("/units/repaired", post(repaired_handler))
        .route("/units/dispose", post(dispose_handler))
        .route("/deliveries", post(delivery_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Fetch shipped orders and run one reconciliation cycle now.
async fn sync_handler<S: Store>(
    State(state): State<Arc<ApiState<S>>>,
) -> Result<Json<CycleSummary>, ApiError> {
    let orders = state
        .orders
        .fetch_shipped(state.lookback_days)
        .await
        .map_err(|e| to_error_response(DaemonError::OrdersApi(e)))?;

    let summary = state.reconciler.run_batch(&orders).await;
    Ok(Json(summary))
}

/// Process a return scan.
async fn return_handler<S: Store>(
    State(state): State<Arc<ApiState<S>>>,
    Json(req): Json<ReturnRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let serial = parse_serial(&req.scanned_serial)?;
    process_return(state.store.as_ref(), &serial, req.placeholder_unit_id, req.user_id)
        .await
        .map_err(to_error_response)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// List pending review rows.
async fn reviews_handler<S: Store>(
    State(state): State<Arc<ApiState<S>>>,
) -> Result<Json<Vec<ManualReviewItem>>, ApiError> {
    let rows = manual::pending_reviews(state.store.as_ref())
        .await
        .map_err(to_error_response)?;
    Ok(Json(rows))
}

/// Resolve a review row.
async fn resolve_handler<S: Store>(
    State(state): State<Arc<ApiState<S>>>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    manual::resolve_review(state.store.as_ref(), &req.order_id, &req.sku, req.user_id)
        .await
        .map_err(to_error_response)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Assign a serial to an untagged unit.
async fn assign_serial_handler<S: Store>(
    State(state): State<Arc<ApiState<S>>>,
    Json(req): Json<AssignSerialRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let serial = parse_serial(&req.new_serial)?;
    manual::assign_serial(state.store.as_ref(), req.unit_id, &serial, req.user_id)
        .await
        .map_err(to_error_response)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Manually mark a serial sold.
async fn fix_sold_handler<S: Store>(
    State(state): State<Arc<ApiState<S>>>,
    Json(req): Json<SerialRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let serial = parse_serial(&req.serial_number)?;
    manual::fix_serial_status(state.store.as_ref(), &serial)
        .await
        .map_err(to_error_response)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Flag a unit damaged by serial.
async fn damaged_handler<S: Store>(
    State(state): State<Arc<ApiState<S>>>,
    Json(req): Json<SerialRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let serial = parse_serial(&req.serial_number)?;
    manual::mark_damaged(state.store.as_ref(), &serial)
        .await
        .map_err(to_error_response)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Mark a unit repaired.
async fn repaired_handler<S: Store>(
    State(state): State<Arc<ApiState<S>>>,
    Json(req): Json<RepairRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    manual::mark_repaired(state.store.as_ref(), req.unit_id, req.new_product_id)
        .await
        .map_err(to_error_response)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Dispose a unit.
async fn dispose_handler<S: Store>(
    State(state): State<Arc<ApiState<S>>>,
    Json(req): Json<DisposeRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    manual::dispose_unit(state.store.as_ref(), req.unit_id)
        .await
        .map_err(to_error_response)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Record a received delivery.
async fn delivery_handler<S: Store>(
    State(state): State<Arc<ApiState<S>>>,
    Json(req): Json<DeliveryRequest>,
) -> Result<(StatusCode, Json<DeliveryResponse>), ApiError> {
    let unit_ids = manual::add_delivery(
        state.store.as_ref(),
        req.product_id,
        req.quantity,
        &req.po_number,
        req.sn_prefix.as_deref(),
        req.damaged,
    )
    .await
    .map_err(to_error_response)?;
    Ok((StatusCode::CREATED, Json(DeliveryResponse { unit_ids })))
}

// =============================================================================
// Error mapping
// =============================================================================

fn parse_serial(raw: &str) -> Result<Serial, ApiError> {
    Serial::new(raw).map_err(|e| to_error_response(DaemonError::Domain(e)))
}

fn to_error_response(err: DaemonError) -> ApiError {
    let status = match &err {
        DaemonError::SerialNotFound(_)
        | DaemonError::UnitNotFound(_)
        | DaemonError::PlaceholderNotFound(_)
        | DaemonError::ReviewNotFound { .. } => StatusCode::NOT_FOUND,

        DaemonError::Domain(_)
        | DaemonError::SerialAlreadyExists(_)
        | DaemonError::SerialNotSold(_)
        | DaemonError::AlreadySerialized(_)
        | DaemonError::UnitDisposed(_)
        | DaemonError::SnPrefixMismatch { .. }
        | DaemonError::MasterSkuMismatch => StatusCode::BAD_REQUEST,

        DaemonError::OrdersApi(_) => StatusCode::BAD_GATEWAY,

        DaemonError::Engine(_) | DaemonError::Store(_) | DaemonError::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        },
    };

    (status, Json(ErrorResponse { error: err.to_string() }))
}
