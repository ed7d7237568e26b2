//! HTTP handlers for checkout, order acceptance and tracking

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::order::{
    AcceptOrderInput, CheckoutInput, Order, OrderDetail, OrderFilter, OrderService,
    OrderStatistics, RejectOrderInput, UpdateOrderStatusInput,
};
use crate::services::tracking::{OrderTrackingView, TrackingService};
use crate::AppState;

/// Place an order from the customer's cart
pub async fn checkout(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CheckoutInput>,
) -> AppResult<(StatusCode, Json<OrderDetail>)> {
    let service = OrderService::new(state.db);
    let order = service.checkout(current_user.0.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn my_orders(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<Order>>> {
    let service = OrderService::new(state.db);
    Ok(Json(service.my_orders(current_user.0.user_id).await?))
}

/// All orders (staff only)
pub async fn list_orders(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(filter): Query<OrderFilter>,
) -> AppResult<Json<Vec<Order>>> {
    current_user.0.require_staff()?;
    let service = OrderService::new(state.db);
    Ok(Json(service.list_orders(filter).await?))
}

pub async fn get_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderDetail>> {
    let service = OrderService::new(state.db);
    Ok(Json(service.get_order(&current_user.0, order_id).await?))
}

/// Customer-facing production timeline for an order
pub async fn get_order_tracking(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderTrackingView>> {
    let service = TrackingService::new(state.db);
    Ok(Json(service.order_tracking(&current_user.0, order_id).await?))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderDetail>> {
    let service = OrderService::new(state.db);
    Ok(Json(service.cancel_order(&current_user.0, order_id).await?))
}

/// Orders awaiting acceptance (staff only)
pub async fn pending_orders(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<OrderDetail>>> {
    current_user.0.require_staff()?;
    let service = OrderService::new(state.db);
    Ok(Json(service.pending_orders().await?))
}

pub async fn order_statistics(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<OrderStatistics>> {
    current_user.0.require_staff()?;
    let service = OrderService::new(state.db);
    Ok(Json(service.statistics().await?))
}

pub async fn accept_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    input: Option<Json<AcceptOrderInput>>,
) -> AppResult<Json<OrderDetail>> {
    let service = OrderService::new(state.db);
    let input = input.map(|Json(i)| i).unwrap_or_default();
    Ok(Json(service.accept_order(&current_user.0, order_id, input).await?))
}

pub async fn reject_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<RejectOrderInput>,
) -> AppResult<Json<OrderDetail>> {
    let service = OrderService::new(state.db);
    Ok(Json(service.reject_order(&current_user.0, order_id, input).await?))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<UpdateOrderStatusInput>,
) -> AppResult<Json<OrderDetail>> {
    let service = OrderService::new(state.db);
    Ok(Json(service.update_status(&current_user.0, order_id, input).await?))
}
