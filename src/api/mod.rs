//! REST surface

mod error;
pub mod identity;

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::domain::aggregates::{CartItem, DeliveryAddress, Order, OrderItem, PaymentMethod};
use crate::domain::value_objects::{Caller, Money};
use crate::{OrderError, OrderService, Result};

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-orders"})) }))
        .route("/api/v1/orders", get(list_all_orders).post(create_order))
        .route("/api/v1/orders/mine", get(list_user_orders))
        .route("/api/v1/orders/latest", get(latest_order))
        .route("/api/v1/orders/:id", get(get_order).delete(delete_order))
        .route("/api/v1/orders/:id/status", put(update_status))
        .route("/api/v1/orders/:id/cancel", post(cancel_order))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateOrderRequest {
    pub items: Vec<CartItem>,
    pub delivery_address: DeliveryAddress,
    pub payment_method: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    pub total_amount: Money,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

async fn create_order(
    State(s): State<AppState>,
    caller: Caller,
    body: std::result::Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateOrderResponse>)> {
    let Json(r) = body?;
    let payment_method = r
        .payment_method
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| OrderError::Validation("Payment method is required".into()))?
        .parse::<PaymentMethod>()
        .map_err(|e| OrderError::Validation(e.to_string()))?;

    let order = s.orders.place_order(caller.user_id, r.items, r.delivery_address, payment_method).await?;
    let response = CreateOrderResponse {
        order_id: order.id(),
        total_amount: order.pricing().total_amount,
        items: order.items().to_vec(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

async fn list_all_orders(State(s): State<AppState>, caller: Caller) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.orders.list_all_orders(&caller).await?))
}

async fn list_user_orders(State(s): State<AppState>, caller: Caller) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.orders.list_user_orders(caller.user_id).await?))
}

async fn latest_order(State(s): State<AppState>, caller: Caller) -> Result<Json<Order>> {
    Ok(Json(s.orders.latest_order(caller.user_id).await?))
}

async fn get_order(
    State(s): State<AppState>,
    caller: Caller,
    id: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Order>> {
    let Path(id) = id?;
    Ok(Json(s.orders.get_order(id, &caller).await?))
}

async fn update_status(
    State(s): State<AppState>,
    caller: Caller,
    id: std::result::Result<Path<Uuid>, PathRejection>,
    body: std::result::Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<Order>> {
    let Path(id) = id?;
    let Json(r) = body?;
    Ok(Json(s.orders.update_status(id, &r.status, &caller).await?))
}

async fn cancel_order(
    State(s): State<AppState>,
    caller: Caller,
    id: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Order>> {
    let Path(id) = id?;
    Ok(Json(s.orders.cancel_order(id, &caller).await?))
}

async fn delete_order(
    State(s): State<AppState>,
    caller: Caller,
    id: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode> {
    let Path(id) = id?;
    s.orders.delete_order(id, &caller).await?;
    Ok(StatusCode::NO_CONTENT)
}
