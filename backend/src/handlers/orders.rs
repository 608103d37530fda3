use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        order::{CreateOrderRequest, CreatePaymentIntentRequest, OrderResponse, PaymentIntentResponse},
        user::User,
        PaginatedResponse, PaginationQuery,
    },
    state::AppState,
    types::OrderId,
};

pub async fn create_payment_intent(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(payload): Json<CreatePaymentIntentRequest>,
) -> Result<Json<PaymentIntentResponse>, AppError> {
    payload.validate()?;
    let intent = state
        .orders
        .create_payment_intent(user.id, &payload.items)
        .await?;
    Ok(Json(intent))
}

pub async fn create_order(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    payload.validate()?;
    let order = state.orders.create_order(user.id, payload).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    Ok(Json(state.orders.list_for_user(user.id).await?))
}

pub async fn get_order(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<OrderResponse>, AppError> {
    Ok(Json(state.orders.get_for_user(user.id, order_id).await?))
}

pub async fn admin_list_orders(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PaginatedResponse<OrderResponse>>, AppError> {
    let (limit, offset) = (query.limit(), query.offset());
    let (orders, total) = state.orders.list_all(limit, offset).await?;
    Ok(Json(PaginatedResponse::new(orders, total, limit, offset)))
}
