//! Orders, their line items, and the checkout payloads that produce them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::models::address::AddressPayload;
use crate::types::{AddressId, OrderId, OrderItemId, ProductModelId, SizeId, UserId};

/// Status stored for orders materialized from a succeeded payment intent.
pub const ORDER_STATUS_PAID: &str = "paid";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub address_id: AddressId,
    /// External payment-intent id; at most one order exists per id.
    pub payment_intent_id: String,
    pub total_cents: i64,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub model_id: ProductModelId,
    pub size_id: SizeId,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
/// One requested cart line.
pub struct CartItem {
    pub model_id: ProductModelId,
    pub size_id: SizeId,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreatePaymentIntentRequest {
    #[validate(length(min = 1), nested)]
    pub items: Vec<CartItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PaymentIntentResponse {
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
/// Finalizes checkout once the client has confirmed the payment.
pub struct CreateOrderRequest {
    #[validate(length(min = 1))]
    pub payment_intent_id: String,
    #[validate(length(min = 1), nested)]
    pub items: Vec<CartItem>,
    #[validate(nested)]
    pub address: AddressPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: OrderId,
    pub address_id: AddressId,
    pub payment_intent_id: String,
    pub total_cents: i64,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl OrderResponse {
    pub fn new(order: Order, items: Vec<OrderItem>) -> Self {
        Self {
            id: order.id,
            address_id: order.address_id,
            payment_intent_id: order.payment_intent_id,
            total_cents: order.total_cents,
            currency: order.currency,
            status: order.status,
            created_at: order.created_at,
            items,
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self::new(order, Vec::new())
    }
}
