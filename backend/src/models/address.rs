//! Shipping addresses owned by a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::types::{AddressId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
/// Database representation of a user's saved address.
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    /// Label chosen by the user ("Home", "Office"); unique per user.
    pub name: String,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
/// Payload used both to create and to fully replace an address.
pub struct AddressPayload {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 200))]
    pub street: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 56))]
    pub country: String,
    #[serde(default)]
    #[validate(length(max = 32))]
    pub phone: Option<String>,
}

impl Address {
    pub fn new(user_id: UserId, payload: AddressPayload) -> Self {
        let now = Utc::now();
        Self {
            id: AddressId::new(),
            user_id,
            name: payload.name.trim().to_string(),
            street: payload.street,
            city: payload.city,
            postal_code: payload.postal_code,
            country: payload.country,
            phone: payload.phone,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites the mutable fields with `payload`, keeping identity and ownership.
    pub fn apply(&mut self, payload: AddressPayload) {
        self.name = payload.name.trim().to_string();
        self.street = payload.street;
        self.city = payload.city;
        self.postal_code = payload.postal_code;
        self.country = payload.country;
        self.phone = payload.phone;
        self.updated_at = Utc::now();
    }
}
