//! Typed ID wrappers for compile-time type safety.
//!
//! These types wrap UUIDs to prevent accidental mixing of different entity IDs.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::{Database, Decode, Encode, Type};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use utoipa::openapi::schema::{KnownFormat, ObjectBuilder, Schema, SchemaFormat, Type as SchemaType};
use utoipa::openapi::RefOr;
use uuid::Uuid;

/// Macro to generate typed ID wrappers with common trait implementations.
macro_rules! typed_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.0.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Uuid::parse_str(&s)
                    .map(Self)
                    .map_err(serde::de::Error::custom)
            }
        }

        impl utoipa::PartialSchema for $name {
            fn schema() -> RefOr<Schema> {
                ObjectBuilder::new()
                    .schema_type(SchemaType::String)
                    .format(Some(SchemaFormat::KnownFormat(KnownFormat::Uuid)))
                    .into()
            }
        }

        impl utoipa::ToSchema for $name {
            fn name() -> Cow<'static, str> {
                Cow::Borrowed(stringify!($name))
            }
        }

        // SQLx integration for reading from database
        impl<'r, DB: Database> Decode<'r, DB> for $name
        where
            String: Decode<'r, DB>,
        {
            fn decode(value: <DB as Database>::ValueRef<'r>) -> Result<Self, BoxDynError> {
                let s = String::decode(value)?;
                Uuid::parse_str(&s)
                    .map(Self)
                    .map_err(|e| e.into())
            }
        }

        // SQLx integration for writing to database
        impl<'q, DB: Database> Encode<'q, DB> for $name
        where
            String: Encode<'q, DB>,
        {
            fn encode_by_ref(
                &self,
                buf: &mut <DB as Database>::ArgumentBuffer<'q>,
            ) -> Result<IsNull, BoxDynError> {
                self.0.to_string().encode_by_ref(buf)
            }
        }

        impl<DB: Database> Type<DB> for $name
        where
            String: Type<DB>,
        {
            fn type_info() -> <DB as Database>::TypeInfo {
                String::type_info()
            }

            fn compatible(ty: &<DB as Database>::TypeInfo) -> bool {
                String::compatible(ty)
            }
        }
    };
}

// Define all typed IDs
typed_id!(UserId, "Unique identifier for a user.");
typed_id!(RefreshTokenId, "Unique identifier for a refresh-token ledger row.");
typed_id!(AddressId, "Unique identifier for a shipping address.");
typed_id!(OrderId, "Unique identifier for an order.");
typed_id!(OrderItemId, "Unique identifier for an order line item.");
typed_id!(ProductModelId, "Unique identifier for a product model.");
typed_id!(SizeId, "Unique identifier for a product size.");
typed_id!(PasswordResetId, "Unique identifier for a password reset code.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_id_round_trips_through_string() {
        let id = OrderId::new();
        let parsed: OrderId = id.to_string().parse().expect("parse id");
        assert_eq!(id, parsed);
    }

    #[test]
    fn typed_id_rejects_non_uuid() {
        assert!("not-a-uuid".parse::<UserId>().is_err());
        assert!(serde_json::from_str::<UserId>("\"nope\"").is_err());
    }

    #[test]
    fn typed_id_serializes_as_plain_string() {
        let uuid = Uuid::new_v4();
        let json = serde_json::to_value(AddressId::from_uuid(uuid)).expect("serialize");
        assert_eq!(json, serde_json::Value::String(uuid.to_string()));
    }
}
