pub mod address;
pub mod auth;
pub mod catalog;
pub mod order;
pub mod password_reset;
pub mod refresh_token;

pub use address::{AddressRepository, PgAddressRepository};
pub use catalog::{CatalogRepository, PgCatalogRepository};
pub use order::{OrderRepository, PgOrderRepository};
pub use refresh_token::{PgRefreshTokenStore, RefreshTokenStore};
