pub mod order;
pub mod payment;
pub mod token;

pub use order::OrderService;
pub use payment::{PaymentGateway, StripeClient};
pub use token::{RefreshError, TokenService, TokenSettings};
