use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    config::Config,
    repositories::{
        AddressRepository, PgAddressRepository, PgCatalogRepository, PgOrderRepository,
        PgRefreshTokenStore,
    },
    services::{OrderService, PaymentGateway, TokenService, TokenSettings},
    utils::email::EmailService,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub tokens: Arc<TokenService>,
    pub orders: Arc<OrderService>,
    pub addresses: Arc<dyn AddressRepository>,
    pub email: Arc<EmailService>,
}

impl AppState {
    /// Wires the Postgres-backed repositories and services around `pool`.
    ///
    /// The payment gateway is injected so tests can substitute a stub.
    pub fn new(
        pool: PgPool,
        config: Config,
        payments: Arc<dyn PaymentGateway>,
    ) -> anyhow::Result<Self> {
        let tokens = TokenService::new(
            Arc::new(PgRefreshTokenStore::new(pool.clone())),
            TokenSettings::from_config(&config),
        );
        let addresses: Arc<dyn AddressRepository> =
            Arc::new(PgAddressRepository::new(pool.clone()));
        let orders = OrderService::new(
            Arc::new(PgCatalogRepository::new(pool.clone())),
            Arc::new(PgOrderRepository::new(pool.clone())),
            addresses.clone(),
            payments,
            config.currency.clone(),
        );
        let email = EmailService::new(&config.smtp)?;

        Ok(Self {
            pool,
            config,
            tokens: Arc::new(tokens),
            orders: Arc::new(orders),
            addresses,
            email: Arc::new(email),
        })
    }
}
