//! Checkout: cart pricing, payment-intent creation and order finalization.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;

use crate::error::AppError;
use crate::models::address::{Address, AddressPayload};
use crate::models::order::{
    CartItem, CreateOrderRequest, Order, OrderItem, OrderResponse, PaymentIntentResponse,
    ORDER_STATUS_PAID,
};
use crate::repositories::order::ORDER_ALREADY_CREATED;
use crate::repositories::{AddressRepository, CatalogRepository, OrderRepository};
use crate::services::payment::{
    NewPaymentIntent, PaymentGateway, STRIPE_METADATA_MAX_KEYS, STRIPE_METADATA_VALUE_LIMIT,
};
use crate::types::{AddressId, OrderId, OrderItemId, UserId};

pub const METADATA_USER_ID: &str = "user_id";
pub const METADATA_ITEMS: &str = "items";

/// One priced cart line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotedLine {
    pub item: CartItem,
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub lines: Vec<QuotedLine>,
    pub total_cents: i64,
}

fn encode_cart_entry(item: &CartItem) -> String {
    format!("{}:{}:{}", item.model_id, item.size_id, item.quantity)
}

/// Compact `model:size:qty` list describing a cart.
pub fn encode_cart_metadata(items: &[CartItem]) -> String {
    items
        .iter()
        .map(encode_cart_entry)
        .collect::<Vec<_>>()
        .join(",")
}

fn cart_metadata_key(index: usize) -> String {
    if index == 0 {
        METADATA_ITEMS.to_string()
    } else {
        format!("{}_{}", METADATA_ITEMS, index)
    }
}

/// Spreads the encoded cart over `items`, `items_1`, `items_2`, ... so no
/// value exceeds the provider limit. Entries are never split.
pub fn cart_metadata_entries(items: &[CartItem]) -> Result<BTreeMap<String, String>, AppError> {
    let mut chunks: Vec<String> = Vec::new();
    for entry in items.iter().map(encode_cart_entry) {
        match chunks.last_mut() {
            Some(chunk) if chunk.len() + 1 + entry.len() <= STRIPE_METADATA_VALUE_LIMIT => {
                chunk.push(',');
                chunk.push_str(&entry);
            }
            _ => chunks.push(entry),
        }
    }
    // One key stays reserved for the owner.
    if chunks.len() >= STRIPE_METADATA_MAX_KEYS {
        return Err(AppError::BadRequest("Cart has too many lines".into()));
    }

    Ok(chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| (cart_metadata_key(index), chunk))
        .collect())
}

/// Reassembles the cart recorded on a payment intent, if any.
pub fn paid_cart_metadata(metadata: &HashMap<String, String>) -> Option<String> {
    let chunks: Vec<&str> = (0..STRIPE_METADATA_MAX_KEYS)
        .map_while(|index| metadata.get(&cart_metadata_key(index)).map(String::as_str))
        .collect();
    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join(","))
    }
}

pub struct OrderService {
    catalog: Arc<dyn CatalogRepository>,
    orders: Arc<dyn OrderRepository>,
    addresses: Arc<dyn AddressRepository>,
    payments: Arc<dyn PaymentGateway>,
    currency: String,
}

impl OrderService {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        orders: Arc<dyn OrderRepository>,
        addresses: Arc<dyn AddressRepository>,
        payments: Arc<dyn PaymentGateway>,
        currency: String,
    ) -> Self {
        Self {
            catalog,
            orders,
            addresses,
            payments,
            currency,
        }
    }

    /// Prices a cart against the catalog.
    pub async fn quote(&self, items: &[CartItem]) -> Result<Quote, AppError> {
        if items.is_empty() {
            return Err(AppError::BadRequest("Cart is empty".into()));
        }

        let mut lines = Vec::with_capacity(items.len());
        let mut total_cents: i64 = 0;
        for item in items {
            if item.quantity < 1 {
                return Err(AppError::BadRequest(
                    "Quantity must be at least 1".into(),
                ));
            }
            let price = self
                .catalog
                .find_model_size(item.model_id, item.size_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!(
                        "Model {} is not available in size {}",
                        item.model_id, item.size_id
                    ))
                })?;

            if !price.currency.eq_ignore_ascii_case(&self.currency) {
                return Err(AppError::BadRequest(format!(
                    "Model {} in size {} is not sold in {}",
                    item.model_id, item.size_id, self.currency
                )));
            }

            total_cents = price
                .unit_price_cents
                .checked_mul(i64::from(item.quantity))
                .and_then(|line_total| total_cents.checked_add(line_total))
                .ok_or_else(|| AppError::BadRequest("Cart total is too large".into()))?;
            lines.push(QuotedLine {
                item: item.clone(),
                unit_price_cents: price.unit_price_cents,
            });
        }

        Ok(Quote { lines, total_cents })
    }

    pub async fn create_payment_intent(
        &self,
        user_id: UserId,
        items: &[CartItem],
    ) -> Result<PaymentIntentResponse, AppError> {
        let quote = self.quote(items).await?;

        let mut metadata = cart_metadata_entries(items)?;
        metadata.insert(METADATA_USER_ID.to_string(), user_id.to_string());

        let intent = self
            .payments
            .create_payment_intent(&NewPaymentIntent {
                amount: quote.total_cents,
                currency: self.currency.clone(),
                metadata,
            })
            .await?;

        tracing::info!(
            %user_id,
            payment_intent_id = %intent.id,
            amount = intent.amount,
            "created payment intent"
        );
        Ok(PaymentIntentResponse {
            payment_intent_id: intent.id,
            client_secret: intent.client_secret,
            amount: intent.amount,
            currency: intent.currency,
        })
    }

    /// Materializes the order behind a succeeded payment intent.
    ///
    /// A payment intent yields at most one order.
    pub async fn create_order(
        &self,
        user_id: UserId,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, AppError> {
        let payment_intent_id = request.payment_intent_id.trim().to_string();

        if self
            .orders
            .find_by_payment_intent(&payment_intent_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(ORDER_ALREADY_CREATED.to_string()));
        }

        let intent = self
            .payments
            .retrieve_payment_intent(&payment_intent_id)
            .await?;
        if !intent.is_succeeded() {
            return Err(AppError::BadRequest(format!(
                "Payment has not succeeded (status: {})",
                intent.status
            )));
        }
        let owner = intent.metadata.get(METADATA_USER_ID).map(String::as_str);
        if owner != Some(user_id.to_string().as_str()) {
            tracing::warn!(%user_id, payment_intent_id = %intent.id, "payment intent owner mismatch");
            return Err(AppError::Forbidden(
                "Payment intent belongs to another user".into(),
            ));
        }
        let paid_cart = paid_cart_metadata(&intent.metadata).ok_or_else(|| {
            AppError::BadRequest("Payment intent does not record a cart".into())
        })?;
        if paid_cart != encode_cart_metadata(&request.items) {
            tracing::warn!(%user_id, payment_intent_id = %intent.id, "cart differs from paid cart");
            return Err(AppError::BadRequest(
                "Cart does not match the paid payment intent".into(),
            ));
        }

        let quote = self.quote(&request.items).await?;
        if quote.total_cents != intent.amount
            || !intent.currency.eq_ignore_ascii_case(&self.currency)
        {
            return Err(AppError::BadRequest(
                "Cart does not match the paid amount".into(),
            ));
        }

        let (address_id, new_address) = self.resolve_address(user_id, request.address).await?;

        let order = Order {
            id: OrderId::new(),
            user_id,
            address_id,
            payment_intent_id,
            total_cents: quote.total_cents,
            currency: self.currency.clone(),
            status: ORDER_STATUS_PAID.to_string(),
            created_at: Utc::now(),
        };
        let items: Vec<OrderItem> = quote
            .lines
            .iter()
            .map(|line| OrderItem {
                id: OrderItemId::new(),
                order_id: order.id,
                model_id: line.item.model_id,
                size_id: line.item.size_id,
                quantity: line.item.quantity,
                unit_price_cents: line.unit_price_cents,
            })
            .collect();

        let created = self
            .orders
            .create_with_items(&order, &items, new_address)
            .await?;
        tracing::info!(
            %user_id,
            order_id = %created.id,
            payment_intent_id = %created.payment_intent_id,
            "order created"
        );
        Ok(OrderResponse::new(created, items))
    }

    /// Reuses the caller's address with the same name, else prepares a new
    /// one that is stored together with the order.
    async fn resolve_address(
        &self,
        user_id: UserId,
        payload: AddressPayload,
    ) -> Result<(AddressId, Option<Address>), AppError> {
        let name = payload.name.trim();
        if let Some(existing) = self.addresses.find_by_name(user_id, name).await? {
            return Ok((existing.id, None));
        }
        let address = Address::new(user_id, payload);
        Ok((address.id, Some(address)))
    }

    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<OrderResponse>, AppError> {
        let orders = self.orders.list_for_user(user_id).await?;
        Ok(orders.into_iter().map(OrderResponse::from).collect())
    }

    pub async fn get_for_user(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<OrderResponse, AppError> {
        let order = self
            .orders
            .find_for_user(user_id, order_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Order not found".into()))?;
        let items = self.orders.list_items(order.id).await?;
        Ok(OrderResponse::new(order, items))
    }

    pub async fn list_all(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<OrderResponse>, i64), AppError> {
        let (orders, total) = self.orders.list_all(limit, offset).await?;
        Ok((orders.into_iter().map(OrderResponse::from).collect(), total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::ModelSizePrice;
    use crate::repositories::address::MockAddressRepository;
    use crate::repositories::catalog::MockCatalogRepository;
    use crate::repositories::order::MockOrderRepository;
    use crate::services::payment::{MockPaymentGateway, PaymentIntent};
    use crate::types::{ProductModelId, SizeId};
    use mockall::predicate::eq;

    struct Mocks {
        catalog: MockCatalogRepository,
        orders: MockOrderRepository,
        addresses: MockAddressRepository,
        payments: MockPaymentGateway,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                catalog: MockCatalogRepository::new(),
                orders: MockOrderRepository::new(),
                addresses: MockAddressRepository::new(),
                payments: MockPaymentGateway::new(),
            }
        }

        fn into_service(self) -> OrderService {
            OrderService::new(
                Arc::new(self.catalog),
                Arc::new(self.orders),
                Arc::new(self.addresses),
                Arc::new(self.payments),
                "usd".into(),
            )
        }
    }

    fn cart_item(quantity: i32) -> CartItem {
        CartItem {
            model_id: ProductModelId::new(),
            size_id: SizeId::new(),
            quantity,
        }
    }

    fn price_in(catalog: &mut MockCatalogRepository, unit_price_cents: i64, currency: &'static str) {
        catalog
            .expect_find_model_size()
            .returning(move |model_id, size_id| {
                Ok(Some(ModelSizePrice {
                    model_id,
                    size_id,
                    model_name: "Trail Runner".into(),
                    size_label: "42".into(),
                    unit_price_cents,
                    currency: currency.into(),
                }))
            });
    }

    fn price_catalog(catalog: &mut MockCatalogRepository, unit_price_cents: i64) {
        price_in(catalog, unit_price_cents, "usd");
    }

    fn address_payload(name: &str) -> AddressPayload {
        AddressPayload {
            name: name.into(),
            street: "1 Main St".into(),
            city: "Springfield".into(),
            postal_code: "12345".into(),
            country: "US".into(),
            phone: None,
        }
    }

    /// Succeeded intent as created for `items` by `user_id`.
    fn succeeded_intent(id: &str, user_id: UserId, amount: i64, items: &[CartItem]) -> PaymentIntent {
        let mut metadata: HashMap<String, String> = cart_metadata_entries(items)
            .expect("cart metadata")
            .into_iter()
            .collect();
        metadata.insert(METADATA_USER_ID.to_string(), user_id.to_string());
        PaymentIntent {
            id: id.into(),
            amount,
            currency: "usd".into(),
            status: "succeeded".into(),
            client_secret: None,
            metadata,
        }
    }

    fn order_request(intent_id: &str, items: Vec<CartItem>) -> CreateOrderRequest {
        CreateOrderRequest {
            payment_intent_id: intent_id.into(),
            items,
            address: address_payload("Home"),
        }
    }

    fn no_existing_order(orders: &mut MockOrderRepository) {
        orders
            .expect_find_by_payment_intent()
            .returning(|_| Ok(None));
    }

    #[tokio::test]
    async fn quote_sums_unit_price_times_quantity() {
        let mut mocks = Mocks::new();
        price_catalog(&mut mocks.catalog, 2500);
        let service = mocks.into_service();

        let quote = service
            .quote(&[cart_item(2), cart_item(1)])
            .await
            .expect("quote");
        assert_eq!(quote.total_cents, 7500);
        assert_eq!(quote.lines.len(), 2);
    }

    #[tokio::test]
    async fn quote_rejects_empty_cart_and_bad_quantities() {
        let service = Mocks::new().into_service();
        assert!(matches!(
            service.quote(&[]).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            service.quote(&[cart_item(0)]).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn quote_rejects_unknown_model_size_pair() {
        let mut mocks = Mocks::new();
        mocks
            .catalog
            .expect_find_model_size()
            .returning(|_, _| Ok(None));
        let service = mocks.into_service();

        assert!(matches!(
            service.quote(&[cart_item(1)]).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn quote_rejects_prices_in_another_currency() {
        let mut mocks = Mocks::new();
        price_in(&mut mocks.catalog, 2500, "eur");
        let service = mocks.into_service();

        assert!(matches!(
            service.quote(&[cart_item(1)]).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn payment_intent_carries_total_currency_owner_and_cart() {
        let user_id = UserId::new();
        let item = cart_item(2);
        let expected_cart = encode_cart_metadata(&[item.clone()]);
        let mut mocks = Mocks::new();
        price_catalog(&mut mocks.catalog, 1999);
        mocks
            .payments
            .expect_create_payment_intent()
            .withf(move |request| {
                request.amount == 3998
                    && request.currency == "usd"
                    && request.metadata.get(METADATA_USER_ID) == Some(&user_id.to_string())
                    && request.metadata.get(METADATA_ITEMS) == Some(&expected_cart)
            })
            .times(1)
            .returning(|request| {
                Ok(PaymentIntent {
                    id: "pi_new".into(),
                    amount: request.amount,
                    currency: request.currency.clone(),
                    status: "requires_payment_method".into(),
                    client_secret: Some("pi_new_secret".into()),
                    metadata: HashMap::new(),
                })
            });
        let service = mocks.into_service();

        let response = service
            .create_payment_intent(user_id, &[item])
            .await
            .expect("intent");
        assert_eq!(response.payment_intent_id, "pi_new");
        assert_eq!(response.amount, 3998);
        assert_eq!(response.client_secret.as_deref(), Some("pi_new_secret"));
    }

    #[tokio::test]
    async fn create_order_reuses_address_and_persists_items() {
        let user_id = UserId::new();
        let items = vec![cart_item(3)];
        let paid_items = items.clone();
        let mut mocks = Mocks::new();
        price_catalog(&mut mocks.catalog, 1000);
        mocks
            .orders
            .expect_find_by_payment_intent()
            .with(eq("pi_ok"))
            .returning(|_| Ok(None));
        mocks
            .payments
            .expect_retrieve_payment_intent()
            .returning(move |id| Ok(succeeded_intent(id, user_id, 3000, &paid_items)));
        let existing = Address::new(user_id, address_payload("Home"));
        let existing_id = existing.id;
        mocks
            .addresses
            .expect_find_by_name()
            .with(eq(user_id), eq("Home"))
            .returning(move |_, _| Ok(Some(existing.clone())));
        mocks
            .orders
            .expect_create_with_items()
            .withf(move |order, items, new_address| {
                order.address_id == existing_id
                    && order.total_cents == 3000
                    && order.status == ORDER_STATUS_PAID
                    && items.len() == 1
                    && items[0].order_id == order.id
                    && new_address.is_none()
            })
            .times(1)
            .returning(|order, _, _| Ok(order.clone()));
        let service = mocks.into_service();

        let response = service
            .create_order(user_id, order_request("pi_ok", items))
            .await
            .expect("order");
        assert_eq!(response.address_id, existing_id);
        assert_eq!(response.items.len(), 1);
        assert_eq!(response.items[0].unit_price_cents, 1000);
    }

    #[tokio::test]
    async fn missing_address_is_written_with_the_order() {
        let user_id = UserId::new();
        let items = vec![cart_item(1)];
        let paid_items = items.clone();
        let mut mocks = Mocks::new();
        price_catalog(&mut mocks.catalog, 500);
        no_existing_order(&mut mocks.orders);
        mocks
            .payments
            .expect_retrieve_payment_intent()
            .returning(move |id| Ok(succeeded_intent(id, user_id, 500, &paid_items)));
        mocks
            .addresses
            .expect_find_by_name()
            .returning(|_, _| Ok(None));
        mocks.addresses.expect_create().never();
        mocks
            .orders
            .expect_create_with_items()
            .withf(move |order, _, new_address| {
                new_address.as_ref().map(|address| (address.id, address.user_id))
                    == Some((order.address_id, user_id))
            })
            .times(1)
            .returning(|order, _, _| Ok(order.clone()));
        let service = mocks.into_service();

        service
            .create_order(user_id, order_request("pi_new_addr", items))
            .await
            .expect("order");
    }

    #[tokio::test]
    async fn second_order_for_same_intent_is_conflict() {
        let user_id = UserId::new();
        let mut mocks = Mocks::new();
        mocks
            .orders
            .expect_find_by_payment_intent()
            .returning(move |intent_id| {
                Ok(Some(Order {
                    id: OrderId::new(),
                    user_id,
                    address_id: AddressId::new(),
                    payment_intent_id: intent_id.to_string(),
                    total_cents: 100,
                    currency: "usd".into(),
                    status: ORDER_STATUS_PAID.into(),
                    created_at: Utc::now(),
                }))
            });
        mocks.payments.expect_retrieve_payment_intent().never();
        mocks.orders.expect_create_with_items().never();
        let service = mocks.into_service();

        match service
            .create_order(user_id, order_request("pi_dup", vec![cart_item(1)]))
            .await
        {
            Err(AppError::Conflict(message)) => assert_eq!(message, ORDER_ALREADY_CREATED),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unpaid_intent_is_rejected() {
        let user_id = UserId::new();
        let items = vec![cart_item(1)];
        let paid_items = items.clone();
        let mut mocks = Mocks::new();
        no_existing_order(&mut mocks.orders);
        mocks
            .payments
            .expect_retrieve_payment_intent()
            .returning(move |id| {
                let mut intent = succeeded_intent(id, user_id, 100, &paid_items);
                intent.status = "requires_payment_method".into();
                Ok(intent)
            });
        mocks.orders.expect_create_with_items().never();
        let service = mocks.into_service();

        assert!(matches!(
            service
                .create_order(user_id, order_request("pi_unpaid", items))
                .await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn intent_of_another_user_is_forbidden() {
        let items = vec![cart_item(1)];
        let paid_items = items.clone();
        let mut mocks = Mocks::new();
        no_existing_order(&mut mocks.orders);
        mocks
            .payments
            .expect_retrieve_payment_intent()
            .returning(move |id| Ok(succeeded_intent(id, UserId::new(), 100, &paid_items)));
        let service = mocks.into_service();

        assert!(matches!(
            service
                .create_order(UserId::new(), order_request("pi_other", items))
                .await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn same_total_cart_with_other_items_is_rejected() {
        let user_id = UserId::new();
        let paid_items = vec![cart_item(1)];
        let swapped_items = vec![cart_item(1)];
        let mut mocks = Mocks::new();
        price_catalog(&mut mocks.catalog, 1000);
        no_existing_order(&mut mocks.orders);
        mocks
            .payments
            .expect_retrieve_payment_intent()
            .returning(move |id| Ok(succeeded_intent(id, user_id, 1000, &paid_items)));
        mocks.orders.expect_create_with_items().never();
        let service = mocks.into_service();

        match service
            .create_order(user_id, order_request("pi_swap", swapped_items))
            .await
        {
            Err(AppError::BadRequest(message)) => {
                assert_eq!(message, "Cart does not match the paid payment intent")
            }
            other => panic!("expected bad request, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn intent_without_recorded_cart_is_rejected() {
        let user_id = UserId::new();
        let mut mocks = Mocks::new();
        no_existing_order(&mut mocks.orders);
        mocks
            .payments
            .expect_retrieve_payment_intent()
            .returning(move |id| Ok(succeeded_intent(id, user_id, 1000, &[])));
        mocks.orders.expect_create_with_items().never();
        let service = mocks.into_service();

        assert!(matches!(
            service
                .create_order(user_id, order_request("pi_bare", vec![cart_item(1)]))
                .await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn cart_that_differs_from_paid_amount_is_rejected() {
        let user_id = UserId::new();
        let items = vec![cart_item(5)];
        let paid_items = items.clone();
        let mut mocks = Mocks::new();
        price_catalog(&mut mocks.catalog, 1000);
        no_existing_order(&mut mocks.orders);
        mocks
            .payments
            .expect_retrieve_payment_intent()
            .returning(move |id| Ok(succeeded_intent(id, user_id, 1000, &paid_items)));
        mocks.orders.expect_create_with_items().never();
        let service = mocks.into_service();

        assert!(matches!(
            service
                .create_order(user_id, order_request("pi_short", items))
                .await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn missing_order_of_caller_is_not_found() {
        let mut mocks = Mocks::new();
        mocks
            .orders
            .expect_find_for_user()
            .returning(|_, _| Ok(None));
        let service = mocks.into_service();

        assert!(matches!(
            service.get_for_user(UserId::new(), OrderId::new()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn cart_metadata_is_compact() {
        let item = cart_item(3);
        let encoded = encode_cart_metadata(&[item.clone()]);
        assert_eq!(
            encoded,
            format!("{}:{}:3", item.model_id, item.size_id)
        );
    }

    #[test]
    fn long_carts_span_several_metadata_keys() {
        let items: Vec<CartItem> = (0..40).map(|_| cart_item(2)).collect();
        let entries = cart_metadata_entries(&items).expect("entries");

        assert!(entries.len() > 1);
        assert!(entries.contains_key("items_1"));
        assert!(entries
            .values()
            .all(|value| value.len() <= STRIPE_METADATA_VALUE_LIMIT));

        let recorded: HashMap<String, String> = entries.into_iter().collect();
        assert_eq!(
            paid_cart_metadata(&recorded),
            Some(encode_cart_metadata(&items))
        );
    }

    #[test]
    fn cart_too_large_for_metadata_is_rejected() {
        let items: Vec<CartItem> = (0..400).map(|_| cart_item(1)).collect();
        assert!(matches!(
            cart_metadata_entries(&items),
            Err(AppError::BadRequest(_))
        ));
    }
}
