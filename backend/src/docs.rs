#![allow(dead_code)] // OpenAPI doc stubs are only referenced by utoipa macros.

use crate::{
    models::{
        address::{Address, AddressPayload},
        order::{
            CartItem, CreateOrderRequest, CreatePaymentIntentRequest, OrderItem, OrderResponse,
            PaymentIntentResponse,
        },
        password_reset::{RequestPasswordResetPayload, ResetPasswordPayload},
        user::{
            AuthResult, ChangePasswordRequest, LoginRequest, RefreshRequest, RegisterRequest,
            UserResponse,
        },
        PaginatedResponse, PaginationQuery,
    },
    types::{AddressId, OrderId},
};
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        register_doc,
        login_doc,
        refresh_doc,
        forgot_password_doc,
        reset_password_doc,
        me_doc,
        logout_doc,
        change_password_doc,
        list_addresses_doc,
        create_address_doc,
        get_address_doc,
        update_address_doc,
        delete_address_doc,
        create_payment_intent_doc,
        create_order_doc,
        list_orders_doc,
        get_order_doc,
        admin_list_orders_doc
    ),
    components(
        schemas(
            // auth
            RegisterRequest,
            LoginRequest,
            RefreshRequest,
            AuthResult,
            ChangePasswordRequest,
            RequestPasswordResetPayload,
            ResetPasswordPayload,
            UserResponse,
            // addresses
            Address,
            AddressPayload,
            // checkout
            CartItem,
            CreatePaymentIntentRequest,
            PaymentIntentResponse,
            CreateOrderRequest,
            OrderItem,
            OrderResponse
        )
    ),
    modifiers(&SecuritySchemes),
    tags(
        (name = "Auth", description = "Registration, tokens and passwords"),
        (name = "Addresses", description = "Saved shipping addresses"),
        (name = "Orders", description = "Checkout and order history"),
        (name = "Admin", description = "Back-office endpoints")
    ),
    security(("BearerAuth" = []))
)]
pub struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();

        let mut bearer = Http::new(HttpAuthScheme::Bearer);
        bearer.bearer_format = Some("JWT".to_string());

        components.add_security_scheme("BearerAuth", SecurityScheme::Http(bearer));
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, token pair issued", body = AuthResult),
        (status = 400, description = "Validation failed", body = AuthResult),
        (status = 409, description = "Username or e-mail taken", body = AuthResult)
    ),
    tag = "Auth",
    security(())
)]
fn register_doc() {}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = AuthResult),
        (status = 401, description = "Invalid credentials", body = AuthResult)
    ),
    tag = "Auth",
    security(())
)]
fn login_doc() {}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = AuthResult),
        (status = 400, description = "Refresh refused", body = AuthResult)
    ),
    tag = "Auth",
    security(())
)]
fn refresh_doc() {}

#[utoipa::path(
    post,
    path = "/api/auth/forgot-password",
    request_body = RequestPasswordResetPayload,
    responses((status = 200, description = "Reset code sent if the e-mail is registered", body = serde_json::Value)),
    tag = "Auth",
    security(())
)]
fn forgot_password_doc() {}

#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    request_body = ResetPasswordPayload,
    responses(
        (status = 200, description = "Password replaced", body = serde_json::Value),
        (status = 400, description = "Invalid or expired code")
    ),
    tag = "Auth",
    security(())
)]
fn reset_password_doc() {}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses((status = 200, description = "Authenticated user", body = UserResponse)),
    tag = "Auth"
)]
fn me_doc() {}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 200, description = "All refresh tokens revoked", body = serde_json::Value)),
    tag = "Auth"
)]
fn logout_doc() {}

#[utoipa::path(
    put,
    path = "/api/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = serde_json::Value),
        (status = 401, description = "Current password is incorrect")
    ),
    tag = "Auth"
)]
fn change_password_doc() {}

#[utoipa::path(
    get,
    path = "/api/addresses",
    responses((status = 200, description = "OK", body = [Address])),
    tag = "Addresses"
)]
fn list_addresses_doc() {}

#[utoipa::path(
    post,
    path = "/api/addresses",
    request_body = AddressPayload,
    responses(
        (status = 201, description = "OK", body = Address),
        (status = 409, description = "Name already used")
    ),
    tag = "Addresses"
)]
fn create_address_doc() {}

#[utoipa::path(
    get,
    path = "/api/addresses/{id}",
    params(("id" = AddressId, Path, description = "Address id")),
    responses((status = 200, description = "OK", body = Address), (status = 404, description = "Not found")),
    tag = "Addresses"
)]
fn get_address_doc() {}

#[utoipa::path(
    put,
    path = "/api/addresses/{id}",
    params(("id" = AddressId, Path, description = "Address id")),
    request_body = AddressPayload,
    responses((status = 200, description = "OK", body = Address), (status = 404, description = "Not found"), (status = 409, description = "Name already used")),
    tag = "Addresses"
)]
fn update_address_doc() {}

#[utoipa::path(
    delete,
    path = "/api/addresses/{id}",
    params(("id" = AddressId, Path, description = "Address id")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not found")),
    tag = "Addresses"
)]
fn delete_address_doc() {}

#[utoipa::path(
    post,
    path = "/api/orders/payment-intent",
    request_body = CreatePaymentIntentRequest,
    responses(
        (status = 200, description = "Payment intent created", body = PaymentIntentResponse),
        (status = 404, description = "Unknown model/size pair"),
        (status = 502, description = "Payment provider error")
    ),
    tag = "Orders"
)]
fn create_payment_intent_doc() {}

#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "OK", body = OrderResponse),
        (status = 400, description = "Payment not succeeded or cart mismatch"),
        (status = 403, description = "Payment intent belongs to another user"),
        (status = 409, description = "Order already created for this payment intent")
    ),
    tag = "Orders"
)]
fn create_order_doc() {}

#[utoipa::path(
    get,
    path = "/api/orders",
    responses((status = 200, description = "OK", body = [OrderResponse])),
    tag = "Orders"
)]
fn list_orders_doc() {}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = OrderId, Path, description = "Order id")),
    responses((status = 200, description = "OK", body = OrderResponse), (status = 404, description = "Not found")),
    tag = "Orders"
)]
fn get_order_doc() {}

#[utoipa::path(
    get,
    path = "/api/admin/orders",
    params(PaginationQuery),
    responses(
        (status = 200, description = "OK", body = PaginatedResponse<OrderResponse>),
        (status = 403, description = "Admin role required")
    ),
    tag = "Admin"
)]
fn admin_list_orders_doc() {}
