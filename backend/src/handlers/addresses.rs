use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        address::{Address, AddressPayload},
        user::User,
    },
    state::AppState,
    types::AddressId,
};

const DUPLICATE_NAME: &str = "An address with this name already exists";

pub async fn list_addresses(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Address>>, AppError> {
    Ok(Json(state.addresses.list_for_user(user.id).await?))
}

pub async fn get_address(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(address_id): Path<AddressId>,
) -> Result<Json<Address>, AppError> {
    let address = find_owned(&state, &user, address_id).await?;
    Ok(Json(address))
}

pub async fn create_address(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(payload): Json<AddressPayload>,
) -> Result<(StatusCode, Json<Address>), AppError> {
    payload.validate()?;
    if state
        .addresses
        .find_by_name(user.id, payload.name.trim())
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(DUPLICATE_NAME.into()));
    }

    let created = state
        .addresses
        .create(&Address::new(user.id, payload))
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_address(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(address_id): Path<AddressId>,
    Json(payload): Json<AddressPayload>,
) -> Result<Json<Address>, AppError> {
    payload.validate()?;
    let mut address = find_owned(&state, &user, address_id).await?;

    if let Some(other) = state
        .addresses
        .find_by_name(user.id, payload.name.trim())
        .await?
    {
        if other.id != address.id {
            return Err(AppError::Conflict(DUPLICATE_NAME.into()));
        }
    }

    address.apply(payload);
    Ok(Json(state.addresses.update(&address).await?))
}

pub async fn delete_address(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(address_id): Path<AddressId>,
) -> Result<StatusCode, AppError> {
    if !state.addresses.delete(user.id, address_id).await? {
        return Err(AppError::NotFound("Address not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn find_owned(
    state: &AppState,
    user: &User,
    address_id: AddressId,
) -> Result<Address, AppError> {
    state
        .addresses
        .find_for_user(user.id, address_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Address not found".into()))
}
