//! HTTP handlers for units, conversions and products

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::product::{
    CreateProductInput, CreatedProduct, PriceQuery, PriceQuote, ProductQuery, ProductService,
    UpdateProductInput,
};
use crate::services::unit::{
    AddConversionInput, ConversionResult, ConvertQuery, CreateUnitInput, UnitService,
};
use crate::AppState;
use shared::{Product, ProductConversion, Unit};

// ============================================================================
// Units
// ============================================================================

pub async fn list_units(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<Unit>>> {
    let service = UnitService::new(state.db);
    let units = service.list_units().await?;
    Ok(Json(units))
}

/// Register a unit of measure
pub async fn create_unit(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateUnitInput>,
) -> AppResult<(StatusCode, Json<Unit>)> {
    let service = UnitService::new(state.db);
    let unit = service.create_unit(&current_user.0, input).await?;
    Ok((StatusCode::CREATED, Json(unit)))
}

// ============================================================================
// Conversions
// ============================================================================

pub async fn list_conversions(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<Vec<ProductConversion>>> {
    let service = UnitService::new(state.db);
    let conversions = service.list_conversions(product_id).await?;
    Ok(Json(conversions))
}

/// Add a conversion between two units of a product
pub async fn add_conversion(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
    Json(input): Json<AddConversionInput>,
) -> AppResult<(StatusCode, Json<ProductConversion>)> {
    let service = UnitService::new(state.db);
    let conversion = service
        .add_conversion(&current_user.0, product_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(conversion)))
}

/// Convert a quantity between two units of a product
pub async fn convert_quantity(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
    Query(query): Query<ConvertQuery>,
) -> AppResult<Json<ConversionResult>> {
    let service = UnitService::new(state.db);
    let result = service.convert(product_id, query).await?;
    Ok(Json(result))
}

// ============================================================================
// Products
// ============================================================================

pub async fn list_products(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<ProductQuery>,
) -> AppResult<Json<Vec<Product>>> {
    let service = ProductService::new(state.db);
    let products = service.list(query).await?;
    Ok(Json(products))
}

/// Create a product, optionally with its receiving unit and opening stock
pub async fn create_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateProductInput>,
) -> AppResult<(StatusCode, Json<CreatedProduct>)> {
    let service = ProductService::new(state.db);
    let product = service.create(&current_user.0, input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn get_product(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<Product>> {
    let service = ProductService::new(state.db);
    let product = service.get(product_id).await?;
    Ok(Json(product))
}

pub async fn update_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
    Json(input): Json<UpdateProductInput>,
) -> AppResult<Json<Product>> {
    let service = ProductService::new(state.db);
    let product = service.update(&current_user.0, product_id, input).await?;
    Ok(Json(product))
}

/// Soft-delete a product
pub async fn delete_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let service = ProductService::new(state.db);
    service.deactivate(&current_user.0, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Price a quantity of a product in any of its units
pub async fn price_product(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
    Query(query): Query<PriceQuery>,
) -> AppResult<Json<PriceQuote>> {
    let service = ProductService::new(state.db);
    let quote = service.price(product_id, query).await?;
    Ok(Json(quote))
}
