//! WebAssembly module for the Butchery POS terminals
//!
//! Runs the shared rules on the terminal so screens can react before the
//! server answers:
//! - Unit conversion and pricing
//! - Order totals and track statuses
//! - Waiter action matrix
//! - Offline validation of new order items
//!
//! Decimals cross the boundary as strings and structured values as JSON.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use uuid::Uuid;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// One edge of a product's conversion graph as the terminal caches it
#[derive(Debug, Deserialize)]
struct ConversionInput {
    from_unit_id: Uuid,
    to_unit_id: Uuid,
    amount_per: Decimal,
    #[serde(default)]
    is_default_sales_unit: bool,
}

/// Order and items as returned by `GET /orders/:id`
#[derive(Debug, Deserialize)]
struct OrderWithItems {
    #[serde(flatten)]
    order: Order,
    items: Vec<OrderItem>,
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn parse_decimal(value: &str) -> Result<Decimal, JsValue> {
    Decimal::from_str(value.trim())
        .map_err(|e| JsValue::from_str(&format!("Invalid number '{}': {}", value, e)))
}

fn parse_uuid(value: &str) -> Result<Uuid, JsValue> {
    Uuid::parse_str(value.trim())
        .map_err(|e| JsValue::from_str(&format!("Invalid id '{}': {}", value, e)))
}

fn build_graph(base_unit_id: &str, conversions_json: &str) -> Result<ConversionGraph, JsValue> {
    let conversions: Vec<ConversionInput> = serde_json::from_str(conversions_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid conversions JSON: {}", e)))?;

    let mut graph = ConversionGraph::new("product", parse_uuid(base_unit_id)?);
    for conversion in &conversions {
        graph
            .add(
                conversion.from_unit_id,
                conversion.to_unit_id,
                conversion.amount_per,
            )
            .map_err(js_error)?;
        if conversion.is_default_sales_unit {
            graph.set_default_sales_unit(conversion.from_unit_id);
        }
    }
    Ok(graph)
}

fn parse_order(order_json: &str) -> Result<OrderWithItems, JsValue> {
    serde_json::from_str(order_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid order JSON: {}", e)))
}

/// Convert `qty` between two units of one product
#[wasm_bindgen]
pub fn convert_quantity(
    base_unit_id: &str,
    conversions_json: &str,
    qty: &str,
    from_unit_id: &str,
    to_unit_id: &str,
) -> Result<String, JsValue> {
    let graph = build_graph(base_unit_id, conversions_json)?;
    let converted = graph
        .convert(
            parse_decimal(qty)?,
            parse_uuid(from_unit_id)?,
            parse_uuid(to_unit_id)?,
        )
        .map_err(js_error)?;
    Ok(quantize(converted).to_string())
}

/// Price of `qty` of a product expressed in `unit_id`
#[wasm_bindgen]
pub fn price_in_unit(
    base_unit_id: &str,
    base_unit_price: &str,
    conversions_json: &str,
    qty: &str,
    unit_id: &str,
) -> Result<String, JsValue> {
    let graph = build_graph(base_unit_id, conversions_json)?;
    let factor = graph
        .factor(parse_uuid(unit_id)?, graph.base_unit_id())
        .map_err(js_error)?;
    let price = parse_decimal(qty)?
        .checked_mul(parse_decimal(base_unit_price)?)
        .and_then(|p| p.checked_mul(factor))
        .ok_or_else(|| JsValue::from_str("Price is out of range"))?;
    Ok(quantize(price).to_string())
}

/// Unit a product is sold in by default
#[wasm_bindgen]
pub fn default_sales_unit(base_unit_id: &str, conversions_json: &str) -> Result<String, JsValue> {
    let graph = build_graph(base_unit_id, conversions_json)?;
    Ok(graph.default_sales_unit_id().to_string())
}

/// Recompute the derived fields of an order after a local change.
/// Returns the order JSON with statuses and total refreshed.
#[wasm_bindgen]
pub fn refresh_order(order_json: &str) -> Result<String, JsValue> {
    let OrderWithItems { mut order, items } = parse_order(order_json)?;
    order.on_item_changed(&items).map_err(js_error)?;
    serde_json::to_string(&order).map_err(js_error)
}

/// Waiter permission matrix for an order, as JSON
#[wasm_bindgen]
pub fn waiter_actions(order_json: &str) -> Result<String, JsValue> {
    let OrderWithItems { order, items } = parse_order(order_json)?;
    serde_json::to_string(&WaiterActions::for_order(&order, &items)).map_err(js_error)
}

/// Check new order items before they are queued offline.
/// Returns an empty string when valid, the first problem otherwise.
#[wasm_bindgen]
pub fn validate_items(items_json: &str) -> Result<String, JsValue> {
    let items: Vec<NewOrderItem> = serde_json::from_str(items_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid items JSON: {}", e)))?;
    Ok(match validate_order_items(&items) {
        Ok(()) => String::new(),
        Err(e) => e.to_string(),
    })
}

/// Whether `value` looks like `YYYYMMDD-NN`
#[wasm_bindgen]
pub fn check_order_number(value: &str) -> bool {
    is_valid_order_number(value)
}
