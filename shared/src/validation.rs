//! Payload validation for orders, stock and catalog input

use rust_decimal::Decimal;

use crate::error::{DomainError, DomainResult};
use crate::models::{max_amount, ItemKind, NewOrderItem};

/// Most units of one item a single order line may carry
pub const MAX_ITEM_QUANTITY: i32 = 10_000;

/// Decimal places a billed amount may carry
const PRICE_SCALE: u32 = 2;

// ============================================================================
// Order Validations
// ============================================================================

/// Validate a single submitted order item
pub fn validate_order_item(item: &NewOrderItem) -> Result<(), &'static str> {
    if item.name.trim().is_empty() {
        return Err("Item name is required");
    }
    if item.quantity < 1 {
        return Err("Item quantity must be at least 1");
    }
    if item.quantity > MAX_ITEM_QUANTITY {
        return Err("Item quantity cannot exceed 10000");
    }
    if item.unit_price < Decimal::ZERO {
        return Err("Item price cannot be negative");
    }
    if item.unit_price > max_amount() {
        return Err("Item price exceeds the largest billable amount");
    }
    if item.unit_price.normalize().scale() > PRICE_SCALE {
        return Err("Item price cannot have more than two decimal places");
    }
    if item.kind == ItemKind::Beverage && item.product_ref.is_none() {
        return Err("Beverage items must reference a product");
    }
    Ok(())
}

/// Validate every item of a submission, naming the offending item
pub fn validate_new_items(items: &[NewOrderItem]) -> DomainResult<()> {
    for (index, item) in items.iter().enumerate() {
        validate_order_item(item).map_err(|message| DomainError::Validation {
            field: Some(format!("items[{}]", index)),
            message: format!("{} ('{}')", message, item.name),
        })?;
    }
    Ok(())
}

/// A new order must carry at least one item
pub fn validate_order_items(items: &[NewOrderItem]) -> DomainResult<()> {
    if items.is_empty() {
        return Err(DomainError::validation(
            "items",
            "An order needs at least one item",
        ));
    }
    validate_new_items(items)
}

// ============================================================================
// Inventory Validations
// ============================================================================

/// Quantities moved through the ledger must be strictly positive
pub fn validate_positive_qty(qty: Decimal) -> Result<(), &'static str> {
    if qty <= Decimal::ZERO {
        return Err("Quantity must be greater than zero");
    }
    Ok(())
}

/// Conversion amounts must be strictly positive
pub fn validate_amount_per(amount_per: Decimal) -> Result<(), &'static str> {
    if amount_per <= Decimal::ZERO {
        return Err("Conversion amount must be greater than zero");
    }
    Ok(())
}

/// Threshold below which a balance is flagged as running out
pub fn validate_threshold(threshold: Decimal) -> Result<(), &'static str> {
    if threshold < Decimal::ZERO {
        return Err("Threshold cannot be negative");
    }
    Ok(())
}

// ============================================================================
// Catalog Validations
// ============================================================================

pub fn validate_price(price: Decimal) -> Result<(), &'static str> {
    if price < Decimal::ZERO {
        return Err("Price cannot be negative");
    }
    Ok(())
}

/// Validate a unit abbreviation (1-10 characters, no whitespace)
pub fn validate_abbreviation(abbreviation: &str) -> Result<(), &'static str> {
    if abbreviation.is_empty() || abbreviation.chars().count() > 10 {
        return Err("Abbreviation must be 1-10 characters");
    }
    if abbreviation.chars().any(char::is_whitespace) {
        return Err("Abbreviation cannot contain whitespace");
    }
    Ok(())
}
