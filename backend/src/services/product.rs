//! Product catalog service

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::{begin_serializable, with_serializable_retry};
use super::inventory::initial_stock;
use super::unit::{load_graph, PRODUCT_COLUMNS};
use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use shared::{validate_amount_per, validate_price, ConversionGraph, Product, Role, Stock};

/// Product catalog service
#[derive(Clone)]
pub struct ProductService {
    db: PgPool,
}

/// Input for creating a product
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub category: String,
    pub base_unit_id: Uuid,
    pub base_unit_price: Decimal,
    /// Unit the product is received in, e.g. carton
    pub input_unit_id: Option<Uuid>,
    /// Base units per input unit
    pub conversion_amount: Option<Decimal>,
    #[serde(default)]
    pub input_unit_is_default_sales_unit: bool,
    pub initial_stock: Option<InitialStockInput>,
}

/// Opening balance recorded with a new product, in its input unit
#[derive(Debug, Deserialize)]
pub struct InitialStockInput {
    pub branch_id: Option<Uuid>,
    pub qty: Decimal,
    #[serde(default)]
    pub min_threshold_base_units: Decimal,
}

/// Input for updating a product
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub category: Option<String>,
    pub base_unit_price: Option<Decimal>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize)]
pub struct PriceQuery {
    pub qty: Decimal,
    pub unit: Uuid,
}

/// A created product with whatever was set up alongside it
#[derive(Debug, Serialize)]
pub struct CreatedProduct {
    #[serde(flatten)]
    pub product: Product,
    pub stock: Option<Stock>,
}

#[derive(Debug, Serialize)]
pub struct PriceQuote {
    pub product_id: Uuid,
    pub qty: Decimal,
    pub unit_id: Uuid,
    pub unit: String,
    pub price: Decimal,
}

/// The conversion row a new product is created with, if any. Receiving in
/// the base unit itself needs no row and only makes sense at a factor of 1.
fn receiving_conversion(
    base_unit_id: Uuid,
    input_unit_id: Option<Uuid>,
    conversion_amount: Option<Decimal>,
) -> AppResult<Option<(Uuid, Decimal)>> {
    let (unit, amount) = match (input_unit_id, conversion_amount) {
        (Some(unit), Some(amount)) => (unit, amount),
        (None, None) => return Ok(None),
        _ => {
            return Err(AppError::validation(
                "conversion_amount",
                "input_unit_id and conversion_amount go together",
            ))
        }
    };
    validate_amount_per(amount).map_err(|msg| AppError::validation("conversion_amount", msg))?;

    if unit != base_unit_id {
        return Ok(Some((unit, amount)));
    }
    if amount != Decimal::ONE {
        return Err(AppError::validation(
            "conversion_amount",
            "The base unit converts to itself at 1",
        ));
    }
    Ok(None)
}

impl ProductService {
    /// Create a new ProductService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a product, its receiving-unit conversion and optionally its
    /// opening stock, all in one transaction
    pub async fn create(&self, user: &AuthUser, input: CreateProductInput) -> AppResult<CreatedProduct> {
        user.require_role(&[Role::Admin, Role::Owner, Role::Manager])?;
        input.validate()?;
        validate_price(input.base_unit_price)
            .map_err(|msg| AppError::validation("base_unit_price", msg))?;

        let conversion = receiving_conversion(
            input.base_unit_id,
            input.input_unit_id,
            input.conversion_amount,
        )?;
        let stock_branch = match &input.initial_stock {
            Some(opening) => Some(user.resolve_branch(opening.branch_id)?),
            None => None,
        };

        let input = &input;
        with_serializable_retry(move || self.create_once(user, input, conversion, stock_branch)).await
    }

    async fn create_once(
        &self,
        user: &AuthUser,
        input: &CreateProductInput,
        conversion: Option<(Uuid, Decimal)>,
        stock_branch: Option<Uuid>,
    ) -> AppResult<CreatedProduct> {
        let mut tx = begin_serializable(&self.db).await?;

        let product = sqlx::query_as::<_, Product>(&format!(
            r#"
            INSERT INTO products (id, name, category, base_unit_id, base_unit_price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(input.name.trim())
        .bind(input.category.trim())
        .bind(input.base_unit_id)
        .bind(input.base_unit_price)
        .fetch_one(&mut *tx)
        .await?;

        if let Some((unit, amount)) = conversion {
            sqlx::query(
                r#"
                INSERT INTO product_conversions
                    (id, product_id, from_unit_id, to_unit_id, amount_per, is_default_sales_unit)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(product.id)
            .bind(unit)
            .bind(product.base_unit_id)
            .bind(amount)
            .bind(input.input_unit_is_default_sales_unit)
            .execute(&mut *tx)
            .await?;
        }

        let stock = match (&input.initial_stock, stock_branch) {
            (Some(opening), Some(branch_id)) => {
                let (product, graph) = load_graph(&mut *tx, product.id).await?;
                let unit = input.input_unit_id.unwrap_or(product.base_unit_id);
                Some(
                    initial_stock(
                        &mut *tx,
                        &product,
                        &graph,
                        branch_id,
                        opening.qty,
                        unit,
                        opening.min_threshold_base_units,
                        user.user_id,
                    )
                    .await?,
                )
            }
            _ => None,
        };

        tx.commit().await?;

        tracing::info!(product_id = %product.id, name = %product.name, "Product created");
        Ok(CreatedProduct { product, stock })
    }

    /// List products, active ones only unless asked otherwise
    pub async fn list(&self, query: ProductQuery) -> AppResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            r#"
            SELECT {}
            FROM products
            WHERE ($1::varchar IS NULL OR category = $1)
              AND ($2 OR is_active = true)
            ORDER BY category, name
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(query.category)
        .bind(query.include_inactive)
        .fetch_all(&self.db)
        .await?;
        Ok(products)
    }

    pub async fn get(&self, product_id: Uuid) -> AppResult<Product> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE id = $1",
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))
    }

    /// Update a product's descriptive fields or price
    pub async fn update(
        &self,
        user: &AuthUser,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> AppResult<Product> {
        user.require_role(&[Role::Admin, Role::Owner, Role::Manager])?;
        input.validate()?;
        if let Some(price) = input.base_unit_price {
            validate_price(price).map_err(|msg| AppError::validation("base_unit_price", msg))?;
        }

        let product = sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products
            SET name = COALESCE($2, name),
                category = COALESCE($3, category),
                base_unit_price = COALESCE($4, base_unit_price),
                is_active = COALESCE($5, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .bind(input.name.as_deref().map(str::trim))
        .bind(input.category.as_deref().map(str::trim))
        .bind(input.base_unit_price)
        .bind(input.is_active)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        tracing::info!(product_id = %product.id, "Product updated");
        Ok(product)
    }

    /// Retire a product. Stock and history stay; the product stops being listed.
    pub async fn deactivate(&self, user: &AuthUser, product_id: Uuid) -> AppResult<()> {
        user.require_role(&[Role::Admin, Role::Owner, Role::Manager])?;
        let result = sqlx::query(
            "UPDATE products SET is_active = false, updated_at = NOW() WHERE id = $1",
        )
        .bind(product_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Product".to_string()));
        }
        tracing::info!(product_id = %product_id, "Product deactivated");
        Ok(())
    }

    /// Price of a quantity expressed in any unit the product converts to
    pub async fn price(&self, product_id: Uuid, query: PriceQuery) -> AppResult<PriceQuote> {
        let mut conn = self.db.acquire().await?;
        let (product, graph): (Product, ConversionGraph) = load_graph(&mut *conn, product_id).await?;
        let price = product.price(query.qty, query.unit, &graph)?;

        Ok(PriceQuote {
            product_id,
            qty: query.qty,
            unit_id: query.unit,
            unit: graph.unit_name(query.unit),
            price,
        })
    }
}
