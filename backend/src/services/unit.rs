//! Unit registry and per-product conversion graph

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use super::{begin_serializable, with_serializable_retry};
use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use shared::{
    quantize, validate_abbreviation, validate_amount_per, ConversionGraph, Product,
    ProductConversion, Role, Unit,
};

/// Unit and conversion service
#[derive(Clone)]
pub struct UnitService {
    db: PgPool,
}

/// Input for registering a unit
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUnitInput {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    pub abbreviation: String,
    #[serde(default)]
    pub is_liquid: bool,
}

/// Input for adding a conversion to a product
#[derive(Debug, Deserialize)]
pub struct AddConversionInput {
    pub from_unit_id: Uuid,
    pub to_unit_id: Uuid,
    pub amount_per: Decimal,
    #[serde(default)]
    pub is_default_sales_unit: bool,
}

/// Query for a one-off conversion
#[derive(Debug, Deserialize)]
pub struct ConvertQuery {
    pub qty: Decimal,
    pub from: Uuid,
    pub to: Uuid,
}

/// Result of converting a quantity between two units of a product
#[derive(Debug, Serialize)]
pub struct ConversionResult {
    pub product_id: Uuid,
    pub qty: Decimal,
    pub from_unit_id: Uuid,
    pub to_unit_id: Uuid,
    pub factor: Decimal,
    pub result: Decimal,
}

#[derive(FromRow)]
struct UnitName {
    id: Uuid,
    name: String,
}

pub(crate) const PRODUCT_COLUMNS: &str =
    "id, name, category, base_unit_id, base_unit_price, is_active, created_at, updated_at";

const CONVERSION_COLUMNS: &str =
    "id, product_id, from_unit_id, to_unit_id, amount_per, is_default_sales_unit, created_at";

/// Load a product and its conversion graph, with unit names for messages
pub async fn load_graph(
    conn: &mut PgConnection,
    product_id: Uuid,
) -> AppResult<(Product, ConversionGraph)> {
    let product = sqlx::query_as::<_, Product>(&format!(
        "SELECT {} FROM products WHERE id = $1",
        PRODUCT_COLUMNS
    ))
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

    let conversions = sqlx::query_as::<_, ProductConversion>(&format!(
        "SELECT {} FROM product_conversions WHERE product_id = $1 ORDER BY created_at",
        CONVERSION_COLUMNS
    ))
    .bind(product_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut unit_ids: Vec<Uuid> = vec![product.base_unit_id];
    for c in &conversions {
        unit_ids.push(c.from_unit_id);
        unit_ids.push(c.to_unit_id);
    }
    let names = sqlx::query_as::<_, UnitName>("SELECT id, name FROM units WHERE id = ANY($1)")
        .bind(&unit_ids)
        .fetch_all(&mut *conn)
        .await?;

    let graph = ConversionGraph::from_conversions(
        product.name.clone(),
        product.base_unit_id,
        &conversions,
    )?
    .with_unit_names(names.into_iter().map(|u| (u.id, u.name)));

    Ok((product, graph))
}

impl UnitService {
    /// Create a new UnitService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List all registered units
    pub async fn list_units(&self) -> AppResult<Vec<Unit>> {
        let units = sqlx::query_as::<_, Unit>(
            "SELECT id, name, abbreviation, is_liquid, created_at FROM units ORDER BY name",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(units)
    }

    /// Register a unit. Managers and above only.
    pub async fn create_unit(&self, user: &AuthUser, input: CreateUnitInput) -> AppResult<Unit> {
        user.require_role(&[Role::Admin, Role::Owner, Role::Manager])?;
        input.validate()?;
        validate_abbreviation(&input.abbreviation)
            .map_err(|msg| AppError::validation("abbreviation", msg))?;

        let unit = sqlx::query_as::<_, Unit>(
            r#"
            INSERT INTO units (id, name, abbreviation, is_liquid)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, abbreviation, is_liquid, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.name.trim())
        .bind(&input.abbreviation)
        .bind(input.is_liquid)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(unit_id = %unit.id, name = %unit.name, "Unit registered");
        Ok(unit)
    }

    /// List the conversions defined for a product
    pub async fn list_conversions(&self, product_id: Uuid) -> AppResult<Vec<ProductConversion>> {
        let conversions = sqlx::query_as::<_, ProductConversion>(&format!(
            "SELECT {} FROM product_conversions WHERE product_id = $1 ORDER BY created_at",
            CONVERSION_COLUMNS
        ))
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;
        Ok(conversions)
    }

    /// Add a conversion to a product. A conversion that contradicts a factor
    /// already implied by the graph is refused.
    pub async fn add_conversion(
        &self,
        user: &AuthUser,
        product_id: Uuid,
        input: AddConversionInput,
    ) -> AppResult<ProductConversion> {
        user.require_role(&[Role::Admin, Role::Owner, Role::Manager])?;
        validate_amount_per(input.amount_per)
            .map_err(|msg| AppError::validation("amount_per", msg))?;
        let input = &input;
        with_serializable_retry(move || self.add_conversion_once(product_id, input)).await
    }

    async fn add_conversion_once(
        &self,
        product_id: Uuid,
        input: &AddConversionInput,
    ) -> AppResult<ProductConversion> {
        let mut tx = begin_serializable(&self.db).await?;

        // Serialise graph changes per product
        sqlx::query("SELECT id FROM products WHERE id = $1 FOR UPDATE")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        let (_, mut graph) = load_graph(&mut *tx, product_id).await?;
        graph.add(input.from_unit_id, input.to_unit_id, input.amount_per)?;

        if input.is_default_sales_unit {
            sqlx::query(
                "UPDATE product_conversions SET is_default_sales_unit = false WHERE product_id = $1",
            )
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
        }

        let conversion = sqlx::query_as::<_, ProductConversion>(&format!(
            r#"
            INSERT INTO product_conversions
                (id, product_id, from_unit_id, to_unit_id, amount_per, is_default_sales_unit)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            CONVERSION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(product_id)
        .bind(input.from_unit_id)
        .bind(input.to_unit_id)
        .bind(input.amount_per)
        .bind(input.is_default_sales_unit)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            product_id = %product_id,
            from = %input.from_unit_id,
            to = %input.to_unit_id,
            amount_per = %input.amount_per,
            "Conversion added"
        );
        Ok(conversion)
    }

    /// Convert a quantity between two units of a product
    pub async fn convert(&self, product_id: Uuid, query: ConvertQuery) -> AppResult<ConversionResult> {
        let mut conn = self.db.acquire().await?;
        let (_, graph) = load_graph(&mut *conn, product_id).await?;
        let factor = graph.factor(query.from, query.to)?;
        let result = quantize(graph.convert(query.qty, query.from, query.to)?);

        Ok(ConversionResult {
            product_id,
            qty: query.qty,
            from_unit_id: query.from,
            to_unit_id: query.to,
            factor: factor.normalize(),
            result,
        })
    }
}
