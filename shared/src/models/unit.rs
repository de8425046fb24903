//! Measurement units and per-product conversion rules
//!
//! A product's conversions form a weighted graph over units. A row
//! `(from_unit, to_unit, amount_per)` reads "one `from_unit` holds `amount_per`
//! `to_unit`", so a carton of 24 bottles is stored as `(carton, bottle, 24)`.
//! Edges are walked in both directions, the reverse direction using the
//! reciprocal factor.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// A measurement unit (bottle, carton, shot, ml, kg, piece)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Unit {
    pub id: Uuid,
    pub name: String,
    pub abbreviation: String,
    pub is_liquid: bool,
    pub created_at: DateTime<Utc>,
}

/// A product-specific conversion between two units
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ProductConversion {
    pub id: Uuid,
    pub product_id: Uuid,
    pub from_unit_id: Uuid,
    pub to_unit_id: Uuid,
    pub amount_per: Decimal,
    pub is_default_sales_unit: bool,
    pub created_at: DateTime<Utc>,
}

/// Quantize a quantity to two decimal places, rounding half away from zero
pub fn quantize(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Two factors closer than this are treated as the same conversion
fn factor_tolerance() -> Decimal {
    Decimal::new(1, 9)
}

/// Conversion graph for one product
#[derive(Debug, Clone)]
pub struct ConversionGraph {
    product_name: String,
    base_unit_id: Uuid,
    edges: HashMap<Uuid, Vec<(Uuid, Decimal)>>,
    unit_names: HashMap<Uuid, String>,
    default_sales_unit_id: Option<Uuid>,
}

impl ConversionGraph {
    pub fn new(product_name: impl Into<String>, base_unit_id: Uuid) -> Self {
        Self {
            product_name: product_name.into(),
            base_unit_id,
            edges: HashMap::new(),
            unit_names: HashMap::new(),
            default_sales_unit_id: None,
        }
    }

    /// Build a graph from stored conversion rows, rejecting inconsistent cycles
    pub fn from_conversions(
        product_name: impl Into<String>,
        base_unit_id: Uuid,
        conversions: &[ProductConversion],
    ) -> DomainResult<Self> {
        let mut graph = Self::new(product_name, base_unit_id);
        for conversion in conversions {
            graph.add(
                conversion.from_unit_id,
                conversion.to_unit_id,
                conversion.amount_per,
            )?;
            if conversion.is_default_sales_unit {
                graph.default_sales_unit_id = Some(conversion.from_unit_id);
            }
        }
        Ok(graph)
    }

    /// Attach display names used in error messages and stock displays
    pub fn with_unit_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = (Uuid, S)>,
        S: Into<String>,
    {
        self.unit_names
            .extend(names.into_iter().map(|(id, name)| (id, name.into())));
        self
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn base_unit_id(&self) -> Uuid {
        self.base_unit_id
    }

    /// Unit used when an order line is drawn from stock, defaulting to the base unit
    pub fn default_sales_unit_id(&self) -> Uuid {
        self.default_sales_unit_id.unwrap_or(self.base_unit_id)
    }

    pub fn set_default_sales_unit(&mut self, unit_id: Uuid) {
        self.default_sales_unit_id = Some(unit_id);
    }

    pub fn unit_name(&self, unit_id: Uuid) -> String {
        self.unit_names
            .get(&unit_id)
            .cloned()
            .unwrap_or_else(|| unit_id.to_string())
    }

    /// Add a conversion edge.
    ///
    /// A self-conversion must carry a factor of 1. An edge between units that
    /// are already connected must agree with the factor implied by the
    /// existing path, which keeps every cycle's product equal to 1.
    pub fn add(&mut self, from: Uuid, to: Uuid, amount_per: Decimal) -> DomainResult<()> {
        if amount_per <= Decimal::ZERO {
            return Err(DomainError::validation(
                "amount_per",
                "Conversion amount must be greater than zero",
            ));
        }

        if from == to {
            if amount_per != Decimal::ONE {
                return Err(DomainError::validation(
                    "amount_per",
                    "A unit converts to itself with a factor of exactly 1",
                ));
            }
            return Ok(());
        }

        if let Ok(existing) = self.factor(from, to) {
            if (existing - amount_per).abs() > factor_tolerance() {
                return Err(DomainError::validation(
                    "amount_per",
                    format!(
                        "Conversion {} -> {} of {} contradicts the existing factor {}",
                        self.unit_name(from),
                        self.unit_name(to),
                        amount_per,
                        existing.normalize()
                    ),
                ));
            }
            return Ok(());
        }

        let reciprocal = Decimal::ONE.checked_div(amount_per).ok_or_else(|| {
            DomainError::validation("amount_per", "Conversion amount is out of range")
        })?;

        self.edges.entry(from).or_default().push((to, amount_per));
        self.edges.entry(to).or_default().push((from, reciprocal));
        Ok(())
    }

    /// How many `to` units one `from` unit holds
    pub fn factor(&self, from: Uuid, to: Uuid) -> DomainResult<Decimal> {
        if from == to {
            return Ok(Decimal::ONE);
        }

        let mut reached: HashMap<Uuid, Decimal> = HashMap::new();
        let mut queue = VecDeque::new();
        reached.insert(from, Decimal::ONE);
        queue.push_back(from);

        while let Some(unit) = queue.pop_front() {
            let acc = reached[&unit];
            for (next, weight) in self.edges.get(&unit).into_iter().flatten() {
                if reached.contains_key(next) {
                    continue;
                }
                let product = acc.checked_mul(*weight).ok_or_else(|| self.no_conversion(from, to))?;
                if *next == to {
                    return Ok(product);
                }
                reached.insert(*next, product);
                queue.push_back(*next);
            }
        }

        Err(self.no_conversion(from, to))
    }

    /// Convert a quantity between two units without rounding
    pub fn convert(&self, qty: Decimal, from: Uuid, to: Uuid) -> DomainResult<Decimal> {
        let factor = self.factor(from, to)?;
        qty.checked_mul(factor)
            .ok_or_else(|| DomainError::validation("qty", "Quantity is out of range"))
    }

    /// Convert a quantity into base units, quantized to two decimal places
    pub fn to_base(&self, qty: Decimal, unit: Uuid) -> DomainResult<Decimal> {
        Ok(quantize(self.convert(qty, unit, self.base_unit_id)?))
    }

    /// Every unit reachable from the base unit, the base unit included
    pub fn reachable_units(&self) -> Vec<Uuid> {
        let mut seen = vec![self.base_unit_id];
        let mut queue = VecDeque::from([self.base_unit_id]);
        while let Some(unit) = queue.pop_front() {
            for (next, _) in self.edges.get(&unit).into_iter().flatten() {
                if !seen.contains(next) {
                    seen.push(*next);
                    queue.push_back(*next);
                }
            }
        }
        seen
    }

    fn no_conversion(&self, from: Uuid, to: Uuid) -> DomainError {
        DomainError::NoConversion {
            product: self.product_name.clone(),
            from: self.unit_name(from),
            to: self.unit_name(to),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    struct Units {
        bottle: Uuid,
        carton: Uuid,
        shot: Uuid,
    }

    fn whisky() -> (ConversionGraph, Units) {
        let units = Units {
            bottle: Uuid::new_v4(),
            carton: Uuid::new_v4(),
            shot: Uuid::new_v4(),
        };
        let mut graph = ConversionGraph::new("Whisky", units.bottle).with_unit_names([
            (units.bottle, "bottle"),
            (units.carton, "carton"),
            (units.shot, "shot"),
        ]);
        graph.add(units.carton, units.bottle, dec("24")).unwrap();
        graph.add(units.shot, units.bottle, dec("0.05")).unwrap();
        (graph, units)
    }

    #[test]
    fn test_self_conversion_is_one() {
        let (graph, units) = whisky();
        assert_eq!(graph.factor(units.shot, units.shot).unwrap(), Decimal::ONE);
    }

    #[test]
    fn test_carton_to_shot_goes_through_base_unit() {
        let (graph, units) = whisky();
        assert_eq!(
            graph.convert(Decimal::ONE, units.carton, units.shot).unwrap(),
            dec("480")
        );
    }

    #[test]
    fn test_reverse_direction_uses_reciprocal() {
        let (graph, units) = whisky();
        assert_eq!(graph.to_base(dec("48"), units.bottle).unwrap(), dec("48"));
        assert_eq!(
            graph.convert(dec("48"), units.bottle, units.carton).unwrap(),
            dec("2")
        );
    }

    #[test]
    fn test_unknown_unit_has_no_conversion() {
        let (graph, units) = whisky();
        let kg = Uuid::new_v4();
        let err = graph.factor(units.bottle, kg).unwrap_err();
        assert!(matches!(err, DomainError::NoConversion { ref product, .. } if product == "Whisky"));
    }

    #[test]
    fn test_rejects_non_positive_amount() {
        let (mut graph, units) = whisky();
        assert!(graph.add(units.carton, units.shot, Decimal::ZERO).is_err());
        assert!(graph.add(units.carton, units.shot, dec("-1")).is_err());
    }

    #[test]
    fn test_rejects_inconsistent_cycle() {
        let (mut graph, units) = whisky();
        assert!(graph.add(units.carton, units.shot, dec("400")).is_err());
        // Agreeing with the implied factor is accepted and changes nothing
        assert!(graph.add(units.carton, units.shot, dec("480")).is_ok());
    }

    #[test]
    fn test_self_conversion_must_be_one() {
        let (mut graph, units) = whisky();
        assert!(graph.add(units.bottle, units.bottle, dec("2")).is_err());
        assert!(graph.add(units.bottle, units.bottle, Decimal::ONE).is_ok());
    }

    #[test]
    fn test_to_base_rounds_half_up() {
        let kg = Uuid::new_v4();
        let gram = Uuid::new_v4();
        let mut graph = ConversionGraph::new("Beef", gram);
        graph.add(kg, gram, dec("1000")).unwrap();
        // 0.0000125 kg = 0.0125 g -> 0.01
        assert_eq!(graph.to_base(dec("0.0000125"), kg).unwrap(), dec("0.01"));
        // 0.000015 kg = 0.015 g -> 0.02
        assert_eq!(graph.to_base(dec("0.000015"), kg).unwrap(), dec("0.02"));
    }

    #[test]
    fn test_default_sales_unit_falls_back_to_base() {
        let (mut graph, units) = whisky();
        assert_eq!(graph.default_sales_unit_id(), units.bottle);
        graph.set_default_sales_unit(units.shot);
        assert_eq!(graph.default_sales_unit_id(), units.shot);
    }

    #[test]
    fn test_reachable_units() {
        let (graph, units) = whisky();
        let reachable = graph.reachable_units();
        assert_eq!(reachable.len(), 3);
        assert!(reachable.contains(&units.carton));
        assert!(reachable.contains(&units.shot));
    }
}
