//! Unit conversion and pricing tests
//!
//! Covers the per-product conversion graph:
//! - multi-hop conversions through the base unit
//! - reciprocity of every reachable pair of units
//! - rejection of inconsistent cycles
//! - pricing in non-base units

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{ConversionGraph, DomainError, Product, ProductConversion};
use std::str::FromStr;
use uuid::Uuid;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

struct Units {
    bottle: Uuid,
    carton: Uuid,
    shot: Uuid,
}

fn drinks_graph() -> (ConversionGraph, Units) {
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

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_carton_to_shot_goes_through_bottle() {
        let (graph, units) = drinks_graph();
        let shots = graph.convert(dec("1"), units.carton, units.shot).unwrap();
        assert_eq!(shots.normalize(), dec("480"));
    }

    #[test]
    fn test_to_base_is_quantized() {
        let (graph, units) = drinks_graph();
        assert_eq!(graph.to_base(dec("3"), units.shot).unwrap(), dec("0.15"));
        assert_eq!(graph.to_base(dec("2"), units.carton).unwrap(), dec("48"));
    }

    #[test]
    fn test_unrelated_unit_has_no_conversion() {
        let (graph, units) = drinks_graph();
        let crate_unit = Uuid::new_v4();
        let err = graph.factor(crate_unit, units.bottle).unwrap_err();
        assert!(matches!(err, DomainError::NoConversion { .. }));
    }

    #[test]
    fn test_inconsistent_cycle_is_rejected() {
        let (mut graph, units) = drinks_graph();
        // carton -> shot is already implied as 480
        let err = graph.add(units.carton, units.shot, dec("400")).unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));
        assert!(graph.add(units.carton, units.shot, dec("480")).is_ok());
    }

    #[test]
    fn test_self_conversion_must_be_one() {
        let (mut graph, units) = drinks_graph();
        assert!(graph.add(units.bottle, units.bottle, dec("1")).is_ok());
        assert!(graph.add(units.bottle, units.bottle, dec("2")).is_err());
    }

    #[test]
    fn test_graph_from_stored_rows_keeps_default_sales_unit() {
        let bottle = Uuid::new_v4();
        let glass = Uuid::new_v4();
        let product_id = Uuid::new_v4();
        let rows = vec![ProductConversion {
            id: Uuid::new_v4(),
            product_id,
            from_unit_id: glass,
            to_unit_id: bottle,
            amount_per: dec("0.2"),
            is_default_sales_unit: true,
            created_at: chrono::Utc::now(),
        }];

        let graph = ConversionGraph::from_conversions("Wine", bottle, &rows).unwrap();
        assert_eq!(graph.default_sales_unit_id(), glass);
        assert_eq!(graph.to_base(dec("5"), glass).unwrap(), dec("1"));
    }

    #[test]
    fn test_default_sales_unit_falls_back_to_base() {
        let (graph, units) = drinks_graph();
        assert_eq!(graph.default_sales_unit_id(), units.bottle);
    }

    #[test]
    fn test_price_in_carton() {
        let (graph, units) = drinks_graph();
        let product = Product {
            id: Uuid::new_v4(),
            name: "Coca".to_string(),
            category: "soft drinks".to_string(),
            base_unit_id: units.bottle,
            base_unit_price: dec("10"),
            is_active: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        assert_eq!(product.price(dec("2"), units.carton, &graph).unwrap(), dec("480"));
        assert_eq!(product.price(dec("4"), units.shot, &graph).unwrap(), dec("2"));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Factors between 1 and 1000 with up to two decimals
    fn factor_strategy() -> impl Strategy<Value = Decimal> {
        (100u32..100_000u32).prop_map(|n| Decimal::new(i64::from(n), 2))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// factor(X, Y) × factor(Y, X) stays within rounding of 1 for every
        /// reachable pair
        #[test]
        fn prop_factors_are_reciprocal(
            factors in prop::collection::vec(factor_strategy(), 1..5)
        ) {
            let base = Uuid::new_v4();
            let mut graph = ConversionGraph::new("Product", base);
            let mut previous = base;
            for factor in &factors {
                let unit = Uuid::new_v4();
                graph.add(unit, previous, *factor).unwrap();
                previous = unit;
            }

            let units = graph.reachable_units();
            prop_assert_eq!(units.len(), factors.len() + 1);
            for x in &units {
                for y in &units {
                    let there = graph.factor(*x, *y).unwrap();
                    let back = graph.factor(*y, *x).unwrap();
                    let product = there * back;
                    prop_assert!((product - Decimal::ONE).abs() < dec("0.000001"));
                }
            }
        }

        /// Converting there and back returns the original quantity
        #[test]
        fn prop_round_trip_conversion(
            factor in factor_strategy(),
            qty in 1u32..10_000u32
        ) {
            let base = Uuid::new_v4();
            let pack = Uuid::new_v4();
            let mut graph = ConversionGraph::new("Product", base);
            graph.add(pack, base, factor).unwrap();

            let qty = Decimal::from(qty);
            let in_base = graph.convert(qty, pack, base).unwrap();
            let back = graph.convert(in_base, base, pack).unwrap();
            prop_assert!((back - qty).abs() < dec("0.0001"));
        }
    }
}
