//! Store and bartender stock balances
//!
//! Balances are held in base units. `original_qty`/`original_unit_id` echo the
//! balance in the unit operators last used, and `initial_qty`/`initial_unit_id`
//! record the first receipt and are never rewritten.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::unit::{quantize, ConversionGraph};
use crate::error::{DomainError, DomainResult};

/// Main store stock for one product in one branch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Stock {
    pub id: Uuid,
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub qty_in_base_units: Decimal,
    pub min_threshold_base_units: Decimal,
    pub original_qty: Decimal,
    pub original_unit_id: Uuid,
    pub initial_qty: Decimal,
    pub initial_unit_id: Uuid,
    pub running_out: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stock already checked out from the store to one bartender
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct BartenderStock {
    pub id: Uuid,
    pub stock_id: Uuid,
    pub bartender_id: Uuid,
    pub qty_in_base_units: Decimal,
    pub original_qty: Decimal,
    pub original_unit_id: Uuid,
    pub min_threshold_base_units: Decimal,
    pub running_out: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Presentation of a balance as whole original units plus a base-unit remainder,
/// e.g. "8 carton + 3 bottle"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockDisplay {
    pub full_units: Decimal,
    pub original_unit: String,
    pub remainder: Decimal,
    pub base_unit: String,
}

/// A requested change to a balance
#[derive(Debug, Clone, Copy)]
pub struct Adjustment {
    pub qty: Decimal,
    pub unit_id: Uuid,
    pub is_addition: bool,
    pub original_qty_delta: Option<Decimal>,
}

impl Adjustment {
    pub fn add(qty: Decimal, unit_id: Uuid) -> Self {
        Self {
            qty,
            unit_id,
            is_addition: true,
            original_qty_delta: None,
        }
    }

    pub fn remove(qty: Decimal, unit_id: Uuid) -> Self {
        Self {
            qty,
            unit_id,
            is_addition: false,
            original_qty_delta: None,
        }
    }
}

/// Result of applying an adjustment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjustOutcome {
    /// Magnitude of the change in base units
    pub qty_in_base_units: Decimal,
    /// Set when `original_qty` had to be back-converted instead of moved by the
    /// supplied delta, or fell back to the base unit
    pub original_recomputed: bool,
}

/// The mutable part of a stock row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockLevel {
    pub qty_in_base_units: Decimal,
    pub min_threshold_base_units: Decimal,
    pub original_qty: Decimal,
    pub original_unit_id: Uuid,
}

impl StockLevel {
    /// An empty balance displayed in `original_unit_id`
    pub fn empty(original_unit_id: Uuid, min_threshold_base_units: Decimal) -> Self {
        Self {
            qty_in_base_units: Decimal::ZERO,
            min_threshold_base_units,
            original_qty: Decimal::ZERO,
            original_unit_id,
        }
    }

    /// Balance for a first receipt of `qty` in `unit`
    pub fn initial(
        graph: &ConversionGraph,
        qty: Decimal,
        unit: Uuid,
        min_threshold_base_units: Decimal,
    ) -> DomainResult<Self> {
        if qty < Decimal::ZERO {
            return Err(DomainError::validation(
                "initial_qty",
                "Initial quantity cannot be negative",
            ));
        }
        Ok(Self {
            qty_in_base_units: graph.to_base(qty, unit)?,
            min_threshold_base_units,
            original_qty: qty,
            original_unit_id: unit,
        })
    }

    pub fn running_out(&self) -> bool {
        self.qty_in_base_units <= self.min_threshold_base_units
    }

    /// Add or subtract a quantity. Nothing is mutated when the call fails.
    pub fn adjust(
        &mut self,
        graph: &ConversionGraph,
        adjustment: &Adjustment,
    ) -> DomainResult<AdjustOutcome> {
        if adjustment.qty <= Decimal::ZERO {
            return Err(DomainError::validation(
                "qty",
                "Quantity must be greater than zero",
            ));
        }

        let delta = graph.to_base(adjustment.qty, adjustment.unit_id)?;
        let new_balance = if adjustment.is_addition {
            self.qty_in_base_units + delta
        } else {
            if delta > self.qty_in_base_units {
                return Err(DomainError::InsufficientStock {
                    product: graph.product_name().to_string(),
                    requested: delta,
                    available: self.qty_in_base_units,
                });
            }
            self.qty_in_base_units - delta
        };

        let mut next = *self;
        next.qty_in_base_units = new_balance;

        let mut recomputed = false;
        match adjustment.original_qty_delta {
            Some(original_delta) => {
                next.original_qty = if adjustment.is_addition {
                    self.original_qty + original_delta
                } else {
                    self.original_qty - original_delta
                };
                if !next.original_is_consistent(graph) {
                    recomputed = true;
                    next.recompute_original(graph);
                }
            }
            None => {
                if adjustment.is_addition {
                    next.original_unit_id = adjustment.unit_id;
                }
                recomputed = !next.recompute_original(graph);
            }
        }

        *self = next;
        Ok(AdjustOutcome {
            qty_in_base_units: delta,
            original_recomputed: recomputed,
        })
    }

    /// Presentation tuple: whole original units and the base-unit remainder
    pub fn display(&self, graph: &ConversionGraph) -> StockDisplay {
        let base_unit = graph.unit_name(graph.base_unit_id());
        match graph.factor(self.original_unit_id, graph.base_unit_id()) {
            Ok(factor) if factor > Decimal::ZERO => {
                let full_units = (self.qty_in_base_units / factor).floor();
                StockDisplay {
                    full_units,
                    original_unit: graph.unit_name(self.original_unit_id),
                    remainder: quantize(self.qty_in_base_units - full_units * factor),
                    base_unit,
                }
            }
            _ => StockDisplay {
                full_units: self.qty_in_base_units,
                original_unit: base_unit.clone(),
                remainder: Decimal::ZERO,
                base_unit,
            },
        }
    }

    /// `original_qty` must describe the balance to within one base unit
    fn original_is_consistent(&self, graph: &ConversionGraph) -> bool {
        match graph.factor(self.original_unit_id, graph.base_unit_id()) {
            Ok(factor) => (self.original_qty * factor - self.qty_in_base_units).abs() <= Decimal::ONE,
            Err(_) => false,
        }
    }

    /// Back-convert `original_qty` from the balance. Returns false when the
    /// original unit had no conversion and the echo fell back to base units.
    fn recompute_original(&mut self, graph: &ConversionGraph) -> bool {
        match graph.factor(self.original_unit_id, graph.base_unit_id()) {
            Ok(factor) if factor > Decimal::ZERO => {
                self.original_qty = quantize(self.qty_in_base_units / factor);
                true
            }
            _ => {
                self.original_unit_id = graph.base_unit_id();
                self.original_qty = self.qty_in_base_units;
                false
            }
        }
    }
}

/// Move `qty` of `unit` from one balance to another. Either both balances
/// change or neither does.
pub fn transfer_between(
    from: &mut StockLevel,
    to: &mut StockLevel,
    graph: &ConversionGraph,
    qty: Decimal,
    unit: Uuid,
) -> DomainResult<Decimal> {
    let mut source = *from;
    let mut target = *to;
    let outcome = source.adjust(graph, &Adjustment::remove(qty, unit))?;
    target.adjust(graph, &Adjustment::add(qty, unit))?;
    *from = source;
    *to = target;
    Ok(outcome.qty_in_base_units)
}

impl Stock {
    pub fn level(&self) -> StockLevel {
        StockLevel {
            qty_in_base_units: self.qty_in_base_units,
            min_threshold_base_units: self.min_threshold_base_units,
            original_qty: self.original_qty,
            original_unit_id: self.original_unit_id,
        }
    }

    /// Write a level back. `initial_qty` and `initial_unit_id` are untouched.
    pub fn apply_level(&mut self, level: StockLevel) {
        self.qty_in_base_units = level.qty_in_base_units;
        self.min_threshold_base_units = level.min_threshold_base_units;
        self.original_qty = level.original_qty;
        self.original_unit_id = level.original_unit_id;
        self.running_out = level.running_out();
    }

    pub fn display(&self, graph: &ConversionGraph) -> StockDisplay {
        self.level().display(graph)
    }
}

impl BartenderStock {
    pub fn level(&self) -> StockLevel {
        StockLevel {
            qty_in_base_units: self.qty_in_base_units,
            min_threshold_base_units: self.min_threshold_base_units,
            original_qty: self.original_qty,
            original_unit_id: self.original_unit_id,
        }
    }

    pub fn apply_level(&mut self, level: StockLevel) {
        self.qty_in_base_units = level.qty_in_base_units;
        self.min_threshold_base_units = level.min_threshold_base_units;
        self.original_qty = level.original_qty;
        self.original_unit_id = level.original_unit_id;
        self.running_out = level.running_out();
    }

    pub fn display(&self, graph: &ConversionGraph) -> StockDisplay {
        self.level().display(graph)
    }
}
