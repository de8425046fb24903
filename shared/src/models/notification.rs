//! Station notification payloads

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::{ItemKind, NewOrderItem};
use super::user::Role;

/// A preparation station that accepts or rejects items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Station {
    Food,
    Beverage,
}

impl Station {
    pub fn as_str(&self) -> &'static str {
        match self {
            Station::Food => "food",
            Station::Beverage => "beverage",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "food" => Some(Station::Food),
            "beverage" => Some(Station::Beverage),
            _ => None,
        }
    }

    /// The item kind routed to this station
    pub fn item_kind(&self) -> ItemKind {
        match self {
            Station::Food => ItemKind::Food,
            Station::Beverage => ItemKind::Beverage,
        }
    }

    /// The role that operates this station
    pub fn operator(&self) -> Role {
        match self {
            Station::Food => Role::Meat,
            Station::Beverage => Role::Bartender,
        }
    }
}

impl From<ItemKind> for Station {
    fn from(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Food => Station::Food,
            ItemKind::Beverage => Station::Beverage,
        }
    }
}

impl Role {
    /// The station a role operates, if any
    pub fn station(&self) -> Option<Station> {
        match self {
            Role::Meat => Some(Station::Food),
            Role::Bartender => Some(Station::Beverage),
            _ => None,
        }
    }
}

/// A fan-out topic: one station of one branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StationTopic {
    pub branch_id: Uuid,
    pub station: Station,
}

impl StationTopic {
    pub fn new(branch_id: Uuid, station: Station) -> Self {
        Self { branch_id, station }
    }
}

impl std::fmt::Display for StationTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.branch_id, self.station.as_str())
    }
}

/// Message pushed to a station when items arrive for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNotification {
    pub order_number: String,
    pub table_number: i32,
    pub item_count: usize,
}

impl OrderNotification {
    pub fn message(&self) -> String {
        format!(
            "Order #{} (Table {}) with {} item(s)",
            self.order_number, self.table_number, self.item_count
        )
    }
}

/// One notification per station that received at least one of `items`
pub fn station_notifications(
    order_number: &str,
    table_number: i32,
    items: &[NewOrderItem],
) -> Vec<(Station, OrderNotification)> {
    [Station::Food, Station::Beverage]
        .into_iter()
        .filter_map(|station| {
            let item_count = items
                .iter()
                .filter(|item| item.kind == station.item_kind())
                .count();
            (item_count > 0).then(|| {
                (
                    station,
                    OrderNotification {
                        order_number: order_number.to_string(),
                        table_number,
                        item_count,
                    },
                )
            })
        })
        .collect()
}
