//! Venue stock split between the storage room and the bar

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LoyaltyError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryLocation {
    Storage,
    Bar,
}

impl InventoryLocation {
    pub fn as_str(self) -> &'static str {
        match self {
            InventoryLocation::Storage => "storage",
            InventoryLocation::Bar => "bar",
        }
    }
}

impl fmt::Display for InventoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InventoryLocation {
    type Err = LoyaltyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "storage" => Ok(InventoryLocation::Storage),
            "bar" => Ok(InventoryLocation::Bar),
            other => Err(LoyaltyError::validation(format!(
                "unknown inventory location: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    /// Delivery into storage
    Restock,
    /// Poured or sold at the bar
    Sold,
    /// Spilled, broken or expired at the bar
    Waste,
    /// Stock count correction, sets an absolute quantity
    Adjustment,
}

impl MovementType {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Restock => "restock",
            MovementType::Sold => "sold",
            MovementType::Waste => "waste",
            MovementType::Adjustment => "adjustment",
        }
    }
}

impl FromStr for MovementType {
    type Err = LoyaltyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "restock" => Ok(MovementType::Restock),
            "sold" => Ok(MovementType::Sold),
            "waste" => Ok(MovementType::Waste),
            "adjustment" => Ok(MovementType::Adjustment),
            other => Err(LoyaltyError::validation(format!(
                "unknown movement type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: Uuid,
    pub venue_id: Uuid,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub storage_quantity: i64,
    pub bar_quantity: i64,
    pub min_stock_level: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryTransfer {
    pub id: Uuid,
    pub item_id: Uuid,
    pub from_location: InventoryLocation,
    pub to_location: InventoryLocation,
    pub quantity: i64,
    pub employee_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub item_id: Uuid,
    pub movement_type: MovementType,
    pub location: InventoryLocation,
    /// Signed change applied to the location
    pub quantity_change: i64,
    pub quantity_after: i64,
    pub employee_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LowStockItem {
    pub item: InventoryItem,
    pub total_quantity: i64,
    pub shortfall: i64,
}

impl InventoryItem {
    pub fn quantity_at(&self, location: InventoryLocation) -> i64 {
        match location {
            InventoryLocation::Storage => self.storage_quantity,
            InventoryLocation::Bar => self.bar_quantity,
        }
    }

    fn set_quantity(&mut self, location: InventoryLocation, quantity: i64) {
        match location {
            InventoryLocation::Storage => self.storage_quantity = quantity,
            InventoryLocation::Bar => self.bar_quantity = quantity,
        }
    }

    pub fn total_quantity(&self) -> i64 {
        self.storage_quantity + self.bar_quantity
    }

    pub fn is_low_stock(&self) -> bool {
        self.total_quantity() < self.min_stock_level
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(LoyaltyError::validation("item name is required"));
        }
        if self.storage_quantity < 0 || self.bar_quantity < 0 {
            return Err(LoyaltyError::validation("quantities must not be negative"));
        }
        if self.min_stock_level < 0 {
            return Err(LoyaltyError::validation("min_stock_level must not be negative"));
        }
        Ok(())
    }

    /// Move `quantity` units between locations, leaving `self` untouched on error
    pub fn transfer(
        &mut self,
        from: InventoryLocation,
        to: InventoryLocation,
        quantity: i64,
    ) -> Result<()> {
        if quantity <= 0 {
            return Err(LoyaltyError::validation("transfer quantity must be positive"));
        }
        if from == to {
            return Err(LoyaltyError::validation(
                "source and destination must differ",
            ));
        }
        let available = self.quantity_at(from);
        if available < quantity {
            return Err(LoyaltyError::validation(format!(
                "only {} {} of {} in {}, cannot move {}",
                available, self.unit, self.name, from, quantity
            )));
        }
        self.set_quantity(from, available - quantity);
        self.set_quantity(to, self.quantity_at(to) + quantity);
        Ok(())
    }

    /// Apply a stock movement and return `(location, signed change, new quantity)`
    pub fn apply_movement(
        &mut self,
        movement: MovementType,
        location: Option<InventoryLocation>,
        quantity: i64,
    ) -> Result<(InventoryLocation, i64, i64)> {
        let location = match movement {
            MovementType::Restock => location.unwrap_or(InventoryLocation::Storage),
            MovementType::Sold | MovementType::Waste => location.unwrap_or(InventoryLocation::Bar),
            MovementType::Adjustment => location.ok_or_else(|| {
                LoyaltyError::validation("adjustment needs a location")
            })?,
        };
        let current = self.quantity_at(location);

        let updated = match movement {
            MovementType::Adjustment => {
                if quantity < 0 {
                    return Err(LoyaltyError::validation(
                        "adjusted quantity must not be negative",
                    ));
                }
                quantity
            }
            _ if quantity <= 0 => {
                return Err(LoyaltyError::validation("movement quantity must be positive"));
            }
            MovementType::Restock => current + quantity,
            MovementType::Sold | MovementType::Waste => {
                if current < quantity {
                    return Err(LoyaltyError::validation(format!(
                        "only {} {} of {} at the {}",
                        current, self.unit, self.name, location
                    )));
                }
                current - quantity
            }
        };

        self.set_quantity(location, updated);
        Ok((location, updated - current, updated))
    }
}

pub fn low_stock(items: Vec<InventoryItem>) -> Vec<LowStockItem> {
    let mut low: Vec<LowStockItem> = items
        .into_iter()
        .filter(InventoryItem::is_low_stock)
        .map(|item| {
            let total_quantity = item.total_quantity();
            LowStockItem {
                shortfall: item.min_stock_level - total_quantity,
                total_quantity,
                item,
            }
        })
        .collect();
    low.sort_by(|a, b| b.shortfall.cmp(&a.shortfall).then(a.item.name.cmp(&b.item.name)));
    low
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(storage: i64, bar: i64, min: i64) -> InventoryItem {
        InventoryItem {
            id: Uuid::new_v4(),
            venue_id: Uuid::new_v4(),
            name: "Gin".to_string(),
            category: "spirits".to_string(),
            unit: "bottles".to_string(),
            storage_quantity: storage,
            bar_quantity: bar,
            min_stock_level: min,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_transfer_storage_to_bar() {
        let mut gin = item(10, 2, 5);
        gin.transfer(InventoryLocation::Storage, InventoryLocation::Bar, 4)
            .unwrap();
        assert_eq!(gin.storage_quantity, 6);
        assert_eq!(gin.bar_quantity, 6);
    }

    #[test]
    fn test_transfer_rejects_overdraw() {
        let mut gin = item(3, 0, 0);
        let err = gin
            .transfer(InventoryLocation::Storage, InventoryLocation::Bar, 4)
            .unwrap_err();
        assert!(matches!(err, LoyaltyError::Validation(_)));
        assert_eq!(gin.storage_quantity, 3);
        assert_eq!(gin.bar_quantity, 0);
    }

    #[test]
    fn test_transfer_rejects_bad_input() {
        let mut gin = item(3, 3, 0);
        assert!(gin
            .transfer(InventoryLocation::Bar, InventoryLocation::Bar, 1)
            .is_err());
        assert!(gin
            .transfer(InventoryLocation::Bar, InventoryLocation::Storage, 0)
            .is_err());
    }

    #[test]
    fn test_movements() {
        let mut gin = item(0, 5, 0);
        assert_eq!(
            gin.apply_movement(MovementType::Restock, None, 12).unwrap(),
            (InventoryLocation::Storage, 12, 12)
        );
        assert_eq!(
            gin.apply_movement(MovementType::Sold, None, 2).unwrap(),
            (InventoryLocation::Bar, -2, 3)
        );
        assert!(gin.apply_movement(MovementType::Waste, None, 4).is_err());
        assert_eq!(
            gin.apply_movement(MovementType::Adjustment, Some(InventoryLocation::Bar), 7)
                .unwrap(),
            (InventoryLocation::Bar, 4, 7)
        );
        assert!(gin.apply_movement(MovementType::Adjustment, None, 1).is_err());
    }

    #[test]
    fn test_low_stock_sorted_by_shortfall() {
        let mut a = item(1, 1, 5);
        a.name = "Rum".to_string();
        let b = item(0, 0, 10);
        let fine = item(10, 0, 10);
        let low = low_stock(vec![a, b, fine]);
        assert_eq!(low.len(), 2);
        assert_eq!(low[0].shortfall, 10);
        assert_eq!(low[1].item.name, "Rum");
        assert_eq!(low[1].total_quantity, 2);
    }
}
