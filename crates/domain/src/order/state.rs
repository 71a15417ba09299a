//! Order status state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Created ──┬──► Paid
///           └──► Cancelled
/// ```
///
/// `Processing` is a reserved value: it can be stored and parsed, but no
/// operation moves an order into or out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Created,

    Paid,

    /// Terminal.
    Cancelled,

    Processing,
}

impl OrderStatus {
    pub fn can_be_paid(&self) -> bool {
        matches!(self, OrderStatus::Created)
    }

    pub fn can_be_cancelled(&self) -> bool {
        matches!(self, OrderStatus::Created)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled)
    }

    /// Returns true if an order in this status may move to `target`.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        match target {
            OrderStatus::Paid => self.can_be_paid(),
            OrderStatus::Cancelled => self.can_be_cancelled(),
            OrderStatus::Created | OrderStatus::Processing => false,
        }
    }

    /// Returns the wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Processing => "processing",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "created" => Ok(OrderStatus::Created),
            "paid" => Ok(OrderStatus::Paid),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "processing" => Ok(OrderStatus::Processing),
            _ => Err(ValidationError::InvalidStatus(value.to_owned())),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
