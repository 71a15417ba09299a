//! Value objects for the order domain.

use std::str::FromStr;

use common::AggregateId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::money::Money;

/// Orders are keyed by the shared aggregate identifier.
pub type OrderId = AggregateId;

/// Unique identifier for a customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(Uuid);

impl CustomerId {
    /// Creates a new random customer ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a customer ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CustomerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CustomerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for CustomerId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<CustomerId> for Uuid {
    fn from(id: CustomerId) -> Self {
        id.0
    }
}

/// Product identifier (SKU). Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductId(String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyProductId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ProductId {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<&str> for ProductId {
    type Error = ValidationError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ProductId> for String {
    fn from(id: ProductId) -> Self {
        id.0
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A line of an order: a product, how many, and the unit price.
///
/// Serialized as `{"product_id", "quantity", "price": {"amount", "currency"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "OrderItemRepr")]
pub struct OrderItem {
    product_id: ProductId,
    quantity: u32,
    price: Money,
}

#[derive(Deserialize)]
struct OrderItemRepr {
    product_id: ProductId,
    quantity: u32,
    price: Money,
}

impl TryFrom<OrderItemRepr> for OrderItem {
    type Error = ValidationError;

    fn try_from(repr: OrderItemRepr) -> Result<Self, Self::Error> {
        OrderItem::new(repr.product_id, repr.quantity, repr.price)
    }
}

impl OrderItem {
    /// Creates an item, rejecting a quantity below 1.
    pub fn new(product_id: ProductId, quantity: u32, price: Money) -> Result<Self, ValidationError> {
        if quantity < 1 {
            return Err(ValidationError::InvalidQuantity(quantity));
        }
        Ok(Self {
            product_id,
            quantity,
            price,
        })
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Unit price.
    pub fn price(&self) -> Money {
        self.price
    }

    /// Unit price times quantity.
    pub fn subtotal(&self) -> Result<Money, ValidationError> {
        let amount = self
            .price
            .amount()
            .checked_mul(i64::from(self.quantity))
            .ok_or(ValidationError::AmountOutOfRange)?;
        Money::with_currency(amount, self.price.currency_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(cents: i64) -> Money {
        Money::new(cents, "USD").unwrap()
    }

    #[test]
    fn test_customer_id_new_creates_unique_ids() {
        assert_ne!(CustomerId::new(), CustomerId::new());
    }

    #[test]
    fn test_customer_id_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = CustomerId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
        assert_eq!(id.to_string().parse::<CustomerId>().unwrap(), id);
    }

    #[test]
    fn test_product_id_rejects_empty() {
        assert_eq!(ProductId::new("SKU-001").unwrap().as_str(), "SKU-001");
        assert_eq!(ProductId::new("  "), Err(ValidationError::EmptyProductId));
    }

    #[test]
    fn test_order_item_rejects_zero_quantity() {
        let result = OrderItem::new(ProductId::new("SKU-001").unwrap(), 0, usd(100));
        assert_eq!(result, Err(ValidationError::InvalidQuantity(0)));
    }

    #[test]
    fn test_order_item_subtotal() {
        let item = OrderItem::new(ProductId::new("SKU-001").unwrap(), 3, usd(1000)).unwrap();
        assert_eq!(item.subtotal().unwrap(), usd(3000));
    }

    #[test]
    fn test_order_item_snapshot_layout() {
        let item = OrderItem::new(ProductId::new("SKU-001").unwrap(), 2, usd(999)).unwrap();
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "product_id": "SKU-001",
                "quantity": 2,
                "price": {"amount": 999, "currency": "USD"}
            })
        );

        let back: OrderItem = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_order_item_snapshot_is_validated() {
        let json = serde_json::json!({
            "product_id": "SKU-001",
            "quantity": 0,
            "price": {"amount": 999, "currency": "USD"}
        });
        assert!(serde_json::from_value::<OrderItem>(json).is_err());
    }
}
