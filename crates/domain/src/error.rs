//! Domain error types.

use common::AggregateId;
use event_store::EventStoreError;
use persistence::{PersistenceError, Transient};
use thiserror::Error;

use crate::order::OrderStatus;

/// A value or aggregate could not be constructed because an invariant was
/// violated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Amount cannot be negative: {0}")]
    NegativeAmount(i64),

    #[error("Currency must be specified")]
    MissingCurrency,

    #[error("Currency code must be 3 letters (ISO 4217), got {0:?}")]
    InvalidCurrency(String),

    #[error("Cannot combine amounts in different currencies: {left} and {right}")]
    CurrencyMismatch { left: String, right: String },

    #[error("Subtraction result cannot be negative")]
    NegativeResult,

    #[error("Multiplier must be a finite non-negative number, got {0}")]
    InvalidMultiplier(f64),

    #[error("Amount is out of range")]
    AmountOutOfRange,

    #[error("Quantity must be at least 1, got {0}")]
    InvalidQuantity(u32),

    #[error("Product ID cannot be empty")]
    EmptyProductId,

    #[error("Order must contain at least one item")]
    NoItems,

    #[error("All order items must share one currency")]
    MixedCurrencies,

    #[error("Unknown order status: {0:?}")]
    InvalidStatus(String),
}

/// Coarse classification for adapters mapping errors onto their own codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Client,
    NotFound,
    Conflict,
    Internal,
}

/// Errors raised by order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Order {order_id} cannot change status from {current} to {target}")]
    InvalidStateTransition {
        order_id: AggregateId,
        current: OrderStatus,
        target: OrderStatus,
    },

    #[error("Order not found: {0}")]
    NotFound(AggregateId),

    /// Stored events do not form a valid order history.
    #[error("Invalid order history: {0}")]
    InvalidHistory(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// The event could not be handed to the outbox.
    #[error("Failed to publish event: {0}")]
    Publish(String),
}

impl OrderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            OrderError::Validation(_) => ErrorClass::Client,
            OrderError::NotFound(_) => ErrorClass::NotFound,
            OrderError::InvalidStateTransition { .. }
            | OrderError::EventStore(EventStoreError::DuplicateVersion { .. }) => {
                ErrorClass::Conflict
            }
            OrderError::InvalidHistory(_)
            | OrderError::Persistence(_)
            | OrderError::EventStore(_)
            | OrderError::Publish(_) => ErrorClass::Internal,
        }
    }
}

impl Transient for OrderError {
    fn is_transient(&self) -> bool {
        match self {
            OrderError::Persistence(err) => err.is_transient(),
            OrderError::EventStore(err) => err.is_transient(),
            _ => false,
        }
    }
}
