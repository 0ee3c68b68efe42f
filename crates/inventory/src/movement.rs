//! Stock movement rules.
//!
//! Every change to an item's shelf quantity caused by a usage record is planned
//! here first. A plan is only produced when the resulting stock is non-negative,
//! so an adapter that applies plans under an exclusive hold on the item can never
//! drive stock below zero.

use thiserror::Error;

/// Rule violation raised while planning a stock movement.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StockError {
    /// Usage quantities must be strictly positive.
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    /// The item does not have enough units on the shelf.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },
}

/// The planned effect of one ledger operation on an item's stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockMovement {
    pub stock_before: i64,
    pub stock_after: i64,
}

impl StockMovement {
    /// Signed change applied to the stock (negative when units are consumed).
    pub fn stock_delta(&self) -> i64 {
        self.stock_after - self.stock_before
    }

    pub fn is_noop(&self) -> bool {
        self.stock_before == self.stock_after
    }
}

fn ensure_positive(quantity: i64) -> Result<(), StockError> {
    if quantity <= 0 {
        return Err(StockError::InvalidQuantity(quantity));
    }
    Ok(())
}

fn take(stock: i64, requested: i64) -> Result<StockMovement, StockError> {
    if requested > stock {
        return Err(StockError::InsufficientStock {
            requested,
            available: stock,
        });
    }
    Ok(StockMovement {
        stock_before: stock,
        stock_after: stock - requested,
    })
}

fn give_back(stock: i64, returned: i64) -> Result<StockMovement, StockError> {
    let stock_after = stock
        .checked_add(returned)
        .ok_or(StockError::InvalidQuantity(returned))?;
    Ok(StockMovement {
        stock_before: stock,
        stock_after,
    })
}

/// Plan a new claim of `quantity` units against an item holding `stock`.
pub fn plan_allocation(stock: i64, quantity: i64) -> Result<StockMovement, StockError> {
    ensure_positive(quantity)?;
    take(stock, quantity)
}

/// Plan changing an existing claim from `old_quantity` to `new_quantity`.
///
/// Growing the claim needs headroom for the difference only; shrinking it
/// always succeeds and credits the difference back.
pub fn plan_resize(
    stock: i64,
    old_quantity: i64,
    new_quantity: i64,
) -> Result<StockMovement, StockError> {
    ensure_positive(new_quantity)?;
    let delta = new_quantity - old_quantity;
    if delta > 0 {
        take(stock, delta)
    } else {
        give_back(stock, -delta)
    }
}

/// Plan dropping a claim of `quantity` units, crediting them back to the item.
pub fn plan_release(stock: i64, quantity: i64) -> Result<StockMovement, StockError> {
    ensure_positive(quantity)?;
    give_back(stock, quantity)
}
