//! Task-creation validation
//!
//! Required price parameters depend on (kind, strategy); a missing field
//! surfaces synchronously with its name and is never retried.

use crate::domain::{Task, TaskKind, TaskStrategy};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

fn require(present: bool, field: &'static str) -> Result<(), ValidationError> {
    if present {
        Ok(())
    } else {
        Err(ValidationError::MissingField(field))
    }
}

fn require_price(value: Option<f64>, field: &'static str) -> Result<(), ValidationError> {
    let Some(value) = value else {
        return Err(ValidationError::MissingField(field));
    };
    if value <= 0.0 || value >= 1.0 {
        return Err(ValidationError::InvalidField {
            field,
            reason: format!("price must be in (0, 1), got {}", value),
        });
    }
    Ok(())
}

/// Validate a task before it enters the queue.
pub fn validate_task(task: &Task) -> Result<(), ValidationError> {
    if task.quantity <= 0.0 {
        return Err(ValidationError::InvalidField {
            field: "quantity",
            reason: format!("must be positive, got {}", task.quantity),
        });
    }

    let p = &task.params;
    match (task.kind, task.strategy) {
        (TaskKind::Buy, TaskStrategy::Taker) => {
            require_price(p.predict_ask_price, "predictAskPrice")?;
            require_price(p.polymarket_max_ask, "polymarketMaxAsk")?;
            require(p.max_total_cost.is_some(), "maxTotalCost")?;
        }
        (TaskKind::Buy, TaskStrategy::Maker) => {
            require_price(p.predict_price, "predictPrice")?;
            require_price(p.polymarket_max_ask, "polymarketMaxAsk")?;
            require(p.min_profit_buffer.is_some(), "minProfitBuffer")?;
        }
        (TaskKind::Sell, TaskStrategy::Taker) => {
            require_price(p.predict_price, "predictPrice")?;
            require_price(p.polymarket_min_bid, "polymarketMinBid")?;
            require(p.entry_cost.is_some(), "entryCost")?;
        }
        (TaskKind::Sell, TaskStrategy::Maker) => {
            require_price(p.predict_ask_price, "predictAskPrice")?;
            require_price(p.polymarket_min_bid, "polymarketMinBid")?;
            require(p.entry_cost.is_some(), "entryCost")?;
        }
    }

    Ok(())
}
