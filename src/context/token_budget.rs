//! Token budget arithmetic for context selection

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token budget errors
#[derive(Debug, Error, PartialEq)]
pub enum BudgetError {
    #[error("Budget exceeded: {used} tokens used, {max} tokens allowed")]
    BudgetExceeded { used: usize, max: usize },

    #[error("Configuration invalid: budget must be greater than zero")]
    ConfigurationInvalid,
}

/// Maximum token count a selected context may occupy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    max_total: usize,
}

impl TokenBudget {
    /// Create a new token budget
    pub fn new(max_total: usize) -> Result<Self, BudgetError> {
        if max_total == 0 {
            return Err(BudgetError::ConfigurationInvalid);
        }
        Ok(Self { max_total })
    }

    /// Check if a given token count fits within the budget
    pub fn check_budget(&self, tokens: usize) -> Result<(), BudgetError> {
        if tokens > self.max_total {
            return Err(BudgetError::BudgetExceeded {
                used: tokens,
                max: self.max_total,
            });
        }
        Ok(())
    }

    pub fn fits(&self, tokens: usize) -> bool {
        tokens <= self.max_total
    }

    /// Tokens that must be removed to fit
    pub fn calculate_shrinkage(&self, current_total: usize) -> usize {
        current_total.saturating_sub(self.max_total)
    }

    pub fn max_total(&self) -> usize {
        self.max_total
    }
}
