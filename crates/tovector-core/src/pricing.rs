//! Pricing configuration.
//!
//! Credits are sold at a flat unit price and consumed per action.

use serde::{Deserialize, Serialize};

use crate::credits::ActionType;

/// Credits charged for a preview.
pub const PREVIEW_COST_CREDITS: i64 = 1;

/// Credits charged for a full vectorization.
pub const VECTORIZE_COST_CREDITS: i64 = 5;

/// Price of one credit in cents ($1).
pub const CREDIT_UNIT_PRICE_CENTS: i64 = 100;

/// Free previews granted to a new account.
pub const NEW_USER_FREE_PREVIEWS: i32 = 1;

/// Largest single purchase accepted at checkout.
pub const MAX_PURCHASE_CREDITS: i64 = 10_000;

/// Pricing configuration for the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Credits charged per preview.
    pub preview_cost: i64,
    /// Credits charged per vectorization.
    pub vectorize_cost: i64,
    /// Price of one credit in cents.
    pub credit_unit_price_cents: i64,
    /// Free previews granted on account creation.
    pub new_user_free_previews: i32,
    /// Minimum credits per purchase.
    pub min_purchase_credits: i64,
    /// Maximum credits per purchase.
    pub max_purchase_credits: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            preview_cost: PREVIEW_COST_CREDITS,
            vectorize_cost: VECTORIZE_COST_CREDITS,
            credit_unit_price_cents: CREDIT_UNIT_PRICE_CENTS,
            new_user_free_previews: NEW_USER_FREE_PREVIEWS,
            min_purchase_credits: 1,
            max_purchase_credits: MAX_PURCHASE_CREDITS,
        }
    }
}

impl PricingConfig {
    /// Credits charged for a consuming action. Non-consuming actions cost nothing.
    #[must_use]
    pub const fn cost_of(&self, action: ActionType) -> i64 {
        match action {
            ActionType::Preview => self.preview_cost,
            ActionType::Vectorize => self.vectorize_cost,
            ActionType::Purchase | ActionType::Refund => 0,
        }
    }

    /// Whether `credits` is an acceptable purchase quantity.
    #[must_use]
    pub const fn is_valid_purchase(&self, credits: i64) -> bool {
        credits >= self.min_purchase_credits && credits <= self.max_purchase_credits
    }

    /// Total checkout price for `credits` in cents.
    #[must_use]
    pub const fn purchase_total_cents(&self, credits: i64) -> i64 {
        credits.saturating_mul(self.credit_unit_price_cents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_costs() {
        let pricing = PricingConfig::default();
        assert_eq!(pricing.cost_of(ActionType::Preview), 1);
        assert_eq!(pricing.cost_of(ActionType::Vectorize), 5);
        assert_eq!(pricing.cost_of(ActionType::Purchase), 0);
    }

    #[test]
    fn purchase_bounds() {
        let pricing = PricingConfig::default();
        assert!(!pricing.is_valid_purchase(0));
        assert!(pricing.is_valid_purchase(1));
        assert!(pricing.is_valid_purchase(MAX_PURCHASE_CREDITS));
        assert!(!pricing.is_valid_purchase(MAX_PURCHASE_CREDITS + 1));
        assert_eq!(pricing.purchase_total_cents(25), 2500);
    }
}
