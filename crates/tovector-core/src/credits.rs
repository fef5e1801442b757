//! Credit ledger types for tovector.
//!
//! A user's entitlement is a paid `credit_balance` plus a small count of free
//! previews. Every change to either is recorded as a [`CreditLog`] entry.
//! The decision of *what* a consuming action costs lives in [`plan_charge`]
//! so that every store backend applies the same policy inside its own
//! atomic section.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TovectorError};
use crate::{CreditLogId, UserId};

/// Credit balance and free-preview allowance of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredits {
    /// The user ID (Supabase Auth subject).
    pub user_id: UserId,

    /// Paid credits available. Never negative.
    pub credit_balance: i64,

    /// Free previews left. Never negative.
    pub free_previews: i32,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl UserCredits {
    /// Create a new account with zero balance and `free_previews` previews.
    #[must_use]
    pub fn new(user_id: UserId, free_previews: i32) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            credit_balance: 0,
            free_previews: free_previews.max(0),
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account has sufficient credits for a deduction.
    #[must_use]
    pub fn has_sufficient_credits(&self, amount: i64) -> bool {
        self.credit_balance >= amount
    }

    /// Apply a planned charge. The charge must come from [`plan_charge`] on
    /// this same account state.
    pub fn apply_charge(&mut self, charge: Charge) {
        match charge {
            Charge::FreePreview => self.free_previews -= 1,
            Charge::Credits(amount) => self.credit_balance -= amount,
        }
        self.updated_at = Utc::now();
    }

    /// Reverse a previously applied charge.
    pub fn reverse_charge(&mut self, charge: Charge) {
        match charge {
            Charge::FreePreview => self.free_previews += 1,
            Charge::Credits(amount) => self.credit_balance += amount,
        }
        self.updated_at = Utc::now();
    }

    /// Add purchased credits.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` if `amount` is not positive.
    pub fn add_credits(&mut self, amount: i64) -> Result<()> {
        if amount <= 0 {
            return Err(TovectorError::InvalidAmount(format!(
                "credit amount must be positive, got {amount}"
            )));
        }
        self.credit_balance = self.credit_balance.saturating_add(amount);
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Kind of ledger action recorded in a [`CreditLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Low-resolution preview vectorization.
    Preview,
    /// Full vectorization.
    Vectorize,
    /// Credits bought through checkout.
    Purchase,
    /// Reversal of a charge whose work failed.
    Refund,
}

impl ActionType {
    /// Stable lowercase name used in storage and JSON.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Vectorize => "vectorize",
            Self::Purchase => "purchase",
            Self::Refund => "refund",
        }
    }

    /// Whether this action consumes credits.
    #[must_use]
    pub const fn is_consuming(&self) -> bool {
        matches!(self, Self::Preview | Self::Vectorize)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = TovectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "preview" => Ok(Self::Preview),
            "vectorize" => Ok(Self::Vectorize),
            "purchase" => Ok(Self::Purchase),
            "refund" => Ok(Self::Refund),
            other => Err(TovectorError::UnknownAction(other.to_string())),
        }
    }
}

/// What a consuming action will cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "credits", rename_all = "snake_case")]
pub enum Charge {
    /// One free preview is used; the paid balance is untouched.
    FreePreview,
    /// Paid credits are deducted.
    Credits(i64),
}

impl Charge {
    /// Paid credits consumed by this charge.
    #[must_use]
    pub const fn credits(&self) -> i64 {
        match self {
            Self::FreePreview => 0,
            Self::Credits(amount) => *amount,
        }
    }

    /// Whether a free preview is consumed.
    #[must_use]
    pub const fn is_free_preview(&self) -> bool {
        matches!(self, Self::FreePreview)
    }
}

/// Decide how a consuming action is paid for.
///
/// Previews use a free preview while any remain, bypassing the balance
/// check. Everything else requires `credit_balance >= amount`.
///
/// # Errors
///
/// - `InvalidAmount` for a negative amount or a non-consuming action.
/// - `InsufficientCredits` when the balance does not cover `amount`.
pub fn plan_charge(account: &UserCredits, amount: i64, action: ActionType) -> Result<Charge> {
    if amount < 0 {
        return Err(TovectorError::InvalidAmount(format!(
            "deduction must not be negative, got {amount}"
        )));
    }
    if !action.is_consuming() {
        return Err(TovectorError::InvalidAmount(format!(
            "{action} does not consume credits"
        )));
    }

    if action == ActionType::Preview && account.free_previews > 0 {
        return Ok(Charge::FreePreview);
    }

    if !account.has_sufficient_credits(amount) {
        return Err(TovectorError::InsufficientCredits {
            balance: account.credit_balance,
            required: amount,
        });
    }

    Ok(Charge::Credits(amount))
}

/// An append-only audit record of one balance mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLog {
    /// Unique id (ULID for time-ordering).
    pub id: CreditLogId,

    /// The user whose balance changed.
    pub user_id: UserId,

    /// What caused the change.
    pub action_type: ActionType,

    /// Paid credits consumed (zero for free previews and additions).
    pub credits_used: i64,

    /// Credits added (purchases and refunds).
    pub credits_added: i64,

    /// Whether a free preview was consumed or restored.
    pub free_preview: bool,

    /// Balance after this entry.
    pub balance_after: i64,

    /// Human-readable description.
    pub description: String,

    /// External reference (Stripe checkout session id) for idempotent credits.
    pub reference: Option<String>,

    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

impl CreditLog {
    /// Entry for a consuming action, given the account state after the charge.
    #[must_use]
    pub fn usage(
        account_after: &UserCredits,
        action: ActionType,
        charge: Charge,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: CreditLogId::generate(),
            user_id: account_after.user_id,
            action_type: action,
            credits_used: charge.credits(),
            credits_added: 0,
            free_preview: charge.is_free_preview(),
            balance_after: account_after.credit_balance,
            description: description.into(),
            reference: None,
            created_at: Utc::now(),
        }
    }

    /// Entry for credits added to an account.
    #[must_use]
    pub fn credit(
        account_after: &UserCredits,
        action: ActionType,
        amount: i64,
        description: impl Into<String>,
        reference: Option<String>,
    ) -> Self {
        Self {
            id: CreditLogId::generate(),
            user_id: account_after.user_id,
            action_type: action,
            credits_used: 0,
            credits_added: amount,
            free_preview: false,
            balance_after: account_after.credit_balance,
            description: description.into(),
            reference,
            created_at: Utc::now(),
        }
    }

    /// Entry for the reversal of `charge`.
    #[must_use]
    pub fn refund(account_after: &UserCredits, charge: Charge, description: impl Into<String>) -> Self {
        Self {
            id: CreditLogId::generate(),
            user_id: account_after.user_id,
            action_type: ActionType::Refund,
            credits_used: 0,
            credits_added: charge.credits(),
            free_preview: charge.is_free_preview(),
            balance_after: account_after.credit_balance,
            description: description.into(),
            reference: None,
            created_at: Utc::now(),
        }
    }
}

/// Outcome of a successful deduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deduction {
    /// How the action was paid for.
    pub charge: Charge,
    /// The consuming action.
    pub action: ActionType,
    /// Account state after the deduction.
    pub account: UserCredits,
    /// The log entry written with the deduction.
    pub log: CreditLog,
}

impl Deduction {
    /// Paid balance after the deduction.
    #[must_use]
    pub fn balance_after(&self) -> i64 {
        self.account.credit_balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(balance: i64, free_previews: i32) -> UserCredits {
        let mut account = UserCredits::new(UserId::generate(), free_previews);
        account.credit_balance = balance;
        account
    }

    #[test]
    fn new_account_gets_free_previews_and_no_balance() {
        let account = UserCredits::new(UserId::generate(), 1);
        assert_eq!(account.credit_balance, 0);
        assert_eq!(account.free_previews, 1);
    }

    #[test]
    fn preview_uses_free_preview_before_balance() {
        let mut acct = account(10, 1);
        let charge = plan_charge(&acct, 1, ActionType::Preview).unwrap();
        assert_eq!(charge, Charge::FreePreview);

        acct.apply_charge(charge);
        assert_eq!(acct.credit_balance, 10);
        assert_eq!(acct.free_previews, 0);
    }

    #[test]
    fn free_preview_bypasses_empty_balance() {
        let acct = account(0, 2);
        assert_eq!(
            plan_charge(&acct, 1, ActionType::Preview).unwrap(),
            Charge::FreePreview
        );
    }

    #[test]
    fn vectorize_never_uses_free_previews() {
        let acct = account(0, 3);
        let err = plan_charge(&acct, 5, ActionType::Vectorize).unwrap_err();
        assert_eq!(
            err,
            TovectorError::InsufficientCredits {
                balance: 0,
                required: 5
            }
        );
    }

    #[test]
    fn deduct_six_from_ten_then_fail() {
        let mut acct = account(10, 0);

        let charge = plan_charge(&acct, 6, ActionType::Vectorize).unwrap();
        acct.apply_charge(charge);
        let log = CreditLog::usage(&acct, ActionType::Vectorize, charge, "Vectorization");
        assert_eq!(acct.credit_balance, 4);
        assert_eq!(log.credits_used, 6);
        assert_eq!(log.balance_after, 4);

        let err = plan_charge(&acct, 6, ActionType::Vectorize).unwrap_err();
        assert!(matches!(err, TovectorError::InsufficientCredits { balance: 4, required: 6 }));
        assert_eq!(acct.credit_balance, 4);
    }

    #[test]
    fn exact_balance_is_sufficient() {
        let acct = account(5, 0);
        assert_eq!(
            plan_charge(&acct, 5, ActionType::Vectorize).unwrap(),
            Charge::Credits(5)
        );
    }

    #[test]
    fn negative_and_non_consuming_deductions_are_rejected() {
        let acct = account(10, 0);
        assert!(matches!(
            plan_charge(&acct, -1, ActionType::Vectorize),
            Err(TovectorError::InvalidAmount(_))
        ));
        assert!(matches!(
            plan_charge(&acct, 1, ActionType::Purchase),
            Err(TovectorError::InvalidAmount(_))
        ));
    }

    #[test]
    fn reverse_charge_restores_state() {
        let mut acct = account(7, 1);
        acct.apply_charge(Charge::FreePreview);
        acct.reverse_charge(Charge::FreePreview);
        acct.apply_charge(Charge::Credits(3));
        acct.reverse_charge(Charge::Credits(3));
        assert_eq!(acct.credit_balance, 7);
        assert_eq!(acct.free_previews, 1);
    }

    #[test]
    fn add_credits_rejects_non_positive() {
        let mut acct = account(0, 0);
        assert!(acct.add_credits(0).is_err());
        assert!(acct.add_credits(-3).is_err());
        acct.add_credits(25).unwrap();
        assert_eq!(acct.credit_balance, 25);
    }

    #[test]
    fn action_type_round_trips_through_str() {
        for action in [
            ActionType::Preview,
            ActionType::Vectorize,
            ActionType::Purchase,
            ActionType::Refund,
        ] {
            assert_eq!(action.as_str().parse::<ActionType>().unwrap(), action);
        }
        assert_eq!(
            "bonus".parse::<ActionType>(),
            Err(TovectorError::UnknownAction("bonus".into()))
        );
    }
}
