//! Storage layer for tovector.
//!
//! This crate persists credit accounts, the credit log, and image metadata.
//!
//! # Backends
//!
//! - [`PgStore`]: PostgreSQL via sqlx. Ledger mutations run in a transaction
//!   that locks the account row, so the balance write and its log entry
//!   commit together and concurrent deductions for one user serialize.
//! - [`MemoryStore`]: in-process maps behind a single mutex, for tests and
//!   local development.
//!
//! # Example
//!
//! ```no_run
//! use tovector_core::{ActionType, UserId};
//! use tovector_store::{MemoryStore, Store};
//!
//! # async fn demo() -> tovector_store::Result<()> {
//! let store = MemoryStore::new();
//! let user_id = UserId::generate();
//!
//! store.add_credits(&user_id, 10, ActionType::Purchase, "Credit purchase", None).await?;
//! let deduction = store.deduct_credits(&user_id, 6, ActionType::Vectorize, "Vectorization").await?;
//! assert_eq!(deduction.balance_after(), 4);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use tovector_core::{ActionType, CreditLog, Deduction, ImageId, ImageRecord, UserCredits, UserId};

/// The storage trait defining all database operations.
#[async_trait]
pub trait Store: Send + Sync {
    /// Check that the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached.
    async fn ping(&self) -> Result<()>;

    // =========================================================================
    // Credit Accounts
    // =========================================================================

    /// Get a user's credit account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_credits(&self, user_id: &UserId) -> Result<Option<UserCredits>>;

    /// Get a user's credit account, creating it with the new-user grant if
    /// it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn ensure_credits(&self, user_id: &UserId) -> Result<UserCredits>;

    /// Charge a consuming action and append its log entry atomically.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::Rejected(InsufficientCredits)` if the balance is too low;
    ///   nothing is written.
    async fn deduct_credits(
        &self,
        user_id: &UserId,
        amount: i64,
        action: ActionType,
        description: &str,
    ) -> Result<Deduction>;

    /// Add credits and append a log entry atomically. Creates the account
    /// if needed. Returns the log entry, which carries the new balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::Rejected(InvalidAmount)` if `amount` is not positive.
    /// - `StoreError::DuplicateEvent` if `reference` was already credited.
    async fn add_credits(
        &self,
        user_id: &UserId,
        amount: i64,
        action: ActionType,
        description: &str,
        reference: Option<&str>,
    ) -> Result<CreditLog>;

    /// Reverse a deduction whose downstream work failed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account no longer exists.
    async fn refund(&self, deduction: &Deduction, description: &str) -> Result<CreditLog>;

    /// List credit log entries for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_credit_logs(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditLog>>;

    // =========================================================================
    // Images
    // =========================================================================

    /// Insert an image metadata row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_image(&self, image: &ImageRecord) -> Result<()>;

    /// Get an image by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_image(&self, image_id: &ImageId) -> Result<Option<ImageRecord>>;

    /// List a user's images, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_images(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ImageRecord>>;

    /// Delete an image row. Derived rows referencing it are removed too.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the image doesn't exist.
    async fn delete_image(&self, image_id: &ImageId) -> Result<()>;
}
