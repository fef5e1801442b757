//! In-memory storage implementation.
//!
//! All state sits behind one mutex, so each ledger operation observes and
//! mutates the account and its log as a single step.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use tovector_core::credits::plan_charge;
use tovector_core::pricing::NEW_USER_FREE_PREVIEWS;
use tovector_core::{
    ActionType, CreditLog, Deduction, ImageId, ImageRecord, UserCredits, UserId,
};

use crate::error::{Result, StoreError};
use crate::Store;

#[derive(Debug, Default)]
struct Inner {
    credits: HashMap<UserId, UserCredits>,
    logs: Vec<CreditLog>,
    references: HashSet<String>,
    images: HashMap<ImageId, ImageRecord>,
}

/// In-process storage implementation.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    new_user_free_previews: i32,
    fail_image_writes: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            new_user_free_previews: NEW_USER_FREE_PREVIEWS,
            fail_image_writes: AtomicBool::new(false),
        }
    }

    /// Set the number of free previews granted to new accounts.
    #[must_use]
    pub fn with_new_user_free_previews(mut self, free_previews: i32) -> Self {
        self.new_user_free_previews = free_previews.max(0);
        self
    }

    /// Make every subsequent `insert_image` fail.
    pub fn fail_image_writes(&self, fail: bool) {
        self.fail_image_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of credit log entries across all users.
    pub async fn log_count(&self) -> usize {
        self.inner.lock().await.logs.len()
    }

    /// Number of image rows across all users.
    pub async fn image_count(&self) -> usize {
        self.inner.lock().await.images.len()
    }
}

fn paginate<T: Clone>(items: Vec<&T>, limit: usize, offset: usize) -> Vec<T> {
    items.into_iter().skip(offset).take(limit).cloned().collect()
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    // =========================================================================
    // Credit Accounts
    // =========================================================================

    async fn get_credits(&self, user_id: &UserId) -> Result<Option<UserCredits>> {
        Ok(self.inner.lock().await.credits.get(user_id).cloned())
    }

    async fn ensure_credits(&self, user_id: &UserId) -> Result<UserCredits> {
        let mut inner = self.inner.lock().await;
        let account = inner
            .credits
            .entry(*user_id)
            .or_insert_with(|| UserCredits::new(*user_id, self.new_user_free_previews));
        Ok(account.clone())
    }

    async fn deduct_credits(
        &self,
        user_id: &UserId,
        amount: i64,
        action: ActionType,
        description: &str,
    ) -> Result<Deduction> {
        let mut inner = self.inner.lock().await;

        let current = inner.credits.get(user_id).ok_or_else(|| StoreError::NotFound {
            entity: "account",
            id: user_id.to_string(),
        })?;

        let charge = plan_charge(current, amount, action)?;
        let mut account = current.clone();
        account.apply_charge(charge);

        let log = CreditLog::usage(&account, action, charge, description);
        inner.credits.insert(*user_id, account.clone());
        inner.logs.push(log.clone());

        Ok(Deduction {
            charge,
            action,
            account,
            log,
        })
    }

    async fn add_credits(
        &self,
        user_id: &UserId,
        amount: i64,
        action: ActionType,
        description: &str,
        reference: Option<&str>,
    ) -> Result<CreditLog> {
        let mut inner = self.inner.lock().await;

        if let Some(reference) = reference {
            if inner.references.contains(reference) {
                return Err(StoreError::DuplicateEvent {
                    reference: reference.to_string(),
                });
            }
        }

        let mut account = inner
            .credits
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| UserCredits::new(*user_id, self.new_user_free_previews));
        account.add_credits(amount)?;

        let log = CreditLog::credit(
            &account,
            action,
            amount,
            description,
            reference.map(str::to_string),
        );

        if let Some(reference) = reference {
            inner.references.insert(reference.to_string());
        }
        inner.credits.insert(*user_id, account);
        inner.logs.push(log.clone());

        Ok(log)
    }

    async fn refund(&self, deduction: &Deduction, description: &str) -> Result<CreditLog> {
        let mut inner = self.inner.lock().await;
        let user_id = deduction.account.user_id;

        let account = inner
            .credits
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "account",
                id: user_id.to_string(),
            })?;
        account.reverse_charge(deduction.charge);

        let log = CreditLog::refund(account, deduction.charge, description);
        inner.logs.push(log.clone());
        Ok(log)
    }

    async fn list_credit_logs(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditLog>> {
        let inner = self.inner.lock().await;
        let newest_first: Vec<&CreditLog> = inner
            .logs
            .iter()
            .rev()
            .filter(|log| log.user_id == *user_id)
            .collect();
        Ok(paginate(newest_first, limit, offset))
    }

    // =========================================================================
    // Images
    // =========================================================================

    async fn insert_image(&self, image: &ImageRecord) -> Result<()> {
        if self.fail_image_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database("image writes disabled".into()));
        }

        let mut inner = self.inner.lock().await;
        if inner.images.values().any(|existing| existing.path == image.path) {
            return Err(StoreError::Database(format!(
                "duplicate image path: {}",
                image.path
            )));
        }
        inner.images.insert(image.id, image.clone());
        Ok(())
    }

    async fn get_image(&self, image_id: &ImageId) -> Result<Option<ImageRecord>> {
        Ok(self.inner.lock().await.images.get(image_id).cloned())
    }

    async fn list_images(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ImageRecord>> {
        let inner = self.inner.lock().await;
        let mut owned: Vec<&ImageRecord> = inner
            .images
            .values()
            .filter(|image| image.user_id == *user_id)
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(owned, limit, offset))
    }

    async fn delete_image(&self, image_id: &ImageId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.images.remove(image_id).is_none() {
            return Err(StoreError::NotFound {
                entity: "image",
                id: image_id.to_string(),
            });
        }
        // Derived rows cascade with their parent.
        inner
            .images
            .retain(|_, image| image.parent_id != Some(*image_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tovector_core::{Charge, TovectorError};

    async fn funded_store(balance: i64) -> (MemoryStore, UserId) {
        let store = MemoryStore::new().with_new_user_free_previews(0);
        let user_id = UserId::generate();
        store.ensure_credits(&user_id).await.unwrap();
        if balance > 0 {
            store
                .add_credits(&user_id, balance, ActionType::Purchase, "seed", None)
                .await
                .unwrap();
        }
        (store, user_id)
    }

    #[tokio::test]
    async fn ensure_credits_grants_new_user_allowance_once() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();

        let first = store.ensure_credits(&user_id).await.unwrap();
        assert_eq!(first.credit_balance, 0);
        assert_eq!(first.free_previews, NEW_USER_FREE_PREVIEWS);

        store
            .deduct_credits(&user_id, 1, ActionType::Preview, "Preview")
            .await
            .unwrap();

        let second = store.ensure_credits(&user_id).await.unwrap();
        assert_eq!(second.free_previews, 0);
    }

    #[tokio::test]
    async fn deduction_writes_balance_and_one_log() {
        let (store, user_id) = funded_store(10).await;
        let logs_before = store.log_count().await;

        let deduction = store
            .deduct_credits(&user_id, 6, ActionType::Vectorize, "Vectorization")
            .await
            .unwrap();

        assert_eq!(deduction.balance_after(), 4);
        assert_eq!(deduction.log.credits_used, 6);
        assert_eq!(deduction.log.balance_after, 4);
        assert_eq!(store.log_count().await, logs_before + 1);

        let account = store.get_credits(&user_id).await.unwrap().unwrap();
        assert_eq!(account.credit_balance, 4);
    }

    #[tokio::test]
    async fn insufficient_credits_writes_nothing() {
        let (store, user_id) = funded_store(4).await;
        let logs_before = store.log_count().await;

        let err = store
            .deduct_credits(&user_id, 6, ActionType::Vectorize, "Vectorization")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StoreError::Rejected(TovectorError::InsufficientCredits {
                balance: 4,
                required: 6
            })
        ));
        assert_eq!(store.log_count().await, logs_before);
        let account = store.get_credits(&user_id).await.unwrap().unwrap();
        assert_eq!(account.credit_balance, 4);
    }

    #[tokio::test]
    async fn deduct_without_account_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .deduct_credits(&UserId::generate(), 1, ActionType::Vectorize, "Vectorization")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "account", .. }));
    }

    #[tokio::test]
    async fn free_preview_leaves_balance_untouched() {
        let store = MemoryStore::new().with_new_user_free_previews(1);
        let user_id = UserId::generate();
        store.ensure_credits(&user_id).await.unwrap();
        store
            .add_credits(&user_id, 3, ActionType::Purchase, "seed", None)
            .await
            .unwrap();

        let deduction = store
            .deduct_credits(&user_id, 1, ActionType::Preview, "Preview")
            .await
            .unwrap();

        assert_eq!(deduction.charge, Charge::FreePreview);
        assert!(deduction.log.free_preview);
        assert_eq!(deduction.log.credits_used, 0);
        assert_eq!(deduction.balance_after(), 3);
        assert_eq!(deduction.account.free_previews, 0);

        let paid = store
            .deduct_credits(&user_id, 1, ActionType::Preview, "Preview")
            .await
            .unwrap();
        assert_eq!(paid.charge, Charge::Credits(1));
        assert_eq!(paid.balance_after(), 2);
    }

    #[tokio::test]
    async fn add_credits_creates_account() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();

        let log = store
            .add_credits(&user_id, 25, ActionType::Purchase, "Credit purchase", None)
            .await
            .unwrap();

        assert_eq!(log.credits_added, 25);
        assert_eq!(log.balance_after, 25);
        let account = store.get_credits(&user_id).await.unwrap().unwrap();
        assert_eq!(account.credit_balance, 25);
    }

    #[tokio::test]
    async fn add_credits_rejects_non_positive_amounts() {
        let (store, user_id) = funded_store(0).await;
        for amount in [0, -5] {
            let err = store
                .add_credits(&user_id, amount, ActionType::Purchase, "bad", None)
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::Rejected(TovectorError::InvalidAmount(_))));
        }
        assert_eq!(store.log_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_reference_credits_once() {
        let (store, user_id) = funded_store(0).await;

        store
            .add_credits(&user_id, 10, ActionType::Purchase, "Credit purchase", Some("cs_1"))
            .await
            .unwrap();
        let err = store
            .add_credits(&user_id, 10, ActionType::Purchase, "Credit purchase", Some("cs_1"))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::DuplicateEvent { reference } if reference == "cs_1"));
        let account = store.get_credits(&user_id).await.unwrap().unwrap();
        assert_eq!(account.credit_balance, 10);
        assert_eq!(store.log_count().await, 1);
    }

    #[tokio::test]
    async fn refund_restores_paid_credits() {
        let (store, user_id) = funded_store(10).await;
        let deduction = store
            .deduct_credits(&user_id, 5, ActionType::Vectorize, "Vectorization")
            .await
            .unwrap();

        let log = store
            .refund(&deduction, "Refund: vectorization failed")
            .await
            .unwrap();

        assert_eq!(log.action_type, ActionType::Refund);
        assert_eq!(log.credits_added, 5);
        assert_eq!(log.balance_after, 10);
        let account = store.get_credits(&user_id).await.unwrap().unwrap();
        assert_eq!(account.credit_balance, 10);
    }

    #[tokio::test]
    async fn refund_restores_free_preview() {
        let store = MemoryStore::new().with_new_user_free_previews(1);
        let user_id = UserId::generate();
        store.ensure_credits(&user_id).await.unwrap();

        let deduction = store
            .deduct_credits(&user_id, 1, ActionType::Preview, "Preview")
            .await
            .unwrap();
        store.refund(&deduction, "Refund").await.unwrap();

        let account = store.get_credits(&user_id).await.unwrap().unwrap();
        assert_eq!(account.free_previews, 1);
        assert_eq!(account.credit_balance, 0);
    }

    #[tokio::test]
    async fn logs_are_newest_first_and_paginated() {
        let (store, user_id) = funded_store(10).await;
        for _ in 0..3 {
            store
                .deduct_credits(&user_id, 1, ActionType::Vectorize, "Vectorization")
                .await
                .unwrap();
        }

        let logs = store.list_credit_logs(&user_id, 2, 0).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].balance_after, 7);
        assert_eq!(logs[1].balance_after, 8);

        let rest = store.list_credit_logs(&user_id, 10, 2).await.unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[1].action_type, ActionType::Purchase);

        let other = store
            .list_credit_logs(&UserId::generate(), 10, 0)
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn concurrent_deductions_never_overdraw() {
        let (store, user_id) = funded_store(10).await;
        let store = std::sync::Arc::new(store);

        let mut handles = Vec::new();
        for _ in 0..5 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .deduct_credits(&user_id, 3, ActionType::Vectorize, "Vectorization")
                    .await
                    .is_ok()
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 3);
        let account = store.get_credits(&user_id).await.unwrap().unwrap();
        assert_eq!(account.credit_balance, 1);
    }

    fn image(user_id: UserId, parent_id: Option<ImageId>) -> ImageRecord {
        let id = ImageId::generate();
        let now = chrono::Utc::now();
        ImageRecord {
            id,
            user_id,
            path: tovector_core::storage_path(&user_id, &id, "png"),
            original_name: "logo.png".to_string(),
            mime_type: "image/png".to_string(),
            size: 1024,
            width: 64,
            height: 64,
            was_resized: false,
            parent_id,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn image_crud_and_cascade() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();

        let original = image(user_id, None);
        let derived = image(user_id, Some(original.id));
        store.insert_image(&original).await.unwrap();
        store.insert_image(&derived).await.unwrap();

        assert_eq!(store.list_images(&user_id, 10, 0).await.unwrap().len(), 2);
        assert!(store
            .list_images(&UserId::generate(), 10, 0)
            .await
            .unwrap()
            .is_empty());

        store.delete_image(&original.id).await.unwrap();
        assert_eq!(store.image_count().await, 0);

        let err = store.delete_image(&original.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "image", .. }));
    }

    #[tokio::test]
    async fn disabled_image_writes_leave_no_row() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        store.fail_image_writes(true);

        let err = store.insert_image(&image(user_id, None)).await.unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
        assert_eq!(store.image_count().await, 0);

        store.fail_image_writes(false);
        store.insert_image(&image(user_id, None)).await.unwrap();
        assert_eq!(store.image_count().await, 1);
    }
}
