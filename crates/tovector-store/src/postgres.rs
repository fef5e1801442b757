//! PostgreSQL storage implementation.
//!
//! Every ledger mutation follows the same shape: begin, lock the account row
//! with `SELECT ... FOR UPDATE`, apply the core policy, write the account,
//! append the log entry, commit. A failure at any step drops the transaction
//! and rolls back both writes.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Row};

use tovector_core::credits::plan_charge;
use tovector_core::pricing::NEW_USER_FREE_PREVIEWS;
use tovector_core::{
    ActionType, CreditLog, Deduction, ImageId, ImageRecord, UserCredits, UserId,
};

use crate::error::{Result, StoreError};
use crate::Store;

const CREDITS_COLUMNS: &str = "user_id, credit_balance, free_previews, created_at, updated_at";

const LOG_COLUMNS: &str = "id, user_id, action_type, credits_used, credits_added, free_preview, \
                           balance_after, description, reference, created_at";

const IMAGE_COLUMNS: &str = "id, user_id, path, original_name, mime_type, size, width, height, \
                             was_resized, parent_id, created_at, updated_at";

/// PostgreSQL-backed storage implementation.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    new_user_free_previews: i32,
}

impl PgStore {
    /// Wrap an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            new_user_free_previews: NEW_USER_FREE_PREVIEWS,
        }
    }

    /// Connect to `database_url` with a bounded pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Set the number of free previews granted to new accounts.
    #[must_use]
    pub fn with_new_user_free_previews(mut self, free_previews: i32) -> Self {
        self.new_user_free_previews = free_previews.max(0);
        self
    }

    /// Apply the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    /// Borrow the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn credits_from_row(row: &PgRow) -> Result<UserCredits> {
    Ok(UserCredits {
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        credit_balance: row.try_get("credit_balance")?,
        free_previews: row.try_get("free_previews")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn log_from_row(row: &PgRow) -> Result<CreditLog> {
    let id: String = row.try_get("id")?;
    let action_type: String = row.try_get("action_type")?;

    Ok(CreditLog {
        id: id
            .parse()
            .map_err(|e| StoreError::Database(format!("corrupt credit log id {id}: {e}")))?,
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        action_type: action_type
            .parse()
            .map_err(|e| StoreError::Database(format!("corrupt action type: {e}")))?,
        credits_used: row.try_get("credits_used")?,
        credits_added: row.try_get("credits_added")?,
        free_preview: row.try_get("free_preview")?,
        balance_after: row.try_get("balance_after")?,
        description: row.try_get("description")?,
        reference: row.try_get("reference")?,
        created_at: row.try_get("created_at")?,
    })
}

fn image_from_row(row: &PgRow) -> Result<ImageRecord> {
    let width: i32 = row.try_get("width")?;
    let height: i32 = row.try_get("height")?;
    let parent_id: Option<uuid::Uuid> = row.try_get("parent_id")?;

    Ok(ImageRecord {
        id: ImageId::from_uuid(row.try_get("id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        path: row.try_get("path")?,
        original_name: row.try_get("original_name")?,
        mime_type: row.try_get("mime_type")?,
        size: row.try_get("size")?,
        width: u32::try_from(width).unwrap_or_default(),
        height: u32::try_from(height).unwrap_or_default(),
        was_resized: row.try_get("was_resized")?,
        parent_id: parent_id.map(ImageId::from_uuid),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn to_i32(value: u32, field: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::Database(format!("{field} out of range: {value}")))
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

// ============================================================================
// Transaction steps
// ============================================================================

async fn insert_account_if_missing(
    conn: &mut PgConnection,
    user_id: &UserId,
    free_previews: i32,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO user_credits (user_id, credit_balance, free_previews) \
         VALUES ($1, 0, $2) ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(*user_id.as_uuid())
    .bind(free_previews)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn lock_account(conn: &mut PgConnection, user_id: &UserId) -> Result<UserCredits> {
    let row = sqlx::query(&format!(
        "SELECT {CREDITS_COLUMNS} FROM user_credits WHERE user_id = $1 FOR UPDATE"
    ))
    .bind(*user_id.as_uuid())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| StoreError::NotFound {
        entity: "account",
        id: user_id.to_string(),
    })?;

    credits_from_row(&row)
}

async fn write_account(conn: &mut PgConnection, account: &UserCredits) -> Result<()> {
    sqlx::query(
        "UPDATE user_credits SET credit_balance = $2, free_previews = $3, updated_at = $4 \
         WHERE user_id = $1",
    )
    .bind(*account.user_id.as_uuid())
    .bind(account.credit_balance)
    .bind(account.free_previews)
    .bind(account.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_log(conn: &mut PgConnection, log: &CreditLog) -> Result<()> {
    let result = sqlx::query(&format!(
        "INSERT INTO credit_logs ({LOG_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
    ))
    .bind(log.id.to_string())
    .bind(*log.user_id.as_uuid())
    .bind(log.action_type.as_str())
    .bind(log.credits_used)
    .bind(log.credits_added)
    .bind(log.free_preview)
    .bind(log.balance_after)
    .bind(&log.description)
    .bind(log.reference.as_deref())
    .bind(log.created_at)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            Err(StoreError::DuplicateEvent {
                reference: log.reference.clone().unwrap_or_default(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

async fn reference_exists(conn: &mut PgConnection, reference: &str) -> Result<bool> {
    let row = sqlx::query("SELECT 1 AS found FROM credit_logs WHERE reference = $1")
        .bind(reference)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // =========================================================================
    // Credit Accounts
    // =========================================================================

    async fn get_credits(&self, user_id: &UserId) -> Result<Option<UserCredits>> {
        sqlx::query(&format!(
            "SELECT {CREDITS_COLUMNS} FROM user_credits WHERE user_id = $1"
        ))
        .bind(*user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(|row| credits_from_row(&row))
        .transpose()
    }

    async fn ensure_credits(&self, user_id: &UserId) -> Result<UserCredits> {
        let mut conn = self.pool.acquire().await?;
        insert_account_if_missing(&mut conn, user_id, self.new_user_free_previews).await?;

        let row = sqlx::query(&format!(
            "SELECT {CREDITS_COLUMNS} FROM user_credits WHERE user_id = $1"
        ))
        .bind(*user_id.as_uuid())
        .fetch_one(&mut *conn)
        .await?;

        credits_from_row(&row)
    }

    async fn deduct_credits(
        &self,
        user_id: &UserId,
        amount: i64,
        action: ActionType,
        description: &str,
    ) -> Result<Deduction> {
        let mut tx = self.pool.begin().await?;

        let mut account = lock_account(&mut tx, user_id).await?;
        let charge = plan_charge(&account, amount, action)?;
        account.apply_charge(charge);

        let log = CreditLog::usage(&account, action, charge, description);
        write_account(&mut tx, &account).await?;
        insert_log(&mut tx, &log).await?;

        tx.commit().await?;

        tracing::debug!(
            user_id = %user_id,
            action = %action,
            credits = charge.credits(),
            free_preview = charge.is_free_preview(),
            balance = account.credit_balance,
            "Credits deducted"
        );

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
        let mut tx = self.pool.begin().await?;

        insert_account_if_missing(&mut tx, user_id, self.new_user_free_previews).await?;
        let mut account = lock_account(&mut tx, user_id).await?;

        if let Some(reference) = reference {
            if reference_exists(&mut tx, reference).await? {
                return Err(StoreError::DuplicateEvent {
                    reference: reference.to_string(),
                });
            }
        }

        account.add_credits(amount)?;
        let log = CreditLog::credit(
            &account,
            action,
            amount,
            description,
            reference.map(str::to_string),
        );
        write_account(&mut tx, &account).await?;
        insert_log(&mut tx, &log).await?;

        tx.commit().await?;

        tracing::debug!(
            user_id = %user_id,
            amount = amount,
            balance = account.credit_balance,
            "Credits added"
        );

        Ok(log)
    }

    async fn refund(&self, deduction: &Deduction, description: &str) -> Result<CreditLog> {
        let mut tx = self.pool.begin().await?;

        let mut account = lock_account(&mut tx, &deduction.account.user_id).await?;
        account.reverse_charge(deduction.charge);

        let log = CreditLog::refund(&account, deduction.charge, description);
        write_account(&mut tx, &account).await?;
        insert_log(&mut tx, &log).await?;

        tx.commit().await?;
        Ok(log)
    }

    async fn list_credit_logs(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditLog>> {
        let rows = sqlx::query(&format!(
            "SELECT {LOG_COLUMNS} FROM credit_logs WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(*user_id.as_uuid())
        .bind(to_i64(limit))
        .bind(to_i64(offset))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(log_from_row).collect()
    }

    // =========================================================================
    // Images
    // =========================================================================

    async fn insert_image(&self, image: &ImageRecord) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO images ({IMAGE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(*image.id.as_uuid())
        .bind(*image.user_id.as_uuid())
        .bind(&image.path)
        .bind(&image.original_name)
        .bind(&image.mime_type)
        .bind(image.size)
        .bind(to_i32(image.width, "width")?)
        .bind(to_i32(image.height, "height")?)
        .bind(image.was_resized)
        .bind(image.parent_id.map(|id| *id.as_uuid()))
        .bind(image.created_at)
        .bind(image.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_image(&self, image_id: &ImageId) -> Result<Option<ImageRecord>> {
        sqlx::query(&format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = $1"))
            .bind(*image_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| image_from_row(&row))
            .transpose()
    }

    async fn list_images(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ImageRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE user_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(*user_id.as_uuid())
        .bind(to_i64(limit))
        .bind(to_i64(offset))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(image_from_row).collect()
    }

    async fn delete_image(&self, image_id: &ImageId) -> Result<()> {
        let result = sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(*image_id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "image",
                id: image_id.to_string(),
            });
        }

        tracing::debug!(image_id = %image_id, "Image row deleted");
        Ok(())
    }
}
