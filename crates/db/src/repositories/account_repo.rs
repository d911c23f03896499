//! Repository for the `accounts` table.
//!
//! Accounts are created by the account-management collaborator; the gift
//! engine only lists them, writes refreshed profile fields back and deletes
//! accounts whose session turned out to be revoked.

use giftpanel_core::types::DbId;
use sqlx::PgPool;

use crate::models::account::{AccountRow, UpdateAccountProfile};

/// Column list for `accounts` joined with `api_profiles` as `p`.
const COLUMNS: &str = "\
    a.id, a.user_id, a.api_profile_id, a.phone, a.session_path, \
    a.username, a.first_name, a.is_premium, a.premium_until, \
    a.stars_amount, a.last_checked_at, p.api_id, p.api_hash";

const FROM: &str = "accounts a JOIN api_profiles p ON p.id = a.api_profile_id";

/// Provides data access for linked accounts.
pub struct AccountRepo;

impl AccountRepo {
    /// All accounts owned by a user, ordered by id ascending.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<AccountRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM {FROM} WHERE a.user_id = $1 ORDER BY a.id ASC");
        sqlx::query_as::<_, AccountRow>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Find one account, scoped to its owner.
    pub async fn find_for_user(
        pool: &PgPool,
        user_id: DbId,
        account_id: DbId,
    ) -> Result<Option<AccountRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM {FROM} WHERE a.user_id = $1 AND a.id = $2");
        sqlx::query_as::<_, AccountRow>(&query)
            .bind(user_id)
            .bind(account_id)
            .fetch_optional(pool)
            .await
    }

    /// Write refreshed profile fields. Returns the updated row, or `None` if
    /// the account no longer exists.
    pub async fn update_profile(
        pool: &PgPool,
        user_id: DbId,
        account_id: DbId,
        dto: &UpdateAccountProfile,
    ) -> Result<Option<AccountRow>, sqlx::Error> {
        let query = format!(
            "WITH a AS ( \
                 UPDATE accounts SET \
                     username = $3, first_name = $4, is_premium = $5, \
                     premium_until = $6, stars_amount = $7, last_checked_at = $8, \
                     updated_at = NOW() \
                 WHERE user_id = $1 AND id = $2 \
                 RETURNING * \
             ) \
             SELECT {COLUMNS} FROM a JOIN api_profiles p ON p.id = a.api_profile_id"
        );
        sqlx::query_as::<_, AccountRow>(&query)
            .bind(user_id)
            .bind(account_id)
            .bind(&dto.username)
            .bind(&dto.first_name)
            .bind(dto.is_premium)
            .bind(&dto.premium_until)
            .bind(dto.stars_amount)
            .bind(dto.last_checked_at)
            .fetch_optional(pool)
            .await
    }

    /// Delete an account. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, user_id: DbId, account_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM accounts WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(account_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
