//! Repository for the `user_settings` table.

use giftpanel_core::types::DbId;
use sqlx::PgPool;

use crate::models::user_settings::UserSettings;

/// Column list for `user_settings` queries.
const COLUMNS: &str = "user_id, bot_token, gifts_auto_refresh, updated_at";

/// Provides data access for per-user settings.
pub struct UserSettingsRepo;

impl UserSettingsRepo {
    /// Settings for a user. `None` if the user never saved any.
    pub async fn get(pool: &PgPool, user_id: DbId) -> Result<Option<UserSettings>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM user_settings WHERE user_id = $1");
        sqlx::query_as::<_, UserSettings>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// The user's configured bot token, ignoring blank values.
    pub async fn bot_token(pool: &PgPool, user_id: DbId) -> Result<Option<String>, sqlx::Error> {
        let token: Option<(Option<String>,)> =
            sqlx::query_as("SELECT bot_token FROM user_settings WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(pool)
                .await?;
        Ok(token
            .and_then(|(t,)| t)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()))
    }

    /// Whether auto-refresh is enabled. Defaults to `false`.
    pub async fn auto_refresh(pool: &PgPool, user_id: DbId) -> Result<bool, sqlx::Error> {
        Ok(Self::get(pool, user_id)
            .await?
            .is_some_and(|s| s.gifts_auto_refresh))
    }

    /// Persist the auto-refresh flag.
    pub async fn set_auto_refresh(
        pool: &PgPool,
        user_id: DbId,
        enabled: bool,
    ) -> Result<UserSettings, sqlx::Error> {
        let query = format!(
            "INSERT INTO user_settings (user_id, gifts_auto_refresh) \
             VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 gifts_auto_refresh = EXCLUDED.gifts_auto_refresh, \
                 updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UserSettings>(&query)
            .bind(user_id)
            .bind(enabled)
            .fetch_one(pool)
            .await
    }

    /// Users whose auto-refresh flag is set, ascending.
    pub async fn list_auto_refresh_users(pool: &PgPool) -> Result<Vec<DbId>, sqlx::Error> {
        let rows: Vec<(DbId,)> = sqlx::query_as(
            "SELECT user_id FROM user_settings WHERE gifts_auto_refresh ORDER BY user_id ASC",
        )
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
