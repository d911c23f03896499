//! Integration tests for the gift engine repositories.
//!
//! Require a PostgreSQL server reachable through `DATABASE_URL`; run with
//! `cargo test -p giftpanel-db -- --ignored`.

use chrono::{TimeZone, Utc};
use giftpanel_db::models::account::UpdateAccountProfile;
use giftpanel_db::models::gift_snapshot::UpsertGiftSnapshot;
use giftpanel_db::repositories::{AccountRepo, GiftSnapshotRepo, UserSettingsRepo};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn seed_user(pool: &PgPool, username: &str) -> i64 {
    let (id,): (i64,) = sqlx::query_as("INSERT INTO users (username) VALUES ($1) RETURNING id")
        .bind(username)
        .fetch_one(pool)
        .await
        .unwrap();
    id
}

async fn seed_account(pool: &PgPool, user_id: i64, phone: &str) -> i64 {
    let (profile_id,): (i64,) = sqlx::query_as(
        "INSERT INTO api_profiles (user_id, api_id, api_hash) VALUES ($1, 100, 'hash') RETURNING id",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .unwrap();

    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO accounts (user_id, api_profile_id, phone, session_path) \
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(user_id)
    .bind(profile_id)
    .bind(phone)
    .bind(format!("sessions/{phone}.session"))
    .fetch_one(pool)
    .await
    .unwrap();
    id
}

// ---------------------------------------------------------------------------
// Test: bootstrap
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn health_check_passes_after_migrations(pool: PgPool) {
    giftpanel_db::health_check(&pool).await.unwrap();
}

// ---------------------------------------------------------------------------
// Test: accounts
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn accounts_are_listed_in_id_order_and_scoped_to_owner(pool: PgPool) {
    let alice = seed_user(&pool, "alice").await;
    let bob = seed_user(&pool, "bob").await;
    let a1 = seed_account(&pool, alice, "+1000").await;
    let a2 = seed_account(&pool, alice, "+1001").await;
    let b1 = seed_account(&pool, bob, "+2000").await;

    let rows = AccountRepo::list_for_user(&pool, alice).await.unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![a1, a2]);
    assert_eq!(rows[0].api_id, 100);

    assert!(AccountRepo::find_for_user(&pool, alice, b1).await.unwrap().is_none());
    assert!(AccountRepo::find_for_user(&pool, bob, b1).await.unwrap().is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn update_profile_and_delete(pool: PgPool) {
    let user = seed_user(&pool, "carol").await;
    let account = seed_account(&pool, user, "+3000").await;
    let checked = Utc.with_ymd_and_hms(2025, 4, 1, 9, 30, 0).unwrap();

    let updated = AccountRepo::update_profile(
        &pool,
        user,
        account,
        &UpdateAccountProfile {
            username: Some("carol_tg".into()),
            first_name: Some("Carol".into()),
            is_premium: true,
            premium_until: Some("01.05.2026".into()),
            stars_amount: 250,
            last_checked_at: checked,
        },
    )
    .await
    .unwrap()
    .expect("account exists");

    assert_eq!(updated.stars_amount, 250);
    assert_eq!(updated.username.as_deref(), Some("carol_tg"));
    assert_eq!(updated.last_checked_at, Some(checked));
    assert_eq!(updated.api_hash, "hash");

    assert!(AccountRepo::delete(&pool, user, account).await.unwrap());
    assert!(!AccountRepo::delete(&pool, user, account).await.unwrap());
}

// ---------------------------------------------------------------------------
// Test: settings
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn auto_refresh_flag_round_trips(pool: PgPool) {
    let user = seed_user(&pool, "dave").await;
    let other = seed_user(&pool, "erin").await;

    assert!(!UserSettingsRepo::auto_refresh(&pool, user).await.unwrap());
    UserSettingsRepo::set_auto_refresh(&pool, user, true).await.unwrap();
    UserSettingsRepo::set_auto_refresh(&pool, other, false).await.unwrap();

    assert!(UserSettingsRepo::auto_refresh(&pool, user).await.unwrap());
    assert_eq!(
        UserSettingsRepo::list_auto_refresh_users(&pool).await.unwrap(),
        vec![user]
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn blank_bot_token_counts_as_missing(pool: PgPool) {
    let user = seed_user(&pool, "frank").await;
    assert_eq!(UserSettingsRepo::bot_token(&pool, user).await.unwrap(), None);

    sqlx::query("INSERT INTO user_settings (user_id, bot_token) VALUES ($1, '   ')")
        .bind(user)
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(UserSettingsRepo::bot_token(&pool, user).await.unwrap(), None);

    sqlx::query("UPDATE user_settings SET bot_token = ' 123:abc ' WHERE user_id = $1")
        .bind(user)
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(
        UserSettingsRepo::bot_token(&pool, user).await.unwrap().as_deref(),
        Some("123:abc")
    );
}

// ---------------------------------------------------------------------------
// Test: snapshots
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn snapshot_upsert_keeps_one_row_per_user(pool: PgPool) {
    let user = seed_user(&pool, "grace").await;
    let t1 = Utc.with_ymd_and_hms(2025, 4, 1, 10, 0, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2025, 4, 1, 10, 0, 30).unwrap();

    GiftSnapshotRepo::upsert(
        &pool,
        user,
        &UpsertGiftSnapshot {
            items: serde_json::json!([{"id": "1"}]),
            content_hash: Some("h1".into()),
            last_polled_at: t1,
        },
    )
    .await
    .unwrap();
    let row = GiftSnapshotRepo::upsert(
        &pool,
        user,
        &UpsertGiftSnapshot {
            items: serde_json::json!([{"id": "2"}]),
            content_hash: Some("h2".into()),
            last_polled_at: t2,
        },
    )
    .await
    .unwrap();
    assert_eq!(row.content_hash.as_deref(), Some("h2"));

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM gift_snapshots WHERE user_id = $1")
        .bind(user)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn touch_polled_leaves_items_and_hash_alone(pool: PgPool) {
    let user = seed_user(&pool, "heidi").await;
    let t1 = Utc.with_ymd_and_hms(2025, 4, 1, 10, 0, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2025, 4, 1, 10, 1, 0).unwrap();

    GiftSnapshotRepo::upsert(
        &pool,
        user,
        &UpsertGiftSnapshot {
            items: serde_json::json!([{"id": "1"}]),
            content_hash: Some("h1".into()),
            last_polled_at: t1,
        },
    )
    .await
    .unwrap();
    GiftSnapshotRepo::touch_polled(&pool, user, t2).await.unwrap();

    let row = GiftSnapshotRepo::get(&pool, user).await.unwrap().unwrap();
    assert_eq!(row.content_hash.as_deref(), Some("h1"));
    assert_eq!(row.items, serde_json::json!([{"id": "1"}]));
    assert_eq!(row.last_polled_at, Some(t2));
}
