//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods
//! that accept `&PgPool` as the first argument.

pub mod account_repo;
pub mod gift_snapshot_repo;
pub mod user_settings_repo;

pub use account_repo::AccountRepo;
pub use gift_snapshot_repo::GiftSnapshotRepo;
pub use user_settings_repo::UserSettingsRepo;
