//! Row models for the tables the gift engine touches.
//!
//! Each submodule contains a `FromRow` entity struct matching the database
//! row and, where the engine writes the table, an update DTO.

pub mod account;
pub mod gift_snapshot;
pub mod user_settings;
