pub mod accounts;
pub mod gifts;
pub mod stickers;
