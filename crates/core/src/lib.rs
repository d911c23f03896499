pub mod account;
pub mod change_detector;
pub mod error;
pub mod gift;
pub mod hashing;
pub mod merge;
pub mod premium;
pub mod sticker;
pub mod types;
