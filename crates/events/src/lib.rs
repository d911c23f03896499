//! Gift event bus.
//!
//! This crate provides the live-update fan-out for the gift engine:
//!
//! - [`GiftEventBus`] -- per-user publish/subscribe topics backed by
//!   `tokio::sync::broadcast`.
//! - [`GiftEvent`] -- the event envelope pushed to live subscribers.
//! - [`Subscription`] -- a single subscriber's receiving end, disconnected
//!   when it falls further behind than its buffer allows.

pub mod bus;

pub use bus::{GiftEvent, GiftEventBus, Subscription, SubscriptionClosed};
