//! High-level state management with stores.
//!
//! A store holds one value, runs every update through its middleware,
//! notifies subscribers on commit and can write itself through to storage.

mod builder;
mod persistence;
mod store;

pub use builder::StoreBuilder;
pub use store::{create_store, Hydration, Store, Subscription, Update};
