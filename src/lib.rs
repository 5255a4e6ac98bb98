//! Shared state core for chat communities: default-schema reconciliation,
//! message-driven leveling, and anonymous polls over a path-addressed store.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod handlers;
pub mod leveling;
pub mod logging;
pub mod model;
pub mod poll;
pub mod reconcile;
pub mod schema;
pub mod settings;
pub mod store;
pub mod tickets;
pub mod voice;
