//! theme-sync: keep a local Shopify theme tree in step with the shop.
//!
//! Two pieces do the real work:
//!
//! - [`scheduler::Scheduler`] queues every API call and dispatches as many as the
//!   shop's call budget allows, absorbing 429 rejections and slowly refilling
//!   the budget afterwards.
//! - [`sync::ThemeSync`] diffs remote and local assets against a persisted
//!   content-hash cache and transfers only what changed.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod scheduler;
pub mod sync;
pub mod transport;

pub use error::{Result, SyncError};
