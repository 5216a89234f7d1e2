//! Core types and trait definitions for the OpsIntel analytics pipeline.
//!
//! No HTTP or database dependencies. Every other crate in the workspace
//! depends on this one.

// Native `async fn` in trait impls; the trait signatures spell out `Send`.
#![allow(async_fn_in_trait)]

pub mod config;
pub mod error;
pub mod frame;
pub mod outcome;
pub mod record;
pub mod refresh;
pub mod store;
pub mod table;

pub use error::{Error, Result};
