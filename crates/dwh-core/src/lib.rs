//! Core types and trait definitions for the song-play warehouse ETL.
//!
//! This crate has no database or cloud dependencies.
//! Warehouse backends implement [`warehouse::Warehouse`]; the
//! [`pipeline::Pipeline`] sequences schema reset, staging load, transform
//! and audit against any of them.

// Native `async fn` in traits; the futures' `Send` bounds are spelled out on
// the trait itself.
#![allow(async_fn_in_trait)]

pub mod audit;
pub mod error;
pub mod pipeline;
pub mod schema;
pub mod staging;
pub mod transform;
pub mod warehouse;

pub use error::{Error, Result};
