//! Commentary - storage engine for a self-hosted comment service
//!
//! Threads are bound to unique page paths; comments hang off threads and may
//! reply to one another (one level deep). The engine persists both behind a
//! single [`storage::Storage`] contract with interchangeable backends.
//!
//! # Architecture
//!
//! - [`model`] - Thread and Comment, ids, timestamps, path normalization
//! - [`storage`] - the storage contract, the relational driver (SQLite,
//!   Postgres, MySQL) and the key-value driver (in-memory, DynamoDB)
//! - [`cleanup`] - background retention sweeps
//! - [`dump`] - line-oriented export, restore and cross-backend migration
//! - [`config`] - database and retention configuration
//! - [`logging`] - tracing subscriber setup
//! - [`error`] - error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cleanup;
pub mod config;
pub mod dump;
pub mod error;
pub mod logging;
pub mod model;
pub mod storage;

pub use error::{Error, Result};
pub use storage::{Storage, open_storage};
