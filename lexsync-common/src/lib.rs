//! # LexSync Common Library
//!
//! Shared code for the LexSync translation services including:
//! - Error taxonomy and crate-wide Result
//! - Configuration loading
//! - SQLite schema initialization
//! - Translation domain models
//! - Timestamp and clock utilities

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod time;

pub use error::{Error, Result};
