//! # LexSync Translation Migration Service
//!
//! Moves translation content between the relational store and the object
//! archive: imports and exports, migration tracking and application,
//! scheduled reconciliation, drift detection, and health reporting.

pub mod apply;
pub mod archive;
pub mod db;
pub mod diff;
pub mod drift;
pub mod export;
pub mod health;
pub mod import;
pub mod jobs;
pub mod reconcile;
pub mod sync;
