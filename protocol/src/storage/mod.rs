//! # Storage Module
//!
//! Persistent storage for offtake deployments, built on sled.

pub mod db;

pub use db::{id_key, parse_id_key, Bucket, DbError, DbResult, OfftakeDB, RecordBatch};
