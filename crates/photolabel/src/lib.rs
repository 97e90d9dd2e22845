//! photolabel - interactive image labeling over a paged photo search.
//!
//! Core library exposing domain modules for workspace crates.

pub mod config;
pub mod migrations;
pub mod models;
pub mod repository;
pub mod schema;
pub mod services;
pub mod source;
pub mod storage;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
