//! Integration tests module
//!
//! End-to-end tests for the rota import engine:
//! - Spreadsheet → external scrape → coverage over real stores
//! - Degraded and critical failure handling

pub mod error_scenarios;
pub mod fixtures;
pub mod pipeline_test;
