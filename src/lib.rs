//! Address Screening Library
//!
//! This library screens cryptocurrency wallet addresses against a
//! risk-intelligence API. It fetches the category taxonomy once, screens a
//! batch of addresses concurrently under a global rate and concurrency limit,
//! and turns every response, successful or not, into one result row.
//!
//! # Modules
//!
//! - `cli`: Command-line arguments.
//! - `client`: Risk API HTTP client.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `gate`: Rate and concurrency admission control.
//! - `input`: Address list reading and deduplication.
//! - `models`: API payloads and screening results.
//! - `output`: Tabular result writing.
//! - `retry`: Bounded retry with exponential backoff.
//! - `screening`: Batch orchestration and normalization.

pub mod cli;
pub mod client;
pub mod config;
pub mod errors;
pub mod gate;
pub mod input;
pub mod models;
pub mod output;
pub mod retry;
pub mod screening;

pub use config::Config;
pub use errors::ScreenError;
pub use models::{ExposureValue, ScreeningResult, ScreeningRow, ScreeningStatus};
pub use screening::{BatchSummary, Screener};
