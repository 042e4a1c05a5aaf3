//! Live license plate recognition and registry compliance checks.
//!
//! Each frame goes through [`plate_detection`] (localization, OCR, text
//! normalization, color classification), then [`matcher`] looks the plate up
//! in a [`registry`] snapshot. [`pipeline`] drives the per-frame state machine
//! and hands matches to [`notify`] and frames to [`display`].

pub mod config;
pub mod display;
pub mod error;
pub mod matcher;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod plate_detection;
pub mod registry;
pub mod utils;

pub use error::{PlateError, Result};
