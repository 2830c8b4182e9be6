//! Report output modules.
//!
//! This module renders an aggregated summary into the supported output
//! formats: the flat summary CSV, a Markdown dashboard and JSON.

pub mod generator;

pub use generator::*;
