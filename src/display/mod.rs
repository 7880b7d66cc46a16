//! Rich terminal display utilities for CLI output.
//!
//! Provides styled tables and a shared color theme.

pub mod tables;
pub mod theme;

pub use tables::{TableBuilder, create_results_table, create_status_table};
pub use theme::{THEME, Theme};
