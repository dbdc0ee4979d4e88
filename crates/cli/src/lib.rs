//! sitecheck CLI
//!
//! Command-line interface for selecting and running browser end-to-end
//! suites and for serving the pages they test.

pub mod commands;
pub mod output;
