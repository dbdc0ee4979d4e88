//! CLI Commands

pub mod list;
pub mod run;
pub mod serve;
