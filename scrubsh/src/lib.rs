// scrubsh/src/lib.rs
//! # scrubsh CLI Application
//!
//! The command-line front end for `scrubsh-core`. It drives the core only
//! through the redactor stream contract: one stream per input file, folded
//! through the rules that apply to that file's path.

pub mod cli;
pub mod commands;
pub mod logger;
pub mod ui;

pub use commands::scrub::{run_scrub, ScrubOptions};
