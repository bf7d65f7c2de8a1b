// scrubsh-core/src/engines/mod.rs
//! This module contains the redactor implementations.
//!
//! Each redactor is a separate file within this directory and implements the
//! `Redactor` trait. Line-based redactors share the line reader and the
//! pattern compiler; the YAML redactor works on whole documents.
//!
//! License: MIT OR APACHE 2.0

pub mod literal;
pub mod multi_line;
pub mod single_line;
pub mod yaml;
