//! Pattern compilation for the regex-based redactors.
//!
//! Turns a redaction regex into a substitution plan from the roles of its
//! capture groups, and keeps compiled regexes in a process-wide cache.

pub mod compiler;
