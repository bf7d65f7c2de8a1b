// scrubsh/src/ui/mod.rs
//! Terminal output helpers.

pub mod summary;
