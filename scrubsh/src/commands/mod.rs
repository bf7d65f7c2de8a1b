// scrubsh/src/commands/mod.rs
pub mod scrub;
