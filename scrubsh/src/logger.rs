// scrubsh/src/logger.rs
//! Logger setup for the scrubsh binary and its tests.

use log::LevelFilter;

/// Initializes `env_logger` once. `RUST_LOG` is honored; `level` overrides it
/// when given. A second call is a no-op.
pub fn init_logger(level: Option<LevelFilter>) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if let Some(level) = level {
        builder.filter_level(level);
    }
    builder.format_timestamp(None).target(env_logger::Target::Stderr).try_init().ok();
}
