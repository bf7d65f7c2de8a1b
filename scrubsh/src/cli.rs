// scrubsh/src/cli.rs
//! This file defines the command-line interface (CLI) for the scrubsh application.
//! License: MIT OR APACHE 2.0

use clap::Parser;
use std::path::PathBuf;

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(
    name = "scrubsh",
    author = "Relay",
    version = env!("CARGO_PKG_VERSION"),
    about = "Scrub secrets out of diagnostic files",
    long_about = "scrubsh streams each input file through the built-in redaction rules (and any rules from --config) and writes the scrubbed copy to stdout or to --output-dir. With tokenization enabled, secrets are replaced by stable typed tokens and the token map can be exported, optionally encrypted.",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Files to scrub, processed in order.
    #[arg(value_name = "FILES", required = true)]
    pub files: Vec<PathBuf>,

    /// Path to a YAML rule file merged over the built-in rules.
    #[arg(long = "config", value_name = "FILE", help = "Path to a YAML rule file merged over the built-in rules.")]
    pub config: Option<PathBuf>,

    /// Skip the built-in rules.
    #[arg(long = "no-defaults", help = "Do not load the built-in rules.")]
    pub no_defaults: bool,

    /// Write scrubbed files under this directory instead of stdout.
    #[arg(long = "output-dir", short = 'o', value_name = "DIR", help = "Write scrubbed files under this directory instead of stdout.")]
    pub output_dir: Option<PathBuf>,

    /// Replace secrets with typed tokens instead of the mask text.
    #[arg(long = "tokenize", short = 't', help = "Replace secrets with typed tokens (also enabled by SCRUBSH_TOKENIZATION).")]
    pub tokenize: bool,

    /// Export the token map to this path after scrubbing.
    #[arg(long = "map-out", value_name = "FILE", help = "Export the token map to this path after scrubbing.")]
    pub map_out: Option<PathBuf>,

    /// Encrypt the exported token map. The key is printed once to stderr.
    #[arg(long = "encrypt-map", requires = "map_out", help = "Encrypt the exported map; the key is printed once to stderr.")]
    pub encrypt_map: bool,

    /// Profile name recorded in the exported map.
    #[arg(long = "profile", short = 'p', value_name = "NAME", default_value = "default")]
    pub profile: String,

    /// Disable informational messages and the summary.
    #[arg(long, short = 'q', help = "Suppress logging and the redaction summary.")]
    pub quiet: bool,

    /// Enable debug logging.
    #[arg(long, short = 'd', conflicts_with = "quiet", help = "Enable debug logging.")]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_encrypt_map_requires_map_out() {
        let err = Cli::try_parse_from(["scrubsh", "--encrypt-map", "a.txt"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let cli = Cli::try_parse_from(["scrubsh", "--encrypt-map", "--map-out", "m.json", "a.txt", "b.txt"]).unwrap();
        assert!(cli.encrypt_map);
        assert_eq!(cli.files.len(), 2);
        assert_eq!(cli.profile, "default");
    }
}
