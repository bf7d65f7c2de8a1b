// scrubsh/src/commands/scrub.rs
//! The scrub command: runs every input file through the applicable rules.

use anyhow::{Context, Result};
use is_terminal::IsTerminal;
use log::{debug, info, warn};
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use scrubsh_core::{
    build_redactors, merge_configs, redact_stream, RedactionConfig, RedactorContext, TokenizerConfig,
};

use crate::cli::Cli;
use crate::ui::summary;

/// Options for a scrub run.
#[derive(Debug, Clone, Default)]
pub struct ScrubOptions {
    pub files: Vec<PathBuf>,
    pub config: Option<PathBuf>,
    pub no_defaults: bool,
    pub output_dir: Option<PathBuf>,
    pub tokenize: bool,
    pub map_out: Option<PathBuf>,
    pub encrypt_map: bool,
    pub profile: String,
    pub quiet: bool,
}

impl From<Cli> for ScrubOptions {
    fn from(cli: Cli) -> Self {
        Self {
            files: cli.files,
            config: cli.config,
            no_defaults: cli.no_defaults,
            output_dir: cli.output_dir,
            tokenize: cli.tokenize,
            map_out: cli.map_out,
            encrypt_map: cli.encrypt_map,
            profile: cli.profile,
            quiet: cli.quiet,
        }
    }
}

/// Loads the built-in rules (unless disabled) and merges the user's rule file over them.
pub fn load_rules(opts: &ScrubOptions) -> Result<RedactionConfig> {
    let defaults = if opts.no_defaults {
        RedactionConfig::default()
    } else {
        RedactionConfig::load_default_rules().context("Failed to load built-in rules")?
    };
    let user = opts
        .config
        .as_ref()
        .map(|path| {
            RedactionConfig::load_from_file(path)
                .with_context(|| format!("Failed to load rules from {}", path.display()))
        })
        .transpose()?;

    let config = merge_configs(defaults, user);
    debug!("Loaded {} rules.", config.redactors.len());
    Ok(config)
}

fn redactor_context(tokenize: bool) -> RedactorContext {
    if tokenize {
        RedactorContext::isolated(TokenizerConfig {
            enabled: true,
            ..Default::default()
        })
    } else {
        RedactorContext::global()
    }
}

/// Where a scrubbed copy of `input` lands under `dir`. Root and parent
/// components are dropped so nothing is written outside `dir`.
fn output_target(dir: &Path, input: &Path) -> PathBuf {
    let relative: PathBuf = input
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    dir.join(relative)
}

async fn scrub_file(path: &Path, config: &RedactionConfig, ctx: &RedactorContext, output_dir: Option<&Path>) -> Result<()> {
    let rule_path = path.to_string_lossy().into_owned();
    let redactors = build_redactors(config, &rule_path, ctx)
        .with_context(|| format!("Failed to build redactors for {}", path.display()))?;
    debug!("{} redactors apply to {}", redactors.len(), rule_path);

    let input = File::open(path)
        .await
        .with_context(|| format!("Failed to open input file: {}", path.display()))?;
    let mut output = redact_stream(Box::pin(input), &rule_path, &redactors);

    match output_dir {
        Some(dir) => {
            let target = output_target(dir, path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
            }
            let mut file = File::create(&target)
                .await
                .with_context(|| format!("Failed to create output file: {}", target.display()))?;
            tokio::io::copy(&mut output, &mut file)
                .await
                .with_context(|| format!("Failed to scrub {}", path.display()))?;
            file.flush().await?;
            info!("Wrote scrubbed copy of {} to {}", path.display(), target.display());
        }
        None => {
            let mut stdout = tokio::io::stdout();
            tokio::io::copy(&mut output, &mut stdout)
                .await
                .with_context(|| format!("Failed to scrub {}", path.display()))?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

/// The main operation runner for the scrubsh CLI.
pub async fn run_scrub(opts: ScrubOptions) -> Result<()> {
    info!("Starting scrub of {} file(s).", opts.files.len());
    let config = load_rules(&opts)?;
    let ctx = redactor_context(opts.tokenize);

    for path in &opts.files {
        scrub_file(path, &config, &ctx, opts.output_dir.as_deref()).await?;
    }

    if !opts.quiet {
        let snapshot = ctx.ledger.snapshot().await;
        let use_color = io::stderr().is_terminal();
        summary::print_summary(&snapshot, &mut io::stderr(), use_color)?;
    }

    if let Some(map_out) = &opts.map_out {
        if !ctx.tokenizer.is_enabled() {
            warn!("Tokenization is disabled; the exported map will hold no tokens.");
        }
        let key = ctx
            .tokenizer
            .export(&opts.profile, map_out, opts.encrypt_map)
            .with_context(|| format!("Failed to export token map to {}", map_out.display()))?;
        if let Some(key) = key {
            // Printed even with --quiet: it is the only copy.
            eprintln!("Map encryption key (store it now, it is not saved): {}", hex::encode(key));
        }
    }

    info!("Scrub completed.");
    Ok(())
}
