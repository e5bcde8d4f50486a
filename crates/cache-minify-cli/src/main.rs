//! `cache-minify`: minify cached pages and manage the minify setting.
//!
//! Plays the cache host: the config file is the host's line-oriented config
//! (`$cache_minify = 1;`), `minify` is the output buffer filter, `enable` /
//! `disable` are the settings page submit.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cache_minify::{CacheHooks, LineFileStore, PageMinifier, Passthrough, Settings};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cache-minify", version, about = "Minify cached HTML pages")]
struct Cli {
    /// Host config file holding the `$cache_minify` line
    #[arg(long, global = true, env = "CACHE_MINIFY_CONFIG", default_value = "cache-config.php")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Minify a page (stdin if no input is given) if minification is enabled
    Minify {
        input: Option<PathBuf>,

        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Treat the visitor as exempt: the page passes through untouched
        #[arg(long)]
        exempt: bool,

        /// Only strip skip markers, do not minify
        #[arg(long)]
        passthrough: bool,
    },
    /// Turn minification on
    Enable,
    /// Turn minification off
    Disable,
    /// Print whether minification is enabled
    Status,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cache_minify=info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Arc::new(Settings::new(Arc::new(LineFileStore::new(cli.config.clone()))));
    tracing::debug!(config = %cli.config.display(), "using config file");

    match cli.command {
        Command::Minify {
            input,
            output,
            exempt,
            passthrough,
        } => {
            let hooks = build_hooks(settings, passthrough);
            hooks.check_caller(exempt);

            let page = read_input(input.as_ref())?;
            let page = hooks.filter_buffer(page);
            write_output(output.as_ref(), &page)?;
        }
        Command::Enable => update_setting(build_hooks(settings, true), "1", &cli.config)?,
        Command::Disable => update_setting(build_hooks(settings, true), "0", &cli.config)?,
        Command::Status => {
            println!("{}", if settings.enabled() { "enabled" } else { "disabled" });
        }
    }

    Ok(())
}

fn build_hooks(settings: Arc<Settings>, passthrough: bool) -> CacheHooks {
    let minifier = if passthrough {
        PageMinifier::new(
            settings,
            Arc::new(Passthrough),
            Arc::new(Passthrough),
            Arc::new(Passthrough),
        )
    } else {
        cache_minify_engines::page_minifier(settings)
    };
    CacheHooks::new(Arc::new(minifier))
}

fn update_setting(hooks: CacheHooks, value: &str, config: &Path) -> Result<()> {
    hooks
        .apply_posted_setting(value)
        .wrap_err_with(|| format!("failed to update {}", config.display()))?;

    let view = hooks.settings_view();
    match view.notice {
        Some(notice) => println!("{notice}"),
        None => println!(
            "HTML Minify is already {}.",
            if view.enabled { "enabled" } else { "disabled" }
        ),
    }
    Ok(())
}

fn read_input(input: Option<&PathBuf>) -> Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {}", path.display())),
        None => {
            let mut page = String::new();
            std::io::stdin()
                .read_to_string(&mut page)
                .wrap_err("failed to read stdin")?;
            Ok(page)
        }
    }
}

fn write_output(output: Option<&PathBuf>, page: &str) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, page)
            .wrap_err_with(|| format!("failed to write {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(page.as_bytes())?;
            stdout.flush()?;
            Ok(())
        }
    }
}
