use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use playlist_finder as lib;
use lib::config::Config;
use lib::finder::Finder;
use lib::session::{self, Prompter};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::subscriber as tracing_subscriber_global;
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "playlist-finder", version)]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for a song and list the playlists containing it (interactive, default)
    Find,
    /// List the playlists containing an exact song title
    Locate {
        #[arg(long)]
        song: String,
    },
    /// Authorize with Spotify and store tokens in the settings file (interactive)
    Auth,
    /// Force an access token refresh
    Refresh,
    /// Drop cached playlists and tracks
    CacheClear,
    /// Validate config file and exit
    ConfigValidate,
}

/// Prompts on stdout, answers from stdin.
struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn ask(&mut self, prompt: &str) -> Result<String> {
        print!("{}", prompt);
        std::io::stdout().flush()?;
        let mut line = String::new();
        let read = std::io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Err(anyhow!("input closed"));
        }
        Ok(line.trim().to_string())
    }

    fn say(&mut self, line: &str) {
        println!("{}", line);
    }
}

fn load_config(explicit: Option<&PathBuf>) -> Result<Config> {
    let mut cfg = match explicit {
        Some(p) => Config::from_path(p)
            .with_context(|| format!("loading config from {}", p.display()))?,
        None => match Config::default_path().filter(|p| p.exists()) {
            Some(p) => Config::from_path(&p)
                .with_context(|| format!("loading config from {}", p.display()))?,
            None => Config::default(),
        },
    };
    cfg.apply_env_overrides();
    Ok(cfg)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_ref())?;

    let command = cli.command.unwrap_or(Commands::Find);
    if let Commands::ConfigValidate = command {
        println!("OK");
        return Ok(());
    }

    // log -> tracing bridge; logs go to stderr and a daily-rotated file in
    // cfg.log_dir so stdout stays free for prompts.
    let _ = LogTracer::init();
    std::fs::create_dir_all(&cfg.log_dir)
        .with_context(|| format!("creating log dir {}", cfg.log_dir.display()))?;
    let file_appender: RollingFileAppender =
        tracing_appender::rolling::daily(&cfg.log_dir, "playlist-finder.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer);
    tracing_subscriber_global::set_global_default(subscriber)
        .context("installing tracing subscriber")?;

    let finder = Finder::from_config(&cfg)?;
    let mut prompter = StdinPrompter;

    match command {
        Commands::Find => {
            session::run_session(&finder, &mut prompter).await?;
        }
        Commands::Locate { song } => {
            session::authorize(finder.auth(), &mut prompter).await?;
            session::locate_and_report(&finder, &song.to_lowercase(), &mut prompter).await?;
        }
        Commands::Auth => {
            session::authorize_interactive(finder.auth(), &mut prompter).await?;
        }
        Commands::Refresh => {
            finder.auth().refresh().await.context("refreshing access token")?;
            println!("Access token refreshed.");
        }
        Commands::CacheClear => {
            finder.catalog().clear_cache().await.context("clearing cache")?;
            println!("Cleared cached playlists and tracks.");
        }
        Commands::ConfigValidate => {}
    }

    Ok(())
}
