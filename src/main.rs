use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use log::{info, warn, LevelFilter};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use job_tracker_lib::config::{Config, DEFAULT_CONFIG_FILE};
use job_tracker_lib::{logger, CancelToken, HttpBrowser, PostingStore, Sweeper};

#[derive(Parser)]
#[command(name = "job-tracker", version, about = "Sweeps job sites for new postings")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Skip the delays between requests
    #[arg(long, global = true)]
    no_pacing: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one sweep now (default)
    Sweep,
    /// Run a sweep every N minutes until interrupted
    Watch {
        #[arg(long, default_value_t = 60)]
        interval_mins: u64,
    },
    /// Print stored postings, high-value and newest first
    List {
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if cli.no_pacing {
        config.pacing.enabled = false;
    }

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logger::init(level, config.log_file.as_deref());
    match &config.loaded_from {
        Some(path) => info!("Loaded config from {:?}", path),
        None => info!("No config file at {:?}. Using defaults.", cli.config),
    }

    let store = PostingStore::open(&config.store_path)
        .with_context(|| format!("Cannot use posting store {:?}", config.store_path))?;
    let store = Arc::new(store);

    match cli.command.unwrap_or(Command::Sweep) {
        Command::Sweep => {
            let cancel = install_interrupt_handler()?;
            let mut sweeper = Sweeper::from_config(&config, HttpBrowser::new()?, store)?;
            sweeper.run(&cancel);
        }
        Command::Watch { interval_mins } => {
            let cancel = install_interrupt_handler()?;
            let mut sweeper = Sweeper::from_config(&config, HttpBrowser::new()?, store)?;
            let interval = Duration::from_secs(interval_mins.max(1) * 60);
            while !cancel.is_cancelled() {
                let started = Instant::now();
                sweeper.run(&cancel);
                info!("Next sweep in {} minutes.", interval_mins.max(1));
                while !cancel.is_cancelled() && started.elapsed() < interval {
                    thread::sleep(Duration::from_millis(500));
                }
            }
        }
        Command::List { limit, json } => list(&store, limit, json)?,
    }

    Ok(())
}

/// First Ctrl+C stops the sweep after the current task; a second one exits.
fn install_interrupt_handler() -> Result<CancelToken> {
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            std::process::exit(130);
        }
        warn!("Interrupt received. Finishing the current task...");
        handler_token.cancel();
    })
    .context("Failed to install Ctrl+C handler")?;
    Ok(cancel)
}

fn list(store: &PostingStore, limit: usize, json: bool) -> Result<()> {
    let postings = store.all_ordered(Some(limit))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&postings)?);
        return Ok(());
    }

    if postings.is_empty() {
        println!("No postings stored yet. Run: job-tracker sweep");
        return Ok(());
    }

    for p in &postings {
        let flag = if p.high_value { ">> VIP" } else { "" };
        println!(
            "{:6} {} | {} | {} | {} | {}",
            flag,
            p.title,
            p.company,
            p.location,
            p.source,
            p.discovered_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
        );
        println!("       {}", p.link);
    }
    let vip = postings.iter().filter(|p| p.high_value).count();
    println!("\n{} postings | {} high-value", postings.len(), vip);
    Ok(())
}
