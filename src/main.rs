use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use theme_sync::api::ShopApi;
use theme_sync::cli::{Cli, Command};
use theme_sync::config::ThemeConfig;
use theme_sync::scheduler::ThrottleConfig;
use theme_sync::sync::ThemeSync;
use theme_sync::{git, SyncError};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let root = cli.root.as_path();

    match cli.command {
        Command::Init {
            shop,
            api_key,
            api_pass,
        } => init(root, &shop, &api_key, &api_pass).await,
        Command::Themes => themes(root).await,
        Command::Pull { theme_id } => pull(root, theme_id).await,
        Command::Push { theme_id } => push(root, theme_id).await,
        Command::Link { theme_id } => link(root, theme_id).await,
    }
}

async fn init(root: &Path, shop: &str, api_key: &str, api_pass: &str) -> Result<()> {
    let mut config = ThemeConfig::new(shop, api_key, api_pass)?;
    // Keep branch mappings and settings from an existing config.
    if let Ok(existing) = ThemeConfig::load(root) {
        config.branches = existing.branches;
        config.throttle = existing.throttle;
        config.api_base = existing.api_base;
    }

    // One careful call is enough to prove the credentials work.
    let scheduler = config.scheduler_with(ThrottleConfig {
        initial_budget: 1,
        ..config.throttle_config()
    })?;
    let themes = ShopApi::new(scheduler)
        .list_themes()
        .await
        .context("Could not verify credentials with the shop")?;

    config.save(root)?;
    println!(
        "{} ({} theme(s) on {})",
        "Config saved.".green(),
        themes.len(),
        config.shop
    );
    Ok(())
}

async fn themes(root: &Path) -> Result<()> {
    let config = ThemeConfig::load(root)?;
    let api = ShopApi::new(config.scheduler()?);

    for theme in api.list_themes().await? {
        let role = theme.role.as_deref().unwrap_or("-");
        println!("{:>14}  {:<12} {}", theme.id, role.dimmed(), theme.name);
    }
    Ok(())
}

async fn open_theme(root: &Path, theme_id: Option<u64>) -> Result<ThemeSync> {
    let config = ThemeConfig::load(root)?;
    let branch = if theme_id.is_none() {
        git::current_branch(root).await?
    } else {
        None
    };
    let theme_id = config.resolve_theme(theme_id, branch.as_deref())?;
    let api = ShopApi::new(config.scheduler()?);

    ThemeSync::open(api, root, theme_id)
        .with_context(|| format!("Could not load cache for theme {theme_id}"))
}

async fn pull(root: &Path, theme_id: Option<u64>) -> Result<()> {
    let mut sync = open_theme(root, theme_id).await?;
    let changed = sync.pull().await?;

    if changed.is_empty() {
        println!("No files have changed since last sync/download.");
    } else {
        println!("{}", "Files changed:".bold());
        for key in changed {
            println!("- {}", key);
        }
    }
    Ok(())
}

async fn push(root: &Path, theme_id: Option<u64>) -> Result<()> {
    let mut sync = open_theme(root, theme_id).await?;
    let uploaded = sync.push().await?;

    if uploaded.is_empty() {
        println!("No files have changed since last sync/upload.");
    } else {
        println!("{}", "Files uploaded:".bold());
        for key in uploaded {
            println!("- {}", key);
        }
    }
    Ok(())
}

async fn link(root: &Path, theme_id: u64) -> Result<()> {
    let mut config = ThemeConfig::load(root)?;
    let branch = git::current_branch(root)
        .await?
        .context("Not on a git branch; nothing to link")?;

    config.branches.insert(branch.clone(), theme_id);
    config.save(root)?;
    println!("Theme {} linked to branch {}", theme_id, branch.cyan());
    Ok(())
}

fn report(err: &anyhow::Error) {
    if let Some(SyncError::TransferFailed(failures)) = err.downcast_ref::<SyncError>() {
        eprintln!(
            "{} {} file(s) failed; theme cache left unchanged",
            "error:".red().bold(),
            failures.len()
        );
        for failure in failures.iter() {
            eprintln!("  {} {}", failure.key.yellow(), failure.error);
        }
        return;
    }
    eprintln!("{} {:#}", "error:".red().bold(), err);
}
