use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "theme-sync")]
#[command(about = "Download and upload Shopify themes, keeping track of what changed", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Theme root (holds assets/, layout/, templates/ ... and .shopify-theme/)
    #[arg(long, global = true, env = "THEME_SYNC_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Verbosity level (-v = debug, -vv = trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Save shop credentials after checking them against the shop
    Init {
        /// Shop name or URL (name.myshopify.com)
        #[arg(long, env = "SHOPIFY_SHOP")]
        shop: String,

        /// Private app API key
        #[arg(long, env = "SHOPIFY_API_KEY")]
        api_key: String,

        /// Private app API password
        #[arg(long, env = "SHOPIFY_API_PASS", hide_env_values = true)]
        api_pass: String,
    },

    /// List the shop's themes
    Themes,

    /// Download changed theme files
    #[command(visible_alias = "down")]
    Pull {
        /// Theme id (defaults to the theme mapped to the current git branch)
        theme_id: Option<u64>,
    },

    /// Upload changed theme files
    #[command(visible_alias = "up")]
    Push {
        /// Theme id (defaults to the theme mapped to the current git branch)
        theme_id: Option<u64>,
    },

    /// Map the current git branch to a theme id
    Link {
        theme_id: u64,
    },
}

impl Cli {
    /// Default filter directive for the log subscriber when RUST_LOG is unset.
    pub fn log_directive(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn,theme_sync=info",
            1 => "warn,theme_sync=debug",
            _ => "trace",
        }
    }
}
