//! Command-line interface definitions for the model watcher.
//!
//! This module defines the CLI arguments and subcommands using the `clap` crate.
//! File locations can be provided via flags or environment variables.

use crate::models::SubscriptionKind;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Command-line arguments for the model watcher.
///
/// With no subcommand a single monitoring pass is run.
///
/// # Examples
///
/// ```sh
/// # Subscribe to an organization page
/// model_watch add qwen https://huggingface.co/Qwen
///
/// # One pass, print what is new
/// model_watch run
///
/// # Run now and every day at 06:30 local time
/// model_watch --config ./config.yaml watch --at 06:30
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the configuration file (.json, or .yaml/.yml)
    #[arg(short, long, env = "MODEL_WATCH_CONFIG", default_value = "config/config.json")]
    pub config: PathBuf,

    /// Path to the snapshot file
    #[arg(short, long, env = "MODEL_WATCH_SNAPSHOT", default_value = "data/models.json")]
    pub snapshot: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Add a subscription
    Add {
        /// Unique subscription name
        name: String,
        /// Listing page or feed URL
        url: String,
        /// How the listing is read
        #[arg(long, value_enum, default_value_t = KindArg::Html)]
        kind: KindArg,
    },
    /// Remove a subscription (its stored records are kept)
    Remove { name: String },
    /// List configured subscriptions
    List,
    /// Run one monitoring pass
    Run,
    /// Run a pass now, then once a day
    Watch {
        /// Local wall-clock time for the daily pass (HH:MM)
        #[arg(long, default_value = "00:00")]
        at: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindArg {
    Html,
    Rss,
}

impl From<KindArg> for SubscriptionKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Html => SubscriptionKind::Html,
            KindArg::Rss => SubscriptionKind::Rss,
        }
    }
}
