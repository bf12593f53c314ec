//! mail-index: idempotent IMAP folder/message catalog builder
//!
//! Walks every selectable leaf folder of an IMAP account and records, in a
//! SQLite catalog, which messages (by Message-ID) live in which folders and
//! at which sequence numbers. Re-running against the same account only adds
//! what is new.
//!
//! # Architecture
//!
//! - [`main`]: Process entry point with env loading, tracing, and exit codes
//! - [`config`]: CLI arguments and environment-driven settings
//! - [`errors`]: Application error model
//! - [`listing`]: Folder listing parser and leaf filtering
//! - [`identity`]: Message-ID extraction from header bytes
//! - [`catalog`]: SQLite catalog with idempotent upserts
//! - [`session`]: Mailbox session trait used by the walk
//! - [`imap`]: TLS IMAP implementation of the mailbox session
//! - [`indexer`]: The folder/message walk and its error policy

mod catalog;
mod config;
mod errors;
mod identity;
mod imap;
mod indexer;
mod listing;
mod session;

use std::process::ExitCode;

use clap::Parser;
use config::{Cli, IndexConfig};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Application entry point
///
/// Exits 0 after a complete walk, 1 on any fatal error or when folders were
/// skipped under the `skip-folder` policy.
///
/// # Example
///
/// ```no_run
/// MAIL_INDEX_DB_PATH=catalog.db cargo run -- user@gmail.com app-password
/// ```
#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match IndexConfig::load(cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match indexer::index_account(&config).await {
        Ok((report, counts)) => {
            info!(
                folders_indexed = report.folders_indexed,
                messages_seen = report.messages_seen,
                new_cross_references = report.new_cross_references,
                catalog_folders = counts.folders,
                catalog_messages = counts.messages,
                catalog_cross_references = counts.cross_references,
                catalog_sequences = counts.sequences,
                "walk finished"
            );
            if report.is_complete() {
                return ExitCode::SUCCESS;
            }
            for skipped in &report.skipped {
                warn!(folder = %skipped.folder, reason = %skipped.reason, "folder incomplete");
            }
            error!("{} folder(s) were not fully indexed", report.skipped.len());
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
