//! Folder/message walk that feeds the catalog
//!
//! Lists folders, keeps the selectable leaves, and for every message in every
//! leaf records the Message-ID, the folder it was seen in and the sequence
//! number it was seen at. The catalog upserts are idempotent, so an aborted
//! run is resumed by simply running again.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::catalog::{CatalogCounts, CatalogStore};
use crate::config::IndexConfig;
use crate::errors::{AppError, AppResult};
use crate::identity;
use crate::imap::ImapMailbox;
use crate::listing::{FolderListing, ListingParser};
use crate::session::MailboxSession;

/// What to do with a folder-scoped error (bad status, missing Message-ID)
///
/// Connection and store failures abort the run under every policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop the whole run at the first error
    #[default]
    AbortRun,
    /// Abandon the rest of the current folder and continue with the next
    SkipFolder,
}

impl FromStr for ErrorPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" | "abort-run" => Ok(Self::AbortRun),
            "skip" | "skip-folder" => Ok(Self::SkipFolder),
            other => Err(AppError::invalid(format!(
                "unknown error policy '{other}' (expected 'abort' or 'skip-folder')"
            ))),
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AbortRun => f.write_str("abort"),
            Self::SkipFolder => f.write_str("skip-folder"),
        }
    }
}

/// A folder abandoned under [`ErrorPolicy::SkipFolder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFolder {
    pub folder: String,
    pub reason: String,
}

/// Outcome of one walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Leaf folders walked to the end
    pub folders_indexed: usize,
    /// Messages whose identifier was recorded
    pub messages_seen: usize,
    /// Cross-references that did not exist before this run
    pub new_cross_references: usize,
    /// Folders abandoned part-way through
    pub skipped: Vec<SkippedFolder>,
}

impl IndexReport {
    /// True when every leaf folder was walked to the end
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Drives one walk over a session into a catalog
pub struct Indexer<'a, S> {
    session: &'a mut S,
    store: &'a CatalogStore,
    parser: ListingParser,
    policy: ErrorPolicy,
}

impl<'a, S: MailboxSession> Indexer<'a, S> {
    pub fn new(
        session: &'a mut S,
        store: &'a CatalogStore,
        policy: ErrorPolicy,
    ) -> AppResult<Self> {
        Ok(Self {
            session,
            store,
            parser: ListingParser::new()?,
            policy,
        })
    }

    /// Walk every selectable leaf folder in listing order
    ///
    /// # Errors
    ///
    /// - `Protocol` if the folder listing fails, or on any folder-scoped
    ///   failure under [`ErrorPolicy::AbortRun`]
    /// - `MissingIdentifier` under [`ErrorPolicy::AbortRun`]
    /// - `Store` whenever a catalog write fails
    pub async fn run(&mut self) -> AppResult<IndexReport> {
        let lines = self.session.list_folders().await?;
        let folders = self.parser.leaf_folders(&lines);
        info!(
            listed = lines.len(),
            leaves = folders.len(),
            policy = %self.policy,
            "starting folder walk"
        );

        let mut report = IndexReport::default();
        for listing in &folders {
            match self.index_folder(listing, &mut report).await {
                Ok(()) => report.folders_indexed += 1,
                Err(e) if self.policy == ErrorPolicy::SkipFolder && e.is_folder_scoped() => {
                    warn!(folder = %listing.name, error = %e, "skipping rest of folder");
                    report.skipped.push(SkippedFolder {
                        folder: listing.name.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    async fn index_folder(
        &mut self,
        listing: &FolderListing,
        report: &mut IndexReport,
    ) -> AppResult<()> {
        let folder = listing.name.as_str();
        let exists = self.session.select_folder(folder).await?;
        self.store.ensure_folder(folder).await?;

        let mut sequences = self.session.search_all().await?;
        sequences.sort_unstable();
        info!(
            folder,
            delimiter = %listing.delimiter,
            exists,
            messages = sequences.len(),
            "indexing folder"
        );

        for sequence in sequences {
            self.index_message(folder, sequence, report).await?;
        }
        Ok(())
    }

    async fn index_message(
        &mut self,
        folder: &str,
        sequence: u32,
        report: &mut IndexReport,
    ) -> AppResult<()> {
        let header = self.session.fetch_header(sequence).await?;
        // nothing is written for a message until its identifier is known
        let identifier =
            identity::message_identifier(&header).ok_or_else(|| AppError::MissingIdentifier {
                folder: folder.to_owned(),
                sequence,
            })?;

        let new_xref = self.store.cross_reference(&identifier, folder).await?;
        self.store
            .record_sequence(&identifier, folder, sequence)
            .await?;

        report.messages_seen += 1;
        if new_xref {
            report.new_cross_references += 1;
        }
        debug!(folder, sequence, identifier = %identifier, new_xref, "catalogued message");
        Ok(())
    }
}

/// Run a walk and log the session out afterwards, whatever the outcome
pub async fn walk<S: MailboxSession>(
    session: &mut S,
    store: &CatalogStore,
    policy: ErrorPolicy,
) -> AppResult<IndexReport> {
    let outcome = match Indexer::new(&mut *session, store, policy) {
        Ok(mut indexer) => indexer.run().await,
        Err(e) => Err(e),
    };

    if let Err(e) = session.logout().await {
        warn!(error = %e, "logout failed");
    }
    outcome
}

/// Connect the IMAP session, open the catalog, walk, and release both
///
/// Returns the walk report along with the catalog row counts after the walk.
pub async fn index_account(config: &IndexConfig) -> AppResult<(IndexReport, CatalogCounts)> {
    index_with(
        ImapMailbox::connect(config),
        &config.db_path,
        config.error_policy,
    )
    .await
}

/// Session-agnostic body of [`index_account`]
///
/// The catalog file is only opened (and created) once the session is
/// established, so a failed login leaves nothing on disk.
async fn index_with<S, F>(
    connect: F,
    db_path: &Path,
    policy: ErrorPolicy,
) -> AppResult<(IndexReport, CatalogCounts)>
where
    S: MailboxSession,
    F: Future<Output = AppResult<S>>,
{
    let mut session = connect.await?;

    let store = match CatalogStore::open(db_path).await {
        Ok(store) => store,
        Err(e) => {
            if let Err(logout) = session.logout().await {
                warn!(error = %logout, "logout failed");
            }
            return Err(e);
        }
    };

    let outcome = match walk(&mut session, &store, policy).await {
        Ok(report) => store.counts().await.map(|counts| (report, counts)),
        Err(e) => Err(e),
    };

    store.close().await;
    outcome
}
