//! Mailbox session abstraction
//!
//! The indexer only needs four protocol operations plus logout. Keeping them
//! behind a trait lets the walk run against a live IMAP connection
//! ([`crate::imap::ImapMailbox`]) or a scripted mailbox in tests.

use crate::errors::AppResult;

/// Stateful connection to a mail store with one selected folder at a time
///
/// Any `Err` is a non-OK status for that command and carries enough context
/// (folder name or sequence number) to diagnose the failure.
pub trait MailboxSession {
    /// Raw folder listing lines, `(attrs) "delim" "name"` per entry
    async fn list_folders(&mut self) -> AppResult<Vec<String>>;

    /// Select a folder, returning its message count
    async fn select_folder(&mut self, name: &str) -> AppResult<u32>;

    /// Sequence numbers of every message in the selected folder, ascending
    async fn search_all(&mut self) -> AppResult<Vec<u32>>;

    /// Header block of one message in the selected folder
    async fn fetch_header(&mut self, sequence: u32) -> AppResult<Vec<u8>>;

    /// End the session
    async fn logout(&mut self) -> AppResult<()>;
}
