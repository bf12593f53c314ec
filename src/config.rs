//! Configuration for the indexing run
//!
//! Credentials come from the two positional CLI arguments. Everything else is
//! loaded from environment variables following the pattern `MAIL_INDEX_<KEY>`,
//! with defaults pointing at the Gmail IMAP endpoint over TLS.

use std::env;
use std::env::VarError;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use secrecy::SecretString;

use crate::errors::{AppError, AppResult};
use crate::indexer::ErrorPolicy;

/// Default mail store host
pub const DEFAULT_HOST: &str = "imap.googlemail.com";
/// Default IMAPS port
pub const DEFAULT_PORT: u16 = 993;
/// Default catalog database file
pub const DEFAULT_DB_PATH: &str = "mail-index.db";

/// Command line arguments
#[derive(Debug, Parser)]
#[command(
    name = "mail-index",
    version,
    about = "Catalog which messages live in which IMAP folders"
)]
pub struct Cli {
    /// Account identifier used for LOGIN
    pub account: String,
    /// Credential secret used for LOGIN
    pub secret: String,
    /// Catalog database path (overrides MAIL_INDEX_DB_PATH)
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,
}

/// Fully resolved configuration for one indexing run
///
/// The password is stored using `SecretString` to prevent accidental logging.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// IMAP server hostname
    pub host: String,
    /// IMAP server port (TLS)
    pub port: u16,
    /// Username for authentication
    pub user: String,
    /// Password stored in a type that prevents accidental logging
    pub pass: SecretString,
    /// SQLite catalog location
    pub db_path: PathBuf,
    /// TCP connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// IMAP greeting/TLS handshake/LOGIN timeout in milliseconds
    pub greeting_timeout_ms: u64,
    /// Per-command socket timeout in milliseconds
    pub socket_timeout_ms: u64,
    /// What to do when a folder-scoped error occurs mid-walk
    pub error_policy: ErrorPolicy,
}

impl IndexConfig {
    /// Resolve configuration from CLI arguments and the environment
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the credentials are blank or an environment
    /// variable is set to a malformed value.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// MAIL_INDEX_HOST=imap.example.com
    /// MAIL_INDEX_PORT=993
    /// MAIL_INDEX_DB_PATH=/var/lib/mail-index/catalog.db
    /// MAIL_INDEX_ON_ERROR=skip-folder
    /// ```
    pub fn load(cli: Cli) -> AppResult<Self> {
        if cli.account.trim().is_empty() {
            return Err(AppError::invalid("account identifier must not be empty"));
        }
        if cli.secret.is_empty() {
            return Err(AppError::invalid("credential secret must not be empty"));
        }

        let db_path = match cli.db {
            Some(path) => path,
            None => PathBuf::from(
                optional_env("MAIL_INDEX_DB_PATH")?.unwrap_or_else(|| DEFAULT_DB_PATH.to_owned()),
            ),
        };

        Ok(Self {
            host: optional_env("MAIL_INDEX_HOST")?.unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port: parse_env("MAIL_INDEX_PORT", DEFAULT_PORT)?,
            user: cli.account,
            pass: SecretString::new(cli.secret.into()),
            db_path,
            connect_timeout_ms: parse_env("MAIL_INDEX_CONNECT_TIMEOUT_MS", 30_000)?,
            greeting_timeout_ms: parse_env("MAIL_INDEX_GREETING_TIMEOUT_MS", 15_000)?,
            socket_timeout_ms: parse_env("MAIL_INDEX_SOCKET_TIMEOUT_MS", 300_000)?,
            error_policy: parse_env("MAIL_INDEX_ON_ERROR", ErrorPolicy::default())?,
        })
    }
}

/// Read an optional environment variable, treating blank values as unset
fn optional_env(key: &str) -> AppResult<Option<String>> {
    match env::var(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => Ok(Some(v.trim().to_owned())),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Parse an environment variable with default fallback
///
/// Returns `default` if unset or blank.
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set but does not parse.
fn parse_env<T: FromStr>(key: &str, default: T) -> AppResult<T> {
    match optional_env(key)? {
        Some(v) => parse_value(key, &v),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> AppResult<T> {
    value.parse::<T>().map_err(|_| {
        AppError::InvalidInput(format!("invalid environment variable {key}: '{value}'"))
    })
}

#[cfg(test)]
mod tests {
    use super::{Cli, IndexConfig, parse_value};
    use crate::indexer::ErrorPolicy;

    fn cli(account: &str, secret: &str) -> Cli {
        Cli {
            account: account.to_owned(),
            secret: secret.to_owned(),
            db: Some("catalog.db".into()),
        }
    }

    #[test]
    fn parse_value_reads_ports_and_policies() {
        assert_eq!(parse_value::<u16>("P", "993").expect("valid port"), 993);
        assert_eq!(
            parse_value::<ErrorPolicy>("P", "skip-folder").expect("valid policy"),
            ErrorPolicy::SkipFolder
        );
    }

    #[test]
    fn parse_value_rejects_garbage_and_names_the_key() {
        let err = parse_value::<u16>("MAIL_INDEX_PORT", "99999").expect_err("must fail");
        assert!(err.to_string().contains("MAIL_INDEX_PORT"));
    }

    #[test]
    fn load_rejects_blank_credentials() {
        let err = IndexConfig::load(cli("  ", "pw")).expect_err("must fail");
        assert!(err.to_string().contains("account"));

        let err = IndexConfig::load(cli("user@example.com", "")).expect_err("must fail");
        assert!(err.to_string().contains("secret"));
    }

    #[test]
    fn db_flag_wins_over_default_path() {
        let config = IndexConfig::load(cli("user@example.com", "pw")).expect("config loads");
        assert_eq!(config.db_path, std::path::PathBuf::from("catalog.db"));
        assert_eq!(config.user, "user@example.com");
    }
}
