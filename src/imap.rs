//! IMAP transport and session operations
//!
//! Provides a timeout-bounded [`MailboxSession`] on top of `async-imap`. All
//! connections use TLS, and timeouts are derived from [`IndexConfig`].

use std::sync::Arc;
use std::time::Duration;

use async_imap::types::{Fetch, Name, NameAttribute};
use async_imap::{Client, Session};
use futures::TryStreamExt;
use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::config::IndexConfig;
use crate::errors::{AppError, AppResult};
use crate::session::MailboxSession;

/// Type alias for authenticated IMAP session over TLS
pub type ImapSession = Session<tokio_rustls::client::TlsStream<TcpStream>>;

/// Live IMAP mailbox
pub struct ImapMailbox {
    session: ImapSession,
    socket_timeout: Duration,
    selected: Option<String>,
}

impl ImapMailbox {
    /// Connect to the IMAP server and authenticate
    ///
    /// Performs full connection sequence with timeouts:
    /// 1. TCP connect
    /// 2. TLS handshake with webpki root certificates
    /// 3. Read IMAP greeting
    /// 4. LOGIN authentication
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the hostname is invalid for TLS SNI
    /// - `Connection` if any phase fails or times out
    pub async fn connect(config: &IndexConfig) -> AppResult<Self> {
        let connect_duration = Duration::from_millis(config.connect_timeout_ms);
        let greeting_duration = Duration::from_millis(config.greeting_timeout_ms);

        let tcp = timeout(
            connect_duration,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| AppError::Connection("tcp connect timeout".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Connection(format!("tcp connect failed: {e}"))))?;

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(tls_config));

        let server_name = ServerName::try_from(config.host.clone())
            .map_err(|_| AppError::InvalidInput("invalid IMAP host for TLS SNI".to_owned()))?;
        let tls_stream = timeout(greeting_duration, connector.connect(server_name, tcp))
            .await
            .map_err(|_| AppError::Connection("TLS handshake timeout".to_owned()))
            .and_then(|r| {
                r.map_err(|e| AppError::Connection(format!("TLS handshake failed: {e}")))
            })?;

        let mut client = Client::new(tls_stream);
        let greeting = timeout(greeting_duration, client.read_response())
            .await
            .map_err(|_| AppError::Connection("IMAP greeting timeout".to_owned()))
            .and_then(|r| {
                r.map_err(|e| AppError::Connection(format!("IMAP greeting failed: {e}")))
            })?;

        if greeting.is_none() {
            return Err(AppError::Connection(
                "IMAP server closed connection before greeting".to_owned(),
            ));
        }

        let pass = config.pass.expose_secret();
        let session = timeout(greeting_duration, client.login(config.user.as_str(), pass))
            .await
            .map_err(|_| AppError::Connection("IMAP login timeout".to_owned()))
            .and_then(|r| r.map_err(|(e, _)| AppError::Connection(format!("login failed: {e}"))))?;

        debug!(host = %config.host, port = config.port, "authenticated");
        Ok(Self {
            session,
            socket_timeout: Duration::from_millis(config.socket_timeout_ms),
            selected: None,
        })
    }

    fn selected_folder(&self) -> &str {
        self.selected.as_deref().unwrap_or("<none>")
    }
}

impl MailboxSession for ImapMailbox {
    async fn list_folders(&mut self) -> AppResult<Vec<String>> {
        let stream = timeout(self.socket_timeout, self.session.list(None, Some("*")))
            .await
            .map_err(|_| AppError::Protocol("LIST timed out".to_owned()))
            .and_then(|r| r.map_err(|e| AppError::Protocol(format!("LIST failed: {e}"))))?;

        let names: Vec<Name> = timeout(self.socket_timeout, stream.try_collect())
            .await
            .map_err(|_| AppError::Protocol("LIST stream timed out".to_owned()))
            .and_then(|r| r.map_err(|e| AppError::Protocol(format!("LIST stream failed: {e}"))))?;

        Ok(names.iter().map(listing_line).collect())
    }

    async fn select_folder(&mut self, name: &str) -> AppResult<u32> {
        let mailbox = timeout(self.socket_timeout, self.session.select(name))
            .await
            .map_err(|_| AppError::Protocol(format!("SELECT timed out for folder '{name}'")))
            .and_then(|r| {
                r.map_err(|e| AppError::Protocol(format!("cannot select folder '{name}': {e}")))
            })?;
        self.selected = Some(name.to_owned());
        Ok(mailbox.exists)
    }

    async fn search_all(&mut self) -> AppResult<Vec<u32>> {
        let folder = self.selected_folder().to_owned();
        let set = timeout(self.socket_timeout, self.session.search("ALL"))
            .await
            .map_err(|_| AppError::Protocol(format!("SEARCH timed out in folder '{folder}'")))
            .and_then(|r| {
                r.map_err(|e| AppError::Protocol(format!("SEARCH failed in folder '{folder}': {e}")))
            })?;
        let mut seqs: Vec<u32> = set.into_iter().collect();
        seqs.sort_unstable();
        Ok(seqs)
    }

    /// Uses `BODY.PEEK[HEADER]` so indexing never sets `\Seen`
    async fn fetch_header(&mut self, sequence: u32) -> AppResult<Vec<u8>> {
        let folder = self.selected_folder().to_owned();
        let stream = timeout(
            self.socket_timeout,
            self.session.fetch(sequence.to_string(), "BODY.PEEK[HEADER]"),
        )
        .await
        .map_err(|_| {
            AppError::Protocol(format!("FETCH timed out for msg {sequence} in '{folder}'"))
        })
        .and_then(|r| {
            r.map_err(|e| {
                AppError::Protocol(format!("FETCH failed for msg {sequence} in '{folder}': {e}"))
            })
        })?;
        let fetches: Vec<Fetch> = timeout(self.socket_timeout, stream.try_collect())
            .await
            .map_err(|_| {
                AppError::Protocol(format!("FETCH stream timed out for msg {sequence}"))
            })
            .and_then(|r| {
                r.map_err(|e| {
                    AppError::Protocol(format!("FETCH stream failed for msg {sequence}: {e}"))
                })
            })?;

        header_for_sequence(
            fetches
                .iter()
                .map(|f| (f.message, f.header().or_else(|| f.body()))),
            sequence,
        )
        .ok_or_else(|| {
            AppError::Protocol(format!(
                "no header returned for msg {sequence} in '{folder}'"
            ))
        })
    }

    async fn logout(&mut self) -> AppResult<()> {
        timeout(self.socket_timeout, self.session.logout())
            .await
            .map_err(|_| AppError::Protocol("LOGOUT timed out".to_owned()))
            .and_then(|r| r.map_err(|e| AppError::Protocol(format!("LOGOUT failed: {e}"))))
    }
}

/// Pick the header of the FETCH response for `sequence`
///
/// Responses for other messages (unsolicited FETCHes) are never used.
fn header_for_sequence<'a>(
    responses: impl IntoIterator<Item = (u32, Option<&'a [u8]>)>,
    sequence: u32,
) -> Option<Vec<u8>> {
    responses
        .into_iter()
        .find(|(seq, _)| *seq == sequence)
        .and_then(|(_, header)| header)
        .map(<[u8]>::to_vec)
}

/// Render a LIST response back into its `(attrs) "delim" "name"` form
fn listing_line(name: &Name) -> String {
    let attributes = name
        .attributes()
        .iter()
        .map(render_attribute)
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "({attributes}) \"{}\" \"{}\"",
        name.delimiter().unwrap_or_default(),
        name.name()
    )
}

fn render_attribute(attr: &NameAttribute<'_>) -> String {
    match attr {
        NameAttribute::NoInferiors => "\\Noinferiors".to_owned(),
        NameAttribute::NoSelect => "\\Noselect".to_owned(),
        NameAttribute::Extension(label) => label.to_string(),
        other => format!("\\{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use async_imap::types::NameAttribute;

    use super::{header_for_sequence, render_attribute};

    #[test]
    fn renders_attributes_in_wire_form() {
        assert_eq!(render_attribute(&NameAttribute::NoSelect), "\\Noselect");
        assert_eq!(render_attribute(&NameAttribute::NoInferiors), "\\Noinferiors");
        assert_eq!(render_attribute(&NameAttribute::Marked), "\\Marked");
        assert_eq!(
            render_attribute(&NameAttribute::Extension(Cow::Borrowed("\\HasNoChildren"))),
            "\\HasNoChildren"
        );
    }

    #[test]
    fn header_is_taken_only_from_the_requested_message() {
        let responses = [(7, Some(&b"Message-ID: <other@x>\r\n\r\n"[..])), (3, None)];
        assert_eq!(header_for_sequence(responses, 3), None);
        assert_eq!(header_for_sequence(responses, 9), None);

        let responses = [
            (7, Some(&b"Message-ID: <other@x>\r\n\r\n"[..])),
            (3, Some(&b"Message-ID: <mine@x>\r\n\r\n"[..])),
        ];
        assert_eq!(
            header_for_sequence(responses, 3).as_deref(),
            Some(&b"Message-ID: <mine@x>\r\n\r\n"[..])
        );
    }
}
