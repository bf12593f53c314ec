//! Message identifier extraction from raw header bytes

use mailparse::MailHeaderMap;

/// Extract the Message-ID from a raw header block
///
/// Field-name lookup is case-insensitive and folded continuation lines are
/// unfolded by `mailparse`. Surrounding whitespace is trimmed; a blank or
/// absent field yields `None`. Header blocks that fail to parse are treated
/// the same as a missing field, since no stable identifier can be derived.
pub fn message_identifier(header_bytes: &[u8]) -> Option<String> {
    let (headers, _) = mailparse::parse_headers(header_bytes).ok()?;
    let value = headers.get_first_value("Message-ID")?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}
