//! Folder listing parser
//!
//! Parses LIST entries of the shape `(attr1 attr2) "delim" "name"` and keeps
//! only the selectable leaf folders. The grammar accepted here is narrower
//! than RFC 3501 on purpose: anything that does not match comes back as the
//! empty listing and is skipped, never treated as an error.

use regex::Regex;
use tracing::warn;

use crate::errors::{AppError, AppResult};

/// Attributes marking a folder as having no children
const LEAF_ATTRIBUTES: [&str; 2] = ["\\HasNoChildren", "\\Noinferiors"];
/// Attributes marking a folder that cannot be selected at all
const UNSELECTABLE_ATTRIBUTES: [&str; 2] = ["\\Noselect", "\\NonExistent"];

/// One parsed folder listing entry
///
/// All three fields are empty when the source line was malformed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderListing {
    /// Raw attribute text between the parentheses
    pub attributes: String,
    /// Hierarchy delimiter
    pub delimiter: String,
    /// Folder name exactly as the server spells it
    pub name: String,
}

impl FolderListing {
    /// True for the "not a selectable folder" result of a malformed line
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// Iterate over individual attribute flags
    pub fn attribute_set(&self) -> impl Iterator<Item = &str> {
        self.attributes.split_whitespace()
    }

    fn has_attribute(&self, wanted: &[&str]) -> bool {
        self.attribute_set()
            .any(|attr| wanted.iter().any(|w| attr.eq_ignore_ascii_case(w)))
    }

    /// Whether this entry is a leaf folder that may be selected directly
    pub fn is_selectable_leaf(&self) -> bool {
        !self.is_empty()
            && self.has_attribute(&LEAF_ATTRIBUTES)
            && !self.has_attribute(&UNSELECTABLE_ATTRIBUTES)
    }
}

/// Parser for raw LIST entries
#[derive(Debug, Clone)]
pub struct ListingParser {
    pattern: Regex,
}

impl ListingParser {
    /// Build the parser
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the listing pattern fails to compile.
    pub fn new() -> AppResult<Self> {
        let pattern = Regex::new(r#"\(([^)]+)\) "([^"]*)" "([^"]*)""#)
            .map_err(|e| AppError::InvalidInput(format!("invalid listing regex: {e}")))?;
        Ok(Self { pattern })
    }

    /// Parse one raw listing line
    ///
    /// Returns the empty listing when the line does not have the expected
    /// shape.
    pub fn parse(&self, line: &str) -> FolderListing {
        let Some(caps) = self.pattern.captures(line) else {
            return FolderListing::default();
        };
        let group = |i: usize| caps.get(i).map_or("", |m| m.as_str()).to_owned();
        FolderListing {
            attributes: group(1),
            delimiter: group(2),
            name: group(3),
        }
    }

    /// Parse a full listing and keep the selectable leaf folders in order
    ///
    /// Malformed lines are logged and dropped.
    pub fn leaf_folders<S: AsRef<str>>(&self, lines: &[S]) -> Vec<FolderListing> {
        lines
            .iter()
            .filter_map(|line| {
                let line = line.as_ref();
                let listing = self.parse(line);
                if listing.is_empty() {
                    warn!(line, "skipping unparseable folder listing entry");
                    return None;
                }
                listing.is_selectable_leaf().then_some(listing)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{FolderListing, ListingParser};

    fn parser() -> ListingParser {
        ListingParser::new().expect("pattern compiles")
    }

    #[test]
    fn parses_well_formed_line() {
        let listing = parser().parse(r#"(\HasNoChildren) "/" "INBOX""#);
        assert_eq!(listing.attributes, r"\HasNoChildren");
        assert_eq!(listing.delimiter, "/");
        assert_eq!(listing.name, "INBOX");
        assert!(listing.is_selectable_leaf());
    }

    #[test]
    fn keeps_spaces_and_hierarchy_in_names() {
        let listing = parser().parse(r#"(\HasNoChildren \Sent) "/" "[Gmail]/Sent Mail""#);
        assert_eq!(listing.name, "[Gmail]/Sent Mail");
        assert_eq!(listing.attribute_set().count(), 2);
    }

    #[test]
    fn malformed_lines_yield_the_empty_listing() {
        let p = parser();
        for line in [
            "",
            "garbage",
            r#"() "/" "INBOX""#,
            r#"(\HasNoChildren) NIL "INBOX""#,
            r#"(\HasNoChildren) "/" INBOX"#,
        ] {
            assert_eq!(p.parse(line), FolderListing::default(), "line: {line}");
        }
    }

    #[test]
    fn leaf_filter_drops_parents_and_unselectable_folders() {
        let lines = [
            r#"(\HasNoChildren) "/" "INBOX""#,
            r#"(\HasChildren) "/" "Work""#,
            r#"(\HasNoChildren \Noselect) "/" "Ghost""#,
            "not a listing line",
            r#"(\Noinferiors) "." "Archive""#,
        ];
        let names: Vec<String> = parser()
            .leaf_folders(&lines)
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["INBOX".to_owned(), "Archive".to_owned()]);
    }

    #[test]
    fn attribute_match_is_case_insensitive() {
        let listing = parser().parse(r#"(\hasnochildren) "/" "Lists""#);
        assert!(listing.is_selectable_leaf());
    }
}
