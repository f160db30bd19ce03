//! Record ID generation and resolution
//!
//! All IDs use the format: `{kind}-{12-char-hex}`
//! Example: `task-5c1e07a9d3b2`

use std::collections::HashMap;

/// Number of hex characters kept from the UUID
const ID_HEX_LEN: usize = 12;

/// Generate a record ID for the given kind
///
/// The hex part is taken from the random tail of a UUIDv7, so IDs minted in
/// the same millisecond still differ.
pub fn generate_id(kind: &str) -> String {
    let uuid = uuid::Uuid::now_v7().simple().to_string();
    let tail = &uuid[uuid.len() - ID_HEX_LEN..];
    format!("{}-{}", kind, tail)
}

/// ID resolution for partial matches
pub struct IdResolver<'a> {
    ids: &'a HashMap<String, String>, // id -> display name
}

impl<'a> IdResolver<'a> {
    pub fn new(ids: &'a HashMap<String, String>) -> Self {
        Self { ids }
    }

    /// Resolve a partial reference to a full ID
    ///
    /// Returns:
    /// - Ok(Some(id)) if exactly one match
    /// - Ok(None) if no matches
    /// - Err with candidates if ambiguous
    pub fn resolve(&self, reference: &str) -> Result<Option<String>, Vec<String>> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Ok(None);
        }

        // An exact ID always wins, even if it is also a prefix of another one
        if self.ids.contains_key(reference) {
            return Ok(Some(reference.to_string()));
        }

        let mut matches: Vec<String> = self
            .ids
            .iter()
            .filter(|(id, name)| Self::matches(id, name, reference))
            .map(|(id, _)| id.clone())
            .collect();
        matches.sort();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => Err(matches),
        }
    }

    /// Check if an ID matches a reference
    fn matches(id: &str, name: &str, reference: &str) -> bool {
        // Prefix of the full ID
        if id.starts_with(reference) {
            return true;
        }

        // Prefix of the hex part
        if id.split_once('-').is_some_and(|(_, hex)| hex.starts_with(reference)) {
            return true;
        }

        // Display name, case-insensitive
        name.eq_ignore_ascii_case(reference)
    }
}
