//! FSPIOP message headers.

use std::collections::BTreeMap;

/// Header carrying the participant that sent the message.
pub const FSPIOP_SOURCE: &str = "fspiop-source";

/// Header carrying the participant the message is addressed to.
pub const FSPIOP_DESTINATION: &str = "fspiop-destination";

/// Headers that belong to a single hop and are never relayed.
const HOP_BY_HOP: [&str; 4] = ["host", "content-length", "connection", "transfer-encoding"];

/// Inbound message headers, keyed by lower-cased header name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    entries: BTreeMap<String, String>,
}

impl MessageHeaders {
    /// Creates an empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header, replacing any previous value.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.entries.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Looks up a header by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The `FSPIOP-Source` participant.
    pub fn source(&self) -> Option<&str> {
        self.get(FSPIOP_SOURCE)
    }

    /// The `FSPIOP-Destination` participant.
    pub fn destination(&self) -> Option<&str> {
        self.get(FSPIOP_DESTINATION)
    }

    /// Headers that may be copied onto an outbound request.
    pub fn outbound(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter(|(name, _)| !HOP_BY_HOP.contains(&name.as_str()))
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Iterates over all headers.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for MessageHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = MessageHeaders::new();
        for (name, value) in iter {
            headers.insert(name.as_ref(), value);
        }
        headers
    }
}
