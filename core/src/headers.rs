//! Header merging.
//!
//! Response headers accumulate: a second value for the same name is appended
//! to the existing line with `,`. Request headers are injected as new lines,
//! duplicates permitted, the way an incoming request's header list works.

use crate::HEADER_MERGE_SEPARATOR;

/// One header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

/// Ordered list of header lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    entries: Vec<Header>,
}

impl HeaderList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create-or-append. Names compare case-sensitively.
    ///
    /// If no line named `name` exists, push one. Otherwise append `,` and
    /// `value` to the first such line.
    pub fn merge(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|h| h.name == name) {
            Some(existing) => {
                existing
                    .value
                    .reserve(HEADER_MERGE_SEPARATOR.len() + value.len());
                existing.value.push_str(HEADER_MERGE_SEPARATOR);
                existing.value.push_str(value);
            }
            None => self.inject(name, value),
        }
    }

    /// Push a new line, even if the name already exists.
    pub fn inject(&mut self, name: &str, value: &str) {
        self.entries.push(Header {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    /// Value of the first line named exactly `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.value.as_str())
    }

    /// Values of every line named exactly `name`.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |h| h.name == name)
            .map(|h| h.value.as_str())
    }

    /// Iterate over lines in order.
    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.entries.iter()
    }

    /// Number of lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderList {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(name, value)| Header {
                    name: name.into(),
                    value: value.into(),
                })
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a HeaderList {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
