// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Domain names as label sequences.
//!
//! Comparison and hashing are ASCII case-insensitive per RFC 1035 Section
//! 2.3.3; the on-wire spelling is preserved so re-encoded names keep the
//! case a peer originally used.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A label may not exceed 63 bytes on the wire (length octet top bits are
/// reserved for compression pointers).
pub const MAX_LABEL_LEN: usize = 63;

/// Encoded form (length octets + labels + terminator) may not exceed 255.
pub const MAX_NAME_LEN: usize = 255;

/// Errors constructing a [`DomainName`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// A single label exceeds [`MAX_LABEL_LEN`] bytes.
    LabelTooLong(usize),
    /// The encoded name would exceed [`MAX_NAME_LEN`] bytes.
    NameTooLong(usize),
    /// Empty label in the middle of a name (e.g. "a..b").
    EmptyLabel,
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LabelTooLong(len) => write!(f, "label of {} bytes exceeds 63", len),
            Self::NameTooLong(len) => write!(f, "encoded name of {} bytes exceeds 255", len),
            Self::EmptyLabel => write!(f, "empty label"),
        }
    }
}

impl std::error::Error for NameError {}

/// A domain name: an ordered sequence of labels.
///
/// `x._foo._tcp.local` has labels `["x", "_foo", "_tcp", "local"]`. The
/// trailing root dot is implicit and never stored.
#[derive(Debug, Clone)]
pub struct DomainName {
    labels: Vec<String>,
}

impl DomainName {
    /// Build from labels, enforcing wire limits.
    pub fn from_labels(labels: Vec<String>) -> Result<Self, NameError> {
        let mut encoded = 1; // terminating zero octet
        for label in &labels {
            if label.is_empty() {
                return Err(NameError::EmptyLabel);
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(NameError::LabelTooLong(label.len()));
            }
            encoded += 1 + label.len();
        }
        if encoded > MAX_NAME_LEN {
            return Err(NameError::NameTooLong(encoded));
        }
        Ok(Self { labels })
    }

    /// The root name (zero labels).
    #[must_use]
    pub fn root() -> Self {
        Self { labels: Vec::new() }
    }

    #[must_use]
    #[inline]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[must_use]
    #[inline]
    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Encoded wire length (length octets + label bytes + terminator),
    /// assuming no compression.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.labels.iter().map(|l| 1 + l.len()).sum::<usize>() + 1
    }

    /// True when `self` equals `parent` or sits below it.
    ///
    /// `x._foo._tcp.local` is a subdomain of `local` and of
    /// `_foo._tcp.local`; comparison is case-insensitive.
    #[must_use]
    pub fn is_subdomain_of(&self, parent: &DomainName) -> bool {
        if parent.labels.len() > self.labels.len() {
            return false;
        }
        let offset = self.labels.len() - parent.labels.len();
        self.labels[offset..]
            .iter()
            .zip(parent.labels.iter())
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    /// Concatenate: `join("x", "_foo._tcp.local")` -> `x._foo._tcp.local`.
    pub fn join(&self, suffix: &DomainName) -> Result<Self, NameError> {
        let mut labels = self.labels.clone();
        labels.extend(suffix.labels.iter().cloned());
        Self::from_labels(labels)
    }

    /// The name with its leftmost label removed, or the root.
    #[must_use]
    pub fn parent(&self) -> Self {
        Self {
            labels: self.labels.get(1..).unwrap_or_default().to_vec(),
        }
    }

    /// Lowercased dotted form, used as a canonical lookup/dedup key.
    #[must_use]
    pub fn key(&self) -> String {
        self.to_string().to_ascii_lowercase()
    }
}

impl PartialEq for DomainName {
    fn eq(&self, other: &Self) -> bool {
        self.labels.len() == other.labels.len()
            && self
                .labels
                .iter()
                .zip(other.labels.iter())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl Eq for DomainName {}

impl Hash for DomainName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for label in &self.labels {
            for byte in label.as_bytes() {
                state.write_u8(byte.to_ascii_lowercase());
            }
            state.write_u8(b'.');
        }
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for label in &self.labels {
            if !first {
                f.write_str(".")?;
            }
            f.write_str(label)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for DomainName {
    type Err = NameError;

    /// Parse a dotted name. A single trailing root dot is accepted and
    /// dropped; interior empty labels are rejected.
    fn from_str(s: &str) -> Result<Self, NameError> {
        let trimmed = s.strip_suffix('.').unwrap_or(s);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let labels = trimmed.split('.').map(str::to_string).collect();
        Self::from_labels(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> DomainName {
        s.parse().expect("valid test name")
    }

    #[test]
    fn test_parse_and_display() {
        let n = name("x._foo._tcp.local");
        assert_eq!(n.label_count(), 4);
        assert_eq!(n.to_string(), "x._foo._tcp.local");
    }

    #[test]
    fn test_trailing_dot_dropped() {
        assert_eq!(name("x.local."), name("x.local"));
    }

    #[test]
    fn test_case_insensitive_eq_and_hash() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(name("X.Local"), 1);
        assert_eq!(map.get(&name("x.LOCAL")), Some(&1));
        assert_eq!(name("A.B"), name("a.b"));
    }

    #[test]
    fn test_case_preserved_in_display() {
        assert_eq!(name("MyHost.Local").to_string(), "MyHost.Local");
    }

    #[test]
    fn test_subdomain() {
        let local = name("local");
        assert!(name("x._foo._tcp.local").is_subdomain_of(&local));
        assert!(name("local").is_subdomain_of(&local));
        assert!(!name("x.example").is_subdomain_of(&local));
        assert!(!name("local").is_subdomain_of(&name("x.local")));
    }

    #[test]
    fn test_join() {
        let full = name("x").join(&name("_foo._tcp.local")).unwrap();
        assert_eq!(full, name("x._foo._tcp.local"));
    }

    #[test]
    fn test_label_too_long_rejected() {
        let long = "a".repeat(64);
        assert!(matches!(
            DomainName::from_str(&long),
            Err(NameError::LabelTooLong(64))
        ));
    }

    #[test]
    fn test_name_too_long_rejected() {
        let label = "a".repeat(63);
        let long = [label.as_str(); 4].join(".");
        assert!(matches!(
            DomainName::from_str(&long),
            Err(NameError::NameTooLong(_))
        ));
    }

    #[test]
    fn test_empty_interior_label_rejected() {
        assert!(matches!(
            DomainName::from_str("a..b"),
            Err(NameError::EmptyLabel)
        ));
    }

    #[test]
    fn test_encoded_len() {
        // 1+1 ("x") + 1+4 ("_foo") + 1+4 ("_tcp") + 1+5 ("local") + 1
        assert_eq!(name("x._foo._tcp.local").encoded_len(), 19);
    }
}
