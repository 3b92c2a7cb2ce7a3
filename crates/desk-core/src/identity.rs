//! # Human-Readable Identifiers
//!
//! Records are keyed by UUID internally, but people refer to them by short
//! identifiers: tasks by `PROJ-12`, tickets by `INC-000042`. The types here
//! validate and format those identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Short project key used as the task key prefix, e.g. `OPS` in `OPS-17`.
///
/// Validated on construction: 2-10 ASCII uppercase letters or digits,
/// starting with a letter. Lower-case input is upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectKey(String);

impl ProjectKey {
    /// Validate and normalize a project key.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let key = raw.as_ref().trim().to_ascii_uppercase();
        let valid_len = (2..=10).contains(&key.len());
        let starts_alpha = key.chars().next().is_some_and(|c| c.is_ascii_uppercase());
        let charset = key
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        if valid_len && starts_alpha && charset {
            Ok(Self(key))
        } else {
            Err(ValidationError::InvalidProjectKey(raw.as_ref().to_string()))
        }
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Format the task key for the `n`-th task of this project.
    pub fn task_key(&self, n: u64) -> String {
        format!("{}-{n}", self.0)
    }
}

impl TryFrom<String> for ProjectKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProjectKey> for String {
    fn from(key: ProjectKey) -> Self {
        key.0
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The ITSM record families that receive sequential ticket numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketKind {
    Incident,
    Problem,
    Change,
    Release,
}

impl TicketKind {
    /// Three-letter prefix used in ticket numbers.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Incident => "INC",
            Self::Problem => "PRB",
            Self::Change => "CHG",
            Self::Release => "REL",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "INC" => Some(Self::Incident),
            "PRB" => Some(Self::Problem),
            "CHG" => Some(Self::Change),
            "REL" => Some(Self::Release),
            _ => None,
        }
    }
}

/// A formatted ticket number such as `INC-000042`.
///
/// Sequences are allocated per organization and per [`TicketKind`]; the
/// number is zero-padded to six digits and grows beyond that if needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TicketNumber {
    kind: TicketKind,
    sequence: u64,
}

impl TicketNumber {
    /// Build a ticket number from its kind and sequence.
    pub fn new(kind: TicketKind, sequence: u64) -> Self {
        Self { kind, sequence }
    }

    /// The record family.
    pub fn kind(&self) -> TicketKind {
        self.kind
    }

    /// The numeric sequence.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for TicketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:06}", self.kind.prefix(), self.sequence)
    }
}

impl FromStr for TicketNumber {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidTicketNumber(s.to_string());
        let (prefix, digits) = s.split_once('-').ok_or_else(invalid)?;
        let kind = TicketKind::from_prefix(prefix).ok_or_else(invalid)?;
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let sequence = digits.parse::<u64>().map_err(|_| invalid())?;
        Ok(Self { kind, sequence })
    }
}

impl Serialize for TicketNumber {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TicketNumber {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_key_normalizes_case() {
        let key = ProjectKey::new("ops").unwrap();
        assert_eq!(key.as_str(), "OPS");
        assert_eq!(key.task_key(17), "OPS-17");
    }

    #[test]
    fn project_key_rejects_bad_input() {
        assert!(ProjectKey::new("A").is_err());
        assert!(ProjectKey::new("1OPS").is_err());
        assert!(ProjectKey::new("OPS-X").is_err());
        assert!(ProjectKey::new("ABCDEFGHIJK").is_err());
        assert!(ProjectKey::new("").is_err());
    }

    #[test]
    fn project_key_deserialize_validates() {
        let ok: ProjectKey = serde_json::from_str("\"web2\"").unwrap();
        assert_eq!(ok.as_str(), "WEB2");
        assert!(serde_json::from_str::<ProjectKey>("\"x\"").is_err());
    }

    #[test]
    fn ticket_number_format() {
        let n = TicketNumber::new(TicketKind::Incident, 42);
        assert_eq!(n.to_string(), "INC-000042");
        let big = TicketNumber::new(TicketKind::Change, 1_234_567);
        assert_eq!(big.to_string(), "CHG-1234567");
    }

    #[test]
    fn ticket_number_parse() {
        let n: TicketNumber = "PRB-000007".parse().unwrap();
        assert_eq!(n.kind(), TicketKind::Problem);
        assert_eq!(n.sequence(), 7);
        assert!("XYZ-000001".parse::<TicketNumber>().is_err());
        assert!("INC-".parse::<TicketNumber>().is_err());
        assert!("INC-12a".parse::<TicketNumber>().is_err());
    }

    #[test]
    fn ticket_number_serde_as_string() {
        let n = TicketNumber::new(TicketKind::Release, 3);
        let json = serde_json::to_string(&n).unwrap();
        assert_eq!(json, "\"REL-000003\"");
        let back: TicketNumber = serde_json::from_str(&json).unwrap();
        assert_eq!(back, n);
    }
}
