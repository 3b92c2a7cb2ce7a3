//! # Ticket Priority
//!
//! Priority is derived, not chosen: the reporter states the business
//! [`Impact`] and the [`Urgency`], and the ITIL matrix yields the
//! [`Priority`] that drives SLA targets and queue ordering.
//!
//! ```text
//!              Urgency
//!             High      Medium    Low
//! Impact High  CRITICAL  HIGH      MEDIUM
//!        Med   HIGH      MEDIUM    LOW
//!        Low   MEDIUM    LOW       LOW
//! ```

use serde::{Deserialize, Serialize};

/// Breadth of business impact of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Impact {
    Low,
    Medium,
    High,
}

/// How quickly the business needs a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

/// Ticket and task priority, ordered `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    /// All priorities, lowest first.
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Critical,
    ];

    /// Derive a priority from the impact x urgency matrix.
    pub fn from_matrix(impact: Impact, urgency: Urgency) -> Self {
        use Impact as I;
        use Urgency as U;
        match (impact, urgency) {
            (I::High, U::High) => Self::Critical,
            (I::High, U::Medium) | (I::Medium, U::High) => Self::High,
            (I::High, U::Low) | (I::Medium, U::Medium) | (I::Low, U::High) => Self::Medium,
            (I::Medium, U::Low) | (I::Low, U::Medium) | (I::Low, U::Low) => Self::Low,
        }
    }

    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_corners() {
        assert_eq!(Priority::from_matrix(Impact::High, Urgency::High), Priority::Critical);
        assert_eq!(Priority::from_matrix(Impact::Low, Urgency::Low), Priority::Low);
        assert_eq!(Priority::from_matrix(Impact::High, Urgency::Low), Priority::Medium);
        assert_eq!(Priority::from_matrix(Impact::Low, Urgency::High), Priority::Medium);
    }

    #[test]
    fn matrix_is_symmetric() {
        let levels = [
            (Impact::Low, Urgency::Low),
            (Impact::Medium, Urgency::Medium),
            (Impact::High, Urgency::High),
        ];
        for (i, _) in levels {
            for (_, u) in levels {
                let swapped_impact = match u {
                    Urgency::Low => Impact::Low,
                    Urgency::Medium => Impact::Medium,
                    Urgency::High => Impact::High,
                };
                let swapped_urgency = match i {
                    Impact::Low => Urgency::Low,
                    Impact::Medium => Urgency::Medium,
                    Impact::High => Urgency::High,
                };
                assert_eq!(
                    Priority::from_matrix(i, u),
                    Priority::from_matrix(swapped_impact, swapped_urgency)
                );
            }
        }
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::High < Priority::Critical);
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn serializes_screaming_case() {
        let json = serde_json::to_string(&Priority::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
        let back: Impact = serde_json::from_str("\"MEDIUM\"").unwrap();
        assert_eq!(back, Impact::Medium);
    }
}
