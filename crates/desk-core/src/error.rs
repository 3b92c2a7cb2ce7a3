//! # Validation Errors
//!
//! Errors raised by validated constructors in this crate. The API layer maps
//! every variant to a 422 response.

use thiserror::Error;

/// A value failed domain validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Project key does not match `[A-Z][A-Z0-9]{1,9}`.
    #[error("invalid project key {0:?}: expected 2-10 uppercase letters or digits starting with a letter")]
    InvalidProjectKey(String),

    /// Business hours window is empty or out of the 0-24 range.
    #[error("invalid business hours {start}:00-{end}:00")]
    InvalidBusinessHours {
        /// Opening hour.
        start: u32,
        /// Closing hour.
        end: u32,
    },

    /// Ticket number string could not be parsed.
    #[error("invalid ticket number: {0}")]
    InvalidTicketNumber(String),

    /// Date range where the end precedes the start.
    #[error("date range ends ({end}) before it starts ({start})")]
    InvertedRange {
        /// Range start.
        start: String,
        /// Range end.
        end: String,
    },
}
