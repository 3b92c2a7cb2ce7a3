//! # desk-core: Foundational Types for servicedesk
//!
//! The leaf of the workspace dependency graph. Everything here is plain data
//! and pure functions; no I/O, no clocks other than values passed in.
//!
//! ## Contents
//!
//! - [`priority`]: ITIL impact x urgency matrix producing a ticket [`Priority`].
//! - [`identity`]: validated [`ProjectKey`] and formatted [`TicketNumber`].
//! - [`calendar`]: working-day counting and business-hours arithmetic used by
//!   sprint capacity, leave requests and SLA clocks.
//! - [`pagination`]: list windowing shared by every collection endpoint.
//! - [`role`]: privilege-ordered caller [`Role`].
//!
//! ## Crate Policy
//!
//! - No dependencies on other `desk-*` crates.
//! - No `unsafe` code, no `.unwrap()` outside tests.

pub mod calendar;
pub mod error;
pub mod identity;
pub mod pagination;
pub mod priority;
pub mod role;

pub use calendar::{
    add_business_minutes, business_minutes_between, is_working_day, working_dates,
    working_days_between, BusinessHours,
};
pub use error::ValidationError;
pub use identity::{ProjectKey, TicketKind, TicketNumber};
pub use pagination::{paginate, Page, PageRequest};
pub use priority::{Impact, Priority, Urgency};
pub use role::Role;
