//! # desk-cli: servicedesk Command-Line Interface
//!
//! Offline tooling for operators. Nothing here talks to a running server:
//! every subcommand reads local files and prints pretty JSON.
//!
//! ## Subcommands
//!
//! - `workflow validate`: structural checks on a workflow definition
//! - `plan capacity`: sprint capacity and point forecast
//! - `plan velocity`: velocity summary over recent sprints
//! - `openapi`: export the API document
//!
//! Input files are YAML (`.yaml`, `.yml`) or JSON, chosen by extension.

pub mod input;
pub mod openapi;
pub mod plan;
pub mod workflow;
