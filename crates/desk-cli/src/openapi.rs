//! # OpenAPI Subcommand
//!
//! Writes the document the server serves at `/openapi.json`, for client
//! generation without a running instance.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use desk_api::openapi::ApiDoc;
use utoipa::OpenApi;

use crate::input::to_pretty_json;

#[derive(Args, Debug)]
pub struct OpenapiArgs {
    /// Write to this file instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// The API document as pretty JSON.
pub fn render() -> Result<String> {
    to_pretty_json(&ApiDoc::openapi())
}

pub fn run_openapi(args: &OpenapiArgs) -> Result<u8> {
    let doc = render()?;
    match &args.out {
        Some(path) => {
            std::fs::write(path, doc)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "OpenAPI document written");
        }
        None => print!("{doc}"),
    }
    Ok(0)
}
