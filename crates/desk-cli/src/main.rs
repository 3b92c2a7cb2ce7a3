//! # desk CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use desk_cli::openapi::{run_openapi, OpenapiArgs};
use desk_cli::plan::{run_plan, PlanArgs};
use desk_cli::workflow::{run_workflow, WorkflowArgs};

/// servicedesk operator toolchain.
///
/// Validates workflow definitions, runs sprint planning arithmetic on local
/// files, and exports the API document.
#[derive(Parser, Debug)]
#[command(name = "desk", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Workflow definition checks.
    Workflow(WorkflowArgs),

    /// Sprint capacity and velocity planning.
    Plan(PlanArgs),

    /// Export the OpenAPI document.
    Openapi(OpenapiArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Workflow(args) => run_workflow(&args),
        Commands::Plan(args) => run_plan(&args),
        Commands::Openapi(args) => run_openapi(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use desk_cli::plan::PlanCommand;
    use desk_cli::workflow::WorkflowCommand;
    use std::path::PathBuf;

    #[test]
    fn parse_workflow_validate() {
        let cli = Cli::try_parse_from(["desk", "workflow", "validate", "flow.yaml"]).unwrap();
        let Commands::Workflow(args) = cli.command else {
            panic!("expected workflow");
        };
        let WorkflowCommand::Validate { file } = args.command;
        assert_eq!(file, PathBuf::from("flow.yaml"));
    }

    #[test]
    fn parse_plan_velocity_defaults_window() {
        let cli = Cli::try_parse_from(["desk", "plan", "velocity", "history.json"]).unwrap();
        let Commands::Plan(args) = cli.command else {
            panic!("expected plan");
        };
        match args.command {
            PlanCommand::Velocity { window, .. } => assert_eq!(window, desk_engine::DEFAULT_WINDOW),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_plan_velocity_window() {
        let cli =
            Cli::try_parse_from(["desk", "-v", "plan", "velocity", "h.yaml", "--window", "6"]).unwrap();
        assert_eq!(cli.verbose, 1);
        let Commands::Plan(args) = cli.command else {
            panic!("expected plan");
        };
        assert!(matches!(args.command, PlanCommand::Velocity { window: 6, .. }));
    }

    #[test]
    fn parse_openapi_out() {
        let cli = Cli::try_parse_from(["desk", "openapi", "--out", "api.json"]).unwrap();
        let Commands::Openapi(args) = cli.command else {
            panic!("expected openapi");
        };
        assert_eq!(args.out, Some(PathBuf::from("api.json")));
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["desk", "deploy"]).is_err());
    }
}
