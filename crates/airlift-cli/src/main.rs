//! Airlift CLI - the Kubernetes package manager powered by WebAssembly flights
//!
//! Release manifests are computed by executing a sandboxed WASM program (a
//! "flight") rather than templating YAML. The subcommands map one-to-one
//! onto engine operations: takeoff (apply), descent (rollback), mayday
//! (delete), turbulence (drift), blackbox (inspect).

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;
use tokio_util::sync::CancellationToken;

mod commands;
mod error;
mod exit_codes;

use commands::{
    blackbox::BlackboxArgs, descent::DescentArgs, exec::ExecArgs, mayday::MaydayArgs,
    takeoff::TakeoffArgs, turbulence::TurbulenceArgs,
};
use error::{CliError, Result};

#[derive(Parser)]
#[command(name = "airlift")]
#[command(author = "Airlift Contributors")]
#[command(version)]
#[command(about = "The Kubernetes package manager powered by WebAssembly flights", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Namespace where airlift persists revisions and the ownership mapping
    #[arg(long, global = true, default_value = "kube-system")]
    system_namespace: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a flight and apply the release to the cluster
    #[command(visible_alias = "up")]
    Takeoff(TakeoffArgs),

    /// Roll a release back to an earlier revision
    #[command(visible_alias = "down")]
    Descent(DescentArgs),

    /// Delete a release, its resources, and its revision history
    #[command(visible_alias = "delete")]
    Mayday(MaydayArgs),

    /// Detect drift between declared and live state, optionally fixing it
    Turbulence(TurbulenceArgs),

    /// Run a flight locally and print its output; no cluster access
    Exec(ExecArgs),

    /// Inspect recorded releases, revisions, and ownership
    #[command(visible_alias = "inspect")]
    Blackbox(BlackboxArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    miette::set_panic_hook();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    match dispatch(cli, &cancel).await {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS),
        Err(err) if err.is_warning() => {
            eprintln!("{} {}", style("Warning:").yellow().bold(), err);
            ExitCode::from(err.exit_code())
        }
        Err(err) => {
            eprintln!("{} {}", style("Error:").red().bold(), err);
            ExitCode::from(err.exit_code())
        }
    }
}

async fn dispatch(cli: Cli, cancel: &CancellationToken) -> Result<()> {
    let system_namespace = cli.system_namespace.clone();

    let operation = async {
        match cli.command {
            Commands::Takeoff(args) => commands::takeoff::run(args, &system_namespace, cancel).await,
            Commands::Descent(args) => commands::descent::run(args, &system_namespace).await,
            Commands::Mayday(args) => commands::mayday::run(args, &system_namespace).await,
            Commands::Turbulence(args) => {
                commands::turbulence::run(args, &system_namespace).await
            }
            Commands::Exec(args) => commands::exec::run(args, cancel).await,
            Commands::Blackbox(args) => commands::blackbox::run(args, &system_namespace).await,
        }
    };

    // One signal cancels all in-flight work. Partial progress is not
    // rolled back; the next invocation reconciles.
    tokio::select! {
        result = operation => result,
        _ = cancel.cancelled() => Err(CliError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_takeoff_parses_flight_args_after_separator() {
        let cli = Cli::try_parse_from([
            "airlift", "takeoff", "foo", "./flight.wasm", "--wait", "2m", "--", "--replicas", "3",
        ])
        .unwrap();

        match cli.command {
            Commands::Takeoff(args) => {
                assert_eq!(args.release, "foo");
                assert_eq!(args.flight, "./flight.wasm");
                assert_eq!(args.wait, Some(std::time::Duration::from_secs(120)));
                assert_eq!(args.args, vec!["--replicas", "3"]);
                assert_eq!(args.namespace, "default");
            }
            _ => panic!("expected takeoff"),
        }
    }

    #[test]
    fn test_takeoff_requires_release_and_flight() {
        assert!(Cli::try_parse_from(["airlift", "takeoff"]).is_err());
        assert!(Cli::try_parse_from(["airlift", "takeoff", "foo"]).is_err());
    }

    #[test]
    fn test_descent_parses_revision() {
        let cli = Cli::try_parse_from(["airlift", "descent", "foo", "2"]).unwrap();
        match cli.command {
            Commands::Descent(args) => {
                assert_eq!(args.release, "foo");
                assert_eq!(args.revision, 2);
            }
            _ => panic!("expected descent"),
        }
    }

    #[test]
    fn test_descent_rejects_non_numeric_revision() {
        assert!(Cli::try_parse_from(["airlift", "descent", "foo", "two"]).is_err());
    }

    #[test]
    fn test_turbulence_conflict_only_defaults_on() {
        let cli = Cli::try_parse_from(["airlift", "turbulence", "foo"]).unwrap();
        match cli.command {
            Commands::Turbulence(args) => {
                assert!(args.conflict_only);
                assert!(!args.fix);
            }
            _ => panic!("expected turbulence"),
        }

        let cli =
            Cli::try_parse_from(["airlift", "turbulence", "foo", "--conflict-only=false"])
                .unwrap();
        match cli.command {
            Commands::Turbulence(args) => assert!(!args.conflict_only),
            _ => panic!("expected turbulence"),
        }
    }

    #[test]
    fn test_blackbox_positional_modes() {
        let cli = Cli::try_parse_from(["airlift", "blackbox"]).unwrap();
        match cli.command {
            Commands::Blackbox(args) => {
                assert!(args.release.is_none());
                assert!(!args.mapping);
            }
            _ => panic!("expected blackbox"),
        }

        let cli = Cli::try_parse_from(["airlift", "blackbox", "foo", "1", "3"]).unwrap();
        match cli.command {
            Commands::Blackbox(args) => {
                assert_eq!(args.release.as_deref(), Some("foo"));
                assert_eq!(args.revision, Some(1));
                assert_eq!(args.diff_revision, Some(3));
            }
            _ => panic!("expected blackbox"),
        }
    }

    #[test]
    fn test_system_namespace_is_global() {
        let cli = Cli::try_parse_from([
            "airlift",
            "mayday",
            "foo",
            "--system-namespace",
            "airlift-system",
        ])
        .unwrap();
        assert_eq!(cli.system_namespace, "airlift-system");
    }
}
