//! Takeoff command - evaluate a flight and apply the release

use std::io::IsTerminal;
use std::time::Duration;

use clap::Args;
use tokio_util::sync::CancellationToken;

use airlift_kube::{FlightSpec, TakeoffParams};

use crate::error::Result;

#[derive(Args, Debug)]
pub struct TakeoffArgs {
    /// Release name
    pub release: String,

    /// Flight path or http(s) URL
    pub flight: String,

    /// Write rendered resources to this directory instead of applying;
    /// `-` writes to stdout
    #[arg(long)]
    pub out: Option<String>,

    /// Preferred namespace for resources that do not define one
    #[arg(short, long, default_value = "default")]
    pub namespace: String,

    /// Skip the dry-run admission phase before applying
    #[arg(long)]
    pub skip_dry_run: bool,

    /// Force apply changes on field manager conflicts
    #[arg(long)]
    pub force_conflicts: bool,

    /// Apply custom resource definitions found in the flight
    #[arg(long)]
    pub create_crds: bool,

    /// Apply namespace resources found in the flight
    #[arg(long)]
    pub create_namespaces: bool,

    /// Execute the flight and print its output without touching the cluster
    #[arg(long)]
    pub test_run: bool,

    /// Show the diff against the current revision without applying
    #[arg(long)]
    pub diff_only: bool,

    /// Lines of context in diffs
    #[arg(long, default_value_t = 4)]
    pub context: usize,

    /// Colored diff output
    #[arg(
        long,
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        default_value_t = std::io::stdout().is_terminal(),
    )]
    pub color: bool,

    /// Time to wait for the release to become ready
    #[arg(long, value_parser = humantime::parse_duration)]
    pub wait: Option<Duration>,

    /// Interval to poll resource state at; used with --wait
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5s")]
    pub poll: Duration,

    /// Arguments forwarded to the flight
    #[arg(last = true)]
    pub args: Vec<String>,
}

pub async fn run(
    args: TakeoffArgs,
    system_namespace: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let flight = FlightSpec {
        source: args.flight,
        input: super::stdin_input()?,
        args: args.args,
        namespace: args.namespace,
    };

    // A test run never needs the cluster: evaluate and print, done.
    if args.test_run {
        let (stdout, _) = airlift_kube::evaluate_flight(&args.release, &flight, cancel).await?;
        use std::io::Write;
        std::io::stdout().write_all(&stdout)?;
        return Ok(());
    }

    let quiet = args.diff_only || args.out.is_some();

    let reconciler = super::reconciler(system_namespace).await?;

    let params = TakeoffParams {
        release: args.release.clone(),
        flight,
        out: args.out,
        skip_dry_run: args.skip_dry_run,
        force_conflicts: args.force_conflicts,
        create_crds: args.create_crds,
        create_namespaces: args.create_namespaces,
        diff_only: args.diff_only,
        context: args.context,
        color: args.color,
        wait: args.wait,
        poll: args.poll,
    };

    reconciler.takeoff(params, cancel).await?;

    if !quiet {
        use console::style;
        println!(
            "{} Release {} applied",
            style("✓").green().bold(),
            style(&args.release).cyan()
        );
    }
    Ok(())
}
