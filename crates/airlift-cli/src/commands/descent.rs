//! Descent command - roll a release back to an earlier revision

use std::time::Duration;

use clap::Args;
use console::style;

use airlift_kube::DescentParams;

use crate::error::Result;

#[derive(Args, Debug)]
pub struct DescentArgs {
    /// Release name
    pub release: String,

    /// Revision ID to roll back to (see `airlift blackbox <release>`)
    pub revision: usize,

    /// Time to wait for the release to become ready
    #[arg(long, value_parser = humantime::parse_duration)]
    pub wait: Option<Duration>,

    /// Interval to poll resource state at; used with --wait
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5s")]
    pub poll: Duration,
}

pub async fn run(args: DescentArgs, system_namespace: &str) -> Result<()> {
    let reconciler = super::reconciler(system_namespace).await?;

    reconciler
        .descent(DescentParams {
            release: args.release.clone(),
            revision_id: args.revision,
            wait: args.wait,
            poll: args.poll,
        })
        .await?;

    println!(
        "{} Release {} rolled back to revision {}",
        style("✓").green().bold(),
        style(&args.release).cyan(),
        args.revision
    );
    Ok(())
}
