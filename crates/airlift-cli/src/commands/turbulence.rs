//! Turbulence command - detect and repair drift from declared state

use std::io::IsTerminal;

use clap::Args;

use airlift_kube::TurbulenceParams;

use crate::error::Result;

#[derive(Args, Debug)]
pub struct TurbulenceArgs {
    /// Release name
    pub release: String,

    /// Only show turbulence for declared state. Disable to also diff
    /// server-generated fields such as status and defaults
    #[arg(
        long = "conflict-only",
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        default_value_t = true,
    )]
    pub conflict_only: bool,

    /// Repair the drift by re-applying the declared state
    #[arg(long)]
    pub fix: bool,

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
}

pub async fn run(args: TurbulenceArgs, system_namespace: &str) -> Result<()> {
    let reconciler = super::reconciler(system_namespace).await?;

    Ok(reconciler
        .turbulence(TurbulenceParams {
            release: args.release,
            // Fixing only ever reconciles declared state.
            conflict_only: args.conflict_only || args.fix,
            fix: args.fix,
            context: args.context,
            color: args.color,
        })
        .await?)
}
