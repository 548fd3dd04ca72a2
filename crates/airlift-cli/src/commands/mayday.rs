//! Mayday command - delete a release and its history

use clap::Args;
use console::style;

use crate::error::Result;

#[derive(Args, Debug)]
pub struct MaydayArgs {
    /// Release name
    pub release: String,
}

pub async fn run(args: MaydayArgs, system_namespace: &str) -> Result<()> {
    let reconciler = super::reconciler(system_namespace).await?;
    reconciler.mayday(&args.release).await?;

    println!(
        "{} Release {} deleted",
        style("✓").green().bold(),
        style(&args.release).cyan()
    );
    Ok(())
}
