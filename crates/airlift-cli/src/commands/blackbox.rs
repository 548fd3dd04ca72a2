//! Blackbox command - inspect persisted release state

use clap::Args;

use airlift_kube::BlackboxParams;

use crate::error::Result;

#[derive(Args, Debug)]
pub struct BlackboxArgs {
    /// Release name; omit to list all releases
    pub release: Option<String>,

    /// Revision ID; dumps that revision's resources
    pub revision: Option<usize>,

    /// Second revision ID; shows the diff between the two revisions
    pub diff_revision: Option<usize>,

    /// Print release to resource mappings, ignoring all other arguments
    #[arg(long)]
    pub mapping: bool,

    /// Lines of context in diffs
    #[arg(long, default_value_t = 4)]
    pub context: usize,
}

pub async fn run(args: BlackboxArgs, system_namespace: &str) -> Result<()> {
    let reconciler = super::reconciler(system_namespace).await?;

    Ok(reconciler
        .blackbox(BlackboxParams {
            release: args.release,
            revision_id: args.revision,
            diff_revision_id: args.diff_revision,
            mapping: args.mapping,
            context: args.context,
        })
        .await?)
}
