//! CLI subcommands

pub mod blackbox;
pub mod descent;
pub mod exec;
pub mod mayday;
pub mod takeoff;
pub mod turbulence;

use airlift_kube::{Output, Reconciler};

use crate::error::Result;

/// Build the reconciler every command runs against.
pub async fn reconciler(system_namespace: &str) -> Result<Reconciler> {
    let client = kube::Client::try_default()
        .await
        .map_err(airlift_kube::KubeError::from)?;
    Ok(Reconciler::with_client(client, system_namespace, Output::stdio()).await?)
}

/// Flight input: stdin is forwarded when the process is not attached to a
/// terminal.
pub fn stdin_input() -> Result<Option<Vec<u8>>> {
    use std::io::{IsTerminal, Read};

    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut input = Vec::new();
    stdin.read_to_end(&mut input)?;
    Ok(Some(input))
}
