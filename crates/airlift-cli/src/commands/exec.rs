//! Exec command - run a flight and print its output without a cluster

use clap::Args;
use tokio_util::sync::CancellationToken;

use airlift_kube::{FlightSpec, evaluate_flight};

use crate::error::Result;

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Release name, forwarded to the flight as argv[0] and $RELEASE
    pub release: String,

    /// Flight path or http(s) URL
    pub flight: String,

    /// Namespace forwarded to the flight as $NAMESPACE
    #[arg(short, long, default_value = "default")]
    pub namespace: String,

    /// Arguments forwarded to the flight
    #[arg(last = true)]
    pub args: Vec<String>,
}

pub async fn run(args: ExecArgs, cancel: &CancellationToken) -> Result<()> {
    let spec = FlightSpec {
        source: args.flight,
        input: super::stdin_input()?,
        args: args.args,
        namespace: args.namespace,
    };

    let (stdout, _) = evaluate_flight(&args.release, &spec, cancel).await?;

    use std::io::Write;
    std::io::stdout().write_all(&stdout)?;
    Ok(())
}
