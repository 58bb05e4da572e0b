use anyhow::Result;
use clap::Parser;

/// A lightweight glue daemon that routes JSON-RPC events from a
/// configurable set of ingress sources to email/socket/HTTP/exec outputs
/// selected by the RPC `method` field.
#[derive(Debug, Parser)]
#[command(name = "notifier", about = "JSON-RPC event router and notifier")]
struct Args {
    /// Bare config filename, without extension, resolved as `<name>.yaml`
    /// against the working directory.
    #[arg(long)]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if let Err(err) = notifier_core::run(args.config).await {
        tracing::error!(error = %err, "notifier exited with a fatal error");
        std::process::exit(1);
    }
    Ok(())
}
