use anyhow::Result;
use clap::Parser;
use pagemill::build::build;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Builds a content directory into a page map and prints it as JSON.
#[derive(Parser)]
#[command(name = "pagemill", version, about)]
struct Args {
    /// Root content directory to build.
    root: PathBuf,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let store = build(&args.root)?;
    let out = if args.pretty {
        serde_json::to_string_pretty(&store)?
    } else {
        serde_json::to_string(&store)?
    };
    println!("{out}");
    Ok(())
}
